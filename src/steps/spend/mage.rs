use super::{
    MeritIncrease, MeritPurchase, add_progress, cleared, increasable_attributes,
    increasable_skills, listings_json, merit_increases, merit_purchases, next_merit_rating,
    requires_signifier, skills_with_dots,
};
use crate::ai::ToolSchema;
use crate::catalog::{Catalog, parse_possible_ratings};
use crate::character::{Character, GROSS_ARCANA, Item, ItemKind, base_name};
use crate::error::StoreError;
use crate::expr::evaluate_prerequisite;
use crate::step::{GenerationStep, StepKey};
use crate::steps::mage::{eligible_spells, mage_traits, path};
use crate::store::{CharacterStore, ItemPatch};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

/// Dots an Arcanum reaches at the cheaper rate: 5 for Ruling, 2 for
/// Inferior, 4 otherwise. Above the limit each dot costs 5.
fn arcanum_limit(path_name: &str, key: &str) -> i64 {
    match path(path_name) {
        Some(info) => {
            if info.ruling.iter().any(|label| label.eq_ignore_ascii_case(key)) {
                5
            } else if info.inferior.eq_ignore_ascii_case(key) {
                2
            } else {
                4
            }
        }
        None => 4,
    }
}

fn option_schema(kind: &str, fields: &[(&str, Value)], required: &[&str]) -> Value {
    let mut properties = Map::new();
    properties.insert("type".into(), json!({ "const": kind }));
    for (name, schema) in fields {
        properties.insert((*name).to_string(), schema.clone());
    }
    let mut needed = vec![json!("type")];
    needed.extend(required.iter().map(|name| json!(name)));
    json!({
        "type": "object",
        "properties": properties,
        "required": needed
    })
}

fn spell_copy(spell: &Item, rote: bool, praxis: bool) -> Item {
    let mut copy = cleared(spell);
    copy.data["isBefouled"] = json!(false);
    copy.data["isInured"] = json!(false);
    copy.data["isPraxis"] = json!(praxis);
    copy.data["isRote"] = json!(rote);
    copy
}

struct SpendOptions {
    regular: i64,
    arcane: i64,
    gnosis: i64,
    wisdom: i64,
    willpower: i64,
    res_com: i64,
    attributes: Vec<&'static str>,
    skills: Vec<&'static str>,
    specialty_skills: Vec<&'static str>,
    new_merits: Vec<MeritPurchase>,
    merit_increases: Vec<MeritIncrease>,
    arcana: Vec<Value>,
    arcana_keys: Vec<&'static str>,
    rote_ids: Vec<String>,
    praxis_ids: Vec<String>,
    spells: Vec<Value>,
}

fn gather(character: &Character, catalog: &Catalog) -> SpendOptions {
    let mage = mage_traits(character);
    let regular = character.experience();
    let arcane = character.arcane_experience();
    let gnosis = i64::from(mage.gnosis.max(1));
    let wisdom = if mage.wisdom == 0 { 7 } else { i64::from(mage.wisdom) };
    let willpower = character.willpower.max;
    let res_com =
        i64::from(character.attributes.resolve) + i64::from(character.attributes.composure);

    let mut arcana = Vec::new();
    let mut arcana_keys = Vec::new();
    for (key, arcanum) in mage.arcana() {
        let value = i64::from(arcanum.dots);
        if value >= 5 {
            continue;
        }
        let limit = arcanum_limit(&mage.path, key);
        let cost = if value >= limit { 5 } else { 4 };
        if regular >= cost || arcane >= cost {
            arcana.push(json!({ "arc": key, "current": value, "cost": cost }));
            arcana_keys.push(key);
        }
    }

    let eligible = eligible_spells(character, catalog);
    let owned_rote = |name: &str| {
        character
            .items_of(ItemKind::Spell)
            .any(|item| item.name == name && item.is_rote())
    };
    let owned_praxis = |name: &str| {
        character
            .items_of(ItemKind::Spell)
            .any(|item| item.name == name && item.is_praxis())
    };
    let rote_ids = eligible
        .iter()
        .filter(|spell| !owned_rote(&spell.name))
        .map(|spell| spell.id.clone())
        .collect();
    let praxis_ids = eligible
        .iter()
        .filter(|spell| !owned_praxis(&spell.name))
        .map(|spell| spell.id.clone())
        .collect();
    let spells = eligible
        .iter()
        .map(|spell| {
            json!({ "id": spell.id, "name": spell.name, "description": spell.description })
        })
        .collect();

    SpendOptions {
        regular,
        arcane,
        gnosis,
        wisdom,
        willpower,
        res_com,
        attributes: increasable_attributes(character, 5),
        skills: increasable_skills(character, 5),
        specialty_skills: skills_with_dots(character),
        new_merits: merit_purchases(character, catalog, regular),
        merit_increases: merit_increases(character, catalog, regular),
        arcana,
        arcana_keys,
        rote_ids,
        praxis_ids,
        spells,
    }
}

pub struct SpendMageStep;

#[async_trait]
impl GenerationStep for SpendMageStep {
    fn key(&self) -> StepKey {
        StepKey::SpendExperience
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let options = gather(character, catalog);
        if options.regular <= 0 && options.arcane <= 0 {
            return "No Experience points to spend.".into();
        }

        let mut prompt = format!(
            "Choose one Experience expenditure for this Mage character. You have {} regular Experience and {} Arcane Experience.\n\
             \n\
             • Expenditures follow Mage: The Awakening 2nd Edition rules.\n\
             • Items with * can use regular or Arcane XP (prefer regular).\n\
             • ** only Arcane XP.\n\
             • No * only regular XP.\n\
             • Arcanum cost: 4 to limit, 5 above (Ruling limit 5, Common 4, Inferior 2).\n\
             • Gnosis increase grants free Praxis (choose spell).\n\
             • Only choose affordable and available options.\n\
             \n\
             Available options:",
            options.regular, options.arcane
        );

        if options.regular >= 4 && !options.attributes.is_empty() {
            prompt.push_str(&format!(
                "\n• Increase Attribute (4 regular XP). Available: {}.",
                options.attributes.join(", ")
            ));
        }
        if options.regular >= 2 && !options.skills.is_empty() {
            prompt.push_str(&format!(
                "\n• Increase Skill (2 regular XP). Available: {}.",
                options.skills.join(", ")
            ));
        }
        if options.regular >= 1 && !options.specialty_skills.is_empty() {
            prompt.push_str(&format!(
                "\n• Add Skill Specialty (1 regular XP). Available skills: {}. Provide specialty string (1-50 characters).",
                options.specialty_skills.join(", ")
            ));
        }
        if !options.new_merits.is_empty() {
            let listings: Vec<Value> = options
                .new_merits
                .iter()
                .map(|merit| merit.listing.clone())
                .collect();
            prompt.push_str(&format!(
                "\n• Buy new Merit at min rating (1 regular XP per dot). Some require signifier (1-30 characters). Available:\n```json\n{}\n```",
                listings_json(&listings)
            ));
        }
        if !options.merit_increases.is_empty() {
            let listings: Vec<Value> = options
                .merit_increases
                .iter()
                .map(|merit| merit.listing.clone())
                .collect();
            prompt.push_str(&format!(
                "\n• Increase existing Merit to next rating (1 regular XP per dot difference). Available:\n```json\n{}\n```",
                listings_json(&listings)
            ));
        }
        if !options.arcana.is_empty() {
            prompt.push_str(&format!(
                "\n• Increase Arcanum (*4 or 5 XP). Available:\n```json\n{}\n```",
                listings_json(&options.arcana)
            ));
        }
        if options.regular >= 5 || options.arcane >= 5 {
            prompt.push_str("\n• Increase Gnosis (*5 XP), choose free Praxis spell.");
        }
        if options.regular >= 1 && !options.rote_ids.is_empty() {
            prompt.push_str("\n• Buy Rote (1 regular XP).");
        }
        if options.arcane >= 1 && !options.praxis_ids.is_empty() {
            prompt.push_str("\n• Buy Praxis (**1 Arcane XP).");
        }
        if options.wisdom < 10 && options.arcane >= 2 {
            prompt.push_str("\n• Increase Wisdom (**2 Arcane XP).");
        }
        if options.willpower < options.res_com && options.regular >= 1 {
            prompt.push_str("\n• Increase Willpower (1 regular XP).");
        }

        prompt.push_str("\n\nReturn an object named **choice** with the selected expenditure.");

        if !options.spells.is_empty() {
            prompt.push_str(&format!(
                "\n\nHere are the spells available to your character to pick as some combination of Rotes/Praxes:\n```json\n{}\n```",
                listings_json(&options.spells)
            ));
        }
        prompt
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let options = gather(character, catalog);
        let mut choices: Vec<Value> = Vec::new();

        if options.regular >= 4 && !options.attributes.is_empty() {
            choices.push(option_schema(
                "increase_attribute",
                &[("attribute", json!({ "type": "string", "enum": options.attributes }))],
                &["attribute"],
            ));
        }
        if options.regular >= 2 && !options.skills.is_empty() {
            choices.push(option_schema(
                "increase_skill",
                &[("skill", json!({ "type": "string", "enum": options.skills }))],
                &["skill"],
            ));
        }
        if options.regular >= 1 && !options.specialty_skills.is_empty() {
            choices.push(option_schema(
                "add_skill_specialty",
                &[
                    ("skill", json!({ "type": "string", "enum": options.specialty_skills })),
                    (
                        "specialty",
                        json!({ "type": "string", "minLength": 1, "maxLength": 50 }),
                    ),
                ],
                &["skill", "specialty"],
            ));
        }
        if !options.new_merits.is_empty() {
            let merit_ids: Vec<&str> =
                options.new_merits.iter().map(|merit| merit.id.as_str()).collect();
            choices.push(option_schema(
                "buy_new_merit",
                &[
                    ("meritId", json!({ "type": "string", "enum": merit_ids })),
                    ("signifier", json!({ "type": "string", "minLength": 1, "maxLength": 30 })),
                ],
                &["meritId"],
            ));
        }
        if !options.merit_increases.is_empty() {
            let merit_ids: Vec<&str> =
                options.merit_increases.iter().map(|merit| merit.id.as_str()).collect();
            choices.push(option_schema(
                "increase_merit",
                &[("meritId", json!({ "type": "string", "enum": merit_ids }))],
                &["meritId"],
            ));
        }
        if !options.arcana.is_empty() {
            choices.push(option_schema(
                "increase_arcanum",
                &[("arcanum", json!({ "type": "string", "enum": options.arcana_keys }))],
                &["arcanum"],
            ));
        }
        if options.gnosis < 10 && (options.regular >= 5 || options.arcane >= 5) {
            choices.push(option_schema(
                "increase_gnosis",
                &[("praxisSpellId", json!({ "type": "string", "enum": options.praxis_ids }))],
                &["praxisSpellId"],
            ));
        }
        if options.regular >= 1 && !options.rote_ids.is_empty() {
            choices.push(option_schema(
                "buy_rote",
                &[("spellId", json!({ "type": "string", "enum": options.rote_ids }))],
                &["spellId"],
            ));
        }
        if options.arcane >= 1 && !options.praxis_ids.is_empty() {
            choices.push(option_schema(
                "buy_praxis",
                &[("spellId", json!({ "type": "string", "enum": options.praxis_ids }))],
                &["spellId"],
            ));
        }
        if options.wisdom < 10 && options.arcane >= 2 {
            choices.push(option_schema("increase_wisdom", &[], &[]));
        }
        if options.willpower < options.res_com && options.regular >= 1 {
            choices.push(option_schema("increase_willpower", &[], &[]));
        }

        ToolSchema {
            name: "spend_experience".into(),
            description: "Choose one valid Experience expenditure".into(),
            parameters: json!({
                "type": "object",
                "properties": { "choice": { "anyOf": choices } },
                "required": ["choice"]
            }),
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let Some(choice) = data.get("choice").filter(|choice| choice.is_object()) else {
            errors.push("Choice is required".into());
            return errors;
        };
        let kind = choice.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind.is_empty() {
            errors.push("Type is required".into());
            return errors;
        }

        let mage = mage_traits(character);
        let regular = character.experience();
        let arcane = character.arcane_experience();
        let gnosis = i64::from(mage.gnosis.max(1));
        let wisdom = if mage.wisdom == 0 { 7 } else { i64::from(mage.wisdom) };
        let willpower = character.willpower.max;
        let res_com =
            i64::from(character.attributes.resolve) + i64::from(character.attributes.composure);
        let eligible = eligible_spells(character, catalog);

        match kind {
            "increase_attribute" => {
                let attribute =
                    choice.get("attribute").and_then(Value::as_str).unwrap_or_default();
                if attribute.is_empty() {
                    errors.push("Attribute required".into());
                } else {
                    match character.attributes.get(attribute) {
                        None => errors.push("Invalid attribute".into()),
                        Some(value) if value >= 5 => errors.push("Attribute at maximum".into()),
                        Some(_) => {}
                    }
                }
                if regular < 4 {
                    errors.push("Not enough regular XP".into());
                }
            }
            "increase_skill" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                if skill.is_empty() {
                    errors.push("Skill required".into());
                } else {
                    match character.skills.get(skill) {
                        None => errors.push("Invalid skill".into()),
                        Some(entry) if entry.dots >= 5 => errors.push("Skill at maximum".into()),
                        Some(_) => {}
                    }
                }
                if regular < 2 {
                    errors.push("Not enough regular XP".into());
                }
            }
            "add_skill_specialty" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                let specialty =
                    choice.get("specialty").and_then(Value::as_str).unwrap_or_default();
                if skill.is_empty() {
                    errors.push("Skill required".into());
                }
                if specialty.is_empty() || specialty.chars().count() > 50 {
                    errors.push("Valid specialty required".into());
                }
                if !skill.is_empty() {
                    match character.skills.get(skill) {
                        None => errors.push("Invalid skill".into()),
                        Some(entry) => {
                            if entry.dots < 1 {
                                errors.push("Skill must have at least 1 dot".into());
                            }
                            if entry.specialties.iter().any(|existing| existing == specialty) {
                                errors.push("Specialty already exists".into());
                            }
                        }
                    }
                }
                if regular < 1 {
                    errors.push("Not enough regular XP".into());
                }
            }
            "buy_new_merit" => {
                let merit_id = choice.get("meritId").and_then(Value::as_str).unwrap_or_default();
                if merit_id.is_empty() {
                    errors.push("meritId required".into());
                } else {
                    match catalog.merits().find(|candidate| candidate.id == merit_id) {
                        None => errors.push("Invalid merit".into()),
                        Some(merit) => {
                            if !evaluate_prerequisite(&merit.prerequisites, character) {
                                errors.push("Prerequisites not met".into());
                            }
                            match parse_possible_ratings(&merit.possible_ratings).first() {
                                None => errors.push("No ratings available".into()),
                                Some(minimum) => {
                                    if regular < *minimum {
                                        errors.push("Not enough regular XP".into());
                                    }
                                }
                            }
                            if requires_signifier(&merit.name) {
                                let signifier = choice
                                    .get("signifier")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default();
                                if signifier.is_empty() || signifier.chars().count() > 30 {
                                    errors.push("Signifier required".into());
                                }
                            }
                        }
                    }
                }
            }
            "increase_merit" => {
                let merit_id = choice.get("meritId").and_then(Value::as_str).unwrap_or_default();
                if merit_id.is_empty() {
                    errors.push("meritId required".into());
                } else {
                    match character.items_of(ItemKind::Merit).find(|item| item.id == merit_id) {
                        None => errors.push("Invalid merit".into()),
                        Some(owned) => {
                            let world = catalog.merits().find(|candidate| {
                                base_name(&candidate.name) == base_name(&owned.name)
                            });
                            match world {
                                None => errors.push("World merit not found".into()),
                                Some(world) => {
                                    let next = parse_possible_ratings(&world.possible_ratings)
                                        .into_iter()
                                        .find(|rating| *rating > owned.rating);
                                    match next {
                                        None => errors.push("No higher rating".into()),
                                        Some(next) => {
                                            if regular < next - owned.rating {
                                                errors.push("Not enough regular XP".into());
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
            "increase_arcanum" => {
                let arcanum = choice.get("arcanum").and_then(Value::as_str).unwrap_or_default();
                if arcanum.is_empty() {
                    errors.push("arcanum required".into());
                } else {
                    match mage.arcanum(arcanum) {
                        None => errors.push("Invalid arcanum".into()),
                        Some(entry) => {
                            let value = i64::from(entry.dots);
                            if value >= 5 {
                                errors.push("Arcanum at maximum".into());
                            } else {
                                let limit = arcanum_limit(&mage.path, arcanum);
                                let cost = if value >= limit { 5 } else { 4 };
                                if regular < cost && arcane < cost {
                                    errors.push("Not enough XP".into());
                                }
                            }
                        }
                    }
                }
            }
            "increase_gnosis" => {
                if gnosis >= 10 {
                    errors.push("Gnosis at maximum".into());
                }
                let praxis_id =
                    choice.get("praxisSpellId").and_then(Value::as_str).unwrap_or_default();
                if praxis_id.is_empty() {
                    errors.push("praxisSpellId required".into());
                } else {
                    match eligible.iter().find(|spell| spell.id == praxis_id) {
                        None => errors.push("Invalid spell for Praxis".into()),
                        Some(spell) => {
                            let taken = character
                                .items_of(ItemKind::Spell)
                                .any(|item| item.name == spell.name && item.is_praxis());
                            if taken {
                                errors.push("Spell already a Praxis".into());
                            }
                        }
                    }
                }
                if regular < 5 && arcane < 5 {
                    errors.push("Not enough XP".into());
                }
            }
            "buy_rote" => {
                let spell_id = choice.get("spellId").and_then(Value::as_str).unwrap_or_default();
                if spell_id.is_empty() {
                    errors.push("spellId required".into());
                } else {
                    match eligible.iter().find(|spell| spell.id == spell_id) {
                        None => errors.push("Invalid spell".into()),
                        Some(spell) => {
                            let taken = character
                                .items_of(ItemKind::Spell)
                                .any(|item| item.name == spell.name && item.is_rote());
                            if taken {
                                errors.push("Spell already a Rote".into());
                            }
                        }
                    }
                }
                if regular < 1 {
                    errors.push("Not enough regular XP".into());
                }
            }
            "buy_praxis" => {
                let spell_id = choice.get("spellId").and_then(Value::as_str).unwrap_or_default();
                if spell_id.is_empty() {
                    errors.push("spellId required".into());
                } else {
                    match eligible.iter().find(|spell| spell.id == spell_id) {
                        None => errors.push("Invalid spell".into()),
                        Some(spell) => {
                            let taken = character
                                .items_of(ItemKind::Spell)
                                .any(|item| item.name == spell.name && item.is_praxis());
                            if taken {
                                errors.push("Spell already a Praxis".into());
                            }
                        }
                    }
                }
                if arcane < 1 {
                    errors.push("Not enough Arcane XP".into());
                }
            }
            "increase_wisdom" => {
                if wisdom >= 10 {
                    errors.push("Wisdom at maximum".into());
                }
                if arcane < 2 {
                    errors.push("Not enough Arcane XP".into());
                }
            }
            "increase_willpower" => {
                if willpower >= res_com {
                    errors.push("Willpower at maximum".into());
                }
                if regular < 1 {
                    errors.push("Not enough regular XP".into());
                }
            }
            _ => errors.push("Invalid type".into()),
        }

        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let snapshot = store.snapshot().await?;
        let mage = mage_traits(&snapshot);
        let regular = snapshot.experience();
        let Some(choice) = data.get("choice").filter(|choice| choice.is_object()) else {
            return Ok(());
        };
        let kind = choice.get("type").and_then(Value::as_str).unwrap_or_default();

        let mut additions: Vec<Item> = Vec::new();
        let mut item_patches: Vec<ItemPatch> = Vec::new();
        let mut patch = Value::Null;
        let mut cost = 0i64;
        let mut use_arcane = false;
        let reason;

        match kind {
            "increase_attribute" => {
                let attribute =
                    choice.get("attribute").and_then(Value::as_str).unwrap_or_default();
                let value = i64::from(snapshot.attributes.get(attribute).unwrap_or(0));
                patch = json!({ "attributes": { attribute: value + 1 } });
                cost = 4;
                reason = format!("increase Attribute {attribute}");
            }
            "increase_skill" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                let dots =
                    i64::from(snapshot.skills.get(skill).map(|entry| entry.dots).unwrap_or(0));
                patch = json!({ "skills": { skill: { "dots": dots + 1 } } });
                cost = 2;
                reason = format!("increase Skill {skill}");
            }
            "add_skill_specialty" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                let specialty =
                    choice.get("specialty").and_then(Value::as_str).unwrap_or_default();
                let mut specialties = snapshot
                    .skills
                    .get(skill)
                    .map(|entry| entry.specialties.clone())
                    .unwrap_or_default();
                specialties.push(specialty.to_string());
                patch = json!({ "skills": { skill: { "specialties": specialties } } });
                cost = 1;
                reason = format!("add Specialty {specialty} to {skill}");
            }
            "buy_new_merit" => {
                let merit_id = choice.get("meritId").and_then(Value::as_str).unwrap_or_default();
                let Some(merit) = catalog.merits().find(|candidate| candidate.id == merit_id)
                else {
                    return Ok(());
                };
                let minimum = parse_possible_ratings(&merit.possible_ratings)
                    .first()
                    .copied()
                    .unwrap_or(0);
                let mut purchase = cleared(merit);
                if let Some(signifier) = choice
                    .get("signifier")
                    .and_then(Value::as_str)
                    .filter(|signifier| !signifier.is_empty())
                {
                    purchase.name = format!("{} ({signifier})", merit.name);
                }
                purchase.rating = minimum;
                cost = minimum;
                reason = format!("buy Merit {}", purchase.name);
                additions.push(purchase);
            }
            "increase_merit" => {
                let merit_id = choice.get("meritId").and_then(Value::as_str).unwrap_or_default();
                let Some(owned) =
                    snapshot.items_of(ItemKind::Merit).find(|item| item.id == merit_id)
                else {
                    return Ok(());
                };
                let Some(next) = next_merit_rating(catalog, owned) else {
                    return Ok(());
                };
                item_patches.push(ItemPatch::new(owned.id.clone(), json!({ "rating": next })));
                cost = next - owned.rating;
                reason = format!("increase Merit {}", owned.name);
            }
            "increase_arcanum" => {
                let arcanum = choice.get("arcanum").and_then(Value::as_str).unwrap_or_default();
                let Some(entry) = mage.arcanum(arcanum) else {
                    return Ok(());
                };
                let value = i64::from(entry.dots);
                let limit = arcanum_limit(&mage.path, arcanum);
                cost = if value >= limit { 5 } else { 4 };
                use_arcane = regular < cost;
                let block = if GROSS_ARCANA.contains(&arcanum) {
                    "arcana_gross"
                } else {
                    "arcana_subtle"
                };
                patch = json!({ "mage": { block: { arcanum: { "dots": value + 1 } } } });
                reason = format!("increase Arcanum {arcanum}");
            }
            "increase_gnosis" => {
                let praxis_id =
                    choice.get("praxisSpellId").and_then(Value::as_str).unwrap_or_default();
                let eligible = eligible_spells(&snapshot, catalog);
                let Some(spell) = eligible.iter().find(|spell| spell.id == praxis_id) else {
                    return Ok(());
                };
                additions.push(spell_copy(spell, false, true));
                let gnosis = i64::from(mage.gnosis.max(1));
                patch = json!({ "mage": { "gnosis": gnosis + 1 } });
                cost = 5;
                use_arcane = regular < 5;
                reason = "increase Gnosis (with free Praxis)".to_string();
            }
            "buy_rote" => {
                let spell_id = choice.get("spellId").and_then(Value::as_str).unwrap_or_default();
                let eligible = eligible_spells(&snapshot, catalog);
                let Some(spell) = eligible.iter().find(|spell| spell.id == spell_id) else {
                    return Ok(());
                };
                additions.push(spell_copy(spell, true, false));
                cost = 1;
                reason = format!("buy Rote {}", spell.name);
            }
            "buy_praxis" => {
                let spell_id = choice.get("spellId").and_then(Value::as_str).unwrap_or_default();
                let eligible = eligible_spells(&snapshot, catalog);
                let Some(spell) = eligible.iter().find(|spell| spell.id == spell_id) else {
                    return Ok(());
                };
                additions.push(spell_copy(spell, false, true));
                cost = 1;
                use_arcane = true;
                reason = format!("buy Praxis {}", spell.name);
            }
            "increase_wisdom" => {
                let wisdom = if mage.wisdom == 0 { 7 } else { i64::from(mage.wisdom) };
                patch = json!({ "mage": { "wisdom": wisdom + 1 } });
                cost = 2;
                use_arcane = true;
                reason = "increase Wisdom".to_string();
            }
            "increase_willpower" => {
                // A permanent Willpower dot also fills the pool by one.
                let willpower = snapshot.willpower;
                patch = json!({
                    "willpower": { "value": willpower.value + 1, "max": willpower.max + 1 }
                });
                cost = 1;
                reason = "increase Willpower".to_string();
            }
            _ => return Ok(()),
        }

        if !additions.is_empty() {
            store.create_items(additions).await?;
        }
        if !item_patches.is_empty() {
            store.update_items(item_patches).await?;
        }
        if !patch.is_null() {
            store.update(patch).await?;
        }
        let (beats, arcane_beats) = if use_arcane { (0, -cost * 5) } else { (-cost * 5, 0) };
        add_progress(store, reason, beats, arcane_beats).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.experience() > 0 || character.arcane_experience() > 0
    }
}
