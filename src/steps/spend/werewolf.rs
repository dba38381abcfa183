use super::{
    MeritIncrease, MeritPurchase, add_progress, cleared, increasable_attributes,
    increasable_skills, listings_json, merit_increases, merit_purchases, next_merit_rating,
    requires_signifier, skills_with_dots,
};
use crate::ai::ToolSchema;
use crate::catalog::{Catalog, parse_possible_ratings, strip_html};
use crate::character::{Character, Item, ItemKind, RENOWN_TYPES, base_name};
use crate::error::StoreError;
use crate::expr::evaluate_prerequisite;
use crate::step::{GenerationStep, StepKey};
use crate::steps::werewolf::{AUSPICES, affinity_gifts, auspice, gift_short_name, werewolf_traits};
use crate::store::{CharacterStore, ItemPatch};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Renown type named in a trailing parenthetical, tolerant of case.
/// Only the five real types count.
fn parsed_renown(name: &str) -> Option<String> {
    let inner = name.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let label = inner[open + 1..].trim().to_ascii_lowercase();
    RENOWN_TYPES.contains(&label.as_str()).then_some(label)
}

fn moon_renown_key(moon: &str) -> Option<&'static str> {
    AUSPICES
        .iter()
        .find(|info| info.moon_gift == moon)
        .map(|info| info.renown)
}

fn moon_facet_at<'a>(catalog: &'a Catalog, moon: &str, level: i64) -> Option<&'a Item> {
    catalog.facets().find(|facet| {
        facet.gift_type() == "moon"
            && gift_short_name(facet.gift()) == moon
            && facet.facet_level() == level
    })
}

/// Facets already owned in a Moon Gift; they arrive strictly in level order,
/// so the count doubles as the highest level reached.
fn owned_moon_level(character: &Character, moon: &str) -> i64 {
    character
        .items_of(ItemKind::Facet)
        .filter(|facet| facet.gift_type() == "moon" && gift_short_name(facet.gift()) == moon)
        .count() as i64
}

fn facet_listing(facets: &[&Item]) -> Vec<Value> {
    facets
        .iter()
        .map(|facet| {
            json!({
                "id": facet.id,
                "name": facet.name,
                "gift": facet.gift(),
                "description": strip_html(&facet.description),
            })
        })
        .collect()
}

fn renown_facet_listing(facets: &[&Item]) -> Vec<Value> {
    facets
        .iter()
        .map(|facet| {
            json!({
                "id": facet.id,
                "name": facet.name,
                "gift": facet.gift(),
                "giftType": facet.gift_type(),
                "description": strip_html(&facet.description),
            })
        })
        .collect()
}

fn ids<'a>(items: &[&'a Item]) -> Vec<&'a str> {
    items.iter().map(|item| item.id.as_str()).collect()
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
        "required": needed,
        "additionalProperties": false
    })
}

/// Everything the character could legally spend Experience on right now.
struct SpendOptions<'a> {
    exp: i64,
    primal_urge: i64,
    attributes: Vec<&'static str>,
    skills: Vec<&'static str>,
    specialty_skills: Vec<&'static str>,
    new_merits: Vec<MeritPurchase>,
    merit_increases: Vec<MeritIncrease>,
    affinity_unlock: Vec<&'a Item>,
    non_affinity_unlock: Vec<&'a Item>,
    add_shadow: Vec<&'a Item>,
    add_wolf: Vec<&'a Item>,
    unlock_moons: Vec<&'static str>,
    add_moons: Vec<&'static str>,
    available_renown: Vec<&'static str>,
    facets_per_renown: Vec<(&'static str, Vec<&'a Item>)>,
    rites: Vec<&'a Item>,
}

fn gather<'a>(character: &Character, catalog: &'a Catalog) -> SpendOptions<'a> {
    let werewolf = werewolf_traits(character);
    let exp = character.experience();
    let max_trait = 5 + i64::from(werewolf.primal_urge);

    // A gift counts as unlocked once any of its facets is owned.
    let entered: HashSet<String> = character
        .items_of(ItemKind::Facet)
        .map(|facet| gift_short_name(facet.gift()))
        .collect();
    let owned_facets: HashSet<&str> = character
        .items_of(ItemKind::Facet)
        .map(|facet| facet.name.as_str())
        .collect();
    let affinity = affinity_gifts(&werewolf);

    let mut affinity_unlock = Vec::new();
    let mut non_affinity_unlock = Vec::new();
    let mut add_shadow = Vec::new();
    let mut add_wolf = Vec::new();
    for facet in catalog.facets() {
        if owned_facets.contains(facet.name.as_str()) {
            continue;
        }
        let gift = gift_short_name(facet.gift());
        match facet.gift_type() {
            "shadow" => {
                if entered.contains(&gift) {
                    add_shadow.push(facet);
                } else if affinity.contains(gift.as_str()) {
                    affinity_unlock.push(facet);
                } else {
                    non_affinity_unlock.push(facet);
                }
            }
            "wolf" => add_wolf.push(facet),
            _ => {}
        }
    }

    let auspice_moon = auspice(&werewolf.auspice).map(|info| info.moon_gift);
    let mut unlock_moons = Vec::new();
    let mut add_moons = Vec::new();
    for info in &AUSPICES {
        let moon = info.moon_gift;
        if auspice_moon == Some(moon) {
            continue;
        }
        let renown = i64::from(werewolf.renown.dots(info.renown));
        if entered.contains(moon) {
            if owned_moon_level(character, moon) < renown {
                add_moons.push(moon);
            }
        } else if renown >= 1 {
            unlock_moons.push(moon);
        }
    }

    let facets_per_renown: Vec<(&'static str, Vec<&'a Item>)> = RENOWN_TYPES
        .into_iter()
        .map(|renown| {
            let facets = catalog
                .facets()
                .filter(|facet| matches!(facet.gift_type(), "shadow" | "wolf"))
                .filter(|facet| parsed_renown(&facet.name).as_deref() == Some(renown))
                .filter(|facet| !owned_facets.contains(facet.name.as_str()))
                .collect();
            (renown, facets)
        })
        .collect();
    let available_renown = facets_per_renown
        .iter()
        .filter(|(renown, facets)| {
            i64::from(werewolf.renown.dots(renown)) < 5 && !facets.is_empty()
        })
        .map(|(renown, _)| *renown)
        .collect();

    let rites = catalog
        .rites()
        .filter(|rite| !character.has_item_named(ItemKind::Rite, &rite.name))
        .filter(|rite| evaluate_prerequisite(&rite.prerequisites, character))
        .filter(|rite| rite.rating <= exp)
        .collect();

    SpendOptions {
        exp,
        primal_urge: i64::from(werewolf.primal_urge),
        attributes: increasable_attributes(character, max_trait),
        skills: increasable_skills(character, max_trait),
        specialty_skills: skills_with_dots(character),
        new_merits: merit_purchases(character, catalog, exp),
        merit_increases: merit_increases(character, catalog, exp),
        affinity_unlock,
        non_affinity_unlock,
        add_shadow,
        add_wolf,
        unlock_moons,
        add_moons,
        available_renown,
        facets_per_renown,
        rites,
    }
}

pub struct SpendWerewolfStep;

#[async_trait]
impl GenerationStep for SpendWerewolfStep {
    fn key(&self) -> StepKey {
        StepKey::SpendExperience
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let options = gather(character, catalog);
        if options.exp <= 0 {
            return "No Experience points to spend.".into();
        }

        let mut prompt = format!(
            "Choose one Experience expenditure for this Werewolf character. You have {} Experience points (each expenditure deducts the cost from your total).\n\
             \n\
             • Expenditures must follow Werewolf: The Forsaken 2nd Edition rules for unlocking/buying with Experience.\n\
             • Gifts are unlocked by buying their first Facet (affinity Shadow: 3, non-affinity Shadow: 5). Additional Facets in unlocked Gifts cost 2. Wolf Gifts are always unlocked; Facets cost 1.\n\
             • Moon Gifts: Auspice Moon Gift Facets are gained free with auspice Renown increases. Other Moon Gifts unlock with 5 for first Facet, 2 for each subsequent (in order, max = associated Renown dots).\n\
             • Renown increases (3) require choosing a Facet of that Renown in any Shadow or Wolf Gift (can unlock new Gift). If auspice Renown, also gain next auspice Moon Facet free.\n\
             • Only choose options you can afford and that are available.\n\
             \n\
             Available options:",
            options.exp
        );

        if options.exp >= 4 && !options.attributes.is_empty() {
            prompt.push_str(&format!(
                "\n• Increase an Attribute (4 Experience). Available: {}.",
                options.attributes.join(", ")
            ));
        }
        if options.exp >= 2 && !options.skills.is_empty() {
            prompt.push_str(&format!(
                "\n• Increase a Skill (2 Experience). Available: {}.",
                options.skills.join(", ")
            ));
        }
        if options.exp >= 1 && !options.specialty_skills.is_empty() {
            prompt.push_str(&format!(
                "\n• Add a Skill Specialty (1 Experience). Available skills: {}. Provide a specialty string (1-50 characters).",
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
                "\n• Buy new Merit at minimum rating (cost = min rating). Some require signifier (1-30 characters). Available:\n```json\n{}\n```",
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
                "\n• Increase existing Merit to next rating (cost = difference). Available:\n```json\n{}\n```",
                listings_json(&listings)
            ));
        }
        if options.exp >= 5 && options.primal_urge < 10 {
            prompt.push_str("\n• Increase Primal Urge (5 Experience).");
        }
        if options.exp >= 3 && !options.available_renown.is_empty() {
            let mut per_renown = Map::new();
            for (renown, facets) in &options.facets_per_renown {
                if options.available_renown.contains(renown) {
                    per_renown
                        .insert((*renown).to_string(), Value::Array(renown_facet_listing(facets)));
                }
            }
            let per_renown_json =
                serde_json::to_string(&per_renown).unwrap_or_else(|_| "{}".into());
            prompt.push_str(&format!(
                "\n• Increase Renown (3 Experience), choosing Facet of that Renown. Available per Renown:\n```json\n{per_renown_json}\n```"
            ));
        }
        if options.exp >= 3 && !options.affinity_unlock.is_empty() {
            prompt.push_str(&format!(
                "\n• Unlock affinity Shadow Gift with first Facet (3 Experience). Available Facets:\n```json\n{}\n```",
                listings_json(&facet_listing(&options.affinity_unlock))
            ));
        }
        if options.exp >= 5 && !options.non_affinity_unlock.is_empty() {
            prompt.push_str(&format!(
                "\n• Unlock non-affinity Shadow Gift with first Facet (5 Experience). Available Facets:\n```json\n{}\n```",
                listings_json(&facet_listing(&options.non_affinity_unlock))
            ));
        }
        if options.exp >= 2 && !options.add_shadow.is_empty() {
            prompt.push_str(&format!(
                "\n• Add Facet to unlocked Shadow Gift (2 Experience). Available Facets:\n```json\n{}\n```",
                listings_json(&facet_listing(&options.add_shadow))
            ));
        }
        if options.exp >= 1 && !options.add_wolf.is_empty() {
            prompt.push_str(&format!(
                "\n• Add Facet to Wolf Gift (1 Experience). Available Facets:\n```json\n{}\n```",
                listings_json(&facet_listing(&options.add_wolf))
            ));
        }
        if options.exp >= 5 && !options.unlock_moons.is_empty() {
            prompt.push_str(&format!(
                "\n• Unlock non-auspice Moon Gift with first Facet (5 Experience). Available: {}.",
                options.unlock_moons.join(", ")
            ));
        }
        if options.exp >= 2 && !options.add_moons.is_empty() {
            prompt.push_str(&format!(
                "\n• Add next Facet to unlocked non-auspice Moon Gift (2 Experience). Available: {}.",
                options.add_moons.join(", ")
            ));
        }
        if !options.rites.is_empty() {
            let listings: Vec<Value> = options
                .rites
                .iter()
                .map(|rite| {
                    json!({
                        "id": rite.id,
                        "name": rite.name,
                        "rating": rite.rating,
                        "cost": rite.rating,
                        "prerequisites": rite.prerequisites,
                        "description": strip_html(&rite.description),
                    })
                })
                .collect();
            prompt.push_str(&format!(
                "\n• Buy Rite (cost = dots). Available:\n```json\n{}\n```",
                listings_json(&listings)
            ));
        }

        prompt.push_str("\n\nReturn an object named **choice** with the selected expenditure.");
        prompt
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let options = gather(character, catalog);
        let mut choices: Vec<Value> = Vec::new();

        if options.exp >= 4 && !options.attributes.is_empty() {
            choices.push(option_schema(
                "increase_attribute",
                &[("attribute", json!({ "type": "string", "enum": options.attributes }))],
                &["attribute"],
            ));
        }
        if options.exp >= 2 && !options.skills.is_empty() {
            choices.push(option_schema(
                "increase_skill",
                &[("skill", json!({ "type": "string", "enum": options.skills }))],
                &["skill"],
            ));
        }
        if options.exp >= 1 && !options.specialty_skills.is_empty() {
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
        if options.exp >= 5 && options.primal_urge < 10 {
            choices.push(option_schema("increase_primal_urge", &[], &[]));
        }
        if options.exp >= 3 && !options.available_renown.is_empty() {
            let facet_ids: Vec<&str> = options
                .facets_per_renown
                .iter()
                .flat_map(|(_, facets)| facets.iter().map(|facet| facet.id.as_str()))
                .collect();
            choices.push(option_schema(
                "increase_renown",
                &[
                    ("renown", json!({ "type": "string", "enum": options.available_renown })),
                    ("facetId", json!({ "type": "string", "enum": facet_ids })),
                ],
                &["renown", "facetId"],
            ));
        }
        if options.exp >= 3 && !options.affinity_unlock.is_empty() {
            choices.push(option_schema(
                "unlock_affinity_shadow",
                &[("facetId", json!({ "type": "string", "enum": ids(&options.affinity_unlock) }))],
                &["facetId"],
            ));
        }
        if options.exp >= 5 && !options.non_affinity_unlock.is_empty() {
            choices.push(option_schema(
                "unlock_non_affinity_shadow",
                &[(
                    "facetId",
                    json!({ "type": "string", "enum": ids(&options.non_affinity_unlock) }),
                )],
                &["facetId"],
            ));
        }
        if options.exp >= 2 && !options.add_shadow.is_empty() {
            choices.push(option_schema(
                "add_shadow_facet",
                &[("facetId", json!({ "type": "string", "enum": ids(&options.add_shadow) }))],
                &["facetId"],
            ));
        }
        if options.exp >= 1 && !options.add_wolf.is_empty() {
            choices.push(option_schema(
                "add_wolf_facet",
                &[("facetId", json!({ "type": "string", "enum": ids(&options.add_wolf) }))],
                &["facetId"],
            ));
        }
        if options.exp >= 5 && !options.unlock_moons.is_empty() {
            choices.push(option_schema(
                "unlock_moon_gift",
                &[("moonGift", json!({ "type": "string", "enum": options.unlock_moons }))],
                &["moonGift"],
            ));
        }
        if options.exp >= 2 && !options.add_moons.is_empty() {
            choices.push(option_schema(
                "add_moon_facet",
                &[("moonGift", json!({ "type": "string", "enum": options.add_moons }))],
                &["moonGift"],
            ));
        }
        if !options.rites.is_empty() {
            choices.push(option_schema(
                "buy_rite",
                &[("riteId", json!({ "type": "string", "enum": ids(&options.rites) }))],
                &["riteId"],
            ));
        }

        let any_of = if choices.is_empty() {
            vec![json!({ "type": "object" })]
        } else {
            choices
        };
        ToolSchema {
            name: "spend_experience".into(),
            description: "Choose one valid Experience expenditure for the Werewolf character"
                .into(),
            parameters: json!({
                "type": "object",
                "properties": { "choice": { "anyOf": any_of } },
                "required": ["choice"],
                "additionalProperties": false
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

        let werewolf = werewolf_traits(character);
        let exp = character.experience();
        let max_trait = 5 + i64::from(werewolf.primal_urge);
        let entered: HashSet<String> = character
            .items_of(ItemKind::Facet)
            .map(|facet| gift_short_name(facet.gift()))
            .collect();
        let affinity = affinity_gifts(&werewolf);
        let auspice_moon = auspice(&werewolf.auspice).map(|info| info.moon_gift);
        let owned_facet = |name: &str| character.has_item_named(ItemKind::Facet, name);

        let mut cost = 0i64;
        match kind {
            "increase_attribute" => {
                let attribute =
                    choice.get("attribute").and_then(Value::as_str).unwrap_or_default();
                if attribute.is_empty() {
                    errors.push("Attribute required".into());
                } else {
                    match character.attributes.get(attribute) {
                        None => errors.push("Invalid attribute".into()),
                        Some(value) if i64::from(value) >= max_trait => {
                            errors.push("Attribute at maximum".into());
                        }
                        Some(_) => {}
                    }
                }
                cost = 4;
            }
            "increase_skill" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                if skill.is_empty() {
                    errors.push("Skill required".into());
                } else {
                    match character.skills.get(skill) {
                        None => errors.push("Invalid skill".into()),
                        Some(entry) if i64::from(entry.dots) >= max_trait => {
                            errors.push("Skill at maximum".into());
                        }
                        Some(_) => {}
                    }
                }
                cost = 2;
            }
            "add_skill_specialty" => {
                let skill = choice.get("skill").and_then(Value::as_str).unwrap_or_default();
                let specialty =
                    choice.get("specialty").and_then(Value::as_str).unwrap_or_default();
                if skill.is_empty() {
                    errors.push("Skill required".into());
                }
                if specialty.is_empty() || specialty.chars().count() > 50 {
                    errors.push("Valid specialty string required (1-50 characters)".into());
                }
                if !skill.is_empty() {
                    match character.skills.get(skill) {
                        None => errors.push("Invalid skill".into()),
                        Some(entry) => {
                            if entry.dots < 1 {
                                errors.push("Skill must have at least 1 dot".into());
                            }
                            if entry.specialties.iter().any(|existing| existing == specialty) {
                                errors.push("Specialty already exists for this skill".into());
                            }
                        }
                    }
                }
                cost = 1;
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
                                errors.push("Merit prerequisites not met".into());
                            }
                            match parse_possible_ratings(&merit.possible_ratings).first() {
                                None => errors.push("No possible ratings for merit".into()),
                                Some(minimum) => cost = *minimum,
                            }
                            if requires_signifier(&merit.name) {
                                let signifier = choice
                                    .get("signifier")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default();
                                if signifier.is_empty() || signifier.chars().count() > 30 {
                                    errors.push(
                                        "Signifier required for this merit (1-30 characters)"
                                            .into(),
                                    );
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
                        None => errors.push("Invalid actor merit".into()),
                        Some(owned) => {
                            let world = catalog.merits().find(|candidate| {
                                base_name(&candidate.name) == base_name(&owned.name)
                            });
                            match world {
                                None => {
                                    errors.push("Corresponding world merit not found".into());
                                }
                                Some(world) => {
                                    let next = parse_possible_ratings(&world.possible_ratings)
                                        .into_iter()
                                        .find(|rating| *rating > owned.rating);
                                    match next {
                                        None => {
                                            errors.push("No higher rating available".into());
                                        }
                                        Some(next) => cost = next - owned.rating,
                                    }
                                }
                            }
                        }
                    }
                }
            }
            "increase_primal_urge" => {
                if werewolf.primal_urge >= 10 {
                    errors.push("Primal Urge at maximum".into());
                }
                cost = 5;
            }
            "increase_renown" => {
                let renown = choice.get("renown").and_then(Value::as_str).unwrap_or_default();
                if renown.is_empty() {
                    errors.push("renown required".into());
                } else if !RENOWN_TYPES.contains(&renown) {
                    errors.push("Invalid renown type".into());
                } else if werewolf.renown.dots(renown) >= 5 {
                    errors.push("Renown at maximum".into());
                }

                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                if facet_id.is_empty() {
                    errors.push("facetId required".into());
                } else {
                    match catalog.facets().find(|candidate| candidate.id == facet_id) {
                        None => errors.push("Invalid facet".into()),
                        Some(facet) => {
                            if !matches!(facet.gift_type(), "shadow" | "wolf") {
                                errors.push("Facet must be Shadow or Wolf Gift".into());
                            } else if parsed_renown(&facet.name).as_deref() != Some(renown) {
                                errors.push("Facet does not match renown type".into());
                            } else if owned_facet(&facet.name) {
                                errors.push("Facet already owned".into());
                            }
                        }
                    }
                }
                cost = 3;
            }
            "unlock_affinity_shadow" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                if facet_id.is_empty() {
                    errors.push("facetId required".into());
                } else {
                    match catalog.facets().find(|candidate| candidate.id == facet_id) {
                        None => errors.push("Invalid facet".into()),
                        Some(facet) => {
                            let gift = gift_short_name(facet.gift());
                            if facet.gift_type() != "shadow" {
                                errors.push("Must be Shadow Gift".into());
                            } else if entered.contains(&gift) {
                                errors.push("Gift already unlocked".into());
                            } else if !affinity.contains(gift.as_str()) {
                                errors.push("Not an affinity Shadow Gift".into());
                            } else if owned_facet(&facet.name) {
                                errors.push("Facet already owned".into());
                            }
                        }
                    }
                }
                cost = 3;
            }
            "unlock_non_affinity_shadow" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                if facet_id.is_empty() {
                    errors.push("facetId required".into());
                } else {
                    match catalog.facets().find(|candidate| candidate.id == facet_id) {
                        None => errors.push("Invalid facet".into()),
                        Some(facet) => {
                            let gift = gift_short_name(facet.gift());
                            if facet.gift_type() != "shadow" {
                                errors.push("Must be Shadow Gift".into());
                            } else if entered.contains(&gift) {
                                errors.push("Gift already unlocked".into());
                            } else if affinity.contains(gift.as_str()) {
                                errors.push("Is an affinity Shadow Gift".into());
                            } else if owned_facet(&facet.name) {
                                errors.push("Facet already owned".into());
                            }
                        }
                    }
                }
                cost = 5;
            }
            "add_shadow_facet" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                if facet_id.is_empty() {
                    errors.push("facetId required".into());
                } else {
                    match catalog.facets().find(|candidate| candidate.id == facet_id) {
                        None => errors.push("Invalid facet".into()),
                        Some(facet) => {
                            let gift = gift_short_name(facet.gift());
                            if facet.gift_type() != "shadow" {
                                errors.push("Must be Shadow Gift".into());
                            } else if !entered.contains(&gift) {
                                errors.push("Gift not unlocked".into());
                            } else if owned_facet(&facet.name) {
                                errors.push("Facet already owned".into());
                            }
                        }
                    }
                }
                cost = 2;
            }
            "add_wolf_facet" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                if facet_id.is_empty() {
                    errors.push("facetId required".into());
                } else {
                    match catalog.facets().find(|candidate| candidate.id == facet_id) {
                        None => errors.push("Invalid facet".into()),
                        Some(facet) => {
                            if facet.gift_type() != "wolf" {
                                errors.push("Must be Wolf Gift".into());
                            } else if owned_facet(&facet.name) {
                                errors.push("Facet already owned".into());
                            }
                        }
                    }
                }
                cost = 1;
            }
            "unlock_moon_gift" => {
                let moon = choice.get("moonGift").and_then(Value::as_str).unwrap_or_default();
                if moon.is_empty() {
                    errors.push("moonGift required".into());
                } else {
                    match moon_renown_key(moon) {
                        None => errors.push("Invalid Moon Gift".into()),
                        Some(renown) => {
                            if auspice_moon == Some(moon) {
                                errors.push(
                                    "Cannot unlock auspice Moon Gift with Experience".into(),
                                );
                            } else if entered.contains(moon) {
                                errors.push("Moon Gift already unlocked".into());
                            } else if werewolf.renown.dots(renown) < 1 {
                                errors.push("Associated renown too low".into());
                            } else if moon_facet_at(catalog, moon, 1).is_none() {
                                errors.push("Level 1 Facet not found for this Moon Gift".into());
                            }
                        }
                    }
                }
                cost = 5;
            }
            "add_moon_facet" => {
                let moon = choice.get("moonGift").and_then(Value::as_str).unwrap_or_default();
                if moon.is_empty() {
                    errors.push("moonGift required".into());
                } else {
                    match moon_renown_key(moon) {
                        None => errors.push("Invalid Moon Gift".into()),
                        Some(renown) => {
                            if auspice_moon == Some(moon) {
                                errors
                                    .push("Cannot add to auspice Moon Gift with Experience".into());
                            } else if !entered.contains(moon) {
                                errors.push("Moon Gift not unlocked".into());
                            } else {
                                let next_level = owned_moon_level(character, moon) + 1;
                                if i64::from(werewolf.renown.dots(renown)) < next_level {
                                    errors.push("Associated renown too low for next Facet".into());
                                } else if moon_facet_at(catalog, moon, next_level).is_none() {
                                    errors.push(
                                        "Next level Facet not found for this Moon Gift".into(),
                                    );
                                }
                            }
                        }
                    }
                }
                cost = 2;
            }
            "buy_rite" => {
                let rite_id = choice.get("riteId").and_then(Value::as_str).unwrap_or_default();
                if rite_id.is_empty() {
                    errors.push("riteId required".into());
                } else {
                    match catalog.rites().find(|candidate| candidate.id == rite_id) {
                        None => errors.push("Invalid rite".into()),
                        Some(rite) => {
                            if !evaluate_prerequisite(&rite.prerequisites, character) {
                                errors.push("Rite prerequisites not met".into());
                            }
                            if character.has_item_named(ItemKind::Rite, &rite.name) {
                                errors.push("Rite already owned".into());
                            }
                            if rite.rating <= 0 {
                                errors.push("Invalid rite rating".into());
                            } else {
                                cost = rite.rating;
                            }
                        }
                    }
                }
            }
            _ => errors.push("Invalid choice type".into()),
        }

        if cost > exp {
            errors.push("Not enough Experience for this choice".into());
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
        let werewolf = werewolf_traits(&snapshot);
        let Some(choice) = data.get("choice").filter(|choice| choice.is_object()) else {
            return Ok(());
        };
        let kind = choice.get("type").and_then(Value::as_str).unwrap_or_default();

        let mut additions: Vec<Item> = Vec::new();
        let mut item_patches: Vec<ItemPatch> = Vec::new();
        let mut patch = Value::Null;
        let mut cost = 0i64;
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
                reason = format!("add Skill Specialty {specialty} to {skill}");
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
                reason = format!("buy new Merit {}", purchase.name);
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
            "increase_primal_urge" => {
                let value = i64::from(werewolf.primal_urge);
                patch = json!({ "werewolf": { "primal_urge": value + 1 } });
                cost = 5;
                reason = "increase Primal Urge".to_string();
            }
            "increase_renown" => {
                let renown = choice.get("renown").and_then(Value::as_str).unwrap_or_default();
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                let Some(facet) = catalog.facets().find(|candidate| candidate.id == facet_id)
                else {
                    return Ok(());
                };
                let current = i64::from(werewolf.renown.dots(renown));
                patch = json!({ "werewolf": { "renown": { renown: { "dots": current + 1 } } } });
                additions.push(cleared(facet));
                // An auspice Renown increase also unlocks the next auspice
                // Moon Gift Facet for free.
                if let Some(info) = auspice(&werewolf.auspice) {
                    if info.renown == renown {
                        if let Some(moon_facet) = moon_facet_at(catalog, info.moon_gift, current + 1)
                        {
                            additions.push(cleared(moon_facet));
                        }
                    }
                }
                cost = 3;
                reason = format!("increase {renown}");
            }
            "unlock_affinity_shadow" | "unlock_non_affinity_shadow" | "add_shadow_facet" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                let Some(facet) = catalog.facets().find(|candidate| candidate.id == facet_id)
                else {
                    return Ok(());
                };
                additions.push(cleared(facet));
                cost = match kind {
                    "unlock_affinity_shadow" => 3,
                    "unlock_non_affinity_shadow" => 5,
                    _ => 2,
                };
                reason = format!("add Shadow Facet {}", facet.name);
            }
            "add_wolf_facet" => {
                let facet_id = choice.get("facetId").and_then(Value::as_str).unwrap_or_default();
                let Some(facet) = catalog.facets().find(|candidate| candidate.id == facet_id)
                else {
                    return Ok(());
                };
                additions.push(cleared(facet));
                cost = 1;
                reason = format!("add Wolf Facet {}", facet.name);
            }
            "unlock_moon_gift" => {
                let moon = choice.get("moonGift").and_then(Value::as_str).unwrap_or_default();
                if let Some(facet) = moon_facet_at(catalog, moon, 1) {
                    additions.push(cleared(facet));
                }
                cost = 5;
                reason = format!("unlock Moon Gift {moon}");
            }
            "add_moon_facet" => {
                let moon = choice.get("moonGift").and_then(Value::as_str).unwrap_or_default();
                let next_level = owned_moon_level(&snapshot, moon) + 1;
                if let Some(facet) = moon_facet_at(catalog, moon, next_level) {
                    additions.push(cleared(facet));
                }
                cost = 2;
                reason = format!("add Facet to Moon Gift {moon}");
            }
            "buy_rite" => {
                let rite_id = choice.get("riteId").and_then(Value::as_str).unwrap_or_default();
                let Some(rite) = catalog.rites().find(|candidate| candidate.id == rite_id) else {
                    return Ok(());
                };
                additions.push(cleared(rite));
                cost = rite.rating;
                reason = format!("buy Rite {}", rite.name);
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
        add_progress(store, reason, -cost * 5, 0).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.experience() > 0
    }
}
