use super::eligible_spells;
use crate::ai::ToolSchema;
use crate::catalog::{Catalog, strip_html};
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

fn spell_listing(spells: &[&Item]) -> Value {
    let entries: Vec<Value> = spells
        .iter()
        .map(|spell| {
            json!({
                "id": spell.id,
                "name": spell.name,
                "arcanum": spell.arcanum(),
                "level": spell.spell_level(),
                "roteSkills": spell.rote_skills(),
                "description": strip_html(&spell.description),
            })
        })
        .collect();
    Value::Array(entries)
}

pub struct RotesStep;

#[async_trait]
impl GenerationStep for RotesStep {
    fn key(&self) -> StepKey {
        StepKey::Rotes
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let spells = eligible_spells(character, catalog);
        format!(
            "Select exactly 3 Rotes for this Mage: the Awakening character. Rotes are mastered spells, each associated with one Rote Skill from its list for casting bonuses.\n\
             \n\
             • Choose 3 unique spells from the eligible list.\n\
             • For each, select one Rote Skill from its available roteSkills array.\n\
             • Return an object with:\n  \
             • **choices** – array of objects, each with:\n    \
             • **spellId** – the spell's id (string).\n    \
             • **roteSkill** – the chosen Rote Skill (string, exact from its roteSkills).\n\
             \n\
             Eligible Spells:\n\
             ```json\n\
             {listing}\n\
             ```",
            listing = spell_listing(&spells),
        )
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let spells = eligible_spells(character, catalog);
        let ids: Vec<&str> = spells.iter().map(|spell| spell.id.as_str()).collect();
        let mut skills: Vec<String> = Vec::new();
        for spell in &spells {
            for skill in spell.rote_skills() {
                if !skills.contains(&skill) {
                    skills.push(skill);
                }
            }
        }
        ToolSchema {
            name: "generate_rotes".into(),
            description: "Select 3 Rotes with chosen Rote Skills".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "choices": {
                        "type": "array",
                        "minItems": 3,
                        "maxItems": 3,
                        "items": {
                            "type": "object",
                            "properties": {
                                "spellId": { "type": "string", "enum": ids },
                                "roteSkill": { "type": "string", "enum": skills },
                            },
                            "required": ["spellId", "roteSkill"],
                            "additionalProperties": false,
                        },
                    },
                },
                "required": ["choices"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let spells = eligible_spells(character, catalog);

        let Some(choices) = data.get("choices").and_then(Value::as_array) else {
            errors.push("choices must be an array of exactly 3 items".into());
            return errors;
        };
        if choices.len() != 3 {
            errors.push("choices must be an array of exactly 3 items".into());
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for choice in choices {
            let spell_id = choice.get("spellId").and_then(Value::as_str).unwrap_or_default();
            let rote_skill = choice.get("roteSkill").and_then(Value::as_str).unwrap_or_default();
            if !choice.is_object() || spell_id.is_empty() || rote_skill.is_empty() {
                errors.push("Invalid choice object".into());
            }
            match spells.iter().find(|spell| spell.id == spell_id) {
                None => errors.push(format!("Invalid spellId: {spell_id}")),
                Some(spell) => {
                    if !spell.rote_skills().iter().any(|skill| skill == rote_skill) {
                        errors
                            .push(format!("Invalid roteSkill {rote_skill} for spell {spell_id}"));
                    }
                }
            }
            if !seen.insert(spell_id) {
                errors.push(format!("Duplicate spellId: {spell_id}"));
            }
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let mut additions: Vec<Item> = Vec::new();
        if let Some(choices) = data.get("choices").and_then(Value::as_array) {
            for choice in choices {
                let Some(spell_id) = choice.get("spellId").and_then(Value::as_str) else {
                    continue;
                };
                let Some(base) = catalog.item(spell_id) else { continue };
                let rote_skill =
                    choice.get("roteSkill").and_then(Value::as_str).unwrap_or_default();
                let mut spell = base.clone();
                spell.id = String::new();
                spell.data["isBefouled"] = json!(false);
                spell.data["isInured"] = json!(false);
                spell.data["isPraxis"] = json!(false);
                spell.data["isRote"] = json!(true);
                spell.data["roteSkill"] = json!(rote_skill);
                additions.push(spell);
            }
        }
        if additions.is_empty() {
            return Ok(());
        }
        store.create_items(additions).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        !character.items_of(ItemKind::Spell).any(Item::is_rote)
    }
}
