use crate::ai::ToolSchema;
use crate::catalog::{Catalog, strip_html};
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

// Rites without a level count as level 3 and fall outside the budget.
fn rite_level(item: &Item) -> i64 {
    item.data["level"].as_i64().unwrap_or(3)
}

fn eligible_rites(catalog: &Catalog) -> Vec<&Item> {
    catalog.rites().filter(|item| rite_level(item) <= 2).collect()
}

pub struct RitesStep;

#[async_trait]
impl GenerationStep for RitesStep {
    fn key(&self) -> StepKey {
        StepKey::Rites
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, _character: &Character, catalog: &Catalog) -> String {
        let listing: Vec<Value> = eligible_rites(catalog)
            .iter()
            .map(|item| {
                json!({
                    "id": item.id,
                    "name": item.name,
                    "description": strip_html(&item.description),
                    "level": item.data["level"],
                    "riteType": item.data["riteType"],
                    "action": item.data["action"],
                })
            })
            .collect();
        let rites_json = Value::Array(listing).to_string();

        format!(
            "Select Rites for this Werewolf: the Forsaken character. The character gets exactly two dots in Rites.\n\
             \n\
             • Select either two one-dot Rites (levels sum to 2) or one two-dot Rite (level 2).\n\
             • Do not select the same Rite more than once.\n\
             • Return an object with:\n  \
             • **choices** – an array of strings (Rite ids from the list). Length 1 or 2, depending on the combination.\n\
             • Ensure the total levels sum exactly to 2.\n\
             \n\
             Eligible Rites:\n```json\n{rites_json}\n```\n"
        )
    }

    fn tool(&self, _character: &Character, catalog: &Catalog) -> ToolSchema {
        let rite_ids: Vec<&str> = eligible_rites(catalog)
            .iter()
            .map(|item| item.id.as_str())
            .collect();

        ToolSchema {
            name: "generate_rites".into(),
            description: "Choose eligible Rites totaling exactly 2 dots".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "choices": {
                        "type": "array",
                        "minItems": 1,
                        "maxItems": 2,
                        "items": { "type": "string", "enum": rite_ids }
                    }
                },
                "required": ["choices"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, _character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let rites = eligible_rites(catalog);

        let Some(choices) = data.get("choices").and_then(Value::as_array) else {
            errors.push("choices must be an array".into());
            return errors;
        };

        if choices.len() != 1 && choices.len() != 2 {
            errors.push("choices must have 1 or 2 items".into());
        }

        let unique: HashSet<String> = choices.iter().map(|value| value.to_string()).collect();
        if unique.len() != choices.len() {
            errors.push("Duplicate Rites selected".into());
        }

        let mut total = 0;
        for id in choices.iter().map(|value| value.as_str().unwrap_or_default()) {
            match rites.iter().find(|item| item.id == id) {
                Some(item) => total += rite_level(item),
                None => errors.push(format!("Invalid rite id: {id}")),
            }
        }
        if total != 2 {
            errors.push(format!("Total Rite levels must be exactly 2 (current: {total})"));
        }

        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let additions: Vec<Item> = data
            .get("choices")
            .and_then(Value::as_array)
            .map(|choices| {
                choices
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| catalog.item(id))
                    .map(|rite| {
                        let mut copy = rite.clone();
                        copy.id = String::new();
                        copy
                    })
                    .collect()
            })
            .unwrap_or_default();

        if additions.is_empty() {
            return Ok(());
        }
        store.create_items(additions).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.items_of(ItemKind::Rite).next().is_none()
    }
}
