use super::mage_traits;
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::Character;
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

fn obsession_count(character: &Character) -> usize {
    if mage_traits(character).gnosis.max(1) >= 3 { 2 } else { 1 }
}

pub struct ObsessionsStep;

#[async_trait]
impl GenerationStep for ObsessionsStep {
    fn key(&self) -> StepKey {
        StepKey::Obsessions
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let count = obsession_count(character);
        format!(
            "Generate {count} Obsession(s) for this Mage: the Awakening character. Obsessions are long-term Aspirations related to magical mysteries, granting Arcane Beats and Mana upon progress or resolution.\n\
             \n\
             • Base on the character's Path, Order, Arcana, Aspiration, and other sheet details to create thematic, mystical goals (e.g., \"Uncover the secrets of the ancient Atlantean ruin\" or \"Master the interplay between Fate and Time\").\n\
             • Return an object with:\n  \
             • **obsessions** – array of {count} unique strings, each a concise Obsession description.",
        )
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let count = obsession_count(character);
        ToolSchema {
            name: "generate_obsessions".into(),
            description: "Generate Obsessions based on Gnosis".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "obsessions": {
                        "type": "array",
                        "minItems": count,
                        "maxItems": count,
                        "items": { "type": "string" },
                    },
                },
                "required": ["obsessions"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let count = obsession_count(character);
        match data.get("obsessions").and_then(Value::as_array) {
            Some(obsessions) if obsessions.len() == count => {
                for obsession in obsessions {
                    let text = obsession.as_str().unwrap_or_default();
                    if text.trim().is_empty() {
                        errors.push("Each obsession must be a non-empty string".into());
                    }
                }
                let unique: HashSet<String> =
                    obsessions.iter().map(|obsession| obsession.to_string()).collect();
                if unique.len() != obsessions.len() {
                    errors.push("Obsessions must be unique".into());
                }
            }
            _ => errors.push(format!("obsessions must be an array of exactly {count} items")),
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let obsessions: Vec<&str> = data
            .get("obsessions")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        store.update(json!({ "mage": { "obsessions": obsessions.join("\n") } })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.mage.as_ref().map(|mage| mage.obsessions.trim().is_empty()).unwrap_or(true)
    }
}
