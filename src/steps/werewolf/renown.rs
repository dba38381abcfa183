use super::werewolf_traits;
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, RENOWN_TYPES};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

fn open_categories(character: &Character) -> Vec<&'static str> {
    let renown = werewolf_traits(character).renown;
    RENOWN_TYPES
        .into_iter()
        .filter(|key| renown.dots(key) < 2)
        .collect()
}

/// The free third Renown dot (second for Ghost Wolves) added after auspice
/// and tribe are locked in.
pub struct RenownStep;

#[async_trait]
impl GenerationStep for RenownStep {
    fn key(&self) -> StepKey {
        StepKey::Renown
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        2
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let werewolf = werewolf_traits(character);
        let total = werewolf.renown.total();
        let is_ghost_wolf = werewolf.tribe == "Ghost Wolves";
        let available = open_categories(character).join(", ");
        let sources = if is_ghost_wolf {
            "1 from Auspice"
        } else {
            "1 from Auspice and 1 from Tribe"
        };
        let after = if is_ghost_wolf {
            "Ghost Wolves will have 2 total"
        } else {
            "others will have 3 total"
        };

        format!(
            "Choose one additional Renown dot for this Werewolf: the Forsaken character.\n\
             \n\
             • You already have {total} Renown dots ({sources}).\n\
             • Choose one Renown category to add 1 dot, but cannot choose a category already at 2 or more dots.\n\
             • Available Renown categories: {available}.\n\
             • After this, {after}.\n\
             • Return an object with:\n  \
             • **renown** - the chosen Renown name (lowercase, exact: {available})."
        )
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let available = open_categories(character);

        ToolSchema {
            name: "generate_renown".into(),
            description: "Choose a valid additional Renown category.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "renown": { "type": "string", "enum": available }
                },
                "required": ["renown"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let werewolf = werewolf_traits(character);

        let chosen = data.get("renown").and_then(Value::as_str).unwrap_or_default();
        if !RENOWN_TYPES.contains(&chosen) {
            errors.push("Invalid renown category chosen".into());
        } else if werewolf.renown.dots(chosen) >= 2 {
            errors.push("Chosen renown already at 2 or more dots".into());
        }

        let expected = if werewolf.tribe == "Ghost Wolves" { 1 } else { 2 };
        let total = werewolf.renown.total();
        if total != expected {
            errors.push(format!(
                "Unexpected current Renown total (expected {expected}, got {total})"
            ));
        }

        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let snapshot = store.snapshot().await?;
        let werewolf = snapshot.werewolf.clone().unwrap_or_default();

        let chosen = data.get("renown").and_then(Value::as_str).unwrap_or_default();
        let track = werewolf.renown.get(chosen).copied().unwrap_or_default();

        store
            .update(json!({
                "werewolf": {
                    "renown": {
                        chosen: {
                            "dots": track.dots + 1,
                            "auspice": track.auspice,
                            "tribe": track.tribe,
                        }
                    }
                }
            }))
            .await
    }

    fn default_checked(&self, character: &Character) -> bool {
        let werewolf = werewolf_traits(character);
        let cap = if werewolf.tribe == "Ghost Wolves" { 1 } else { 2 };
        werewolf.renown.total() <= cap
    }
}
