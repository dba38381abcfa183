use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::Character;
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

const RESISTANCE: [(&str, &str); 3] =
    [("Composure", "composure"), ("Resolve", "resolve"), ("Stamina", "stamina")];

fn current(character: &Character, key: &str) -> u8 {
    character.attributes.get(key).unwrap_or(0)
}

pub struct ResistanceAttributeStep;

#[async_trait]
impl GenerationStep for ResistanceAttributeStep {
    fn key(&self) -> StepKey {
        StepKey::ResistanceAttribute
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let eligible: Vec<String> = RESISTANCE
            .iter()
            .filter(|(_, key)| current(character, key) < 5)
            .map(|(label, key)| format!("{label} (current: {})", current(character, key)))
            .collect();

        format!(
            "Choose one Resistance Attribute to increase by 1 dot for this Mage: the Awakening character. This represents the toughening effect of Awakening on mind, body, or soul.\n\
             \n\
             • Eligible attributes (only those below 5 dots): {eligible}.\n\
             • Base the choice on the character's concept, Path, Order, and details (e.g., a scholarly mage might benefit from Resolve).\n\
             • Return an object with:\n  \
             • **attribute** – the chosen attribute (lowercase, e.g., \"resolve\").",
            eligible = eligible.join(", "),
        )
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let eligible: Vec<&str> = RESISTANCE
            .iter()
            .filter(|(_, key)| current(character, key) < 5)
            .map(|(_, key)| *key)
            .collect();
        ToolSchema {
            name: "choose_resistance_attribute".into(),
            description: "Select a Resistance Attribute to bump".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "attribute": { "type": "string", "enum": eligible },
                },
                "required": ["attribute"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let attribute = data.get("attribute").and_then(Value::as_str).unwrap_or_default();
        if !RESISTANCE.iter().any(|(_, key)| *key == attribute) {
            errors.push("Invalid attribute chosen".into());
            return errors;
        }
        if current(character, attribute) >= 5 {
            errors.push(format!("Chosen attribute {attribute} is already at 5 or more"));
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let attribute = data.get("attribute").and_then(Value::as_str).unwrap_or_default();
        if !RESISTANCE.iter().any(|(_, key)| *key == attribute) {
            return Ok(());
        }
        let snapshot = store.snapshot().await?;
        let value = snapshot.attributes.get(attribute).unwrap_or(0);
        store.update(json!({ "attributes": { attribute: value + 1 } })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.attributes.total() <= 21
    }
}
