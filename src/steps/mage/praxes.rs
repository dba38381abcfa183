use super::{eligible_spells, mage_traits};
use crate::ai::ToolSchema;
use crate::catalog::{Catalog, strip_html};
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

fn praxis_count(character: &Character) -> u32 {
    u32::from(mage_traits(character).gnosis.max(1))
}

fn spell_listing(spells: &[&Item]) -> Value {
    let entries: Vec<Value> = spells
        .iter()
        .map(|spell| {
            json!({
                "id": spell.id,
                "name": spell.name,
                "arcanum": spell.arcanum(),
                "level": spell.spell_level(),
                "description": strip_html(&spell.description),
            })
        })
        .collect();
    Value::Array(entries)
}

pub struct PraxesStep;

#[async_trait]
impl GenerationStep for PraxesStep {
    fn key(&self) -> StepKey {
        StepKey::Praxes
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let gnosis = praxis_count(character);
        let spells = eligible_spells(character, catalog);
        format!(
            "Select exactly {gnosis} Praxis/Praxes for this Mage: the Awakening character. Praxes are signature spells the mage has internalized, allowing exceptional success on 3 successes and costing 1 Mana to make Lasting.\n\
             \n\
             • Choose {gnosis} unique spells from the eligible list.\n\
             • Return an object with:\n  \
             • **choices** – array of strings (spell ids). Length exactly {gnosis}.\n\
             \n\
             Eligible Spells:\n\
             ```json\n\
             {listing}\n\
             ```",
            listing = spell_listing(&spells),
        )
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let gnosis = praxis_count(character);
        let ids: Vec<&str> =
            eligible_spells(character, catalog).iter().map(|spell| spell.id.as_str()).collect();
        ToolSchema {
            name: "generate_praxes".into(),
            description: "Select Praxes equal to Gnosis".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "choices": {
                        "type": "array",
                        "minItems": gnosis,
                        "maxItems": gnosis,
                        "items": { "type": "string", "enum": ids },
                    },
                },
                "required": ["choices"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let gnosis = praxis_count(character);
        let spells = eligible_spells(character, catalog);

        let Some(choices) = data.get("choices").and_then(Value::as_array) else {
            errors.push(format!("choices must be an array of exactly {gnosis} items"));
            return errors;
        };
        if choices.len() as u32 != gnosis {
            errors.push(format!("choices must be an array of exactly {gnosis} items"));
        }

        let unique: HashSet<String> = choices.iter().map(|id| id.to_string()).collect();
        if unique.len() != choices.len() {
            errors.push("Duplicate spell ids selected".into());
        }

        for id in choices {
            let id = id.as_str().unwrap_or_default();
            if !spells.iter().any(|spell| spell.id == id) {
                errors.push(format!("Invalid spell id: {id}"));
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
            for id in choices.iter().filter_map(Value::as_str) {
                let Some(base) = catalog.item(id) else { continue };
                let mut spell = base.clone();
                spell.id = String::new();
                spell.data["isBefouled"] = json!(false);
                spell.data["isInured"] = json!(false);
                spell.data["isPraxis"] = json!(true);
                spell.data["isRote"] = json!(false);
                additions.push(spell);
            }
        }
        if additions.is_empty() {
            return Ok(());
        }
        store.create_items(additions).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        !character.items_of(ItemKind::Spell).any(Item::is_praxis)
    }
}
