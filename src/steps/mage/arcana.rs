use super::{ARCANA_LABELS, mage_traits, path};
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, GROSS_ARCANA, SUBTLE_ARCANA};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

fn ruling_labels(character: &Character) -> Vec<&'static str> {
    path(&mage_traits(character).path).map(|info| info.ruling.to_vec()).unwrap_or_default()
}

fn inferior_label(character: &Character) -> &'static str {
    path(&mage_traits(character).path).map(|info| info.inferior).unwrap_or_default()
}

pub struct ArcanaStep;

#[async_trait]
impl GenerationStep for ArcanaStep {
    fn key(&self) -> StepKey {
        StepKey::Arcana
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        5
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let mage = mage_traits(character);
        let path_name = if mage.path.is_empty() { "Unknown" } else { mage.path.as_str() };
        let ruling = ruling_labels(character);
        let inferior = inferior_label(character);
        let available: Vec<&str> =
            ARCANA_LABELS.iter().copied().filter(|label| *label != inferior).collect();

        format!(
            "Assign starting Arcana dots for this Mage: the Awakening character on Path {path_name}.\n\
             \n\
             Rules:\n\
             - Total dots: Exactly 6.\n\
             - Maximum per Arcanum: 3 dots, and only one Arcanum can have 3 dots.\n\
             - Ruling Arcana ({ruling}): Must allocate 3 to 5 dots total across them. Each must have at least 1 dot.\n\
             - Inferior Arcanum ({inferior}): 0 dots (cannot assign any).\n\
             - Common Arcana (all others): 0 to 3 dots, but follow total and max rules.\n\
             - Valid distributions: Specialist (3-2-1 or 3-1-1-1), Balanced (2-2-2 or 2-2-1-1), Generalist (2-1-1-1-1).\n\
             \n\
             Available Arcana to assign (exclude {inferior}): {available}.\n\
             \n\
             Return an object with keys for each available Arcanum (lowercase, e.g., \"time\": 2), values as integers. Ensure rulings have min 1 each.",
            ruling = ruling.join(" and "),
            available = available.join(", "),
        )
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let ruling = ruling_labels(character);
        let inferior = inferior_label(character);
        let mut properties = Map::new();
        let mut required: Vec<String> = Vec::new();
        for label in ARCANA_LABELS {
            if label == inferior {
                continue;
            }
            let key = label.to_ascii_lowercase();
            let minimum = u8::from(ruling.contains(&label));
            properties.insert(
                key.clone(),
                json!({ "type": "integer", "minimum": minimum, "maximum": 3 }),
            );
            if minimum > 0 {
                required.push(key);
            }
        }
        ToolSchema {
            name: "assign_arcana".into(),
            description: "Assign dots to available Arcana.".into(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let inferior = inferior_label(character).to_ascii_lowercase();
        let ruling: Vec<String> =
            ruling_labels(character).iter().map(|label| label.to_ascii_lowercase()).collect();
        let expected: Vec<String> = ARCANA_LABELS
            .iter()
            .map(|label| label.to_ascii_lowercase())
            .filter(|key| *key != inferior)
            .collect();

        let empty = Map::new();
        let entries = data.as_object().unwrap_or(&empty);
        if entries.len() != expected.len() || !entries.keys().all(|key| expected.contains(key)) {
            errors.push("Must assign exactly the available Arcana".into());
        }

        let mut total = 0;
        let mut ruling_dots = 0;
        let mut at_three = 0;
        for (key, value) in entries {
            let dots = match value.as_i64() {
                Some(dots) if (0..=3).contains(&dots) => dots,
                _ => {
                    errors.push(format!("Invalid value for {key}: must be integer 0-3"));
                    continue;
                }
            };
            if ruling.contains(key) {
                if dots < 1 {
                    errors.push(format!("Ruling Arcanum {key} must have at least 1 dot"));
                }
                ruling_dots += dots;
            }
            if dots == 3 {
                at_three += 1;
            }
            total += dots;
        }

        if total != 6 {
            errors.push(format!("Total dots must be exactly 6 (current: {total})"));
        }
        if !(3..=5).contains(&ruling_dots) {
            errors.push(format!("Ruling Arcana dots must be 3-5 (current: {ruling_dots})"));
        }
        if at_three > 1 {
            errors.push("Only one Arcanum can have 3 dots".into());
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        // Every Arcanum gets written; the inferior one is absent from the
        // arguments and lands on zero.
        let mut gross = Map::new();
        for key in GROSS_ARCANA {
            gross.insert(key.to_string(), json!({ "dots": data[key].as_u64().unwrap_or(0) }));
        }
        let mut subtle = Map::new();
        for key in SUBTLE_ARCANA {
            subtle.insert(key.to_string(), json!({ "dots": data[key].as_u64().unwrap_or(0) }));
        }
        store.update(json!({ "mage": { "arcana_gross": gross, "arcana_subtle": subtle } })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character
            .mage
            .as_ref()
            .map(|mage| mage.arcana().map(|(_, arcanum)| u32::from(arcanum.dots)).sum::<u32>() == 0)
            .unwrap_or(true)
    }
}
