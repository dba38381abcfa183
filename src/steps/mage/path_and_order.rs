use super::{ORDERS, PATHS, order, path};
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, GROSS_ARCANA, Item, ItemKind, SUBTLE_ARCANA, all_skills};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

const PROMPT: &str = "Choose a Path and Order for this Mage: the Awakening character.

• Path is determined by the Supernal Realm the mage Awakened to and defines their magical perspective. It sets two Ruling Arcana and one Inferior Arcana.
• Available Paths:
  - Acanthus: Ruling - Time, Fate; Inferior - Forces. Themes: Enchantment, destiny, unpredictability.
  - Mastigos: Ruling - Mind, Space; Inferior - Matter. Themes: Inner demons, boundaries, psychic forces.
  - Moros: Ruling - Death, Matter; Inferior - Spirit. Themes: Alchemy, transition, materialism.
  - Obrimos: Ruling - Prime, Forces; Inferior - Death. Themes: Divine power, energy, the celestial.
  - Thyrsus: Ruling - Life, Spirit; Inferior - Mind. Themes: Ecstasy, instinct, the natural world.
• Order is the societal group the mage joins, providing structure, rotes, and philosophy. Non-Apostate Orders grant Rote Skills, +1 Occult dot, Status (Order) •, and Language (Atlantean High Speech) •.
• Available Orders and Rote Skills:
  - Adamantine Arrow: Athletics, Intimidation, Medicine. Philosophy: Warrior-mages, conflict as enlightenment.
  - Free Council: Crafts, Persuasion, Science. Philosophy: Modern magic, democracy, innovation.
  - Guardians of the Veil: Investigation, Stealth, Subterfuge. Philosophy: Secrecy, protecting magic from abuse.
  - Mysterium: Investigation, Occult, Survival. Philosophy: Seekers of knowledge, archiving mysteries.
  - Silver Ladder: Expression, Persuasion, Subterfuge. Philosophy: Hierarchy, leading humanity to Awakening.
  - Apostate: No Rote Skills or bonuses. Independent, no Order affiliation.
• Return an object with:
  • **path** - the Path name (exact spelling, capitalized).
  • **order** - the Order name (exact spelling as listed).";

pub struct PathAndOrderStep;

#[async_trait]
impl GenerationStep for PathAndOrderStep {
    fn key(&self) -> StepKey {
        StepKey::PathAndOrder
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        5
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        let paths: Vec<&str> = PATHS.iter().map(|info| info.name).collect();
        let orders: Vec<&str> = ORDERS.iter().map(|info| info.name).collect();
        ToolSchema {
            name: "generate_path_and_order".into(),
            description: "Choose a valid Path and Order.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "enum": paths },
                    "order": { "type": "string", "enum": orders },
                },
                "required": ["path", "order"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let chosen_path = data.get("path").and_then(Value::as_str).unwrap_or_default();
        let chosen_order = data.get("order").and_then(Value::as_str).unwrap_or_default();
        if path(chosen_path).is_none() {
            errors.push("Invalid path chosen".into());
        }
        if order(chosen_order).is_none() {
            errors.push("Invalid order chosen".into());
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
        let chosen_path = data.get("path").and_then(Value::as_str).unwrap_or_default();
        let chosen_order = data.get("order").and_then(Value::as_str).unwrap_or_default();

        // Ruling and inferior flags are rebuilt across all ten Arcana so a
        // changed Path does not leave stale flags behind.
        let ruling: Vec<String> = path(chosen_path)
            .map(|info| info.ruling.iter().map(|label| label.to_ascii_lowercase()).collect())
            .unwrap_or_default();
        let inferior = path(chosen_path)
            .map(|info| info.inferior.to_ascii_lowercase())
            .unwrap_or_default();

        let mut gross = Map::new();
        for key in GROSS_ARCANA {
            gross.insert(
                key.to_string(),
                json!({ "ruling": ruling.iter().any(|r| r == key), "inferior": inferior == key }),
            );
        }
        let mut subtle = Map::new();
        for key in SUBTLE_ARCANA {
            subtle.insert(
                key.to_string(),
                json!({ "ruling": ruling.iter().any(|r| r == key), "inferior": inferior == key }),
            );
        }

        let rote_skills = order(chosen_order).map(|info| info.rote_skills).unwrap_or(&[]);
        let apostate = chosen_order == "Apostate";

        let mut skills = Map::new();
        for (label, key) in all_skills() {
            let rote = rote_skills.contains(&label);
            if key == "occult" && !apostate {
                let dots = snapshot.skills.get("occult").map(|skill| skill.dots).unwrap_or(0);
                skills.insert(key.to_string(), json!({ "rote": rote, "dots": dots + 1 }));
            } else {
                skills.insert(key.to_string(), json!({ "rote": rote }));
            }
        }

        if !apostate {
            let mut additions: Vec<Item> = Vec::new();
            let status_base = catalog
                .merits()
                .find(|merit| merit.name == "Status" || merit.name == "Status (•)");
            if let Some(base) = status_base {
                let owned = snapshot.items_of(ItemKind::Merit).any(|item| {
                    item.name.contains("Status") && item.name.contains(chosen_order)
                });
                if !owned {
                    let mut status = base.clone();
                    status.id = String::new();
                    status.name = format!("Status ({chosen_order})");
                    status.rating = 1;
                    additions.push(status);
                }
            }
            let language_base = catalog
                .merits()
                .find(|merit| merit.name == "Language" || merit.name == "Language (•)");
            if let Some(base) = language_base {
                let owned = snapshot.items_of(ItemKind::Merit).any(|item| {
                    item.name.contains("Language") && item.name.contains("High Speech")
                });
                if !owned {
                    let mut language = base.clone();
                    language.id = String::new();
                    language.name = "Language (Atlantean High Speech)".to_string();
                    language.rating = 1;
                    additions.push(language);
                }
            }
            if !additions.is_empty() {
                store.create_items(additions).await?;
            }
        }

        let patch = json!({
            "mage": {
                "path": chosen_path,
                "order": chosen_order,
                "arcana_gross": gross,
                "arcana_subtle": subtle,
            },
            "skills": skills,
        });
        log::debug!("Applying Path and Order update: {patch}");
        store.update(patch).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.mage.as_ref().map(|mage| mage.path.is_empty()).unwrap_or(true)
    }
}
