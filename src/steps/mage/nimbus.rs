use super::mage_traits;
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::Character;
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

const FIELDS: [&str; 4] = ["longTerm", "immediate", "signature", "tilt"];

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

pub struct NimbusStep;

#[async_trait]
impl GenerationStep for NimbusStep {
    fn key(&self) -> StepKey {
        StepKey::Nimbus
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let mage = mage_traits(character);
        let path = if mage.path.is_empty() { "unknown" } else { mage.path.as_str() };
        format!(
            r#"Generate a flavorful Nimbus description for this Mage: the Awakening character, based on their Path ({path}) and other personal details from the sheet (such as description, virtue, vice, aspirations, etc.). The Nimbus is the mage's supernatural aura, manifesting in three forms:

**Long-Term Nimbus**: A series of subtle coincidences that surround the mage, aligning with their Path. These are story-based effects of strangeness:
- Acanthus: Strange luck, lost memories rising, visions of possible fates.
- Mastigos: People's fears welling up, seeing internal devils.
- Moros: Ghastly hauntings, decay, rust, mechanical breakdowns.
- Obrimos: Religious revelations, extreme weather swings, blackouts.
- Thyrsus: Spirits appearing more, strange pathogens, terminal diseases vanishing.
The potency increases with Gnosis (subtle at low, obvious at Gnosis 6+), and spreads along sympathetic ties based on Wisdom (Enlightened: Strong connections; Understanding: Medium; Falling: Weak).

**Immediate Nimbus**: A powerful aura wrapping close to the mage's soul, visible in Mage Sight during spellcasting or when deliberately flared (costs Mana, visible even to non-mages). Based mostly on Path:
- Acanthus: Time bends around them, or causes fatalism.
- Mastigos: Glow with sickly green fire, or swell temptation.
- Moros: Subtle rot around them, or melancholy.
- Obrimos: Bask in holy light, or remarkable inspiration.
- Thyrsus: Mist of blood, or deep rutting instinct.
When it flares, it causes a unique Nimbus Tilt (describe its effect below), strength from spell Potency or Gnosis roll, affecting those with Resolve <= strength.

**Signature Nimbus**: Residue left on spells, Praxes, Rotes, or Attainments, recognizable in Focused Mage Sight. Looks like a remainder of the Immediate Nimbus (e.g., charring/ash if Immediate is fiery, hangover if intoxicating). Lasts a week normally, longer if imprinted.

Create creative, thematic descriptions for each form, incorporating the character's Path and personal symbolism (e.g., Shadow Name if present, magical tools, etc.). Also, invent a unique Nimbus Tilt effect that fits the theme.

Return an object with:
- **longTerm**: Description of the Long-Term Nimbus (string).
- **immediate**: Description of the Immediate Nimbus (string).
- **signature**: Description of the Signature Nimbus (string).
- **tilt**: Description of the Nimbus Tilt effect (string)."#
        )
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "generate_nimbus".into(),
            description: "Generate descriptions for the mage's Nimbus forms and Tilt.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "longTerm": { "type": "string" },
                    "immediate": { "type": "string" },
                    "signature": { "type": "string" },
                    "tilt": { "type": "string" },
                },
                "required": ["longTerm", "immediate", "signature", "tilt"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        if !FIELDS.iter().all(|key| !field(data, key).trim().is_empty()) {
            errors.push("All fields must be non-empty strings".into());
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let formatted = format!(
            "LONG-TERM\n{}\n\nIMMEDIATE\n{}\n\nSIGNATURE\n{}\n\nTILT\n{}",
            field(data, "longTerm"),
            field(data, "immediate"),
            field(data, "signature"),
            field(data, "tilt"),
        );
        store.update(json!({ "mage": { "nimbus": formatted.trim() } })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.mage.as_ref().map(|mage| mage.nimbus.trim().is_empty()).unwrap_or(true)
    }
}
