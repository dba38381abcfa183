use super::mage_traits;
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

const TOOL_TYPES: [&str; 5] = ["Coins", "Cups", "Mirrors", "Rods", "Weapons"];

pub struct DedicatedMagicalToolStep;

#[async_trait]
impl GenerationStep for DedicatedMagicalToolStep {
    fn key(&self) -> StepKey {
        StepKey::DedicatedMagicalTool
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        let mage = mage_traits(character);
        let path = if mage.path.is_empty() { "unknown" } else { mage.path.as_str() };
        format!(
            r#"Generate a Dedicated Magical Tool for this Mage: the Awakening character, based on their Path ({path}) and personal details from the sheet (description, virtue, vice, aspirations, etc.). Dedicated Tools are mundane items with symbolic links to the Supernal Realms, adding +1 die to spellcasting as Yantras.

Each Path has five Tools, each with a specific function:
- Coins or symbols of material wealth: Represent construction, repair, inanimate or intangible lasting things. Closest to the Fallen World, used for manipulating money/resources.
- Cups or drinking vessels: Invoke healing, intuition, perceptual magic, gathering. Drinking from a shared cup spreads spells. Symbol of female sexuality (interpret based on mage).
- Mirrors (actual mirrors, polished plates, reflecting pools): Represent sight, soul, self. Used for spells on oneself.
- Rods, wands, or staves: Symbols of control, pointing to single out victims or hold as rulership/command. Symbol of male sexuality.
- Weapons (usually knives): Symbols of thought made action, for direct/decisive spells. Used to harm or master intellect/will over the world.

Choose one Tool type that fits the character's theme/Path. Then, create a short, descriptive name (e.g., "Silver Chalice of Insight") and a paragraph-long elaborate description incorporating personal symbolism, how it looks, its history/use, and why it resonates with the mage.

Return an object with:
- **toolType**: The chosen Tool type (exact: "Coins", "Cups", "Mirrors", "Rods", "Weapons").
- **name**: Short name for the tool (string).
- **description**: Elaborate description (string, about a paragraph)."#
        )
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "generate_dedicated_tool".into(),
            description: "Generate a Dedicated Magical Tool.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "toolType": { "type": "string", "enum": TOOL_TYPES },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                },
                "required": ["toolType", "name", "description"],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let tool_type = data.get("toolType").and_then(Value::as_str).unwrap_or_default();
        if !TOOL_TYPES.contains(&tool_type) {
            errors.push("Invalid toolType".into());
        }
        let name = data.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.trim().is_empty() {
            errors.push("Name must be a non-empty string".into());
        }
        let description = data.get("description").and_then(Value::as_str).unwrap_or_default();
        if description.trim().len() < 50 {
            errors.push("Description must be a string at least a paragraph long".into());
        }
        errors
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError> {
        let tool = Item {
            kind: ItemKind::Equipment,
            name: data.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            description: data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: json!({
                "toolType": data.get("toolType").and_then(Value::as_str).unwrap_or_default(),
                "diceBonus": 1,
                "equipped": true,
                "isMagical": true,
                "magicType": "Yantra",
                "magicClass": "Dedicated Magical Tool",
            }),
            ..Item::default()
        };
        store.create_items(vec![tool]).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        !character
            .items_of(ItemKind::Equipment)
            .any(|item| item.data["magicClass"].as_str() == Some("Dedicated Magical Tool"))
    }
}
