use super::unescape_newlines;
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::Character;
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

const PROMPT: &str = r#"Choose Blood and Bone archetypes for this Werewolf: the Forsaken character.

• Blood archetype reflects behavior on the hunt, when instincts dominate.
• Bone archetype reflects self-identity behind the fury.
• You can choose from the examples or create custom ones that fit the character's concept.
• Examples of Blood archetypes: Alpha, Challenger, Destroyer, Fox, Monster, Soldier. (See descriptions for details.)
• Examples of Bone archetypes: Community Organizer, Cub, Guru, Hedonist, Lone Wolf, Wallflower. (See descriptions for details.)
• For custom archetypes, follow this style guide:
  - Name: A single word or short phrase that captures the essence (e.g., "Alpha", "Hedonist").
  - Description: 2-4 sentences describing the behavior and identity.
  - Include Willpower recovery: "Your character recovers a point of Willpower when [small-scale bad choice or action]. [He/She] regains all Willpower when [large-scale submission to Kuruth/hunt or standing ground]."
  - Ensure it aligns with the dichotomy: Blood for chaotic hunt actions, Bone for rational self-identity.
• Return an object with:
  • **blood_name** - Name of the Blood archetype (string).
  • **blood_description** - Full description including Willpower recovery (string).
  • **bone_name** - Name of the Bone archetype (string).
  • **bone_description** - Full description including Willpower recovery (string).

EXAMPLE BONE ARCHETYPE
```
Lone Wolf — The Lone Wolf knows that sometimes, the answer lies not with the pack, but with the individual. She's not inherently bad at working with a team, but she's much more willing to handle something herself if she feels it's the best recourse.

Your character recovers a point of Willpower when she acts independently of her pack to solve a pack problem. She regains all Willpower when her pack is on the hunt, and she subverts their plans and solves the problem alone.
```

EXAMPLE BLOOD ARCHETYPE
```
The Monster — A Monster revels in the shadows, using terror and shock to cripple the victims of his hunts. It's less important to overwhelm a victim by force than it is to overwhelm it psychologically. By the time his jaws clamp down, the fight should already be over.

Your character recovers a point of Willpower when he resorts to disgusting or frightening someone into submission. He recovers all Willpower when using the hunt or Kuruth as a terror tactic.
```
"#;

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn bad_name(name: &str) -> bool {
    name.is_empty() || name.chars().count() > 50
}

fn bad_description(description: &str) -> bool {
    let length = description.chars().count();
    length < 50 || length > 1000
}

fn missing_recovery(description: &str) -> bool {
    !description.contains("recovers a point of Willpower")
        || !description.contains("regains all Willpower")
}

pub struct BloodAndBoneStep;

#[async_trait]
impl GenerationStep for BloodAndBoneStep {
    fn key(&self) -> StepKey {
        StepKey::BloodAndBone
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        5
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "generate_blood_and_bone".into(),
            description: "Choose or create Blood and Bone archetypes.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "blood_name": { "type": "string", "minLength": 1, "maxLength": 50 },
                    "blood_description": { "type": "string", "minLength": 50, "maxLength": 1000 },
                    "bone_name": { "type": "string", "minLength": 1, "maxLength": 50 },
                    "bone_description": { "type": "string", "minLength": 50, "maxLength": 1000 }
                },
                "required": ["blood_name", "blood_description", "bone_name", "bone_description"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        if bad_name(field(data, "blood_name")) {
            errors.push("Invalid blood_name".into());
        }
        if bad_description(field(data, "blood_description")) {
            errors.push("Invalid blood_description".into());
        }
        if bad_name(field(data, "bone_name")) {
            errors.push("Invalid bone_name".into());
        }
        if bad_description(field(data, "bone_description")) {
            errors.push("Invalid bone_description".into());
        }

        if missing_recovery(field(data, "blood_description")) {
            errors.push(
                "Blood description missing Willpower recovery details; there should be a mention \
                 of recovering a point of Willpower and regaining all Willpower"
                    .into(),
            );
        }
        if missing_recovery(field(data, "bone_description")) {
            errors.push(
                "Bone description missing Willpower recovery details; there should be a mention \
                 of recovering a point of Willpower and regaining all Willpower"
                    .into(),
            );
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

        let blood_name = field(data, "blood_name");
        let bone_name = field(data, "bone_name");
        let blood_description = unescape_newlines(field(data, "blood_description"));
        let bone_description = unescape_newlines(field(data, "bone_description"));

        let notes = format!(
            "{}BLOOD ARCHETYPE\n{blood_name} - {blood_description}\n\n\
             BONE ARCHETYPE\n{bone_name} - {bone_description}",
            snapshot.notes
        );

        store
            .update(json!({
                "virtue": blood_name,
                "vice": bone_name,
                "notes": notes,
            }))
            .await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.virtue.is_empty() || character.vice.is_empty()
    }
}
