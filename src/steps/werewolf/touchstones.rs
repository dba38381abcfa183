use super::{unescape_newlines, werewolf_traits};
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::Character;
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

const PROMPT: &str = r#"Choose two Touchstones for this Werewolf: the Forsaken character: one physical (flesh) and one spiritual (spirit).

• Physical Touchstone (flesh) pulls toward humanity/civilization but requires forsaking the spiritual side.
• Spiritual Touchstone (spirit) pulls toward the Hisil but requires estrangement from humanity.
• Touchstones introduce conflict; they help maintain Harmony but are things the character wants but cannot fully have.
• You can choose from examples or create custom ones that fit the character's concept.
• Examples of Physical Touchstones: The Abuser, The Ex, The Old Gang, The Parents, The Religion, The Sponsor. (See descriptions for conflicts.)
• Examples of Spiritual Touchstones: The Ambitious Totem, The Buddy Spirit, The Future Self, The Locus, The Lune, The Prey, The Wilds. (See descriptions for conflicts.)
• For custom Touchstones, follow this style guide:
  - Name: A single word or short phrase that captures the essence (e.g., "The Ex", "The Locus").
  - Description: 2-4 sentences describing the Touchstone and its conflict.
  - Include mechanics: "Reinforcing the bond regains a Willpower point. Putting life or pack on the line in defense regains all Willpower. Losing it causes Harmony shift."
  - Both must descriptions must use exact phrases 'regains a Willpower point' and 'regains all Willpower' to convey exactly how to gain Willpower back.
  - Ensure built-in conflict: Explain how it pulls the character and complicates life.
• Return an object with:
  • **flesh_name** - Name of the Physical Touchstone (string).
  • **flesh_description** - Full description including conflict and mechanics (string).
  • **spirit_name** - Name of the Spiritual Touchstone (string).
  • **spirit_description** - Full description including conflict and mechanics (string).

EXAMPLE TOUCHSTONES
The Sponsor (Physical Touchstone) — Your character was in recovery for cocaine addiction. The First Change curbed the addiction, and that was wonderful. She finally shook that problem. Unfortunately, her sponsor doesn’t know any better. He sees the rage inside her. He sees the late night meetings. He sees her sneaking out, lying to her employers, and threatening that asshole next door. To him, it looks like she’s fallen off the wagon, and is hitting the coke again. He cares. To him, helping her is the next step in his personal recovery. He’s considering staging an intervention. She’ll be surprised when she comes in with blood on her hands after a hunt, only to see her closest friends and family ready to help her kick the blow.

The Wilds (Spiritual Touchstone) — The wilderness calls to your character. Those places where humans fear to tread, where the Gauntlet runs thin, where the only rule is the rule of nature, those places resonate as home for her in a way no city can hope to. However, she has a life in that civilization. She has a pack, friends, family, and an entire context she can’t just abandon and hope to maintain Harmony. Worse, the wilds demand her attention. Any time she spends a full day in the city, some awful coincidence occurs with the nature around her. Yesterday, a tree fell and nearly crashed her car. Today, flooding caused her to be late and lose her job."#;

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn missing_recovery(description: &str) -> bool {
    !description.contains("regains a Willpower point")
        || !description.contains("regains all Willpower")
}

pub struct UrathaTouchstonesStep;

#[async_trait]
impl GenerationStep for UrathaTouchstonesStep {
    fn key(&self) -> StepKey {
        StepKey::UrathaTouchstones
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        2
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "generate_touchstones".into(),
            description: "Choose or create Physical and Spiritual Touchstones.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "flesh_name": { "type": "string", "minLength": 1, "maxLength": 50 },
                    "flesh_description": { "type": "string", "minLength": 50, "maxLength": 1000 },
                    "spirit_name": { "type": "string", "minLength": 1, "maxLength": 50 },
                    "spirit_description": { "type": "string", "minLength": 50, "maxLength": 1000 }
                },
                "required": ["flesh_name", "flesh_description", "spirit_name", "spirit_description"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let flesh_name = field(data, "flesh_name");
        let flesh_description = field(data, "flesh_description");
        let spirit_name = field(data, "spirit_name");
        let spirit_description = field(data, "spirit_description");

        if flesh_name.is_empty() || flesh_name.chars().count() > 50 {
            errors.push("Invalid flesh_name".into());
        }
        let flesh_length = flesh_description.chars().count();
        if flesh_length < 50 || flesh_length > 1000 {
            errors.push("Invalid flesh_description".into());
        }
        if spirit_name.is_empty() || spirit_name.chars().count() > 50 {
            errors.push("Invalid spirit_name".into());
        }
        let spirit_length = spirit_description.chars().count();
        if spirit_length < 50 || spirit_length > 1000 {
            errors.push("Invalid spirit_description".into());
        }

        if missing_recovery(flesh_description) {
            errors.push(
                "Flesh description missing Willpower recovery details; must use phrases \
                 'regains a Willpower point' and 'regains all Willpower'"
                    .into(),
            );
        }
        if missing_recovery(spirit_description) {
            errors.push(
                "Spirit description missing Willpower recovery details; must use phrases \
                 'regains a Willpower point' and 'regains all Willpower'"
                    .into(),
            );
        }
        if !flesh_description.to_lowercase().contains("harmony")
            || !spirit_description.to_lowercase().contains("harmony")
        {
            errors.push("Descriptions missing Harmony shift details".into());
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

        let flesh_name = field(data, "flesh_name");
        let spirit_name = field(data, "spirit_name");
        let flesh_description = unescape_newlines(field(data, "flesh_description"));
        let spirit_description = unescape_newlines(field(data, "spirit_description"));

        let notes = format!(
            "{}\n\nFLESH TOUCHSTONE\n{flesh_name} - {flesh_description}\n\n\
             SPIRITUAL TOUCHSTONE\n{spirit_name} - {spirit_description}",
            snapshot.notes
        );

        store
            .update(json!({
                "werewolf": {
                    "touchstone_flesh": flesh_name,
                    "touchstone_spirit": spirit_name,
                },
                "notes": notes,
            }))
            .await
    }

    fn default_checked(&self, character: &Character) -> bool {
        let werewolf = werewolf_traits(character);
        werewolf.touchstone_flesh.is_empty() || werewolf.touchstone_spirit.is_empty()
    }
}
