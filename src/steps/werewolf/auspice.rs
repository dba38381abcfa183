use super::{AUSPICES, TRIBES, auspice, tribe, werewolf_traits};
use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, RENOWN_TYPES, skill_key};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

const PROMPT: &str = r#"Choose an Auspice and Tribe for this Werewolf: the Forsaken character.

• Auspice is determined by the moon phase under which the werewolf Changed and defines their role. It grants a free dot in one of three Skills (choose one where the current value is less than 5), one Renown dot in the Auspice's Renown (marked as auspice: true), and a Hunter's Aspect (noted but fixed per Auspice).
• Available Auspices:
  - Cahalith (Gibbous Moon): Skills - Crafts, Expression, Persuasion; Renown - Glory; Hunter's Aspect - Monstrous (prey accepts inevitable death).
  - Elodoth (Half Moon): Skills - Empathy, Investigation, Politics; Renown - Honor; Hunter's Aspect - Isolating (prey feels shunned and alone).
  - Irraka (New Moon): Skills - Larceny, Stealth, Subterfuge; Renown - Cunning; Hunter's Aspect - Blissful (prey is oblivious to danger).
  - Ithaeur (Crescent Moon): Skills - Animal Ken, Medicine, Occult; Renown - Wisdom; Hunter's Aspect - Mystical (prey senses the other world and is betrayed by senses).
  - Rahu (Full Moon): Skills - Brawl, Intimidation, Survival; Renown - Purity; Hunter's Aspect - Dominant (prey spoils for a fight).
• Tribe is chosen by the character and aligns with expectations. It grants one Renown dot in the Tribe's Renown (marked as tribe: true), except for Ghost Wolves.
• Available Tribes:
  - Blood Talons: Renown - Glory.
  - Bone Shadows: Renown - Wisdom.
  - Hunters in Darkness: Renown - Purity.
  - Iron Masters: Renown - Cunning.
  - Storm Lords: Renown - Honor.
  - Ghost Wolves: No Renown
• Return an object with:
  • **auspice** - the Auspice name (exact spelling, capitalized).
  • **tribe** - the Tribe name (exact spelling, capitalized).
  • **skill** - the chosen Skill name for the free dot (exact spelling from the Auspice's list, only if current dots < 5)."#;

fn skill_dots(character: &Character, label: &str) -> u8 {
    skill_key(label)
        .and_then(|key| character.skills.get(key))
        .map(|skill| skill.dots)
        .unwrap_or(0)
}

pub struct AuspiceAndTribeStep;

#[async_trait]
impl GenerationStep for AuspiceAndTribeStep {
    fn key(&self) -> StepKey {
        StepKey::AuspiceAndTribe
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        5
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let auspices: Vec<&str> = AUSPICES.iter().map(|info| info.name).collect();
        let tribes: Vec<&str> = TRIBES.iter().map(|info| info.name).collect();

        // Every auspice skill with room left, in auspice order.
        let mut skills: Vec<&str> = Vec::new();
        for info in &AUSPICES {
            for label in info.skills {
                if !skills.contains(&label) && skill_dots(character, label) < 5 {
                    skills.push(label);
                }
            }
        }

        ToolSchema {
            name: "generate_auspice_and_tribe".into(),
            description: "Choose a valid Auspice, Tribe, and Auspice Skill.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "auspice": { "type": "string", "enum": auspices },
                    "tribe": { "type": "string", "enum": tribes },
                    "skill": { "type": "string", "enum": skills }
                },
                "required": ["auspice", "tribe", "skill"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let chosen_auspice = data.get("auspice").and_then(Value::as_str).unwrap_or_default();
        let chosen_tribe = data.get("tribe").and_then(Value::as_str).unwrap_or_default();
        let chosen_skill = data.get("skill").and_then(Value::as_str).unwrap_or_default();

        let info = auspice(chosen_auspice);
        if info.is_none() {
            errors.push("Invalid auspice chosen".into());
        }
        if tribe(chosen_tribe).is_none() {
            errors.push("Invalid tribe chosen".into());
        }

        let matches_auspice = info
            .map(|info| info.skills.contains(&chosen_skill))
            .unwrap_or(false);
        if chosen_skill.is_empty() || !matches_auspice {
            errors.push("Chosen skill does not match auspice".into());
        }
        if skill_dots(character, chosen_skill) >= 5 {
            errors.push("Chosen skill already at maximum (5 dots)".into());
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

        let chosen_auspice = data.get("auspice").and_then(Value::as_str).unwrap_or_default();
        let chosen_tribe = data.get("tribe").and_then(Value::as_str).unwrap_or_default();
        let chosen_skill = data.get("skill").and_then(Value::as_str).unwrap_or_default();

        let auspice_renown = auspice(chosen_auspice).map(|info| info.renown);
        let hunters_aspect = auspice(chosen_auspice)
            .map(|info| info.hunters_aspect)
            .unwrap_or_default();
        let tribe_renown = tribe(chosen_tribe).and_then(|info| info.renown);

        // The renown block is rebuilt from scratch so a retried run does not
        // stack dots on top of an earlier pick.
        let mut renown = Map::new();
        for key in RENOWN_TYPES {
            let from_auspice = auspice_renown == Some(key);
            let from_tribe = tribe_renown == Some(key);
            renown.insert(
                key.to_string(),
                json!({
                    "dots": u8::from(from_auspice) + u8::from(from_tribe),
                    "auspice": from_auspice,
                    "tribe": from_tribe,
                }),
            );
        }

        let mut patch = json!({
            "werewolf": {
                "auspice": chosen_auspice,
                "tribe": chosen_tribe,
                "hunters_aspect": hunters_aspect,
                "renown": renown,
            }
        });

        if let Some(key) = skill_key(chosen_skill) {
            let dots = snapshot
                .skills
                .get(key)
                .map(|skill| skill.dots)
                .unwrap_or(0);
            patch["skills"] = json!({ key: { "dots": dots + 1 } });
        }

        store.update(patch).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        let werewolf = werewolf_traits(character);
        werewolf.auspice.is_empty() || werewolf.tribe.is_empty()
    }
}
