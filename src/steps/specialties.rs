use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, all_skills, skill_key};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};

const PROMPT: &str = r#"Choose exactly three Skill Specialties for this Chronicles of Darkness character.

• A Skill Specialty is one or two words that narrow a Skill’s focus (e.g. “Firearms (rifles)”, “Occult (vampires)”).
• The character may take a Specialty only in a Skill with at least 1 dot.
• A Skill may receive more than one Specialty, but each Specialty string must be unique.
• Return an array named **specialties**.  It must contain exactly three objects and nothing else.
  Each object has:
  • **skill** – the Skill name (exact spelling from the list you are given)
  • **specialty** – the chosen Specialty string (max 20 characters, no newline)"#;

pub struct SkillSpecialtiesStep;

#[async_trait]
impl GenerationStep for SkillSpecialtiesStep {
    fn key(&self) -> StepKey {
        StepKey::SkillSpecialties
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        2
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let allowed: Vec<&str> = all_skills()
            .filter(|(_, key)| {
                character
                    .skills
                    .get(key)
                    .map(|skill| skill.dots)
                    .unwrap_or(0)
                    >= 1
            })
            .map(|(label, _)| label)
            .collect();

        ToolSchema {
            name: "generate_skill_specialties".into(),
            description: "Choose exactly three valid Skill Specialties.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "specialties": {
                        "type": "array",
                        "minItems": 3,
                        "maxItems": 3,
                        "items": {
                            "type": "object",
                            "properties": {
                                "skill": { "type": "string", "enum": allowed },
                                "specialty": { "type": "string", "minLength": 1, "maxLength": 20 }
                            },
                            "required": ["skill", "specialty"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["specialties"],
                "additionalProperties": false
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let Some(specialties) = data.get("specialties").and_then(Value::as_array) else {
            errors.push("specialties must be an array of exactly 3 items".into());
            return errors;
        };
        if specialties.len() != 3 {
            errors.push("specialties must contain exactly 3 items".into());
        }

        let mut flagged: HashSet<String> = HashSet::new();
        let mut seen: HashSet<String> = HashSet::new();
        for entry in specialties {
            let skill = entry.get("skill").and_then(Value::as_str).unwrap_or_default();
            let specialty = entry
                .get("specialty")
                .and_then(Value::as_str)
                .unwrap_or_default();

            let dots = skill_key(skill)
                .and_then(|key| character.skills.get(key))
                .map(|skill| skill.dots)
                .unwrap_or(0);
            if dots < 1 && flagged.insert(skill.to_string()) {
                errors.push(format!("Cannot choose specialty for {skill} as it has no dots"));
            }

            let length = specialty.chars().count();
            if length == 0 || length > 20 {
                errors.push(format!("specialty for {skill} must be 1-20 characters"));
            }

            let pair = format!("{skill}:{}", specialty.to_lowercase());
            if !seen.insert(pair) {
                errors.push(format!("Duplicate specialty found: {skill} ({specialty})"));
            }
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

        let mut touched: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        if let Some(specialties) = data.get("specialties").and_then(Value::as_array) {
            for entry in specialties {
                let Some(label) = entry.get("skill").and_then(Value::as_str) else {
                    continue;
                };
                let Some(specialty) = entry.get("specialty").and_then(Value::as_str) else {
                    continue;
                };
                let Some(key) = skill_key(label) else {
                    continue;
                };
                let list = touched.entry(key).or_insert_with(|| {
                    snapshot
                        .skills
                        .get(key)
                        .map(|skill| skill.specialties.clone())
                        .unwrap_or_default()
                });
                if !list.iter().any(|existing| existing == specialty) {
                    list.push(specialty.to_string());
                }
            }
        }

        let mut skills = Map::new();
        for (key, list) in touched {
            skills.insert(key.into(), json!({ "specialties": list }));
        }
        store.update(json!({ "skills": skills })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        all_skills().all(|(_, key)| {
            character
                .skills
                .get(key)
                .map(|skill| skill.specialties.is_empty())
                .unwrap_or(true)
        })
    }
}
