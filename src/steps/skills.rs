use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, MENTAL_SKILLS, PHYSICAL_SKILLS, SOCIAL_SKILLS, all_skills};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

const CATEGORIES: [&str; 3] = ["Physical", "Mental", "Social"];

const PROMPT: &str = r#"Assign Skills for a Chronicles of Darkness character as follows:

1. Choose category priorities:
   • One **primary** category gets **11 dots**
   • One **secondary** category gets **7 dots**
   • One **tertiary** category gets **4 dots**

   Categories and their skills:
   • **Mental**: Academics, Computer, Crafts, Investigation, Medicine, Occult, Politics, Science
   • **Physical**: Athletics, Brawl, Drive, Firearms, Larceny, Stealth, Survival, Weaponry
   • **Social**: Animal Ken, Empathy, Expression, Intimidation, Persuasion, Socialize, Streetwise, Subterfuge

2. Distribute the allotted dots inside each chosen category. Skills start at 0 and cannot exceed 5.

3. Return primaryCategory, secondaryCategory, tertiaryCategory and final values for all 24 skills.

Rules:
• Totals per category must be 11, 7, 4 respectively.
• No skill may exceed 5."#;

fn category_skills(category: &str) -> [(&'static str, &'static str); 8] {
    match category {
        "Mental" => MENTAL_SKILLS,
        "Physical" => PHYSICAL_SKILLS,
        _ => SOCIAL_SKILLS,
    }
}

pub struct SkillsStep;

#[async_trait]
impl GenerationStep for SkillsStep {
    fn key(&self) -> StepKey {
        StepKey::Skills
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        5
    }

    fn reasoning_effort(&self, _character: &Character) -> Option<&'static str> {
        Some("high")
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        PROMPT.to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        let mut props = Map::new();
        let mut required = Vec::new();
        for key in ["primaryCategory", "secondaryCategory", "tertiaryCategory"] {
            props.insert(key.into(), json!({ "type": "string", "enum": CATEGORIES }));
            required.push(key);
        }
        for (label, _) in all_skills() {
            props.insert(
                label.into(),
                json!({ "type": "integer", "minimum": 0, "maximum": 5 }),
            );
            required.push(label);
        }

        ToolSchema {
            name: "generate_skills".into(),
            description:
                "Assign Skill priorities and final dot ratings for a Chronicles of Darkness character."
                    .into(),
            parameters: json!({
                "type": "object",
                "properties": props,
                "required": required
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();

        let chosen: Vec<Option<&str>> = ["primaryCategory", "secondaryCategory", "tertiaryCategory"]
            .iter()
            .map(|key| {
                let value = data.get(*key).and_then(Value::as_str);
                if !value.is_some_and(|category| CATEGORIES.contains(&category)) {
                    errors.push(format!("{key} must be Physical, Mental, or Social"));
                }
                value
            })
            .collect();

        let distinct = chosen.iter().flatten().collect::<HashSet<_>>();
        if distinct.len() != 3 {
            errors.push("Each category must be used exactly once".into());
        }

        for (label, _) in all_skills() {
            let value = data.get(label).and_then(Value::as_i64);
            if !value.is_some_and(|dots| (0..=5).contains(&dots)) {
                errors.push(format!("{label} must be between 0 and 5"));
            }
        }

        if errors.is_empty() {
            let expected = |category: &str| -> i64 {
                if chosen[0] == Some(category) {
                    11
                } else if chosen[1] == Some(category) {
                    7
                } else {
                    4
                }
            };
            for category in CATEGORIES {
                let used: i64 = category_skills(category)
                    .iter()
                    .map(|(label, _)| data[*label].as_i64().unwrap_or(0))
                    .sum();
                if used != expected(category) {
                    errors.push(format!(
                        "{category} must total {} dots but has {used}",
                        expected(category)
                    ));
                }
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
        let mut dots = Map::new();
        for (label, key) in all_skills() {
            dots.insert(key.into(), json!({ "dots": data[label] }));
        }
        store.update(json!({ "skills": dots })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        all_skills().all(|(_, key)| {
            character
                .skills
                .get(key)
                .map(|skill| skill.dots)
                .unwrap_or(0)
                == 0
        })
    }
}
