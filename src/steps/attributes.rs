use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{
    Character, MENTAL_ATTRIBUTES, PHYSICAL_ATTRIBUTES, SOCIAL_ATTRIBUTES, all_attributes,
};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

const CATEGORIES: [&str; 3] = ["Physical", "Mental", "Social"];

const PROMPT: &str = r#"To assign attributes for a Chronicles of Darkness character, follow these steps precisely:

1. **Choose Category Priorities:**
   - Select one category as the **primary** category, which will receive **5 additional dots**.
   - Select one category as the **secondary** category, which will receive **4 additional dots**.
   - Select one category as the **tertiary** category, which will receive **3 additional dots**.
   - The categories and their attributes are:
     - **Mental**: Intelligence, Wits, Resolve
     - **Social**: Presence, Manipulation, Composure
     - **Physical**: Strength, Dexterity, Stamina

2. **Distribute Additional Dots:**
   - Each of the nine attributes (Strength, Dexterity, Stamina, Intelligence, Wits, Resolve, Presence, Manipulation, Composure) starts with **1 dot** by default.
   - For the **primary category**, distribute **exactly 5 additional dots** among its three attributes in any combination (e.g., 3 to one, 2 to another, 0 to the third), but no attribute can exceed **5 dots total** (including the starting dot).
   - For the **secondary category**, distribute **exactly 4 additional dots** among its three attributes, following the same rules.
   - For the **tertiary category**, distribute **exactly 3 additional dots** among its three attributes, following the same rules.
   - **Constraint:** The additional dots must be distributed within each category separately, and the totals must match 5 (primary), 4 (secondary), and 3 (tertiary).

3. **Calculate Final Attribute Values:**
   - For each attribute, the final value is **1 (starting dot) + the additional dots assigned**.
   - Verify that no attribute exceeds **5 dots total**.

4. **Return the Results:**
   - Provide the chosen **primaryCategory**, **secondaryCategory**, and **tertiaryCategory** (e.g., "Physical", "Mental", "Social").
   - Provide the final values for all nine attributes: **Strength, Dexterity, Stamina, Intelligence, Wits, Resolve, Presence, Manipulation, Composure**.

**Example:**
- Choices: **Physical** (primary), **Mental** (secondary), **Social** (tertiary).
- **Physical (primary, 5 dots):** Assign 3 to Strength, 2 to Dexterity, 0 to Stamina.
  - Final: Strength = 1 + 3 = 4, Dexterity = 1 + 2 = 3, Stamina = 1 + 0 = 1.
- **Mental (secondary, 4 dots):** Assign 2 to Intelligence, 1 to Wits, 1 to Resolve.
  - Final: Intelligence = 1 + 2 = 3, Wits = 1 + 1 = 2, Resolve = 1 + 1 = 2.
- **Social (tertiary, 3 dots):** Assign 1 to Presence, 1 to Manipulation, 1 to Composure.
  - Final: Presence = 1 + 1 = 2, Manipulation = 1 + 1 = 2, Composure = 1 + 1 = 2.
- **Output:**
  - primaryCategory: "Physical"
  - secondaryCategory: "Mental"
  - tertiaryCategory: "Social"
  - Strength: 4, Dexterity: 3, Stamina: 1
  - Intelligence: 3, Wits: 2, Resolve: 2
  - Presence: 2, Manipulation: 2, Composure: 2

**Rules to Enforce:**
- Each category must receive exactly its allotted additional dots: 5 (primary), 4 (secondary), 3 (tertiary).
- No attribute can exceed 5 dots total.
- All nine attributes must have at least 1 dot (due to the starting dot)."#;

fn category_labels(category: &str) -> [&'static str; 3] {
    let table = match category {
        "Physical" => PHYSICAL_ATTRIBUTES,
        "Mental" => MENTAL_ATTRIBUTES,
        _ => SOCIAL_ATTRIBUTES,
    };
    [table[0].0, table[1].0, table[2].0]
}

pub struct AttributesStep;

#[async_trait]
impl GenerationStep for AttributesStep {
    fn key(&self) -> StepKey {
        StepKey::Attributes
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
        for (label, _) in PHYSICAL_ATTRIBUTES
            .into_iter()
            .chain(MENTAL_ATTRIBUTES)
            .chain(SOCIAL_ATTRIBUTES)
        {
            props.insert(
                label.into(),
                json!({ "type": "integer", "minimum": 1, "maximum": 5 }),
            );
            required.push(label);
        }

        ToolSchema {
            name: "generate_attributes".into(),
            description:
                "Assign Attribute priorities and final dot ratings for a Chronicles of Darkness character."
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
                    errors.push(format!("{key} must be one of Physical, Mental, Social"));
                }
                value
            })
            .collect();

        let distinct = chosen.iter().flatten().collect::<std::collections::HashSet<_>>();
        if distinct.len() != 3 {
            errors.push("Each category must be assigned exactly once".into());
        }

        for (label, _) in all_attributes() {
            let value = data.get(label).and_then(Value::as_i64);
            if !value.is_some_and(|dots| (1..=5).contains(&dots)) {
                errors.push(format!("{label} must be an integer 1-5"));
            }
        }

        if errors.is_empty() {
            let expected = |category: &str| -> i64 {
                if chosen[0] == Some(category) {
                    5
                } else if chosen[1] == Some(category) {
                    4
                } else {
                    3
                }
            };
            for category in CATEGORIES {
                let used: i64 = category_labels(category)
                    .iter()
                    .map(|label| data[*label].as_i64().unwrap_or(0) - 1)
                    .sum();
                if used != expected(category) {
                    errors.push(format!(
                        "{category} must have {} assigned dots but has {used}",
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
        for (label, key) in all_attributes() {
            dots.insert(key.into(), data[label].clone());
        }
        store.update(json!({ "attributes": dots })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        all_attributes().all(|(_, key)| character.attributes.get(key).unwrap_or(1) <= 1)
    }
}
