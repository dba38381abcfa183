use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, Splat};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

// Splats whose sheets track integrity-style morality instead of
// virtue/vice anchors.
fn has_virtue_and_vice(character: &Character) -> bool {
    !matches!(
        character.splat,
        Splat::Changeling | Splat::Mage | Splat::Werewolf | Splat::Demon | Splat::SinEater
    )
}

fn maximum_age(character: &Character) -> i64 {
    if character.splat == Splat::Vampire {
        1_000
    } else {
        100
    }
}

fn demographic_list(character: &Character) -> Vec<&'static str> {
    let mut list = vec!["name", "age", "sex", "aspirations", "notes", "description"];
    if has_virtue_and_vice(character) {
        list.push("virtue");
        list.push("vice");
    }
    list
}

fn non_empty_string(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_str)
        .is_some_and(|text| !text.trim().is_empty())
}

pub struct DemographicsStep;

#[async_trait]
impl GenerationStep for DemographicsStep {
    fn key(&self) -> StepKey {
        StepKey::Demographics
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        2
    }

    fn prompt(&self, character: &Character, _catalog: &Catalog) -> String {
        format!(
            "Generate demographics. Include {}.",
            demographic_list(character).join(", ")
        )
    }

    fn tool(&self, character: &Character, _catalog: &Catalog) -> ToolSchema {
        let mut props = Map::new();
        props.insert(
            "name".into(),
            json!({ "type": "string", "description": "The character’s full name." }),
        );
        props.insert(
            "age".into(),
            json!({
                "type": "integer",
                "minimum": 18,
                "maximum": maximum_age(character),
                "description": "Age in years."
            }),
        );
        props.insert(
            "sex".into(),
            json!({
                "type": "string",
                "description": "Sex (case sensitive).",
                "enum": ["Male", "Female"]
            }),
        );
        props.insert(
            "aspirations".into(),
            json!({
                "type": "array",
                "minItems": 3,
                "maxItems": 3,
                "description": "3 concise Aspirations; one long-term, two short-term.",
                "items": { "type": "string" }
            }),
        );
        props.insert(
            "notes".into(),
            json!({ "type": "string", "description": "Free-form design notes or background info." }),
        );
        props.insert(
            "description".into(),
            json!({
                "type": "string",
                "description": "Physical appearance and personality in a few sentences."
            }),
        );
        if has_virtue_and_vice(character) {
            props.insert(
                "virtue".into(),
                json!({ "type": "string", "description": "Morality Virtue" }),
            );
            props.insert(
                "vice".into(),
                json!({ "type": "string", "description": "Morality Vice" }),
            );
        }

        ToolSchema {
            name: "generate_demographics".into(),
            description:
                "Return the basic concept / demographic fields for a Chronicles of Darkness Character."
                    .into(),
            parameters: json!({
                "type": "object",
                "properties": props,
                "required": demographic_list(character)
            }),
        }
    }

    fn validate(&self, character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let required = demographic_list(character);

        for key in &required {
            if data.get(key).is_none() {
                errors.push(format!("Missing required key: {key}"));
            }
        }
        if let Some(map) = data.as_object() {
            for key in map.keys() {
                if !required.contains(&key.as_str()) {
                    errors.push(format!("Unexpected key present: {key}"));
                }
            }
        }

        if !non_empty_string(data.get("name")) {
            errors.push("name must be a non-empty string".into());
        }

        let max_age = maximum_age(character);
        let age_ok = data
            .get("age")
            .and_then(Value::as_i64)
            .is_some_and(|age| (18..=max_age).contains(&age));
        if !age_ok {
            errors.push(format!("age must be an integer between 18 and {max_age}"));
        }

        let sex_ok = data
            .get("sex")
            .and_then(Value::as_str)
            .is_some_and(|sex| sex == "Male" || sex == "Female");
        if !sex_ok {
            errors.push("sex must be Male or Female (case sensitive)".into());
        }

        let aspirations_ok = data
            .get("aspirations")
            .and_then(Value::as_array)
            .is_some_and(|list| {
                list.len() == 3
                    && list
                        .iter()
                        .all(|entry| entry.as_str().is_some_and(|text| !text.trim().is_empty()))
            });
        if !aspirations_ok {
            errors.push("aspirations must be an array of 3 non-empty strings".into());
        }

        for key in ["notes", "description"] {
            if !non_empty_string(data.get(key)) {
                errors.push(format!("{key} must be a non-empty string"));
            }
        }

        if has_virtue_and_vice(character) {
            for key in ["virtue", "vice"] {
                if !non_empty_string(data.get(key)) {
                    errors.push(format!("{key} must be a non-empty string"));
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
        let snapshot = store.snapshot().await?;

        let aspirations = data["aspirations"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(|aspiration| format!("* {aspiration}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let mut patch = json!({
            "name": data["name"],
            "age": data["age"],
            "sex": data["sex"],
            "aspirations": aspirations,
            "notes": data["notes"],
            "description": data["description"],
        });
        if has_virtue_and_vice(&snapshot) {
            patch["virtue"] = data["virtue"].clone();
            patch["vice"] = data["vice"].clone();
        }

        store.update(patch).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        let untouched_anchors = !has_virtue_and_vice(character)
            || (character.virtue.is_empty() && character.vice.is_empty());
        character.age == 0
            && character.sex.is_empty()
            && character.aspirations.is_empty()
            && character.notes.is_empty()
            && character.description.is_empty()
            && untouched_anchors
    }
}
