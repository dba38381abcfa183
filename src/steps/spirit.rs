use crate::ai::ToolSchema;
use crate::catalog::{Catalog, strip_html};
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

struct RankRow {
    rank: u8,
    trait_limit: i64,
    attr_dots_min: i64,
    attr_dots_max: i64,
    max_essence: u32,
    numina_min: usize,
    numina_max: usize,
    title: &'static str,
}

#[rustfmt::skip]
const RANK_TABLE: [RankRow; 6] = [
    RankRow { rank: 0, trait_limit: 0,  attr_dots_min: 0,  attr_dots_max: 0,  max_essence: 5,  numina_min: 0, numina_max: 0,  title: "Muthra" },
    RankRow { rank: 1, trait_limit: 5,  attr_dots_min: 5,  attr_dots_max: 8,  max_essence: 10, numina_min: 1, numina_max: 3,  title: "Hursih" },
    RankRow { rank: 2, trait_limit: 7,  attr_dots_min: 9,  attr_dots_max: 14, max_essence: 15, numina_min: 3, numina_max: 5,  title: "Hursah" },
    RankRow { rank: 3, trait_limit: 9,  attr_dots_min: 15, attr_dots_max: 25, max_essence: 20, numina_min: 5, numina_max: 7,  title: "Ensih" },
    RankRow { rank: 4, trait_limit: 12, attr_dots_min: 26, attr_dots_max: 35, max_essence: 25, numina_min: 7, numina_max: 9,  title: "Ensah" },
    RankRow { rank: 5, trait_limit: 15, attr_dots_min: 36, attr_dots_max: 45, max_essence: 50, numina_min: 9, numina_max: 11, title: "Dihir" },
];

fn rank_row(rank: u8) -> &'static RankRow {
    RANK_TABLE.iter().find(|row| row.rank == rank).unwrap_or(&RANK_TABLE[0])
}

// An unset rank counts as 1; rank 0 spirits are not generated.
fn spirit_rank(character: &Character) -> u8 {
    character.spirit.as_ref().map(|spirit| spirit.rank).unwrap_or(0).max(1)
}

fn item_listing<'a>(items: impl Iterator<Item = &'a Item>) -> Value {
    let entries: Vec<Value> = items
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "description": strip_html(&item.description),
            })
        })
        .collect();
    Value::Array(entries)
}

fn string_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn trait_field(data: &Value, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or(-1)
}

pub struct GenerateSpiritStep;

#[async_trait]
impl GenerationStep for GenerateSpiritStep {
    fn key(&self) -> StepKey {
        StepKey::GenerateSpirit
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let rank = spirit_rank(character);
        let row = rank_row(rank);
        format!(
            "Generate details for this Spirit based on its Rank {rank}.\n\
             \n\
             - Power, Finesse, and Resistance: Each between 1 and {limit}, total sum between {min} and {max}.\n\
             - Influences: Array of objects with name (concept the spirit influences) and rating (dots). Total ratings sum exactly to {rank}. Ratings per influence 1 to {rank}.\n\
             - Numina: Select {numina_min} to {numina_max} unique Numina from the list. Return array of IDs.\n\
             - Manifestations: Select exactly {rank} unique Manifestations from the list (in addition to default Twilight Form). Return array of IDs.\n\
             - Ban: A behavioral compulsion the spirit must follow or avoid under certain conditions. Complexity increases with Rank: simple for low Rank, complex with severe consequences for high Rank.\n\
             - Bane: A physical substance or energy that harms the spirit symbolically. Common for low Rank, esoteric and specific for high Rank.\n\
             - Name: A suitable name for the spirit.\n\
             - Description: A brief description of the spirit's nature and appearance.\n\
             - Virtue: The spirit's Virtue.\n\
             - Vice: The spirit's Vice.\n\
             \n\
             Eligible Numina:\n\
             {numina}\n\
             \n\
             Eligible Manifestations:\n\
             {manifestations}\n\
             \n\
             Return an object with the specified fields.",
            limit = row.trait_limit,
            min = row.attr_dots_min,
            max = row.attr_dots_max,
            numina_min = row.numina_min,
            numina_max = row.numina_max,
            numina = item_listing(catalog.numina()),
            manifestations = item_listing(catalog.manifestations()),
        )
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let rank = spirit_rank(character);
        let row = rank_row(rank);
        let numina_ids: Vec<&str> = catalog.numina().map(|item| item.id.as_str()).collect();
        let manifestation_ids: Vec<&str> =
            catalog.manifestations().map(|item| item.id.as_str()).collect();
        ToolSchema {
            name: "generate_spirit".into(),
            description: "Generate spirit details based on Rank".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "virtue": { "type": "string" },
                    "vice": { "type": "string" },
                    "ban": { "type": "string" },
                    "bane": { "type": "string" },
                    "power": { "type": "integer", "minimum": 1, "maximum": row.trait_limit },
                    "finesse": { "type": "integer", "minimum": 1, "maximum": row.trait_limit },
                    "resistance": { "type": "integer", "minimum": 1, "maximum": row.trait_limit },
                    "influences": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "rating": { "type": "integer", "minimum": 1, "maximum": rank },
                            },
                            "required": ["name", "rating"],
                            "additionalProperties": false,
                        },
                    },
                    "numina": {
                        "type": "array",
                        "minItems": row.numina_min,
                        "maxItems": row.numina_max,
                        "items": { "type": "string", "enum": numina_ids },
                    },
                    "manifestations": {
                        "type": "array",
                        "minItems": rank,
                        "maxItems": rank,
                        "items": { "type": "string", "enum": manifestation_ids },
                    },
                },
                "required": [
                    "name", "description", "virtue", "vice", "ban", "bane",
                    "power", "finesse", "resistance", "influences", "numina",
                    "manifestations",
                ],
                "additionalProperties": false,
            }),
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let rank = spirit_rank(character);
        let row = rank_row(rank);

        let power = trait_field(data, "power");
        let finesse = trait_field(data, "finesse");
        let resistance = trait_field(data, "resistance");
        if ![power, finesse, resistance]
            .iter()
            .all(|value| (1..=row.trait_limit).contains(value))
        {
            errors.push("Attributes must be integers between 1 and trait limit".into());
        }
        let attr_sum = power + finesse + resistance;
        if attr_sum < row.attr_dots_min || attr_sum > row.attr_dots_max {
            errors.push(format!(
                "Attribute sum must be between {} and {}",
                row.attr_dots_min, row.attr_dots_max
            ));
        }

        match data.get("influences").and_then(Value::as_array) {
            Some(influences) if !influences.is_empty() => {
                let mut sum = 0;
                for influence in influences {
                    let name = influence.get("name").and_then(Value::as_str).unwrap_or_default();
                    let rating = influence.get("rating").and_then(Value::as_i64).unwrap_or(0);
                    if name.is_empty() || rating < 1 || rating > i64::from(rank) {
                        errors.push("Invalid influence entry".into());
                    }
                    sum += rating;
                }
                if sum != i64::from(rank) {
                    errors.push(format!("Influence ratings must sum to {rank}"));
                }
            }
            _ => errors.push("Influences must be a non-empty array".into()),
        }

        let numina_ids: HashSet<&str> = catalog.numina().map(|item| item.id.as_str()).collect();
        match data.get("numina").and_then(Value::as_array) {
            Some(numina)
                if numina.len() >= row.numina_min && numina.len() <= row.numina_max =>
            {
                let unique: HashSet<String> = numina.iter().map(|id| id.to_string()).collect();
                if unique.len() != numina.len() {
                    errors.push("Duplicate Numina IDs".into());
                }
                for id in numina {
                    let id = id.as_str().unwrap_or_default();
                    if !numina_ids.contains(id) {
                        errors.push(format!("Invalid Numina ID: {id}"));
                    }
                }
            }
            _ => errors.push(format!(
                "Numina count must be between {} and {}",
                row.numina_min, row.numina_max
            )),
        }

        let manifestation_ids: HashSet<&str> =
            catalog.manifestations().map(|item| item.id.as_str()).collect();
        match data.get("manifestations").and_then(Value::as_array) {
            Some(manifestations) if manifestations.len() == usize::from(rank) => {
                let unique: HashSet<String> =
                    manifestations.iter().map(|id| id.to_string()).collect();
                if unique.len() != manifestations.len() {
                    errors.push("Duplicate Manifestation IDs".into());
                }
                for id in manifestations {
                    let id = id.as_str().unwrap_or_default();
                    if !manifestation_ids.contains(id) {
                        errors.push(format!("Invalid Manifestation ID: {id}"));
                    }
                }
            }
            _ => errors.push(format!("Manifestations count must be exactly {rank}")),
        }

        let strings = ["name", "description", "virtue", "vice", "ban", "bane"];
        if !strings.iter().all(|key| !string_field(data, key).trim().is_empty()) {
            errors.push("All string fields must be non-empty strings".into());
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
        let rank = spirit_rank(&snapshot);
        let row = rank_row(rank);

        let power = trait_field(data, "power");
        let finesse = trait_field(data, "finesse");
        let resistance = trait_field(data, "resistance");

        let size = i64::from(rank);
        let corpus = resistance + size;
        // Rank 1 spirits defend with their better trait, everyone else with
        // the worse one.
        let defense = if rank == 1 { power.max(finesse) } else { power.min(finesse) };
        let initiative = finesse + resistance;
        let speed = power + finesse;
        let willpower = resistance + finesse;
        let perception = power + finesse;

        store
            .update(json!({
                "name": string_field(data, "name"),
                "description": string_field(data, "description"),
                "virtue": string_field(data, "virtue"),
                "vice": string_field(data, "vice"),
                "spirit": {
                    "power": power,
                    "finesse": finesse,
                    "resistance": resistance,
                    "essence": { "value": row.max_essence, "max": row.max_essence },
                    "rank_title": row.title,
                    "ban": string_field(data, "ban"),
                    "bane": string_field(data, "bane"),
                },
                "willpower": { "value": willpower, "max": willpower },
                "derived": {
                    "size": { "value": size },
                    "speed": { "value": speed },
                    "defense": { "value": defense },
                    "initiative": { "value": initiative },
                    "perception": { "value": perception },
                    "health": { "value": corpus },
                },
            }))
            .await?;

        let mut additions: Vec<Item> = Vec::new();
        if let Some(influences) = data.get("influences").and_then(Value::as_array) {
            for influence in influences {
                let name = influence.get("name").and_then(Value::as_str).unwrap_or_default();
                let rating = influence.get("rating").and_then(Value::as_i64).unwrap_or(0);
                additions.push(Item {
                    kind: ItemKind::Influence,
                    name: name.to_string(),
                    rating,
                    description: format!("Influence over {name}"),
                    ..Item::default()
                });
            }
        }
        for key in ["numina", "manifestations"] {
            if let Some(chosen) = data.get(key).and_then(Value::as_array) {
                for id in chosen.iter().filter_map(Value::as_str) {
                    if let Some(base) = catalog.item(id) {
                        let mut copy = base.clone();
                        copy.id = String::new();
                        additions.push(copy);
                    }
                }
            }
        }
        if additions.is_empty() {
            return Ok(());
        }
        store.create_items(additions).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        let owned = |kind| character.items_of(kind).next().is_some();
        !owned(ItemKind::Numen) && !owned(ItemKind::Manifestation) && !owned(ItemKind::Influence)
    }
}
