use crate::ai::ToolSchema;
use crate::catalog::{Catalog, parse_possible_ratings};
use crate::character::{Character, Item, ItemKind, Splat};
use crate::error::StoreError;
use crate::expr::evaluate_prerequisite;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};

fn total_dots(splat: Splat) -> i64 {
    match splat {
        Splat::Mortal | Splat::Spirit => 7,
        _ => 10,
    }
}

fn power_stat_name(splat: Splat) -> Option<&'static str> {
    match splat {
        Splat::Mage => Some("Gnosis"),
        Splat::Vampire => Some("Blood Potency"),
        Splat::Werewolf => Some("Primal Urge"),
        Splat::Changeling => Some("Wyrd"),
        Splat::Demon => Some("Primum"),
        Splat::SinEater => Some("Synergy"),
        Splat::Mortal | Splat::Spirit => None,
    }
}

// Copy of the character with the bought power-stat increase already in
// place, used to evaluate prerequisites as if the purchase had happened.
fn with_power_stat_increase(character: &Character, increase: u8) -> Character {
    let mut simulated = character.clone();
    match simulated.splat {
        Splat::Mage => {
            if let Some(mage) = simulated.mage.as_mut() {
                mage.gnosis += increase;
            }
        }
        Splat::Vampire => {
            if let Some(vampire) = simulated.vampire.as_mut() {
                vampire.blood_potency += increase;
            }
        }
        Splat::Werewolf => {
            if let Some(werewolf) = simulated.werewolf.as_mut() {
                werewolf.primal_urge += increase;
            }
        }
        Splat::Changeling => {
            if let Some(changeling) = simulated.changeling.as_mut() {
                changeling.wyrd += increase;
            }
        }
        Splat::Demon => {
            if let Some(demon) = simulated.demon.as_mut() {
                demon.primum += increase;
            }
        }
        Splat::SinEater => {
            if let Some(sin_eater) = simulated.sin_eater.as_mut() {
                sin_eater.synergy += increase;
            }
        }
        Splat::Mortal | Splat::Spirit => {}
    }
    simulated
}

// Clone a catalog merit into an owned item for the chosen rating, renamed
// when a signifier narrows it ("Status" -> "Status (police)").
fn chosen_item(merit: &Item, choice: &Value) -> Item {
    let mut item = merit.clone();
    item.id = String::new();
    if let Some(signifier) = choice
        .get("signifier")
        .and_then(Value::as_str)
        .filter(|signifier| !signifier.is_empty())
    {
        item.name = format!("{} ({signifier})", merit.name);
    }
    item.rating = choice.get("rating").and_then(Value::as_i64).unwrap_or(0);
    item
}

pub struct MeritsStep;

#[async_trait]
impl GenerationStep for MeritsStep {
    fn key(&self) -> StepKey {
        StepKey::Merits
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let merits: Vec<Value> = catalog
            .merits()
            .map(|merit| {
                json!({
                    "id": merit.id,
                    "name": merit.name,
                    "description": merit.description,
                    "possibleRatings": merit.possible_ratings,
                    "prerequisites": merit.prerequisites,
                })
            })
            .collect();
        let merits_json = serde_json::to_string(&merits).unwrap_or_else(|_| "[]".into());

        let budget = total_dots(character.splat);
        let power_stat_text = power_stat_name(character.splat)
            .map(|name| {
                format!(
                    "• Optionally, spend 5 dots to increase the character's {name} by 1 \
                     (you may do this up to 2 times, as total dots are {budget}).\n"
                )
            })
            .unwrap_or_default();
        let power_stat_field = if power_stat_name(character.splat).is_some() {
            "• Optionally, include **powerStatIncrease** – an integer (0 to 2).  \n"
        } else {
            ""
        };

        format!(
            "Choose Merits for this Chronicles of Darkness character, totaling exactly {budget} dots.\n\
             \n\
             • Merits cost a number of dots equal to their chosen rating.\n\
             • You may select multiple Merits, each with a valid rating from its possibleRatings.\n\
             • Prerequisites must be met, either by the character's current traits or by other selected Merits (they will be validated in an order that allows dependencies).\n\
             {power_stat_text}\
             • Some Merits require a specifier, like 'Status' in a particular organization (e.g., 'police'). If appropriate for the Merit, include **signifier** – a string (1-30 characters) describing the target. The final name will be 'Merit Name (signifier)'. Exercise caution: only include if the Merit typically requires it, such as Status, Allies, Contacts, etc.\n\
             • Do not select the same Merit more than once.\n\
             • Return an object named **choices** – an array of objects, each with:  \n\
             \x20 • **meritId** – the Merit's id (exact from the list)  \n\
             \x20 • **rating** – the chosen rating (must be in possibleRatings for that Merit)  \n\
             \x20 • Optionally, **signifier** – if needed  \n\
             {power_stat_field}\
             \n\
             Available Merits:\n\
             ```json\n\
             {merits_json}\n\
             ```\n"
        )
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let one_of: Vec<Value> = catalog
            .merits()
            .map(|merit| {
                json!({
                    "type": "object",
                    "properties": {
                        "meritId": { "type": "string", "const": merit.id },
                        "rating": {
                            "type": "integer",
                            "enum": parse_possible_ratings(&merit.possible_ratings)
                        },
                        "signifier": { "type": "string", "minLength": 1, "maxLength": 30 }
                    },
                    "required": ["meritId", "rating"],
                    "additionalProperties": false
                })
            })
            .collect();

        let has_power_stat = power_stat_name(character.splat).is_some();
        let mut parameters = json!({
            "type": "object",
            "properties": {
                "choices": {
                    "type": "array",
                    "items": { "oneOf": one_of }
                }
            },
            "required": ["choices"],
            "additionalProperties": false
        });
        if has_power_stat {
            parameters["properties"]["powerStatIncrease"] =
                json!({ "type": "integer", "minimum": 0, "maximum": 2 });
            if let Some(required) = parameters["required"].as_array_mut() {
                required.push(json!("powerStatIncrease"));
            }
        }

        let description = if has_power_stat {
            "Choose valid Merits and powerStatIncrease increase of 0 to 2".to_string()
        } else {
            "Choose valid Merits".to_string()
        };

        ToolSchema {
            name: "generate_merits".into(),
            description,
            parameters,
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let budget = total_dots(character.splat);

        let Some(choices) = data.get("choices").and_then(Value::as_array) else {
            errors.push("choices must be an array".into());
            return errors;
        };

        let increase = data
            .get("powerStatIncrease")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let merit_cost: i64 = choices
            .iter()
            .map(|choice| choice.get("rating").and_then(Value::as_i64).unwrap_or(0))
            .sum();
        let total_cost = merit_cost + 5 * increase;
        if total_cost != budget {
            errors.push(format!(
                "Total cost must be exactly {budget} (current: {total_cost})"
            ));
        }

        let has_power_stat = power_stat_name(character.splat).is_some();
        let max_increase = if has_power_stat { 2 } else { 0 };
        if increase > max_increase {
            errors.push(format!("Power stat increase cannot exceed {max_increase}"));
        }
        if !has_power_stat && increase > 0 {
            errors.push("This character type cannot increase power stat".into());
        }

        let ids: Vec<&str> = choices
            .iter()
            .filter_map(|choice| choice.get("meritId").and_then(Value::as_str))
            .collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        if unique.len() != ids.len() {
            errors.push("Duplicate Merits selected (not allowed)".into());
        }

        for choice in choices {
            let id = choice
                .get("meritId")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let Some(merit) = catalog.item(id) else {
                errors.push(format!("Invalid meritId: {id}"));
                continue;
            };
            let rating = choice.get("rating").and_then(Value::as_i64).unwrap_or(0);
            if !parse_possible_ratings(&merit.possible_ratings).contains(&rating) {
                errors.push(format!("Invalid rating {rating} for Merit {}", merit.name));
            }
            if let Some(signifier) = choice.get("signifier").and_then(Value::as_str) {
                if !signifier.is_empty() && signifier.chars().count() > 30 {
                    errors.push(format!("Signifier for {} must be 1-30 characters", merit.name));
                }
            }
        }

        // Admit chosen merits one fixed-point pass at a time, so an in-set
        // merit can satisfy another's prerequisite regardless of order.
        let mut simulated = with_power_stat_increase(character, increase.clamp(0, 2) as u8);
        let mut remaining: Vec<&Value> = choices.iter().collect();
        while !remaining.is_empty() {
            let mut added = false;
            remaining.retain(|choice| {
                let id = choice
                    .get("meritId")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let Some(merit) = catalog.item(id) else {
                    return true;
                };
                if evaluate_prerequisite(&merit.prerequisites, &simulated) {
                    simulated.items.push(chosen_item(merit, choice));
                    added = true;
                    false
                } else {
                    true
                }
            });
            if !added {
                let stuck: Vec<String> = remaining
                    .iter()
                    .map(|choice| {
                        let id = choice
                            .get("meritId")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        catalog
                            .item(id)
                            .map(|merit| merit.name.clone())
                            .unwrap_or_else(|| id.to_string())
                    })
                    .collect();
                errors.push(format!(
                    "The following Merits have prerequisites that are not met: {}",
                    stuck.join(", ")
                ));
                break;
            }
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

        let mut items = Vec::new();
        if let Some(choices) = data.get("choices").and_then(Value::as_array) {
            for choice in choices {
                let Some(id) = choice.get("meritId").and_then(Value::as_str) else {
                    continue;
                };
                let Some(merit) = catalog.item(id) else {
                    continue;
                };
                items.push(chosen_item(merit, choice));
            }
        }
        store.create_items(items).await?;

        let increase = data
            .get("powerStatIncrease")
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .clamp(0, 2) as u8;
        if let Some(current) = snapshot.power_stat() {
            if let Some(patch) = snapshot.power_stat_patch(current + increase) {
                store.update(patch).await?;
            }
        }
        Ok(())
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.items_of(ItemKind::Merit).next().is_none()
    }
}
