use super::{auspice, eligible_facets, werewolf_traits};
use crate::ai::ToolSchema;
use crate::catalog::{Catalog, strip_html};
use crate::character::{Character, Item, ItemKind};
use crate::error::StoreError;
use crate::step::{GenerationStep, StepKey};
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashSet;

fn auspice_renown_dots(character: &Character) -> u8 {
    let werewolf = werewolf_traits(character);
    auspice(&werewolf.auspice)
        .map(|info| werewolf.renown.dots(info.renown))
        .unwrap_or(0)
}

// Below two dots of auspice Renown the character rounds out with a Wolf
// Facet instead of a second-level Moon Facet.
fn needs_wolf(character: &Character) -> bool {
    auspice_renown_dots(character) < 2
}

// Clones shed their catalog id; the store mints a fresh one on create.
fn cleared(facet: &Item) -> Item {
    let mut copy = facet.clone();
    copy.id = String::new();
    copy
}

fn facet_summary(item: &Item) -> Value {
    json!({
        "id": item.id,
        "name": item.name,
        "description": strip_html(&item.description),
        "gift": item.gift(),
        "giftType": item.gift_type(),
        "cost": item.data["cost"],
        "action": item.data["action"],
        "duration": item.data["duration"],
    })
}

pub struct GiftsStep;

#[async_trait]
impl GenerationStep for GiftsStep {
    fn key(&self) -> StepKey {
        StepKey::Gifts
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        3
    }

    fn prompt(&self, character: &Character, catalog: &Catalog) -> String {
        let pool = eligible_facets(character, catalog);
        let wolf_needed = needs_wolf(character);

        let shadow_json =
            Value::Array(pool.shadow.iter().map(|item| facet_summary(item)).collect())
                .to_string();

        let extra_rule = if wolf_needed {
            "\n• Select exactly one Wolf Facet from the eligible list."
        } else {
            ""
        };
        let extra_field = if wolf_needed {
            "  • **wolfFacet** – a string (Facet id from the wolf list)"
        } else {
            ""
        };

        let mut prompt = format!(
            "Select Gifts for this Werewolf: the Forsaken character.\n\
             \n\
             • Select exactly two Shadow Facets from the eligible list. They must be from different Shadow Gifts.{extra_rule}\n\
             • Return an object with:\n  \
             • **shadowFacets** – an array of exactly two strings (Facet ids from the shadow list)\n\
             {extra_field}\n\
             \n\
             Eligible Shadow Facets:\n```json\n{shadow_json}\n```\n"
        );

        if wolf_needed {
            let wolf_json =
                Value::Array(pool.wolf.iter().map(|item| facet_summary(item)).collect())
                    .to_string();
            prompt.push_str(&format!(
                "\n\nEligible Wolf Facets:\n```json\n{wolf_json}\n```"
            ));
        }

        prompt
    }

    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema {
        let pool = eligible_facets(character, catalog);
        let wolf_needed = needs_wolf(character);

        let shadow_ids: Vec<&str> = pool.shadow.iter().map(|item| item.id.as_str()).collect();

        let mut parameters = json!({
            "type": "object",
            "properties": {
                "shadowFacets": {
                    "type": "array",
                    "minItems": 2,
                    "maxItems": 2,
                    "uniqueItems": true,
                    "items": { "type": "string", "enum": shadow_ids }
                }
            },
            "required": ["shadowFacets"],
            "additionalProperties": false
        });

        if wolf_needed {
            let wolf_ids: Vec<&str> = pool.wolf.iter().map(|item| item.id.as_str()).collect();
            parameters["properties"]["wolfFacet"] = json!({ "type": "string", "enum": wolf_ids });
            if let Some(required) = parameters["required"].as_array_mut() {
                required.push(json!("wolfFacet"));
            }
        }

        ToolSchema {
            name: "generate_gifts".into(),
            description: if wolf_needed {
                "Choose eligible Shadow and Wolf Facets".into()
            } else {
                "Choose eligible Shadow Facets".into()
            },
            parameters,
        }
    }

    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String> {
        let mut errors = Vec::new();
        let pool = eligible_facets(character, catalog);
        let wolf_needed = needs_wolf(character);

        let shadow_ids: HashSet<&str> = pool.shadow.iter().map(|item| item.id.as_str()).collect();
        let wolf_ids: HashSet<&str> = pool.wolf.iter().map(|item| item.id.as_str()).collect();

        match data.get("shadowFacets").and_then(Value::as_array) {
            Some(chosen) if chosen.len() == 2 => {
                let gifts: HashSet<&str> = chosen
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| pool.shadow.iter().find(|item| item.id == id))
                    .map(|item| item.gift())
                    .collect();
                if gifts.len() != 2 {
                    errors.push("Selected Shadow Facets must be from different Gifts".into());
                }
                for id in chosen.iter().map(|value| value.as_str().unwrap_or_default()) {
                    if !shadow_ids.contains(id) {
                        errors.push(format!("Invalid shadowFacet id: {id}"));
                    }
                }
                let unique: HashSet<String> =
                    chosen.iter().map(|value| value.to_string()).collect();
                if unique.len() != 2 {
                    errors.push("Duplicate Shadow Facets selected".into());
                }
            }
            _ => errors.push("shadowFacets must be an array of exactly 2 ids".into()),
        }

        let wolf_choice = data.get("wolfFacet");
        if wolf_needed {
            match wolf_choice.and_then(Value::as_str) {
                None | Some("") => {
                    errors.push("wolfFacet is required and must be a string".into());
                }
                Some(id) if !wolf_ids.contains(id) => {
                    errors.push(format!("Invalid wolfFacet id: {id}"));
                }
                Some(_) => {}
            }
        } else if wolf_choice
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty())
        {
            errors.push("wolfFacet should not be selected when Auspice Renown >= 2".into());
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
        let mut additions: Vec<Item> = Vec::new();

        if let Some(chosen) = data.get("shadowFacets").and_then(Value::as_array) {
            for id in chosen.iter().filter_map(Value::as_str) {
                if let Some(facet) = catalog.item(id) {
                    additions.push(cleared(facet));
                }
            }
        }
        if let Some(id) = data.get("wolfFacet").and_then(Value::as_str) {
            if let Some(facet) = catalog.item(id) {
                additions.push(cleared(facet));
            }
        }

        // The auspice Moon Gift comes free: level 1, or levels 1-2 once the
        // auspice Renown reaches 2.
        let werewolf = snapshot.werewolf.clone().unwrap_or_default();
        if let Some(info) = auspice(&werewolf.auspice) {
            let cap: i64 = if werewolf.renown.dots(info.renown) >= 2 { 2 } else { 1 };
            for facet in catalog.facets() {
                if facet.gift_type() == "moon"
                    && facet.gift().contains(info.moon_gift)
                    && facet.facet_level() <= cap
                {
                    additions.push(cleared(facet));
                }
            }
        }

        if additions.is_empty() {
            return Ok(());
        }
        store.create_items(additions).await.map(|_| ())
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.items_of(ItemKind::Facet).next().is_none()
    }
}
