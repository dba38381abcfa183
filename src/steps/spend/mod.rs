//! Experience expenditure steps, one variant per splat that supports them.
//! The run loop keeps re-queuing the registered variant until the
//! character's Experience pools are dry.

mod mage;
mod werewolf;

pub use mage::SpendMageStep;
pub use werewolf::SpendWerewolfStep;

use crate::catalog::{Catalog, parse_possible_ratings, strip_html};
use crate::character::{
    Character, Item, ItemKind, ProgressEntry, all_attributes, all_skills, base_name,
};
use crate::error::StoreError;
use crate::expr::evaluate_prerequisite;
use crate::store::CharacterStore;
use serde_json::{Value, json};
use std::collections::HashSet;

/// Merits whose name alone is ambiguous; purchases must carry a signifier
/// ("Status" becomes "Status (police)").
pub(crate) const SIGNIFIER_MERITS: [&str; 9] = [
    "Status",
    "Allies",
    "Contacts",
    "Resources",
    "Safe Place",
    "Staff",
    "Mentor",
    "Retainer",
    "Alternate Identity",
];

pub(crate) fn requires_signifier(name: &str) -> bool {
    SIGNIFIER_MERITS.contains(&name)
}

/// Attribute record keys still below the cap, in mental/physical/social order.
pub(crate) fn increasable_attributes(character: &Character, cap: i64) -> Vec<&'static str> {
    all_attributes()
        .filter(|(_, key)| i64::from(character.attributes.get(key).unwrap_or(0)) < cap)
        .map(|(_, key)| key)
        .collect()
}

/// Skill record keys still below the cap.
pub(crate) fn increasable_skills(character: &Character, cap: i64) -> Vec<&'static str> {
    all_skills()
        .filter(|(_, key)| {
            let dots = character.skills.get(key).map(|skill| skill.dots).unwrap_or(0);
            i64::from(dots) < cap
        })
        .map(|(_, key)| key)
        .collect()
}

/// Skills that can take a specialty: at least one dot.
pub(crate) fn skills_with_dots(character: &Character) -> Vec<&'static str> {
    all_skills()
        .filter(|(_, key)| character.skills.get(key).map(|skill| skill.dots).unwrap_or(0) >= 1)
        .map(|(_, key)| key)
        .collect()
}

/// A catalog merit the character could buy fresh, with the prompt listing
/// already rendered.
pub(crate) struct MeritPurchase {
    pub id: String,
    pub listing: Value,
}

/// Merits not yet owned (by base name), prerequisites met, and whose
/// cheapest rating fits the budget.
pub(crate) fn merit_purchases(
    character: &Character,
    catalog: &Catalog,
    budget: i64,
) -> Vec<MeritPurchase> {
    let owned: HashSet<&str> = character
        .items_of(ItemKind::Merit)
        .map(|item| base_name(&item.name))
        .collect();

    catalog
        .merits()
        .filter(|merit| !owned.contains(base_name(&merit.name)))
        .filter(|merit| evaluate_prerequisite(&merit.prerequisites, character))
        .filter_map(|merit| {
            let ratings = parse_possible_ratings(&merit.possible_ratings);
            let minimum = *ratings.first()?;
            if minimum > budget {
                return None;
            }
            Some(MeritPurchase {
                id: merit.id.clone(),
                listing: json!({
                    "id": merit.id,
                    "name": merit.name,
                    "possibleRatings": merit.possible_ratings,
                    "minCost": minimum,
                    "prerequisites": merit.prerequisites,
                    "description": strip_html(&merit.description),
                }),
            })
        })
        .collect()
}

/// An owned merit with a higher rating still on the table.
pub(crate) struct MeritIncrease {
    pub id: String,
    pub listing: Value,
}

/// Owned merits whose catalog counterpart offers a next rating the budget
/// covers. Ids address the owned copies, not the catalog.
pub(crate) fn merit_increases(
    character: &Character,
    catalog: &Catalog,
    budget: i64,
) -> Vec<MeritIncrease> {
    character
        .items_of(ItemKind::Merit)
        .filter_map(|merit| {
            let next = next_merit_rating(catalog, merit)?;
            let cost = next - merit.rating;
            if cost > budget {
                return None;
            }
            Some(MeritIncrease {
                id: merit.id.clone(),
                listing: json!({
                    "id": merit.id,
                    "name": merit.name,
                    "currentRating": merit.rating,
                    "nextRating": next,
                    "cost": cost,
                }),
            })
        })
        .collect()
}

/// Next legal rating for an owned merit, looked up in the catalog by base
/// name so signifier suffixes do not break the match.
pub(crate) fn next_merit_rating(catalog: &Catalog, merit: &Item) -> Option<i64> {
    let world = catalog
        .merits()
        .find(|candidate| base_name(&candidate.name) == base_name(&merit.name))?;
    parse_possible_ratings(&world.possible_ratings)
        .into_iter()
        .find(|rating| *rating > merit.rating)
}

// Clones shed their catalog id; the store mints a fresh one on create.
pub(crate) fn cleared(item: &Item) -> Item {
    let mut copy = item.clone();
    copy.id = String::new();
    copy
}

pub(crate) fn listings_json(listings: &[Value]) -> String {
    serde_json::to_string(listings).unwrap_or_else(|_| "[]".into())
}

/// Records the expenditure in the progress ledger. Costs land as negative
/// beats, five per Experience point.
pub(crate) async fn add_progress(
    store: &dyn CharacterStore,
    reason: String,
    beats: i64,
    arcane_beats: i64,
) -> Result<(), StoreError> {
    let snapshot = store.snapshot().await?;
    let mut progress = snapshot.progress;
    progress.push(ProgressEntry {
        reason,
        beats,
        arcane_beats,
    });
    store.update(json!({ "progress": progress })).await
}
