//! Steps specific to Mage: the Awakening, plus the Path and Order tables
//! they share with the experience-spending rules.

mod arcana;
mod nimbus;
mod obsessions;
mod path_and_order;
mod praxes;
mod resistance;
mod rotes;
mod tool;

pub use arcana::ArcanaStep;
pub use nimbus::NimbusStep;
pub use obsessions::ObsessionsStep;
pub use path_and_order::PathAndOrderStep;
pub use praxes::PraxesStep;
pub use resistance::ResistanceAttributeStep;
pub use rotes::RotesStep;
pub use tool::DedicatedMagicalToolStep;

use crate::catalog::Catalog;
use crate::character::{Character, Item, MageTraits};

pub(crate) struct PathInfo {
    pub name: &'static str,
    pub ruling: [&'static str; 2],
    pub inferior: &'static str,
}

pub(crate) const PATHS: [PathInfo; 5] = [
    PathInfo { name: "Acanthus", ruling: ["Time", "Fate"], inferior: "Forces" },
    PathInfo { name: "Mastigos", ruling: ["Mind", "Space"], inferior: "Matter" },
    PathInfo { name: "Moros", ruling: ["Death", "Matter"], inferior: "Spirit" },
    PathInfo { name: "Obrimos", ruling: ["Prime", "Forces"], inferior: "Death" },
    PathInfo { name: "Thyrsus", ruling: ["Life", "Spirit"], inferior: "Mind" },
];

pub(crate) struct OrderInfo {
    pub name: &'static str,
    pub rote_skills: &'static [&'static str],
}

pub(crate) const ORDERS: [OrderInfo; 6] = [
    OrderInfo { name: "Adamantine Arrow", rote_skills: &["Athletics", "Intimidation", "Medicine"] },
    OrderInfo { name: "Free Council", rote_skills: &["Crafts", "Persuasion", "Science"] },
    OrderInfo {
        name: "Guardians of the Veil",
        rote_skills: &["Investigation", "Stealth", "Subterfuge"],
    },
    OrderInfo { name: "Mysterium", rote_skills: &["Investigation", "Occult", "Survival"] },
    OrderInfo { name: "Silver Ladder", rote_skills: &["Expression", "Persuasion", "Subterfuge"] },
    OrderInfo { name: "Apostate", rote_skills: &[] },
];

/// Arcana display labels; the record keys are the lowercase forms.
pub(crate) const ARCANA_LABELS: [&str; 10] =
    ["Death", "Fate", "Forces", "Life", "Matter", "Mind", "Prime", "Space", "Spirit", "Time"];

pub(crate) fn path(name: &str) -> Option<&'static PathInfo> {
    PATHS.iter().find(|info| info.name == name)
}

pub(crate) fn order(name: &str) -> Option<&'static OrderInfo> {
    ORDERS.iter().find(|info| info.name == name)
}

pub(crate) fn mage_traits(character: &Character) -> MageTraits {
    character.mage.clone().unwrap_or_default()
}

/// Spells the character can learn: Arcanum dots at or above the spell
/// level. Entries without a usable level (1 through 5) are skipped.
pub(crate) fn eligible_spells<'a>(character: &Character, catalog: &'a Catalog) -> Vec<&'a Item> {
    let mage = mage_traits(character);
    catalog
        .spells()
        .filter(|spell| {
            let level = spell.spell_level();
            let dots = mage.arcanum(spell.arcanum()).map(|arcanum| arcanum.dots).unwrap_or(0);
            level >= 1 && i64::from(dots) >= level
        })
        .collect()
}
