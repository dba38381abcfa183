//! Steps specific to Werewolf: the Forsaken, plus the auspice, tribe, and
//! moon tables they share with the experience-spending rules.

mod auspice;
mod blood_and_bone;
mod gifts;
mod renown;
mod rites;
mod touchstones;

pub use auspice::AuspiceAndTribeStep;
pub use blood_and_bone::BloodAndBoneStep;
pub use gifts::GiftsStep;
pub use renown::RenownStep;
pub use rites::RitesStep;
pub use touchstones::UrathaTouchstonesStep;

use crate::catalog::Catalog;
use crate::character::{Character, Item, WerewolfTraits};
use std::collections::HashSet;

pub(crate) struct AuspiceInfo {
    pub name: &'static str,
    pub renown: &'static str,
    pub moon_gift: &'static str,
    pub hunters_aspect: &'static str,
    pub skills: [&'static str; 3],
    pub shadow_gifts: [&'static str; 2],
}

pub(crate) const AUSPICES: [AuspiceInfo; 5] = [
    AuspiceInfo {
        name: "Cahalith",
        renown: "glory",
        moon_gift: "Gibbous Moon",
        hunters_aspect: "Monstrous",
        skills: ["Crafts", "Expression", "Persuasion"],
        shadow_gifts: ["Inspiration", "Knowledge"],
    },
    AuspiceInfo {
        name: "Elodoth",
        renown: "honor",
        moon_gift: "Half Moon",
        hunters_aspect: "Isolating",
        skills: ["Empathy", "Investigation", "Politics"],
        shadow_gifts: ["Insight", "Warding"],
    },
    AuspiceInfo {
        name: "Irraka",
        renown: "cunning",
        moon_gift: "New Moon",
        hunters_aspect: "Blissful",
        skills: ["Larceny", "Stealth", "Subterfuge"],
        shadow_gifts: ["Evasion", "Stealth"],
    },
    AuspiceInfo {
        name: "Ithaeur",
        renown: "wisdom",
        moon_gift: "Crescent Moon",
        hunters_aspect: "Mystical",
        skills: ["Animal Ken", "Medicine", "Occult"],
        shadow_gifts: ["Elemental", "Shaping"],
    },
    AuspiceInfo {
        name: "Rahu",
        renown: "purity",
        moon_gift: "Full Moon",
        hunters_aspect: "Dominant",
        skills: ["Brawl", "Intimidation", "Survival"],
        shadow_gifts: ["Dominance", "Strength"],
    },
];

pub(crate) struct TribeInfo {
    pub name: &'static str,
    pub renown: Option<&'static str>,
    pub shadow_gifts: &'static [&'static str],
}

pub(crate) const TRIBES: [TribeInfo; 6] = [
    TribeInfo {
        name: "Blood Talons",
        renown: Some("glory"),
        shadow_gifts: &["Inspiration", "Rage", "Strength"],
    },
    TribeInfo {
        name: "Bone Shadows",
        renown: Some("wisdom"),
        shadow_gifts: &["Death", "Elemental", "Insight"],
    },
    TribeInfo {
        name: "Hunters in Darkness",
        renown: Some("purity"),
        shadow_gifts: &["Nature", "Stealth", "Warding"],
    },
    TribeInfo {
        name: "Iron Masters",
        renown: Some("cunning"),
        shadow_gifts: &["Knowledge", "Shaping", "Technology"],
    },
    TribeInfo {
        name: "Storm Lords",
        renown: Some("honor"),
        shadow_gifts: &["Evasion", "Dominance", "Weather"],
    },
    TribeInfo {
        name: "Ghost Wolves",
        renown: None,
        shadow_gifts: &[],
    },
];

const RENOWN_LABELS: [(&str, &str); 5] = [
    ("Purity", "purity"),
    ("Glory", "glory"),
    ("Honor", "honor"),
    ("Wisdom", "wisdom"),
    ("Cunning", "cunning"),
];

pub(crate) fn auspice(name: &str) -> Option<&'static AuspiceInfo> {
    AUSPICES.iter().find(|info| info.name == name)
}

pub(crate) fn tribe(name: &str) -> Option<&'static TribeInfo> {
    TRIBES.iter().find(|info| info.name == name)
}

/// The werewolf block, defaulted when absent so read paths stay total.
pub(crate) fn werewolf_traits(character: &Character) -> WerewolfTraits {
    character.werewolf.clone().unwrap_or_default()
}

/// Renown type named in a Facet's trailing parenthetical, so
/// "Crushing Blow (Purity)" reads as purity. Names without a recognized
/// label earn nothing.
pub(crate) fn facet_renown(name: &str) -> Option<&'static str> {
    let inner = name.strip_suffix(')')?;
    let open = inner.rfind('(')?;
    let label = inner[open + 1..].trim();
    RENOWN_LABELS
        .into_iter()
        .find(|(display, _)| *display == label)
        .map(|(_, key)| key)
}

/// Renown type a Moon Gift answers to, keyed on the moon phase in its name.
pub(crate) fn moon_renown(gift: &str) -> Option<&'static str> {
    AUSPICES
        .iter()
        .find(|info| gift.contains(info.moon_gift))
        .map(|info| info.renown)
}

/// Strips a "Gift of " prefix from a Facet's gift field, so
/// "Gift of Knowledge" and plain "Knowledge" compare equal.
pub(crate) fn gift_short_name(gift: &str) -> String {
    let lower = gift.to_ascii_lowercase();
    match lower.find("gift of ") {
        Some(at) => {
            let mut short = String::with_capacity(gift.len());
            short.push_str(&gift[..at]);
            short.push_str(&gift[at + 8..]);
            short.trim().to_string()
        }
        None => gift.trim().to_string(),
    }
}

/// Shadow Gifts the character has affinity for: the auspice pair plus the
/// tribe triple. Ghost Wolves bring none of their own.
pub(crate) fn affinity_gifts(werewolf: &WerewolfTraits) -> HashSet<&'static str> {
    let mut allowed = HashSet::new();
    if let Some(info) = auspice(&werewolf.auspice) {
        allowed.extend(info.shadow_gifts);
    }
    if let Some(info) = tribe(&werewolf.tribe) {
        allowed.extend(info.shadow_gifts);
    }
    allowed
}

pub(crate) struct EligibleFacets<'a> {
    pub shadow: Vec<&'a Item>,
    pub wolf: Vec<&'a Item>,
}

/// Facets the character can legally learn right now: the Renown named in
/// the Facet must be owned at one dot or more, and Shadow Facets must
/// belong to a gift in the affinity set.
pub(crate) fn eligible_facets<'a>(
    character: &Character,
    catalog: &'a Catalog,
) -> EligibleFacets<'a> {
    let werewolf = werewolf_traits(character);
    let allowed = affinity_gifts(&werewolf);

    let earned = |item: &Item| {
        facet_renown(&item.name)
            .map(|key| werewolf.renown.dots(key) >= 1)
            .unwrap_or(false)
    };

    let shadow = catalog
        .facets()
        .filter(|item| item.gift_type() == "shadow")
        .filter(|item| earned(item))
        .filter(|item| allowed.contains(gift_short_name(item.gift()).as_str()))
        .collect();
    let wolf = catalog
        .facets()
        .filter(|item| item.gift_type() == "wolf")
        .filter(|item| earned(item))
        .collect();

    EligibleFacets { shadow, wolf }
}

/// Models sometimes hand back literal "\n" sequences inside long
/// description strings; turn them into real newlines before writing notes.
pub(crate) fn unescape_newlines(text: &str) -> String {
    text.replace("\\n", "\n")
}
