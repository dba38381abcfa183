use crate::character::{Item, ItemKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

// Read-only collection of world content (merits, facets, rites, spells,
// numina, manifestations) the steps draw their legal choices from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub items: Vec<Item>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Self {
        Catalog { items }
    }

    pub fn empty() -> Self {
        Catalog::default()
    }

    pub fn load_from_file(path: &str) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        let catalog = serde_json::from_str(&data)?;
        Ok(catalog)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn of_kind(&self, kind: ItemKind) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    pub fn merits(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Merit)
    }

    pub fn facets(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Facet)
    }

    pub fn rites(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Rite)
    }

    pub fn spells(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Spell)
    }

    pub fn numina(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Numen)
    }

    pub fn manifestations(&self) -> impl Iterator<Item = &Item> {
        self.of_kind(ItemKind::Manifestation)
    }

    pub fn merit_named(&self, name: &str) -> Option<&Item> {
        self.merits().find(|merit| merit.name == name)
    }
}

/// Parses a "1, 2, 3"-style ratings string into ascending ratings.
/// Unparseable fragments are dropped rather than erroring.
pub fn parse_possible_ratings(raw: &str) -> Vec<i64> {
    let mut ratings: Vec<i64> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect();
    ratings.sort_unstable();
    ratings
}

/// Removes HTML tags from catalog descriptions before they are embedded in
/// prompt text. A tag is '<', at least one non-'>' character, then '>';
/// "<>" and an unclosed '<' pass through untouched.
pub fn strip_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find('<') {
        match rest[open + 1..].find('>') {
            Some(0) | None => {
                out.push_str(&rest[..=open]);
                rest = &rest[open + 1..];
            }
            Some(gap) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + gap + 2..];
            }
        }
    }
    out.push_str(rest);
    out
}
