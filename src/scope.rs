use crate::character::{
    Character, GROSS_ARCANA, ItemKind, SUBTLE_ARCANA, all_attributes, all_skills,
};
use std::collections::HashMap;

// Flat variable namespace a prerequisite expression evaluates against.
// Built fresh from a snapshot for every evaluation; construction never
// fails and every missing path lands as a zero.
pub struct Scope<'a> {
    values: HashMap<&'a str, f64>,
    splat: String,
    character: &'a Character,
}

impl<'a> Scope<'a> {
    pub fn build(character: &'a Character) -> Self {
        let mut values: HashMap<&'a str, f64> = HashMap::new();

        for (_, key) in all_attributes() {
            values.insert(key, f64::from(character.attributes.get(key).unwrap_or(0)));
        }
        for (_, key) in all_skills() {
            let dots = character.skills.get(key).map(|skill| skill.dots).unwrap_or(0);
            values.insert(key, f64::from(dots));
        }

        for (key, derived) in &character.derived {
            values.insert(key.as_str(), derived.effective() as f64);
        }

        values.insert("willpower", character.willpower.max as f64);
        values.insert("mana", character.mana.max as f64);
        values.insert("integrity", f64::from(character.integrity));
        values.insert("potency", f64::from(character.potency));

        // Power stats are always present, zero when the trait group is absent.
        let mage = character.mage.as_ref();
        values.insert("gnosis", f64::from(mage.map(|m| m.gnosis).unwrap_or(0)));
        values.insert("wisdom", f64::from(mage.map(|m| m.wisdom).unwrap_or(0)));
        let vampire = character.vampire.as_ref();
        values.insert(
            "bloodPotency",
            f64::from(vampire.map(|v| v.blood_potency).unwrap_or(0)),
        );
        values.insert(
            "humanity",
            f64::from(vampire.map(|v| v.humanity).unwrap_or(0)),
        );
        let changeling = character.changeling.as_ref();
        values.insert("wyrd", f64::from(changeling.map(|c| c.wyrd).unwrap_or(0)));
        values.insert(
            "mantle",
            f64::from(changeling.map(|c| c.mantle).unwrap_or(0)),
        );
        let werewolf = character.werewolf.as_ref();
        values.insert(
            "primalUrge",
            f64::from(werewolf.map(|w| w.primal_urge).unwrap_or(0)),
        );
        values.insert(
            "harmony",
            f64::from(werewolf.map(|w| w.harmony).unwrap_or(0)),
        );
        values.insert(
            "primum",
            f64::from(character.demon.as_ref().map(|d| d.primum).unwrap_or(0)),
        );
        values.insert(
            "synergy",
            f64::from(
                character
                    .sin_eater
                    .as_ref()
                    .map(|s| s.synergy)
                    .unwrap_or(0),
            ),
        );

        // Arcana flatten; zero dots for non-mages.
        for key in GROSS_ARCANA.into_iter().chain(SUBTLE_ARCANA) {
            let dots = mage.and_then(|m| m.arcanum(key)).map(|arcanum| arcanum.dots).unwrap_or(0);
            values.insert(key, f64::from(dots));
        }

        Scope {
            values,
            splat: character.splat.to_string(),
            character,
        }
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn splat(&self) -> &str {
        &self.splat
    }

    /// Rating of the named merit in the snapshot, zero when absent.
    pub fn merit(&self, name: &str) -> f64 {
        self.character
            .items_of(ItemKind::Merit)
            .find(|item| item.name == name)
            .map(|item| item.rating as f64)
            .unwrap_or(0.0)
    }

    /// Case-insensitive membership test against a skill's specialty list.
    pub fn has_specialty(&self, skill: &str, text: &str) -> bool {
        let needle = text.to_lowercase();
        self.character
            .skills
            .get(skill)
            .map(|skill| {
                skill
                    .specialties
                    .iter()
                    .any(|spec| spec.to_lowercase() == needle)
            })
            .unwrap_or(false)
    }
}
