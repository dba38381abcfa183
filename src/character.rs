use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

// Attribute and skill tables as (display label, record key) pairs. Tool
// schemas talk to the model in display labels; the record stores keys.
pub const MENTAL_ATTRIBUTES: [(&str, &str); 3] = [
    ("Intelligence", "intelligence"),
    ("Wits", "wits"),
    ("Resolve", "resolve"),
];
pub const PHYSICAL_ATTRIBUTES: [(&str, &str); 3] = [
    ("Strength", "strength"),
    ("Dexterity", "dexterity"),
    ("Stamina", "stamina"),
];
pub const SOCIAL_ATTRIBUTES: [(&str, &str); 3] = [
    ("Presence", "presence"),
    ("Manipulation", "manipulation"),
    ("Composure", "composure"),
];

pub const MENTAL_SKILLS: [(&str, &str); 8] = [
    ("Academics", "academics"),
    ("Computer", "computer"),
    ("Crafts", "crafts"),
    ("Investigation", "investigation"),
    ("Medicine", "medicine"),
    ("Occult", "occult"),
    ("Politics", "politics"),
    ("Science", "science"),
];
pub const PHYSICAL_SKILLS: [(&str, &str); 8] = [
    ("Athletics", "athletics"),
    ("Brawl", "brawl"),
    ("Drive", "drive"),
    ("Firearms", "firearms"),
    ("Larceny", "larceny"),
    ("Stealth", "stealth"),
    ("Survival", "survival"),
    ("Weaponry", "weaponry"),
];
pub const SOCIAL_SKILLS: [(&str, &str); 8] = [
    ("Animal Ken", "animalKen"),
    ("Empathy", "empathy"),
    ("Expression", "expression"),
    ("Intimidation", "intimidation"),
    ("Persuasion", "persuasion"),
    ("Socialize", "socialize"),
    ("Streetwise", "streetwise"),
    ("Subterfuge", "subterfuge"),
];

pub const GROSS_ARCANA: [&str; 5] = ["forces", "life", "matter", "space", "time"];
pub const SUBTLE_ARCANA: [&str; 5] = ["death", "fate", "mind", "prime", "spirit"];
pub const RENOWN_TYPES: [&str; 5] = ["cunning", "glory", "honor", "purity", "wisdom"];

/// Returns every attribute as (label, key).
pub fn all_attributes() -> impl Iterator<Item = (&'static str, &'static str)> {
    MENTAL_ATTRIBUTES
        .into_iter()
        .chain(PHYSICAL_ATTRIBUTES)
        .chain(SOCIAL_ATTRIBUTES)
}

/// Returns every skill as (label, key).
pub fn all_skills() -> impl Iterator<Item = (&'static str, &'static str)> {
    MENTAL_SKILLS
        .into_iter()
        .chain(PHYSICAL_SKILLS)
        .chain(SOCIAL_SKILLS)
}

/// Record key for a skill display label ("Animal Ken" -> "animalKen").
pub fn skill_key(label: &str) -> Option<&'static str> {
    all_skills()
        .find(|(name, _)| *name == label)
        .map(|(_, key)| key)
}

/// Record key for an attribute display label.
pub fn attribute_key(label: &str) -> Option<&'static str> {
    all_attributes()
        .find(|(name, _)| *name == label)
        .map(|(_, key)| key)
}

/// Strips one trailing parenthetical from an item name, so
/// "Status (Ordo Dracul)" and "Status" share a base name.
pub fn base_name(name: &str) -> &str {
    if !name.ends_with(')') {
        return name;
    }
    match name.find('(') {
        Some(open) if open + 1 < name.len() - 1 => name[..open].trim_end(),
        _ => name,
    }
}

// Character templates ("splats") the generator knows about.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum Splat {
    Mortal,
    Mage,
    Vampire,
    Werewolf,
    Changeling,
    Demon,
    #[serde(rename = "Sin-Eater")]
    #[strum(serialize = "Sin-Eater")]
    SinEater,
    Spirit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub intelligence: u8,
    pub wits: u8,
    pub resolve: u8,
    pub strength: u8,
    pub dexterity: u8,
    pub stamina: u8,
    pub presence: u8,
    pub manipulation: u8,
    pub composure: u8,
}

impl Default for Attributes {
    fn default() -> Self {
        // Every attribute starts at one dot.
        Attributes {
            intelligence: 1,
            wits: 1,
            resolve: 1,
            strength: 1,
            dexterity: 1,
            stamina: 1,
            presence: 1,
            manipulation: 1,
            composure: 1,
        }
    }
}

impl Attributes {
    pub fn get(&self, key: &str) -> Option<u8> {
        match key {
            "intelligence" => Some(self.intelligence),
            "wits" => Some(self.wits),
            "resolve" => Some(self.resolve),
            "strength" => Some(self.strength),
            "dexterity" => Some(self.dexterity),
            "stamina" => Some(self.stamina),
            "presence" => Some(self.presence),
            "manipulation" => Some(self.manipulation),
            "composure" => Some(self.composure),
            _ => None,
        }
    }

    pub fn total(&self) -> u32 {
        all_attributes()
            .filter_map(|(_, key)| self.get(key))
            .map(u32::from)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Skill {
    pub dots: u8,
    pub specialties: Vec<String>,
    pub rote: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Skills {
    pub academics: Skill,
    pub computer: Skill,
    pub crafts: Skill,
    pub investigation: Skill,
    pub medicine: Skill,
    pub occult: Skill,
    pub politics: Skill,
    pub science: Skill,
    pub athletics: Skill,
    pub brawl: Skill,
    pub drive: Skill,
    pub firearms: Skill,
    pub larceny: Skill,
    pub stealth: Skill,
    pub survival: Skill,
    pub weaponry: Skill,
    #[serde(rename = "animalKen")]
    pub animal_ken: Skill,
    pub empathy: Skill,
    pub expression: Skill,
    pub intimidation: Skill,
    pub persuasion: Skill,
    pub socialize: Skill,
    pub streetwise: Skill,
    pub subterfuge: Skill,
}

impl Skills {
    pub fn get(&self, key: &str) -> Option<&Skill> {
        match key {
            "academics" => Some(&self.academics),
            "computer" => Some(&self.computer),
            "crafts" => Some(&self.crafts),
            "investigation" => Some(&self.investigation),
            "medicine" => Some(&self.medicine),
            "occult" => Some(&self.occult),
            "politics" => Some(&self.politics),
            "science" => Some(&self.science),
            "athletics" => Some(&self.athletics),
            "brawl" => Some(&self.brawl),
            "drive" => Some(&self.drive),
            "firearms" => Some(&self.firearms),
            "larceny" => Some(&self.larceny),
            "stealth" => Some(&self.stealth),
            "survival" => Some(&self.survival),
            "weaponry" => Some(&self.weaponry),
            "animalKen" => Some(&self.animal_ken),
            "empathy" => Some(&self.empathy),
            "expression" => Some(&self.expression),
            "intimidation" => Some(&self.intimidation),
            "persuasion" => Some(&self.persuasion),
            "socialize" => Some(&self.socialize),
            "streetwise" => Some(&self.streetwise),
            "subterfuge" => Some(&self.subterfuge),
            _ => None,
        }
    }

    pub fn total(&self) -> u32 {
        all_skills()
            .filter_map(|(_, key)| self.get(key))
            .map(|skill| u32::from(skill.dots))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DerivedTrait {
    pub value: i64,
    #[serde(rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_value: Option<i64>,
}

impl DerivedTrait {
    pub fn new(value: i64) -> Self {
        DerivedTrait {
            value,
            final_value: None,
        }
    }

    // Prerequisites read the adjusted value where one exists.
    pub fn effective(&self) -> i64 {
        self.final_value.unwrap_or(self.value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Pool {
    pub value: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Arcanum {
    pub dots: u8,
    pub ruling: bool,
    pub inferior: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MageTraits {
    pub gnosis: u8,
    pub wisdom: u8,
    pub path: String,
    pub order: String,
    pub obsessions: String,
    pub nimbus: String,
    pub arcana_gross: ArcanaGross,
    pub arcana_subtle: ArcanaSubtle,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArcanaGross {
    pub forces: Arcanum,
    pub life: Arcanum,
    pub matter: Arcanum,
    pub space: Arcanum,
    pub time: Arcanum,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArcanaSubtle {
    pub death: Arcanum,
    pub fate: Arcanum,
    pub mind: Arcanum,
    pub prime: Arcanum,
    pub spirit: Arcanum,
}

impl MageTraits {
    pub fn arcanum(&self, key: &str) -> Option<&Arcanum> {
        match key {
            "forces" => Some(&self.arcana_gross.forces),
            "life" => Some(&self.arcana_gross.life),
            "matter" => Some(&self.arcana_gross.matter),
            "space" => Some(&self.arcana_gross.space),
            "time" => Some(&self.arcana_gross.time),
            "death" => Some(&self.arcana_subtle.death),
            "fate" => Some(&self.arcana_subtle.fate),
            "mind" => Some(&self.arcana_subtle.mind),
            "prime" => Some(&self.arcana_subtle.prime),
            "spirit" => Some(&self.arcana_subtle.spirit),
            _ => None,
        }
    }

    pub fn arcana(&self) -> impl Iterator<Item = (&'static str, &Arcanum)> {
        GROSS_ARCANA
            .into_iter()
            .chain(SUBTLE_ARCANA)
            .filter_map(|key| self.arcanum(key).map(|arcanum| (key, arcanum)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RenownTrack {
    pub dots: u8,
    pub auspice: bool,
    pub tribe: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Renown {
    pub cunning: RenownTrack,
    pub glory: RenownTrack,
    pub honor: RenownTrack,
    pub purity: RenownTrack,
    pub wisdom: RenownTrack,
}

impl Renown {
    pub fn get(&self, key: &str) -> Option<&RenownTrack> {
        match key {
            "cunning" => Some(&self.cunning),
            "glory" => Some(&self.glory),
            "honor" => Some(&self.honor),
            "purity" => Some(&self.purity),
            "wisdom" => Some(&self.wisdom),
            _ => None,
        }
    }

    pub fn dots(&self, key: &str) -> u8 {
        self.get(key).map(|track| track.dots).unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        RENOWN_TYPES
            .into_iter()
            .map(|key| u32::from(self.dots(key)))
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WerewolfTraits {
    pub primal_urge: u8,
    pub harmony: u8,
    pub auspice: String,
    pub tribe: String,
    pub hunters_aspect: String,
    pub renown: Renown,
    pub touchstone_flesh: String,
    pub touchstone_spirit: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VampireTraits {
    pub blood_potency: u8,
    pub humanity: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChangelingTraits {
    pub wyrd: u8,
    pub mantle: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DemonTraits {
    pub primum: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SinEaterTraits {
    pub synergy: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpiritTraits {
    pub rank: u8,
    pub power: u8,
    pub finesse: u8,
    pub resistance: u8,
    pub essence: Pool,
    pub rank_title: String,
    pub ban: String,
    pub bane: String,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    Merit,
    Facet,
    Rite,
    Spell,
    Equipment,
    Numen,
    Manifestation,
    Influence,
}

// Embedded record on a character or entry in the content catalog. The
// kind-specific fields live in `data` (gift/giftType/level for facets,
// arcanum/level/roteSkills/isRote/isPraxis for spells, and so on).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub name: String,
    pub rating: i64,
    pub prerequisites: String,
    pub possible_ratings: String,
    pub description: String,
    pub data: Value,
}

impl Default for Item {
    fn default() -> Self {
        Item {
            id: String::new(),
            kind: ItemKind::Merit,
            name: String::new(),
            rating: 0,
            prerequisites: String::new(),
            possible_ratings: String::new(),
            description: String::new(),
            data: Value::Null,
        }
    }
}

impl Item {
    fn data_str(&self, key: &str) -> &str {
        self.data[key].as_str().unwrap_or_default()
    }

    fn data_i64(&self, key: &str) -> i64 {
        self.data[key].as_i64().unwrap_or_default()
    }

    fn data_bool(&self, key: &str) -> bool {
        self.data[key].as_bool().unwrap_or_default()
    }

    pub fn gift(&self) -> &str {
        self.data_str("gift")
    }

    pub fn gift_type(&self) -> &str {
        self.data_str("giftType")
    }

    pub fn facet_level(&self) -> i64 {
        self.data_i64("level")
    }

    pub fn arcanum(&self) -> &str {
        self.data_str("arcanum")
    }

    pub fn spell_level(&self) -> i64 {
        self.data_i64("level")
    }

    pub fn rote_skills(&self) -> Vec<String> {
        self.data["roteSkills"]
            .as_array()
            .map(|skills| {
                skills
                    .iter()
                    .filter_map(|skill| skill.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_rote(&self) -> bool {
        self.data_bool("isRote")
    }

    pub fn is_praxis(&self) -> bool {
        self.data_bool("isPraxis")
    }
}

// One line of the experience ledger. Spending writes negative beats.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProgressEntry {
    pub reason: String,
    pub beats: i64,
    pub arcane_beats: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Character {
    pub name: String,
    pub splat: Splat,
    pub age: u32,
    pub sex: String,
    pub virtue: String,
    pub vice: String,
    pub description: String,
    pub notes: String,
    pub aspirations: String,
    pub attributes: Attributes,
    pub skills: Skills,
    pub derived: BTreeMap<String, DerivedTrait>,
    pub willpower: Pool,
    pub mana: Pool,
    pub integrity: u8,
    pub potency: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mage: Option<MageTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub werewolf: Option<WerewolfTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vampire: Option<VampireTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changeling: Option<ChangelingTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demon: Option<DemonTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sin_eater: Option<SinEaterTraits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spirit: Option<SpiritTraits>,
    pub items: Vec<Item>,
    pub progress: Vec<ProgressEntry>,
}

impl Default for Character {
    fn default() -> Self {
        Character::new(Splat::Mortal)
    }
}

impl Character {
    pub fn new(splat: Splat) -> Self {
        let mut derived = BTreeMap::new();
        derived.insert("size".to_string(), DerivedTrait::new(5));
        derived.insert("speed".to_string(), DerivedTrait::new(7));
        derived.insert("defense".to_string(), DerivedTrait::new(1));
        derived.insert("initiative".to_string(), DerivedTrait::new(2));
        derived.insert("perception".to_string(), DerivedTrait::new(2));
        derived.insert("health".to_string(), DerivedTrait::new(6));

        let mut character = Character {
            name: String::new(),
            splat,
            age: 0,
            sex: String::new(),
            virtue: String::new(),
            vice: String::new(),
            description: String::new(),
            notes: String::new(),
            aspirations: String::new(),
            attributes: Attributes::default(),
            skills: Skills::default(),
            derived,
            willpower: Pool { value: 2, max: 2 },
            mana: Pool::default(),
            integrity: 7,
            potency: 0,
            mage: None,
            werewolf: None,
            vampire: None,
            changeling: None,
            demon: None,
            sin_eater: None,
            spirit: None,
            items: Vec::new(),
            progress: Vec::new(),
        };

        match splat {
            Splat::Mage => {
                character.mage = Some(MageTraits {
                    gnosis: 1,
                    wisdom: 7,
                    ..MageTraits::default()
                });
                character.mana = Pool { value: 10, max: 10 };
            }
            Splat::Werewolf => {
                character.werewolf = Some(WerewolfTraits {
                    primal_urge: 1,
                    harmony: 7,
                    ..WerewolfTraits::default()
                });
            }
            Splat::Vampire => {
                character.vampire = Some(VampireTraits {
                    blood_potency: 1,
                    humanity: 7,
                });
            }
            Splat::Changeling => {
                character.changeling = Some(ChangelingTraits { wyrd: 1, mantle: 0 });
            }
            Splat::Demon => {
                character.demon = Some(DemonTraits { primum: 1 });
            }
            Splat::SinEater => {
                character.sin_eater = Some(SinEaterTraits { synergy: 1 });
            }
            Splat::Spirit => {
                character.spirit = Some(SpiritTraits::default());
            }
            Splat::Mortal => {}
        }

        character
    }

    /// General experience: five beats buy one point.
    pub fn experience(&self) -> i64 {
        let beats: i64 = self.progress.iter().map(|entry| entry.beats).sum();
        beats.div_euclid(5).max(0)
    }

    /// Arcane experience (Mage only in practice; zero elsewhere).
    pub fn arcane_experience(&self) -> i64 {
        let beats: i64 = self.progress.iter().map(|entry| entry.arcane_beats).sum();
        beats.div_euclid(5).max(0)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn items_of(&self, kind: ItemKind) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    pub fn has_item_named(&self, kind: ItemKind, name: &str) -> bool {
        self.items_of(kind).any(|item| item.name == name)
    }

    /// Rating of the named merit, zero when the character does not own it.
    pub fn merit_rating(&self, name: &str) -> i64 {
        self.items_of(ItemKind::Merit)
            .find(|item| item.name == name)
            .map(|item| item.rating)
            .unwrap_or(0)
    }

    /// Current value of the splat's power stat, if the splat has one.
    pub fn power_stat(&self) -> Option<u8> {
        match self.splat {
            Splat::Mage => self.mage.as_ref().map(|mage| mage.gnosis),
            Splat::Vampire => self.vampire.as_ref().map(|vampire| vampire.blood_potency),
            Splat::Werewolf => self
                .werewolf
                .as_ref()
                .map(|werewolf| werewolf.primal_urge),
            Splat::Changeling => self
                .changeling
                .as_ref()
                .map(|changeling| changeling.wyrd),
            Splat::Demon => self.demon.as_ref().map(|demon| demon.primum),
            Splat::SinEater => self.sin_eater.as_ref().map(|sin_eater| sin_eater.synergy),
            Splat::Mortal | Splat::Spirit => None,
        }
    }

    /// Store patch raising the splat's power stat to `value`.
    pub fn power_stat_patch(&self, value: u8) -> Option<Value> {
        match self.splat {
            Splat::Mage => Some(json!({ "mage": { "gnosis": value } })),
            Splat::Vampire => Some(json!({ "vampire": { "blood_potency": value } })),
            Splat::Werewolf => Some(json!({ "werewolf": { "primal_urge": value } })),
            Splat::Changeling => Some(json!({ "changeling": { "wyrd": value } })),
            Splat::Demon => Some(json!({ "demon": { "primum": value } })),
            Splat::SinEater => Some(json!({ "sin_eater": { "synergy": value } })),
            Splat::Mortal | Splat::Spirit => None,
        }
    }
}
