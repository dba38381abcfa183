use crate::catalog::strip_html;
use crate::character::{Character, ItemKind, Splat, all_attributes, all_skills};
use serde_json::{Map, Value, json};

/// Projects the snapshot the model sees as conversation context. Spirits
/// get their own, much smaller sheet.
pub fn sheet_for(character: &Character) -> Value {
    if character.splat == Splat::Spirit {
        spirit_sheet(character)
    } else {
        character_sheet(character)
    }
}

pub fn character_sheet(character: &Character) -> Value {
    let mut attributes = Map::new();
    for (_, key) in all_attributes() {
        attributes.insert(
            key.to_string(),
            json!(character.attributes.get(key).unwrap_or(0)),
        );
    }

    let mut skills = Map::new();
    for (_, key) in all_skills() {
        if let Some(skill) = character.skills.get(key) {
            skills.insert(
                key.to_string(),
                json!({ "value": skill.dots, "specialties": skill.specialties }),
            );
        }
    }

    let merits: Vec<Value> = character
        .items_of(ItemKind::Merit)
        .map(|merit| json!({ "name": merit.name, "rating": merit.rating }))
        .collect();

    let equipment: Vec<Value> = character
        .items_of(ItemKind::Equipment)
        .map(|item| json!({ "name": item.name, "description": item.description }))
        .collect();

    let mut sheet = json!({
        "demographics": {
            "name": character.name,
            "description": character.description,
            "virtue": character.virtue,
            "vice": character.vice,
            "age": character.age,
            "sex": character.sex,
            "aspirations": character.aspirations,
            "notes": character.notes,
        },
        "attributes": attributes,
        "skills": skills,
        "merits": merits,
        "equipment": equipment,
    });

    if let Some(werewolf) = &character.werewolf {
        let gift_facets: Vec<Value> = character
            .items_of(ItemKind::Facet)
            .map(|facet| {
                json!({
                    "name": facet.name,
                    "gift": facet.gift(),
                    "type": facet.gift_type(),
                })
            })
            .collect();
        sheet["werewolf_traits"] = json!(werewolf);
        sheet["gift_facets"] = json!(gift_facets);
        sheet["blood"] = json!(character.virtue);
        sheet["bone"] = json!(character.vice);
    }

    if let Some(mage) = &character.mage {
        let spells: Vec<&crate::character::Item> =
            character.items_of(ItemKind::Spell).collect();
        sheet["mage_traits"] = json!(mage);
        sheet["spells"] = json!(spells);
    }

    sheet
}

pub fn spirit_sheet(character: &Character) -> Value {
    let spirit = character.spirit.clone().unwrap_or_default();

    let mut derived = Map::new();
    for (key, derived_trait) in &character.derived {
        derived.insert(key.clone(), json!(derived_trait.value));
    }

    let influences: Vec<Value> = character
        .items_of(ItemKind::Influence)
        .map(|influence| {
            json!({
                "name": influence.name,
                "rating": influence.rating,
                "description": strip_html(&influence.description),
            })
        })
        .collect();

    let numina: Vec<Value> = character
        .items_of(ItemKind::Numen)
        .map(|numen| json!({ "name": numen.name, "description": strip_html(&numen.description) }))
        .collect();

    let manifestations: Vec<Value> = character
        .items_of(ItemKind::Manifestation)
        .map(|item| json!({ "name": item.name, "description": strip_html(&item.description) }))
        .collect();

    json!({
        "demographics": {
            "name": character.name,
            "description": character.description,
            "virtue": character.virtue,
            "vice": character.vice,
            "ban": spirit.ban,
            "bane": spirit.bane,
            "rankName": spirit.rank_title,
            "aspirations": character.aspirations,
            "notes": character.notes,
        },
        "attributes": {
            "power": spirit.power,
            "finesse": spirit.finesse,
            "resistance": spirit.resistance,
        },
        "derivedTraits": derived,
        "essence": { "value": spirit.essence.value, "max": spirit.essence.max },
        "willpower": { "value": character.willpower.value, "max": character.willpower.max },
        "influences": influences,
        "numina": numina,
        "manifestations": manifestations,
    })
}
