// ../tests/tests.rs
use async_trait::async_trait;
use chronicler::ai::{ChatRequest, ChatResponse};
use chronicler::catalog::{parse_possible_ratings, strip_html};
use chronicler::character::{
    DerivedTrait, GROSS_ARCANA, ProgressEntry, SUBTLE_ARCANA, all_attributes, all_skills,
};
use chronicler::engine::{SYSTEM_FRAMING, run_step};
use chronicler::expr::evaluate_prerequisite;
use chronicler::scope::Scope;
use chronicler::sheet::sheet_for;
use chronicler::steps::{AttributesStep, GenerateSpiritStep, MeritsStep};
use chronicler::store::{ItemPatch, deep_merge};
use chronicler::*;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

fn load_catalog() -> Catalog {
    Catalog::load_from_file("tests/dummy_catalog.json")
        .expect("Failed to read dummy catalog JSON file")
}

fn ok_reply(arguments: &str) -> Result<ChatResponse, EndpointError> {
    Ok(ChatResponse {
        arguments: Some(arguments.to_string()),
    })
}

// Replays a fixed list of completions and records every request it saw.
struct ScriptedEndpoint {
    replies: Mutex<VecDeque<Result<ChatResponse, EndpointError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedEndpoint {
    fn new(replies: Vec<Result<ChatResponse, EndpointError>>) -> Self {
        ScriptedEndpoint {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn answering(arguments: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| ok_reply(arguments)).collect())
    }

    fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ModelEndpoint for ScriptedEndpoint {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, EndpointError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.messages.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("Endpoint called more times than scripted")
    }
}

#[derive(Default)]
struct RecordingConsole {
    events: Mutex<Vec<String>>,
}

impl RecordingConsole {
    fn lines(&self) -> Vec<String> {
        self.events.lock().expect("console lock").clone()
    }
}

impl Console for RecordingConsole {
    fn status(&self, slot: usize, key: &str, status: StepStatus) {
        self.events
            .lock()
            .expect("console lock")
            .push(format!("status {slot} {key} {status}"));
    }

    fn info(&self, message: &str) {
        self.events
            .lock()
            .expect("console lock")
            .push(format!("info {message}"));
    }

    fn warn(&self, message: &str) {
        self.events
            .lock()
            .expect("console lock")
            .push(format!("warn {message}"));
    }

    fn error(&self, message: &str) {
        self.events
            .lock()
            .expect("console lock")
            .push(format!("error {message}"));
    }
}

// Minimal step that accepts only { "ok": true } and applies nothing.
struct EchoStep {
    limit: u32,
}

#[async_trait]
impl GenerationStep for EchoStep {
    fn key(&self) -> StepKey {
        StepKey::Demographics
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        self.limit
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        "Return ok set to true.".to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Echo check".into(),
            parameters: json!({
                "type": "object",
                "properties": { "ok": { "type": "boolean" } },
                "required": ["ok"]
            }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, data: &Value) -> Vec<String> {
        if data.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            Vec::new()
        } else {
            vec!["ok must be true".to_string()]
        }
    }

    async fn apply(
        &self,
        _store: &dyn CharacterStore,
        _catalog: &Catalog,
        _data: &Value,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    fn default_checked(&self, _character: &Character) -> bool {
        true
    }
}

struct FailingApplyStep;

#[async_trait]
impl GenerationStep for FailingApplyStep {
    fn key(&self) -> StepKey {
        StepKey::Demographics
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        2
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        "Return anything.".to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Echo check".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, _data: &Value) -> Vec<String> {
        Vec::new()
    }

    async fn apply(
        &self,
        _store: &dyn CharacterStore,
        _catalog: &Catalog,
        _data: &Value,
    ) -> Result<(), StoreError> {
        Err(StoreError::Update("boom".to_string()))
    }

    fn default_checked(&self, _character: &Character) -> bool {
        true
    }
}

// Accepts anything and records the order in which apply ran.
struct RecorderStep {
    key: StepKey,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl GenerationStep for RecorderStep {
    fn key(&self) -> StepKey {
        self.key
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        1
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        format!("Run {}.", self.key)
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: self.key.to_string(),
            description: "Recorder".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, _data: &Value) -> Vec<String> {
        Vec::new()
    }

    async fn apply(
        &self,
        _store: &dyn CharacterStore,
        _catalog: &Catalog,
        _data: &Value,
    ) -> Result<(), StoreError> {
        self.log.lock().expect("log lock").push(self.key.to_string());
        Ok(())
    }

    fn default_checked(&self, _character: &Character) -> bool {
        true
    }
}

// Spends three experience points per run by writing a ledger entry.
struct SpendStub;

#[async_trait]
impl GenerationStep for SpendStub {
    fn key(&self) -> StepKey {
        StepKey::SpendExperience
    }

    fn maximum_attempts(&self, _character: &Character) -> u32 {
        1
    }

    fn prompt(&self, _character: &Character, _catalog: &Catalog) -> String {
        "Spend experience.".to_string()
    }

    fn tool(&self, _character: &Character, _catalog: &Catalog) -> ToolSchema {
        ToolSchema {
            name: "spend_experience".into(),
            description: "Spend".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    fn validate(&self, _character: &Character, _catalog: &Catalog, _data: &Value) -> Vec<String> {
        Vec::new()
    }

    async fn apply(
        &self,
        store: &dyn CharacterStore,
        _catalog: &Catalog,
        _data: &Value,
    ) -> Result<(), StoreError> {
        let snapshot = store.snapshot().await?;
        let mut progress = snapshot.progress.clone();
        progress.push(ProgressEntry {
            reason: "Bought a dot of Occult".to_string(),
            beats: -15,
            arcane_beats: 0,
        });
        store.update(json!({ "progress": progress })).await
    }

    fn default_checked(&self, character: &Character) -> bool {
        character.experience() > 0
    }
}

// Mortal with enough of a sheet to exercise every scope lookup.
fn practiced_thief() -> Character {
    let mut character = Character::new(Splat::Mortal);
    character.attributes.wits = 3;
    character.skills.larceny.dots = 3;
    character
        .skills
        .larceny
        .specialties
        .push("Pickpocketing".to_string());
    character.items.push(Item {
        name: "Fast Reflexes".to_string(),
        rating: 2,
        ..Item::default()
    });
    character
}

fn attributes_payload(strength: i64) -> String {
    json!({
        "primaryCategory": "Physical",
        "secondaryCategory": "Mental",
        "tertiaryCategory": "Social",
        "Strength": strength,
        "Dexterity": 3,
        "Stamina": 1,
        "Intelligence": 3,
        "Wits": 2,
        "Resolve": 2,
        "Presence": 2,
        "Manipulation": 2,
        "Composure": 2
    })
    .to_string()
}

#[test]
fn test_prerequisite_comparisons_and_arithmetic() {
    let character = practiced_thief();

    assert!(evaluate_prerequisite("wits >= 3", &character));
    assert!(!evaluate_prerequisite("wits > 3", &character));
    assert!(evaluate_prerequisite("wits + larceny >= 6", &character));
    assert!(evaluate_prerequisite("wits + larceny * 2 == 9", &character));
    assert!(evaluate_prerequisite("(wits + larceny) * 2 == 12", &character));
    assert!(evaluate_prerequisite("!(wits < 3)", &character));
    assert!(evaluate_prerequisite("-wits < 0", &character));
    assert!(evaluate_prerequisite("strength < 2 && wits != 2", &character));
}

#[test]
fn test_prerequisite_empty_expression_passes() {
    let character = Character::new(Splat::Mortal);
    assert!(evaluate_prerequisite("", &character));
    assert!(evaluate_prerequisite("   \t ", &character));
}

#[test]
fn test_prerequisite_fails_closed() {
    let character = practiced_thief();

    // Unknown identifiers, syntax errors, assignment, bad call shapes, and
    // a bare string result all evaluate to unmet rather than erroring.
    assert!(!evaluate_prerequisite("garbage >= 1", &character));
    assert!(!evaluate_prerequisite("wits >=", &character));
    assert!(!evaluate_prerequisite("wits = 3", &character));
    assert!(!evaluate_prerequisite("'Mage'", &character));
    assert!(!evaluate_prerequisite("merit(3) > 0", &character));
    assert!(!evaluate_prerequisite("has_specialty('larceny')", &character));
    assert!(!evaluate_prerequisite("wits @ 3", &character));
    assert!(!evaluate_prerequisite("rank('Fast Reflexes') > 0", &character));
}

#[test]
fn test_prerequisite_strict_equality() {
    let character = Character::new(Splat::Mage);

    assert!(evaluate_prerequisite("splat == 'Mage'", &character));
    assert!(!evaluate_prerequisite("splat == 'Werewolf'", &character));
    // Mixed types are unequal, never coerced.
    assert!(!evaluate_prerequisite("splat == 3", &character));
    assert!(evaluate_prerequisite("splat != 3", &character));
    assert!(!evaluate_prerequisite("wits == 'one'", &character));
    assert!(evaluate_prerequisite("wits != 'one'", &character));
}

#[test]
fn test_prerequisite_callables() {
    let character = practiced_thief();

    assert!(evaluate_prerequisite("merit('Fast Reflexes') >= 2", &character));
    assert!(evaluate_prerequisite("merit('Unseen Sense') == 0", &character));
    assert!(evaluate_prerequisite(
        "has_specialty('larceny', 'PICKPOCKETING')",
        &character
    ));
    assert!(!evaluate_prerequisite(
        "has_specialty('larceny', 'safecracking')",
        &character
    ));
    assert!(!evaluate_prerequisite(
        "has_specialty('occult', 'pickpocketing')",
        &character
    ));
}

#[test]
fn test_prerequisite_short_circuits() {
    let character = practiced_thief();

    // The right side would fail closed if it were ever evaluated.
    assert!(evaluate_prerequisite("wits >= 1 || garbage >= 1", &character));
    assert!(!evaluate_prerequisite("wits >= 9 && garbage >= 1", &character));
}

#[test]
fn test_scope_lists_every_trait_for_a_bare_mortal() {
    let character = Character::new(Splat::Mortal);
    let scope = Scope::build(&character);

    for (_, key) in all_attributes() {
        assert_eq!(scope.value(key), Some(1.0), "attribute {key}");
    }
    for (_, key) in all_skills() {
        assert_eq!(scope.value(key), Some(0.0), "skill {key}");
    }
    for key in GROSS_ARCANA.into_iter().chain(SUBTLE_ARCANA) {
        assert_eq!(scope.value(key), Some(0.0), "arcanum {key}");
    }
    for key in [
        "gnosis",
        "wisdom",
        "bloodPotency",
        "humanity",
        "wyrd",
        "mantle",
        "primalUrge",
        "harmony",
        "primum",
        "synergy",
    ] {
        assert_eq!(scope.value(key), Some(0.0), "power stat {key}");
    }

    assert_eq!(scope.value("size"), Some(5.0));
    assert_eq!(scope.value("willpower"), Some(2.0));
    assert_eq!(scope.value("integrity"), Some(7.0));
    assert_eq!(scope.value("mana"), Some(0.0));
    assert_eq!(scope.value("momentum"), None);
    assert_eq!(scope.splat(), "Mortal");
    assert_eq!(scope.merit("Fast Reflexes"), 0.0);
    assert!(!scope.has_specialty("larceny", "pickpocketing"));
}

#[test]
fn test_scope_prefers_final_trait_values() {
    let mut character = Character::new(Splat::Mage);
    character.derived.insert(
        "speed".to_string(),
        DerivedTrait {
            value: 7,
            final_value: Some(12),
        },
    );
    if let Some(mage) = character.mage.as_mut() {
        mage.arcana_gross.forces.dots = 3;
    }

    let scope = Scope::build(&character);
    assert_eq!(scope.value("speed"), Some(12.0));
    assert_eq!(scope.value("forces"), Some(3.0));
    assert_eq!(scope.value("gnosis"), Some(1.0));
}

#[tokio::test]
async fn test_store_update_merges_and_guards_items() {
    let store = MemoryStore::new(Character::new(Splat::Mortal));

    store
        .update(json!({ "attributes": { "wits": 4 }, "name": "Quinn" }))
        .await
        .expect("Failed to apply update");
    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.name, "Quinn");
    assert_eq!(snapshot.attributes.wits, 4);
    assert_eq!(snapshot.attributes.intelligence, 1);

    let error = store
        .update(json!({ "items": [] }))
        .await
        .expect_err("A top-level items patch must be rejected");
    assert!(matches!(error, StoreError::IllegalPatch(_)));

    // Arrays replace wholesale rather than merging.
    store
        .update(json!({ "progress": [ { "reason": "Session one", "beats": 3, "arcane_beats": 0 } ] }))
        .await
        .expect("Failed to apply update");
    store
        .update(json!({ "progress": [ { "reason": "Session two", "beats": 5, "arcane_beats": 0 } ] }))
        .await
        .expect("Failed to apply update");
    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.progress.len(), 1);
    assert_eq!(snapshot.progress[0].reason, "Session two");
}

#[tokio::test]
async fn test_store_item_lifecycle() {
    let store = MemoryStore::new(Character::new(Splat::Mortal));

    let ids = store
        .create_items(vec![
            Item {
                name: "Contacts".to_string(),
                rating: 2,
                ..Item::default()
            },
            Item {
                id: "fixed-id".to_string(),
                name: "Status".to_string(),
                rating: 1,
                ..Item::default()
            },
        ])
        .await
        .expect("Failed to create items");
    assert_eq!(ids.len(), 2);
    assert!(!ids[0].is_empty());
    assert_eq!(ids[1], "fixed-id");

    store
        .update_items(vec![ItemPatch::new(ids[0].clone(), json!({ "rating": 3 }))])
        .await
        .expect("Failed to patch item");
    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(
        snapshot.item(&ids[0]).expect("Expected the patched item").rating,
        3
    );
    assert_eq!(snapshot.merit_rating("Status"), 1);

    let error = store
        .update_items(vec![ItemPatch::new("missing", json!({ "rating": 5 }))])
        .await
        .expect_err("Patching a missing id must error");
    assert!(matches!(error, StoreError::MissingItem(_)));
}

#[test]
fn test_deep_merge_merges_objects_and_replaces_leaves() {
    let mut target = json!({ "a": { "x": 1, "y": 2 }, "list": [1, 2, 3], "keep": true });
    deep_merge(
        &mut target,
        &json!({ "a": { "y": 9, "z": 3 }, "list": [4], "fresh": "yes" }),
    );
    assert_eq!(
        target,
        json!({ "a": { "x": 1, "y": 9, "z": 3 }, "list": [4], "keep": true, "fresh": "yes" })
    );
}

#[test]
fn test_experience_pools_convert_beats() {
    let mut character = Character::new(Splat::Mage);
    assert_eq!(character.experience(), 0);

    character.progress.push(ProgressEntry {
        reason: "Story beats".to_string(),
        beats: 7,
        arcane_beats: 12,
    });
    assert_eq!(character.experience(), 1);
    assert_eq!(character.arcane_experience(), 2);

    character.progress.push(ProgressEntry {
        reason: "Bought a Merit".to_string(),
        beats: -5,
        arcane_beats: 0,
    });
    assert_eq!(character.experience(), 0);

    // A ledger that dips negative never reports negative experience.
    character.progress.push(ProgressEntry {
        reason: "Refund gone wrong".to_string(),
        beats: -9,
        arcane_beats: 0,
    });
    assert_eq!(character.experience(), 0);
    assert_eq!(character.arcane_experience(), 2);
}

#[test]
fn test_catalog_fixture_and_rating_parsing() {
    let catalog = load_catalog();

    let merit = catalog
        .merit_named("Fast Reflexes")
        .expect("Expected Fast Reflexes in the fixture");
    assert_eq!(merit.kind, ItemKind::Merit);
    assert_eq!(parse_possible_ratings(&merit.possible_ratings), vec![1, 2, 3]);
    assert_eq!(catalog.numina().count(), 3);
    assert_eq!(catalog.manifestations().count(), 2);
    assert!(catalog.item("merit-status").is_some());
    assert!(catalog.item("nope").is_none());

    assert_eq!(parse_possible_ratings("3, 1, 2"), vec![1, 2, 3]);
    assert_eq!(parse_possible_ratings("1, two, 3"), vec![1, 3]);
    assert!(parse_possible_ratings("").is_empty());
}

#[test]
fn test_strip_html_removes_tags_only() {
    assert_eq!(
        strip_html("<p>Standing</p> in <em>an</em> organization"),
        "Standing in an organization"
    );
    assert_eq!(strip_html("no tags"), "no tags");
    assert_eq!(strip_html("a < b > c"), "a  c");
    assert_eq!(strip_html("a<>b"), "a<>b");
    assert_eq!(strip_html("dangling < bracket"), "dangling < bracket");
}

#[test]
fn test_settings_roundtrip_through_file() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("settings.json");
    let path = path.to_str().expect("Expected a UTF-8 temp path");

    let settings = Settings {
        endpoint: "http://localhost:8080/v1/chat/completions".to_string(),
        api_key: "secret".to_string(),
        model: "test-model".to_string(),
    };
    settings.save_to_file(path).expect("Failed to save settings");

    let loaded = Settings::load_settings_from_file(path).expect("Failed to load settings");
    assert_eq!(loaded, settings);

    let raw = fs::read_to_string(path).expect("Failed to read settings file");
    assert!(raw.contains("test-model"));
}

#[test]
fn test_logging_writes_to_the_chosen_directory() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    logging::init_at(dir.path().to_path_buf()).expect("Failed to install logger");
    // Repeated init must not fail once a logger is installed.
    logging::init_at(dir.path().to_path_buf()).expect("Failed to re-init logger");

    log::info!("logging smoke marker");

    let raw =
        fs::read_to_string(dir.path().join("log.txt")).expect("Failed to read log file");
    assert!(raw.contains("logging smoke marker"));
    assert!(raw.contains("INFO"));
}

#[test]
fn test_sheet_shape_follows_splat() {
    let mortal = Character::new(Splat::Mortal);
    let sheet = sheet_for(&mortal);
    assert!(sheet.get("attributes").is_some());
    assert!(sheet.get("skills").is_some());
    assert!(sheet.get("mage_traits").is_none());
    assert!(sheet.get("werewolf_traits").is_none());

    let mage = Character::new(Splat::Mage);
    let sheet = sheet_for(&mage);
    assert!(sheet.get("mage_traits").is_some());
    assert!(sheet.get("spells").is_some());

    let spirit = Character::new(Splat::Spirit);
    let sheet = sheet_for(&spirit);
    assert!(sheet.get("essence").is_some());
    assert!(sheet.get("influences").is_some());
    assert!(sheet.get("skills").is_none());
    assert_eq!(sheet["attributes"]["power"], json!(0));
}

#[test]
fn test_merit_fixed_point_admits_dependent_choices() {
    let catalog = load_catalog();
    let mut character = Character::new(Splat::Mortal);
    character.attributes.dexterity = 3;

    // Seizing the Edge depends on Fast Reflexes, listed after it.
    let data = json!({
        "choices": [
            { "meritId": "merit-seizing-the-edge", "rating": 2 },
            { "meritId": "merit-fast-reflexes", "rating": 2 },
            { "meritId": "merit-contacts", "rating": 3 }
        ]
    });
    let errors = MeritsStep.validate(&character, &catalog, &data);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
}

#[test]
fn test_merit_unsatisfiable_prerequisites_are_named() {
    let catalog = load_catalog();
    let character = Character::new(Splat::Mortal);

    let data = json!({
        "choices": [
            { "meritId": "merit-fast-reflexes", "rating": 2 },
            { "meritId": "merit-seizing-the-edge", "rating": 2 },
            { "meritId": "merit-contacts", "rating": 3 }
        ]
    });
    let errors = MeritsStep.validate(&character, &catalog, &data);
    assert_eq!(
        errors,
        vec![
            "The following Merits have prerequisites that are not met: Fast Reflexes, Seizing the Edge"
                .to_string()
        ]
    );
}

#[test]
fn test_merit_budget_duplicates_and_ratings() {
    let catalog = load_catalog();
    let character = Character::new(Splat::Mortal);

    let short = json!({ "choices": [ { "meritId": "merit-contacts", "rating": 5 } ] });
    assert_eq!(
        MeritsStep.validate(&character, &catalog, &short),
        vec!["Total cost must be exactly 7 (current: 5)".to_string()]
    );

    let doubled = json!({
        "choices": [
            { "meritId": "merit-contacts", "rating": 3 },
            { "meritId": "merit-contacts", "rating": 4 }
        ]
    });
    assert_eq!(
        MeritsStep.validate(&character, &catalog, &doubled),
        vec!["Duplicate Merits selected (not allowed)".to_string()]
    );

    let off_menu = json!({
        "choices": [
            { "meritId": "merit-seizing-the-edge", "rating": 3 },
            { "meritId": "merit-contacts", "rating": 4 }
        ]
    });
    let errors = MeritsStep.validate(&character, &catalog, &off_menu);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "Invalid rating 3 for Merit Seizing the Edge");

    let unknown = json!({ "choices": [ { "meritId": "merit-nope", "rating": 7 } ] });
    let errors = MeritsStep.validate(&character, &catalog, &unknown);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "Invalid meritId: merit-nope");
}

#[tokio::test]
async fn test_merits_apply_creates_items_and_raises_power_stat() {
    let catalog = load_catalog();
    let mut character = Character::new(Splat::Mage);
    character.attributes.dexterity = 3;
    let store = MemoryStore::new(character.clone());

    // Mage budget is 10 dots; a power stat increase costs 5 of them.
    let data = json!({
        "choices": [
            { "meritId": "merit-contacts", "rating": 3, "signifier": "police" },
            { "meritId": "merit-fast-reflexes", "rating": 2 }
        ],
        "powerStatIncrease": 1
    });
    let errors = MeritsStep.validate(&character, &catalog, &data);
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");

    MeritsStep
        .apply(&store, &catalog, &data)
        .await
        .expect("Failed to apply merits");

    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert!(snapshot.has_item_named(ItemKind::Merit, "Contacts (police)"));
    assert_eq!(snapshot.merit_rating("Contacts (police)"), 3);
    assert_eq!(snapshot.merit_rating("Fast Reflexes"), 2);
    assert!(snapshot.items.iter().all(|item| !item.id.is_empty()));
    assert_eq!(
        snapshot.mage.as_ref().expect("Expected mage traits").gnosis,
        2
    );
}

#[test]
fn test_attribute_distribution_rules() {
    let character = Character::new(Splat::Mortal);
    let catalog = Catalog::empty();

    let valid: Value =
        serde_json::from_str(&attributes_payload(4)).expect("Fixture payload must parse");
    assert!(AttributesStep.validate(&character, &catalog, &valid).is_empty());

    let short: Value =
        serde_json::from_str(&attributes_payload(3)).expect("Fixture payload must parse");
    assert_eq!(
        AttributesStep.validate(&character, &catalog, &short),
        vec!["Physical must have 5 assigned dots but has 4".to_string()]
    );

    let mut repeated = valid.clone();
    repeated["secondaryCategory"] = json!("Physical");
    let errors = AttributesStep.validate(&character, &catalog, &repeated);
    assert!(errors.contains(&"Each category must be assigned exactly once".to_string()));

    let mut bloated = valid.clone();
    bloated["Strength"] = json!(6);
    let errors = AttributesStep.validate(&character, &catalog, &bloated);
    assert!(errors.contains(&"Strength must be an integer 1-5".to_string()));
}

#[tokio::test]
async fn test_engine_succeeds_on_second_attempt() {
    let rejected = attributes_payload(3);
    let accepted = attributes_payload(4);
    let endpoint = ScriptedEndpoint::new(vec![ok_reply(&rejected), ok_reply(&accepted)]);
    let store = MemoryStore::new(Character::new(Splat::Mortal));

    let outcome = run_step(&AttributesStep, &store, &Catalog::empty(), &endpoint, Vec::new())
        .await
        .expect("Engine failed");

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(
        outcome.final_data,
        Some(serde_json::from_str(&accepted).expect("Fixture payload must parse"))
    );
    assert_eq!(
        outcome.transcript,
        vec![
            ChatMessage::assistant(format!("Attempt 1 of 5: {rejected}")),
            ChatMessage::user(
                "Validation errors (try again): Physical must have 5 assigned dots but has 4"
            ),
            ChatMessage::assistant(format!("Attempt 2 of 5: {accepted}")),
        ]
    );

    // Framing, sheet, and prompt are computed once; only the corrective
    // context grows between attempts.
    let requests = endpoint.seen();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 3);
    assert_eq!(requests[0][0], ChatMessage::system(SYSTEM_FRAMING));
    assert_eq!(requests[1].len(), 5);
    assert_eq!(requests[1][1], requests[0][1]);
    assert_eq!(requests[1][2], requests[0][2]);

    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.attributes.strength, 4);
    assert_eq!(snapshot.attributes.dexterity, 3);
    assert_eq!(snapshot.attributes.intelligence, 3);
    assert_eq!(snapshot.attributes.composure, 2);
}

#[tokio::test]
async fn test_engine_exhausts_attempts_and_leaves_store_untouched() {
    let rejected = attributes_payload(3);
    let endpoint = ScriptedEndpoint::answering(&rejected, 5);
    let store = MemoryStore::new(Character::new(Splat::Mortal));

    let outcome = run_step(&AttributesStep, &store, &Catalog::empty(), &endpoint, Vec::new())
        .await
        .expect("Engine failed");

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 5);
    assert!(outcome.final_data.is_none());
    assert_eq!(outcome.transcript.len(), 10);

    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    for (_, key) in all_attributes() {
        assert_eq!(snapshot.attributes.get(key), Some(1));
    }
}

#[tokio::test]
async fn test_engine_counts_transport_and_garbage_attempts() {
    let endpoint = ScriptedEndpoint::new(vec![
        Err(EndpointError::Status(500)),
        Ok(ChatResponse { arguments: None }),
        ok_reply("not json"),
    ]);
    let store = MemoryStore::new(Character::new(Splat::Mortal));
    let step = EchoStep { limit: 3 };

    let outcome = run_step(&step, &store, &Catalog::empty(), &endpoint, Vec::new())
        .await
        .expect("Engine failed");

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.final_data.is_none());
    assert_eq!(
        outcome.transcript,
        vec![
            ChatMessage::assistant("Error: Network response was not ok (500)"),
            ChatMessage::assistant("Attempt 2 of 3: No content returned."),
            ChatMessage::user("No arguments returned from the LLM. Please try again."),
            ChatMessage::assistant("Attempt 3 of 3: not json"),
            ChatMessage::user("Invalid JSON returned. Please try again."),
        ]
    );
}

#[tokio::test]
async fn test_engine_floors_zero_attempt_budget() {
    let endpoint = ScriptedEndpoint::new(vec![
        Err(EndpointError::Api("overloaded".to_string())),
        Err(EndpointError::Api("overloaded".to_string())),
        Err(EndpointError::Api("overloaded".to_string())),
    ]);
    let store = MemoryStore::new(Character::new(Splat::Mortal));
    let step = EchoStep { limit: 0 };

    let outcome = run_step(&step, &store, &Catalog::empty(), &endpoint, Vec::new())
        .await
        .expect("Engine failed");

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.transcript.len(), 3);
    assert_eq!(
        outcome.transcript[0],
        ChatMessage::assistant("Error: overloaded")
    );
}

#[tokio::test]
async fn test_engine_apply_failure_fails_the_step() {
    let endpoint = ScriptedEndpoint::new(vec![ok_reply(r#"{"ok":true}"#)]);
    let store = MemoryStore::new(Character::new(Splat::Mortal));

    let outcome = run_step(&FailingApplyStep, &store, &Catalog::empty(), &endpoint, Vec::new())
        .await
        .expect("Engine failed");

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.final_data, Some(json!({ "ok": true })));
}

#[tokio::test]
async fn test_engine_keeps_seed_context() {
    let endpoint = ScriptedEndpoint::new(vec![ok_reply(r#"{"ok":true}"#)]);
    let store = MemoryStore::new(Character::new(Splat::Mortal));
    let step = EchoStep { limit: 3 };
    let seed = vec![ChatMessage::user("Lean into the heist angle.")];

    let outcome = run_step(&step, &store, &Catalog::empty(), &endpoint, seed.clone())
        .await
        .expect("Engine failed");

    assert!(outcome.success);
    let requests = endpoint.seen();
    assert_eq!(requests[0].len(), 4);
    assert_eq!(requests[0][3], seed[0]);
    assert_eq!(outcome.transcript[0], seed[0]);
}

#[test]
fn test_canonical_order_per_splat() {
    let order = |splat: Splat| -> String {
        canonical_order(splat)
            .iter()
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    assert_eq!(
        order(Splat::Mage),
        "demographics, attributes, skills, skill_specialties, path_and_order, arcana, \
         resistance_attribute, nimbus, dedicated_magical_tool, rotes, praxes, obsessions, \
         merits, spend_experience"
    );
    assert_eq!(
        order(Splat::Werewolf),
        "demographics, attributes, skills, skill_specialties, auspice_and_tribe, renown, \
         blood_and_bone, uratha_touchstones, gifts, rites, merits, spend_experience"
    );
    assert_eq!(
        order(Splat::Mortal),
        "demographics, attributes, skills, skill_specialties, merits, spend_experience"
    );
    assert_eq!(order(Splat::Spirit), "generate_spirit");
}

#[test]
fn test_default_selection_skips_touched_areas() {
    let registry = standard_registry();

    let fresh = Character::new(Splat::Mage);
    let selection = default_selection(&registry, &fresh);
    assert!(selection.contains(&"attributes".to_string()));
    assert!(selection.contains(&"path_and_order".to_string()));
    assert!(!selection.contains(&"spend_experience".to_string()));
    assert_eq!(selection.len(), canonical_order(Splat::Mage).len() - 1);

    let mut seasoned = Character::new(Splat::Mage);
    seasoned.attributes.wits = 3;
    seasoned.progress.push(ProgressEntry {
        reason: "Session beats".to_string(),
        beats: 25,
        arcane_beats: 0,
    });
    let selection = default_selection(&registry, &seasoned);
    assert!(!selection.contains(&"attributes".to_string()));
    assert!(selection.contains(&"spend_experience".to_string()));
}

#[tokio::test]
async fn test_orchestrator_follows_canonical_order() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut registry = StepRegistry::new();
    for key in [
        StepKey::Demographics,
        StepKey::Attributes,
        StepKey::Skills,
        StepKey::SkillSpecialties,
        StepKey::Merits,
    ] {
        registry.register(Box::new(RecorderStep {
            key,
            log: Arc::clone(&log),
        }));
    }

    let catalog = Catalog::empty();
    let endpoint = ScriptedEndpoint::answering("{}", 4);
    let console = RecordingConsole::default();
    let store = MemoryStore::new(Character::new(Splat::Mortal));
    let orchestrator = Orchestrator::new(&registry, &catalog, &endpoint, &console);

    // Scrambled, with a duplicate and a key nobody registered.
    let selected: Vec<String> = [
        "merits",
        "attributes",
        "demographics",
        "nonsense",
        "skills",
        "attributes",
    ]
    .iter()
    .map(|key| key.to_string())
    .collect();
    let reports = orchestrator.generate(&store, &selected).await;

    assert_eq!(
        log.lock().expect("log lock").clone(),
        vec!["demographics", "attributes", "skills", "merits"]
    );

    assert_eq!(reports.len(), 5);
    assert_eq!(reports[0].key, "nonsense");
    assert!(!reports[0].success);
    assert_eq!(reports[0].attempts, 0);
    let executed: Vec<&str> = reports[1..]
        .iter()
        .map(|report| report.key.as_str())
        .collect();
    assert_eq!(executed, vec!["demographics", "attributes", "skills", "merits"]);
    assert!(
        reports[1..]
            .iter()
            .all(|report| report.success && report.attempts == 1)
    );

    let lines = console.lines();
    assert!(lines.contains(&"warn No step defined for nonsense. Skipping.".to_string()));
    assert!(lines.contains(
        &"info Generating: nonsense, demographics, attributes, skills, merits".to_string()
    ));
}

#[tokio::test]
async fn test_orchestrator_drains_experience_pool() {
    let mut registry = StepRegistry::new();
    registry.register_spend(Splat::Mage, Box::new(SpendStub));

    let mut character = Character::new(Splat::Mage);
    character.progress.push(ProgressEntry {
        reason: "Story award".to_string(),
        beats: 25,
        arcane_beats: 0,
    });
    let store = MemoryStore::new(character);

    let catalog = Catalog::empty();
    let endpoint = ScriptedEndpoint::answering("{}", 2);
    let console = RecordingConsole::default();
    let orchestrator = Orchestrator::new(&registry, &catalog, &endpoint, &console);

    let reports = orchestrator
        .generate(&store, &["spend_experience".to_string()])
        .await;

    // Five points drain in two passes of three, then the queue stops.
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|report| report.success));
    assert!(reports.iter().all(|report| report.key == "spend_experience"));

    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.experience(), 0);
    assert_eq!(snapshot.progress.len(), 3);
}

#[tokio::test]
async fn test_spirit_generation_derives_traits_from_rank() {
    let catalog = load_catalog();
    let mut character = Character::new(Splat::Spirit);
    if let Some(spirit) = character.spirit.as_mut() {
        spirit.rank = 2;
    }
    let store = MemoryStore::new(character);

    let payload = json!({
        "name": "Gnawing Rust",
        "description": "A patient spirit of oxidation and slow decay.",
        "virtue": "Patient",
        "vice": "Covetous",
        "ban": "Cannot cross a line of unrusted iron filings.",
        "bane": "Stainless steel",
        "power": 4,
        "finesse": 3,
        "resistance": 4,
        "influences": [ { "name": "Rust", "rating": 2 } ],
        "numina": ["numen-awe", "numen-blast", "numen-pathfinder"],
        "manifestations": ["manifestation-materialize", "manifestation-fetter"]
    })
    .to_string();
    let endpoint = ScriptedEndpoint::new(vec![ok_reply(&payload)]);

    let outcome = run_step(&GenerateSpiritStep, &store, &catalog, &endpoint, Vec::new())
        .await
        .expect("Engine failed");
    assert!(outcome.success);
    assert_eq!(outcome.attempts, 1);

    let snapshot = store.snapshot().await.expect("Failed to snapshot");
    assert_eq!(snapshot.name, "Gnawing Rust");
    assert_eq!(snapshot.virtue, "Patient");

    let traits = snapshot.spirit.as_ref().expect("Expected spirit traits");
    assert_eq!(traits.rank, 2);
    assert_eq!(traits.power, 4);
    assert_eq!(traits.finesse, 3);
    assert_eq!(traits.resistance, 4);
    assert_eq!(traits.essence.max, 15);
    assert_eq!(traits.rank_title, "Hursah");
    assert_eq!(traits.bane, "Stainless steel");

    // Rank 2 and above defend with the worse of power and finesse.
    assert_eq!(snapshot.derived["defense"].value, 3);
    assert_eq!(snapshot.derived["size"].value, 2);
    assert_eq!(snapshot.derived["health"].value, 6);
    assert_eq!(snapshot.derived["speed"].value, 7);
    assert_eq!(snapshot.derived["initiative"].value, 7);
    assert_eq!(snapshot.willpower.max, 7);

    assert_eq!(snapshot.items_of(ItemKind::Influence).count(), 1);
    assert_eq!(snapshot.items_of(ItemKind::Numen).count(), 3);
    assert_eq!(snapshot.items_of(ItemKind::Manifestation).count(), 2);
    assert!(snapshot.items.iter().all(|item| !item.id.is_empty()));
}
