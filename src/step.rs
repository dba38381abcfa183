use crate::ai::ToolSchema;
use crate::catalog::Catalog;
use crate::character::{Character, Splat};
use crate::error::StoreError;
use crate::store::CharacterStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

/// Closed set of generation step keys. Selection input is parsed against
/// this set; anything else is an unknown key and fails its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StepKey {
    Demographics,
    Attributes,
    Skills,
    SkillSpecialties,
    Merits,
    AuspiceAndTribe,
    Renown,
    BloodAndBone,
    UrathaTouchstones,
    Gifts,
    Rites,
    MasksAndDirges,
    KindredTouchstone,
    Disciplines,
    PathAndOrder,
    Arcana,
    ResistanceAttribute,
    Nimbus,
    DedicatedMagicalTool,
    Rotes,
    Praxes,
    Obsessions,
    Mien,
    NeedleAndThread,
    Touchstone,
    Contracts,
    SpendExperience,
    GenerateSpirit,
}

/// Lifecycle of one run slot. Strictly forward; a re-queued spend step gets
/// a fresh slot rather than reviving a finished one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    Queued,
    Current,
    Done,
    Failed,
}

/// One generation step: everything the engine needs to prompt the model,
/// check its answer, and commit the result.
///
/// `prompt`, `tool`, and `validate` are read-only against a snapshot; only
/// `apply` writes, and only after `validate` returned no errors.
#[async_trait]
pub trait GenerationStep: Send + Sync {
    fn key(&self) -> StepKey;

    /// Retry budget for this step. The engine floors 0 to 3.
    fn maximum_attempts(&self, character: &Character) -> u32;

    /// Natural-language instructions, with any option data embedded.
    fn prompt(&self, character: &Character, catalog: &Catalog) -> String;

    /// Function-call schema enumerating the currently legal choices.
    fn tool(&self, character: &Character, catalog: &Catalog) -> ToolSchema;

    /// Human-readable rule violations in `data`, empty when valid. These
    /// strings go back to the model verbatim as a correction.
    fn validate(&self, character: &Character, catalog: &Catalog, data: &Value) -> Vec<String>;

    /// Commit validated data to the store. One transaction boundary: an
    /// error here fails the whole step.
    async fn apply(
        &self,
        store: &dyn CharacterStore,
        catalog: &Catalog,
        data: &Value,
    ) -> Result<(), StoreError>;

    /// Whether a default selection should include this step, i.e. whether
    /// the character still looks untouched in this step's area.
    fn default_checked(&self, character: &Character) -> bool;

    fn reasoning_effort(&self, _character: &Character) -> Option<&'static str> {
        None
    }
}

/// Lookup table from step keys to implementations. Experience spending is
/// registered per splat and resolved against the character at run time.
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<StepKey, Box<dyn GenerationStep>>,
    spend: HashMap<Splat, Box<dyn GenerationStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        StepRegistry::default()
    }

    pub fn register(&mut self, step: Box<dyn GenerationStep>) {
        self.steps.insert(step.key(), step);
    }

    pub fn register_spend(&mut self, splat: Splat, step: Box<dyn GenerationStep>) {
        self.spend.insert(splat, step);
    }

    pub fn get(&self, key: StepKey) -> Option<&dyn GenerationStep> {
        self.steps.get(&key).map(Box::as_ref)
    }

    /// The experience-spending rules for `splat`, when that splat has any.
    pub fn spend_variant(&self, splat: Splat) -> Option<&dyn GenerationStep> {
        self.spend.get(&splat).map(Box::as_ref)
    }

    /// Resolve a key the way the orchestrator does: spend_experience goes
    /// through the per-splat table, everything else through the main one.
    pub fn resolve(&self, key: StepKey, splat: Splat) -> Option<&dyn GenerationStep> {
        match key {
            StepKey::SpendExperience => self.spend_variant(splat),
            _ => self.get(key),
        }
    }
}
