use crate::ai::ModelEndpoint;
use crate::catalog::Catalog;
use crate::character::{Character, Splat};
use crate::engine::run_step;
use crate::step::{GenerationStep, StepKey, StepRegistry, StepStatus};
use crate::store::CharacterStore;
use std::collections::VecDeque;
use std::str::FromStr;

/// Status and notification sink. The CLI prints these; tests capture them.
pub trait Console: Send + Sync {
    fn status(&self, slot: usize, key: &str, status: StepStatus);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Outcome of one run slot, in execution order.
#[derive(Debug)]
pub struct StepReport {
    pub key: String,
    pub success: bool,
    pub attempts: u32,
}

/// Hard ceiling on slots per run. Only experience spending re-queues, so
/// this bounds the drain loop when a purchase somehow fails to shrink the
/// pool.
pub const MAX_RUN_SLOTS: usize = 50;

const BASE_STEPS: [StepKey; 4] = [
    StepKey::Demographics,
    StepKey::Attributes,
    StepKey::Skills,
    StepKey::SkillSpecialties,
];

fn splat_steps(splat: Splat) -> &'static [StepKey] {
    match splat {
        Splat::Werewolf => &[
            StepKey::AuspiceAndTribe,
            StepKey::Renown,
            StepKey::BloodAndBone,
            StepKey::UrathaTouchstones,
            StepKey::Gifts,
            StepKey::Rites,
        ],
        Splat::Mage => &[
            StepKey::PathAndOrder,
            StepKey::Arcana,
            StepKey::ResistanceAttribute,
            StepKey::Nimbus,
            StepKey::DedicatedMagicalTool,
            StepKey::Rotes,
            StepKey::Praxes,
            StepKey::Obsessions,
        ],
        Splat::Vampire => &[
            StepKey::MasksAndDirges,
            StepKey::KindredTouchstone,
            StepKey::Disciplines,
        ],
        Splat::Changeling => &[
            StepKey::Mien,
            StepKey::NeedleAndThread,
            StepKey::Touchstone,
            StepKey::Contracts,
        ],
        _ => &[],
    }
}

/// The fixed execution order for a splat: base steps, then the splat's
/// steps in dependency order, then merits, with experience spending last.
/// Spirits run their single all-in-one step instead.
pub fn canonical_order(splat: Splat) -> Vec<StepKey> {
    if splat == Splat::Spirit {
        return vec![StepKey::GenerateSpirit];
    }
    let mut order: Vec<StepKey> = BASE_STEPS.to_vec();
    order.extend_from_slice(splat_steps(splat));
    order.push(StepKey::Merits);
    order.push(StepKey::SpendExperience);
    order
}

/// The steps a fresh run would pre-select: every registered step in
/// canonical order whose area of the character still looks untouched.
pub fn default_selection(registry: &StepRegistry, character: &Character) -> Vec<String> {
    canonical_order(character.splat)
        .into_iter()
        .filter_map(|key| {
            let step = registry.resolve(key, character.splat)?;
            step.default_checked(character).then(|| key.to_string())
        })
        .collect()
}

pub struct Orchestrator<'a> {
    registry: &'a StepRegistry,
    catalog: &'a Catalog,
    endpoint: &'a dyn ModelEndpoint,
    console: &'a dyn Console,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a StepRegistry,
        catalog: &'a Catalog,
        endpoint: &'a dyn ModelEndpoint,
        console: &'a dyn Console,
    ) -> Self {
        Orchestrator {
            registry,
            catalog,
            endpoint,
            console,
        }
    }

    /// Run the selected steps against the store. Selection order does not
    /// matter: execution follows `canonical_order`. Keys that do not parse,
    /// do not belong to the character's splat, or have no registered step
    /// fail their slot without aborting the rest. A successful experience
    /// spend re-queues itself while either pool still holds a point.
    pub async fn generate(
        &self,
        store: &dyn CharacterStore,
        selected: &[String],
    ) -> Vec<StepReport> {
        let mut reports = Vec::new();

        let snapshot = match store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                self.console
                    .error(&format!("Could not read the character: {error}"));
                return reports;
            }
        };
        let splat = snapshot.splat;
        let canonical = canonical_order(splat);

        let mut unknown: Vec<String> = Vec::new();
        let mut wanted: Vec<StepKey> = Vec::new();
        for raw in selected {
            match StepKey::from_str(raw) {
                Ok(key) if canonical.contains(&key) => {
                    if !wanted.contains(&key) {
                        wanted.push(key);
                    }
                }
                _ => {
                    if !unknown.contains(raw) {
                        unknown.push(raw.clone());
                    }
                }
            }
        }

        let mut runnable: Vec<(StepKey, &dyn GenerationStep)> = Vec::new();
        for key in canonical {
            if !wanted.contains(&key) {
                continue;
            }
            match self.registry.resolve(key, splat) {
                Some(step) => runnable.push((key, step)),
                None if key == StepKey::SpendExperience => {
                    // Splats without spending rules skip the stage outright.
                    log::debug!("No experience spending rules for {splat}; skipping.");
                }
                None => unknown.push(key.to_string()),
            }
        }

        let mut next_slot = 0usize;
        for key in &unknown {
            self.console.status(next_slot, key, StepStatus::Queued);
            next_slot += 1;
        }
        let mut queue: VecDeque<(usize, StepKey, &dyn GenerationStep)> = VecDeque::new();
        for (key, step) in runnable {
            self.console
                .status(next_slot, &key.to_string(), StepStatus::Queued);
            queue.push_back((next_slot, key, step));
            next_slot += 1;
        }

        let mut announced: Vec<String> = unknown.clone();
        announced.extend(queue.iter().map(|(_, key, _)| key.to_string()));
        self.console
            .info(&format!("Generating: {}", announced.join(", ")));

        for (slot, key) in unknown.iter().enumerate() {
            self.console
                .warn(&format!("No step defined for {key}. Skipping."));
            self.console.status(slot, key, StepStatus::Failed);
            reports.push(StepReport {
                key: key.clone(),
                success: false,
                attempts: 0,
            });
        }

        while let Some((slot, key, step)) = queue.pop_front() {
            let name = key.to_string();
            self.console.status(slot, &name, StepStatus::Current);

            let outcome = match run_step(step, store, self.catalog, self.endpoint, Vec::new()).await
            {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.console.status(slot, &name, StepStatus::Failed);
                    self.console.error(&format!("Failed {name}: {error}"));
                    reports.push(StepReport {
                        key: name,
                        success: false,
                        attempts: 0,
                    });
                    continue;
                }
            };

            if outcome.success {
                self.console.status(slot, &name, StepStatus::Done);
                self.console.info(&format!(
                    "Generated {name} after {} attempt(s).",
                    outcome.attempts
                ));
            } else {
                self.console.status(slot, &name, StepStatus::Failed);
                self.console.error(&format!(
                    "Failed {name} after {} attempts.",
                    outcome.attempts
                ));
                log::error!("Failed to generate {name}.");
                for message in &outcome.transcript {
                    log::debug!("{name} transcript {:?}: {}", message.role, message.content);
                }
            }

            if key == StepKey::SpendExperience && outcome.success {
                match store.snapshot().await {
                    Ok(current)
                        if current.experience() > 0 || current.arcane_experience() > 0 =>
                    {
                        if next_slot < MAX_RUN_SLOTS {
                            self.console.status(next_slot, &name, StepStatus::Queued);
                            queue.push_back((next_slot, key, step));
                            next_slot += 1;
                        } else {
                            self.console.warn(
                                "Experience remains, but the run hit its slot ceiling; stopping.",
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(error) => {
                        self.console
                            .warn(&format!("Could not re-check experience: {error}"));
                    }
                }
            }

            reports.push(StepReport {
                key: name,
                success: outcome.success,
                attempts: outcome.attempts,
            });
        }

        reports
    }
}
