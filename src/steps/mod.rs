//! Step implementations, grouped by splat. `standard_registry` wires up
//! everything the generator ships with.

mod attributes;
mod demographics;
pub mod mage;
mod merits;
mod skills;
mod specialties;
mod spend;
mod spirit;
pub mod werewolf;

pub use attributes::AttributesStep;
pub use demographics::DemographicsStep;
pub use mage::{
    ArcanaStep, DedicatedMagicalToolStep, NimbusStep, ObsessionsStep, PathAndOrderStep, PraxesStep,
    ResistanceAttributeStep, RotesStep,
};
pub use merits::MeritsStep;
pub use skills::SkillsStep;
pub use specialties::SkillSpecialtiesStep;
pub use spend::{SpendMageStep, SpendWerewolfStep};
pub use spirit::GenerateSpiritStep;
pub use werewolf::{
    AuspiceAndTribeStep, BloodAndBoneStep, GiftsStep, RenownStep, RitesStep, UrathaTouchstonesStep,
};

use crate::character::Splat;
use crate::step::StepRegistry;

/// Every step the generator ships with. Vampire and Changeling slots in the
/// canonical order have no implementations yet and fail as unknown keys.
pub fn standard_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();

    registry.register(Box::new(DemographicsStep));
    registry.register(Box::new(AttributesStep));
    registry.register(Box::new(SkillsStep));
    registry.register(Box::new(SkillSpecialtiesStep));
    registry.register(Box::new(MeritsStep));

    registry.register(Box::new(AuspiceAndTribeStep));
    registry.register(Box::new(RenownStep));
    registry.register(Box::new(BloodAndBoneStep));
    registry.register(Box::new(UrathaTouchstonesStep));
    registry.register(Box::new(GiftsStep));
    registry.register(Box::new(RitesStep));

    registry.register(Box::new(PathAndOrderStep));
    registry.register(Box::new(ArcanaStep));
    registry.register(Box::new(ResistanceAttributeStep));
    registry.register(Box::new(NimbusStep));
    registry.register(Box::new(DedicatedMagicalToolStep));
    registry.register(Box::new(RotesStep));
    registry.register(Box::new(PraxesStep));
    registry.register(Box::new(ObsessionsStep));

    registry.register(Box::new(GenerateSpiritStep));

    registry.register_spend(Splat::Werewolf, Box::new(SpendWerewolfStep));
    registry.register_spend(Splat::Mage, Box::new(SpendMageStep));

    registry
}
