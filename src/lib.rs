pub mod ai;
pub mod catalog;
pub mod character;
pub mod engine;
pub mod error;
pub mod expr;
pub mod logging;
pub mod orchestrator;
pub mod scope;
pub mod settings;
pub mod sheet;
pub mod step;
pub mod steps;
pub mod store;

// Re-export commonly used items for easier access
pub use ai::{ChatMessage, HttpEndpoint, ModelEndpoint, ToolSchema};
pub use catalog::Catalog;
pub use character::{Character, Item, ItemKind, Splat};
pub use error::{EndpointError, StoreError};
pub use orchestrator::{Console, Orchestrator, StepReport, canonical_order, default_selection};
pub use settings::Settings;
pub use step::{GenerationStep, StepKey, StepRegistry, StepStatus};
pub use steps::standard_registry;
pub use store::{CharacterStore, MemoryStore};
