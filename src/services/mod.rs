// Service layer modules
pub mod catalog_sync;
pub mod matching;
pub mod scenario_generation;

// Re-exports for convenience
pub use catalog_sync::{CatalogSyncService, SyncOptions, SyncReport};
pub use matching::*;
pub use scenario_generation::{
    GenerationMode, GenerationOptions, GenerationReport, ScenarioGenerationService,
};
