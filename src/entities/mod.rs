// Product model entities
pub mod assets;
pub mod products;

// Catalog and generated scenario entities
pub mod catalog;
pub mod damage_scenarios;
pub mod generation_runs;
pub mod threat_scenarios;

// Type re-exports
pub use assets::*;
pub use catalog::*;
pub use damage_scenarios::*;
pub use generation_runs::*;
pub use products::*;
pub use threat_scenarios::*;
