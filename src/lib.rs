pub mod config;
pub mod executor;
pub mod harvest;
pub mod html;
pub mod memory;
pub mod model;
pub mod telemetry;
pub mod traits;

// Re-export common types for convenience
pub use config::*;
pub use executor::*;
pub use harvest::*;
pub use memory::InMemoryIndex;
pub use model::*;
pub use traits::*;
