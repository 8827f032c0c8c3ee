pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use engine::{PlacementResult, RelocationSession, Scheduler, SchedulingError};
