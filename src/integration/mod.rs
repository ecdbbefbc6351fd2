//! Application assembly: configuration, component wiring and the live voice bridge

pub mod config;
pub mod live;
pub mod orchestrator;

pub use config::{AppConfig, StorageConfig};
pub use live::{LiveConversation, LiveEvent};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
