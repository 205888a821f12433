//! Orchestration layer: analysis pipeline, collaborator stores, configuration.

pub mod analysis;
pub mod config;
pub mod stores;

pub use analysis::{AnalysisError, AnalysisService};
pub use config::{AnalysisConfig, AppConfig, ConfigError};
