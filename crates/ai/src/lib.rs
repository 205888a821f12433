//! `critique-ai`
//!
//! **Responsibility:** boundary to the external text-generation capability.
//!
//! The orchestrator treats "produce a critique given a persona instruction and
//! a document" as an opaque, possibly slow, possibly failing operation:
//! - `TextGenerator` is the only seam the orchestrator calls through.
//! - `GenerationError` classifies failures into the retry taxonomy.
//! - Concrete providers (`OpenAiGenerator`) and the deterministic
//!   `ScriptedGenerator` used by tests/dev both live here.

pub mod error;
pub mod generator;
pub mod openai;
pub mod scripted;

pub use error::{ErrorKind, GenerationError};
pub use generator::{GenerationRequest, TextGenerator};
pub use openai::{OpenAiConfig, OpenAiGenerator};
pub use scripted::{ScriptStep, ScriptedGenerator};
