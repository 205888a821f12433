//! `critique-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no IO, no async): typed
//! identifiers, the domain error model, and persona configuration records.

pub mod error;
pub mod id;
pub mod persona;

pub use error::{DomainError, DomainResult};
pub use id::{DocumentId, JobId, PersonaId, TaskId};
pub use persona::{normalize_name, Persona, PersonaSnapshot, PersonaTraits};
