//! Collaborator ports consumed by the analysis core.
//!
//! ## Components
//!
//! - `PersonaStore`: persona lookup by name/id (read-only during a job)
//! - `DocumentStore`: extracted document text by id
//! - `catalog`: YAML persona catalog loader used to seed a persona store

pub mod catalog;
pub mod document_store;
pub mod persona_store;

pub use catalog::{load_personas, parse_personas};
pub use document_store::{DocumentStore, InMemoryDocumentStore};
pub use persona_store::{InMemoryPersonaStore, PersonaStore};

use critique_core::DocumentId;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("persona not found: {0}")]
    PersonaNotFound(String),
    #[error("document not found: {0}")]
    DocumentNotFound(DocumentId),
    #[error("persona catalog error: {0}")]
    Catalog(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub(crate) fn poisoned<T>(_: T) -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}
