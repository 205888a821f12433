//! Document text storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use critique_core::DocumentId;

use super::{poisoned, StoreError};

/// Source of extracted document text.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with `DocumentNotFound` for unknown ids.
    async fn get_text(&self, document_id: DocumentId) -> Result<String, StoreError>;
}

/// In-memory document store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Store text under a fresh identifier.
    pub fn insert(&self, text: impl Into<String>) -> Result<DocumentId, StoreError> {
        let id = DocumentId::new();
        self.insert_with_id(id, text)?;
        Ok(id)
    }

    pub fn insert_with_id(&self, id: DocumentId, text: impl Into<String>) -> Result<(), StoreError> {
        self.documents
            .write()
            .map_err(poisoned)?
            .insert(id, text.into());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_text(&self, document_id: DocumentId) -> Result<String, StoreError> {
        self.documents
            .read()
            .map_err(poisoned)?
            .get(&document_id)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(document_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_text_round_trips() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert("Abstract: we study things.").unwrap();
        assert_eq!(store.get_text(id).await.unwrap(), "Abstract: we study things.");
    }

    #[tokio::test]
    async fn unknown_document_fails() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        assert_eq!(
            store.get_text(id).await.unwrap_err(),
            StoreError::DocumentNotFound(id)
        );
    }
}
