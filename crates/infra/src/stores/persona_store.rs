//! Persona storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use critique_core::{normalize_name, Persona, PersonaId};

use super::{poisoned, StoreError};

/// Persona store abstraction.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Look up personas by name (case-insensitive), in the order given.
    ///
    /// Fails with `PersonaNotFound` naming the first unknown entry.
    async fn get_by_names(&self, names: &[String]) -> Result<Vec<Persona>, StoreError>;

    /// Look up a persona by identifier.
    async fn get_by_id(&self, id: PersonaId) -> Result<Option<Persona>, StoreError>;

    /// All personas, sorted by name.
    async fn list(&self) -> Result<Vec<Persona>, StoreError>;

    /// Insert or replace a persona (keyed by normalized name).
    async fn upsert(&self, persona: Persona) -> Result<(), StoreError>;
}

/// In-memory persona store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPersonaStore {
    by_name: RwLock<HashMap<String, Persona>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Build a store from a persona list; duplicate normalized names are rejected.
    pub fn from_personas(personas: Vec<Persona>) -> Result<Self, StoreError> {
        let mut by_name = HashMap::with_capacity(personas.len());
        for persona in personas {
            let key = persona.normalized_name();
            if by_name.contains_key(&key) {
                return Err(StoreError::Catalog(format!(
                    "duplicate persona name: {}",
                    persona.name
                )));
            }
            by_name.insert(key, persona);
        }
        Ok(Self {
            by_name: RwLock::new(by_name),
        })
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn get_by_names(&self, names: &[String]) -> Result<Vec<Persona>, StoreError> {
        let by_name = self.by_name.read().map_err(poisoned)?;
        names
            .iter()
            .map(|name| {
                by_name
                    .get(&normalize_name(name))
                    .cloned()
                    .ok_or_else(|| StoreError::PersonaNotFound(name.trim().to_string()))
            })
            .collect()
    }

    async fn get_by_id(&self, id: PersonaId) -> Result<Option<Persona>, StoreError> {
        let by_name = self.by_name.read().map_err(poisoned)?;
        Ok(by_name.values().find(|p| p.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Persona>, StoreError> {
        let by_name = self.by_name.read().map_err(poisoned)?;
        let mut all: Vec<Persona> = by_name.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn upsert(&self, persona: Persona) -> Result<(), StoreError> {
        let mut by_name = self.by_name.write().map_err(poisoned)?;
        by_name.insert(persona.normalized_name(), persona);
        Ok(())
    }
}
