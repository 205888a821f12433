//! Persona resolution: requested names/ids to read-only snapshots.

use std::collections::HashSet;
use std::sync::Arc;

use critique_core::{normalize_name, Persona, PersonaId, PersonaSnapshot};

use super::error::AnalysisError;
use crate::stores::PersonaStore;

/// Maps requested persona identifiers to snapshots, in request order.
#[derive(Clone)]
pub struct PersonaResolver {
    store: Arc<dyn PersonaStore>,
}

enum Requested {
    /// Parses as a persona id; the raw entry is kept for the name fallback.
    Id(PersonaId, String),
    Name(String),
}

impl PersonaResolver {
    pub fn new(store: Arc<dyn PersonaStore>) -> Self {
        Self { store }
    }

    /// Resolve names (or persona ids) to snapshots.
    ///
    /// Rejects an empty selection, duplicates after normalization, unknown
    /// entries and inactive personas. Read-only.
    pub async fn resolve(&self, names: &[String]) -> Result<Vec<PersonaSnapshot>, AnalysisError> {
        if names.is_empty() {
            return Err(AnalysisError::EmptySelection);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in names {
            if !seen.insert(normalize_name(name)) {
                return Err(AnalysisError::DuplicatePersona(name.trim().to_string()));
            }
        }

        let requested: Vec<Requested> = names
            .iter()
            .map(|n| match n.trim().parse::<PersonaId>() {
                Ok(id) => Requested::Id(id, n.trim().to_string()),
                Err(_) => Requested::Name(n.trim().to_string()),
            })
            .collect();

        let by_name: Vec<String> = requested
            .iter()
            .filter_map(|r| match r {
                Requested::Name(n) => Some(n.clone()),
                Requested::Id(..) => None,
            })
            .collect();
        let found = if by_name.is_empty() {
            Vec::new()
        } else {
            self.store.get_by_names(&by_name).await?
        };
        let mut named = found.into_iter();

        let mut personas: Vec<Persona> = Vec::with_capacity(requested.len());
        for entry in requested {
            let persona = match entry {
                Requested::Id(id, raw) => match self.store.get_by_id(id).await? {
                    Some(persona) => persona,
                    // Names may be UUID-shaped too.
                    None => self
                        .store
                        .get_by_names(std::slice::from_ref(&raw))
                        .await?
                        .into_iter()
                        .next()
                        .ok_or(AnalysisError::PersonaNotFound(raw))?,
                },
                Requested::Name(name) => named
                    .next()
                    .ok_or(AnalysisError::PersonaNotFound(name))?,
            };
            personas.push(persona);
        }

        // A name and an id may point at the same record.
        let mut ids = HashSet::with_capacity(personas.len());
        for persona in &personas {
            if !ids.insert(persona.id) {
                return Err(AnalysisError::DuplicatePersona(persona.name.clone()));
            }
            if !persona.is_active {
                return Err(AnalysisError::PersonaInactive(persona.name.clone()));
            }
        }

        Ok(personas.iter().map(Persona::snapshot).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryPersonaStore;

    fn resolver(personas: Vec<Persona>) -> PersonaResolver {
        PersonaResolver::new(Arc::new(InMemoryPersonaStore::from_personas(personas).unwrap()))
    }

    fn persona(name: &str) -> Persona {
        Persona::new(name, format!("You are {name}")).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn resolves_in_request_order() {
        let r = resolver(vec![persona("CriticalReviewer"), persona("SupportiveCoach")]);
        let snaps = r
            .resolve(&names(&["SupportiveCoach", "criticalreviewer"]))
            .await
            .unwrap();
        assert_eq!(snaps[0].name, "SupportiveCoach");
        assert_eq!(snaps[1].name, "CriticalReviewer");
    }

    #[tokio::test]
    async fn empty_and_duplicate_selections_are_rejected() {
        let r = resolver(vec![persona("CriticalReviewer")]);
        assert_eq!(r.resolve(&[]).await, Err(AnalysisError::EmptySelection));
        assert_eq!(
            r.resolve(&names(&["CriticalReviewer", " criticalREVIEWER "])).await,
            Err(AnalysisError::DuplicatePersona("criticalREVIEWER".to_string()))
        );
    }

    #[tokio::test]
    async fn unknown_and_inactive_personas_fail() {
        let r = resolver(vec![persona("CriticalReviewer"), persona("Retired").with_active(false)]);
        assert_eq!(
            r.resolve(&names(&["CriticalReviewer", "Ghost"])).await,
            Err(AnalysisError::PersonaNotFound("Ghost".to_string()))
        );
        assert_eq!(
            r.resolve(&names(&["Retired"])).await,
            Err(AnalysisError::PersonaInactive("Retired".to_string()))
        );
    }

    #[tokio::test]
    async fn ids_are_accepted_alongside_names() {
        let coach = persona("SupportiveCoach");
        let coach_id = coach.id;
        let r = resolver(vec![persona("CriticalReviewer"), coach]);

        let snaps = r
            .resolve(&[coach_id.to_string(), "CriticalReviewer".to_string()])
            .await
            .unwrap();
        assert_eq!(snaps[0].id, coach_id);

        assert_eq!(
            r.resolve(&[coach_id.to_string(), "SupportiveCoach".to_string()]).await,
            Err(AnalysisError::DuplicatePersona("SupportiveCoach".to_string()))
        );
    }

    #[tokio::test]
    async fn uuid_shaped_names_fall_back_to_name_lookup() {
        let name = "0190a5b2-7c3e-7d4f-8a1b-2c3d4e5f6a7b";
        let r = resolver(vec![persona(name)]);

        let snaps = r.resolve(&names(&[name])).await.unwrap();
        assert_eq!(snaps[0].name, name);

        let missing = "0190a5b2-0000-7000-8000-000000000000";
        assert_eq!(
            r.resolve(&names(&[missing])).await,
            Err(AnalysisError::PersonaNotFound(missing.to_string()))
        );
    }
}
