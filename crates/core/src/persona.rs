//! Persona configuration records.
//!
//! A persona is a named critique configuration: a system instruction plus a
//! free-form trait map (tone, focus, style...). The trait map is opaque to the
//! orchestrator; it is validated only for presence of keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::PersonaId;

/// Normalize a persona name for lookup and duplicate detection
/// (case-insensitive, surrounding whitespace ignored).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Caller-defined persona metadata (string keys to string values, no schema).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaTraits(BTreeMap<String, String>);

impl PersonaTraits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Blank keys are rejected by [`PersonaTraits::validate`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.0.keys().any(|k| k.trim().is_empty()) {
            return Err(DomainError::validation("persona trait keys must not be blank"));
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for PersonaTraits {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persona record as owned by the persona store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    pub name: String,
    pub description: Option<String>,
    pub traits: PersonaTraits,
    pub system_instruction: String,
    pub is_active: bool,
}

impl Persona {
    /// Create an active persona with a fresh identifier.
    ///
    /// The instruction is not required to be non-blank here: a blank
    /// instruction is a per-task `InvalidPersonaConfig` failure, not a
    /// catalog error.
    pub fn new(name: impl Into<String>, system_instruction: impl Into<String>) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("persona name must not be blank"));
        }
        if name.contains(',') {
            return Err(DomainError::validation(format!(
                "persona name must not contain ',': {name}"
            )));
        }

        Ok(Self {
            id: PersonaId::new(),
            name,
            description: None,
            traits: PersonaTraits::new(),
            system_instruction: system_instruction.into(),
            is_active: true,
        })
    }

    pub fn with_id(mut self, id: PersonaId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_traits(mut self, traits: PersonaTraits) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// Read-only value copy handed to a running job.
    pub fn snapshot(&self) -> PersonaSnapshot {
        PersonaSnapshot {
            id: self.id,
            name: self.name.clone(),
            traits: self.traits.clone(),
            system_instruction: self.system_instruction.clone(),
        }
    }
}

/// Immutable copy of a persona taken at submission time.
///
/// Later edits to the stored persona never reach a job already in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub id: PersonaId,
    pub name: String,
    pub traits: PersonaTraits,
    pub system_instruction: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_and_rejects_blank_names() {
        let p = Persona::new("  CriticalReviewer ", "be critical").unwrap();
        assert_eq!(p.name, "CriticalReviewer");
        assert!(p.is_active);

        assert!(matches!(Persona::new("   ", "x"), Err(DomainError::Validation(_))));
        assert!(matches!(Persona::new("a,b", "x"), Err(DomainError::Validation(_))));
    }

    #[test]
    fn snapshot_is_detached_from_later_edits() {
        let mut p = Persona::new("SupportiveCoach", "be kind")
            .unwrap()
            .with_traits(PersonaTraits::new().with("tone", "warm"));
        let snap = p.snapshot();

        p.system_instruction = "be harsh".to_string();
        p.traits = PersonaTraits::new();

        assert_eq!(snap.system_instruction, "be kind");
        assert_eq!(snap.traits.get("tone"), Some("warm"));
    }

    #[test]
    fn traits_reject_blank_keys() {
        let ok = PersonaTraits::new().with("focus", "methodology");
        assert!(ok.validate().is_ok());

        let bad = PersonaTraits::new().with(" ", "x");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn traits_serialize_as_plain_map() {
        let traits = PersonaTraits::new().with("tone", "blunt");
        let json = serde_json::to_value(&traits).unwrap();
        assert_eq!(json, serde_json::json!({"tone": "blunt"}));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalization_is_idempotent(name in "[ A-Za-z0-9_-]{0,32}") {
                let once = normalize_name(&name);
                prop_assert_eq!(normalize_name(&once), once);
            }

            #[test]
            fn normalization_ignores_case_and_padding(
                name in "[A-Za-z][A-Za-z0-9]{0,20}",
                left in " {0,3}",
                right in " {0,3}",
            ) {
                let padded = format!("{left}{}{right}", name.to_uppercase());
                prop_assert_eq!(normalize_name(&padded), normalize_name(&name));
            }
        }
    }
}
