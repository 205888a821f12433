//! YAML persona catalog.
//!
//! The catalog is a list of entries:
//!
//! ```yaml
//! - name: CriticalReviewer
//!   description: Finds weaknesses in methodology
//!   personality_traits: { tone: blunt, focus: methodology }
//!   system_prompt: You are a demanding peer reviewer...
//! ```
//!
//! `system_instruction` and `traits` are accepted as aliases. Trait values may
//! be any YAML scalar; they are stored as strings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use critique_core::{Persona, PersonaTraits};

use super::StoreError;

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "traits")]
    personality_traits: BTreeMap<String, serde_yaml::Value>,
    #[serde(alias = "system_instruction")]
    system_prompt: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Parse a catalog document into personas, rejecting duplicate normalized names.
pub fn parse_personas(yaml: &str) -> Result<Vec<Persona>, StoreError> {
    let entries: Vec<CatalogEntry> =
        serde_yaml::from_str(yaml).map_err(|e| StoreError::Catalog(e.to_string()))?;

    let mut seen = std::collections::HashSet::new();
    let mut personas = Vec::with_capacity(entries.len());
    for entry in entries {
        let traits = entry
            .personality_traits
            .into_iter()
            .map(|(k, v)| Ok((k, scalar_to_string(v)?)))
            .collect::<Result<PersonaTraits, StoreError>>()?;

        let mut persona = Persona::new(entry.name, entry.system_prompt)
            .map_err(|e| StoreError::Catalog(e.to_string()))?
            .with_traits(traits)
            .with_active(entry.is_active);
        if let Some(description) = entry.description {
            persona = persona.with_description(description);
        }
        persona
            .traits
            .validate()
            .map_err(|e| StoreError::Catalog(e.to_string()))?;

        if !seen.insert(persona.normalized_name()) {
            return Err(StoreError::Catalog(format!(
                "duplicate persona name: {}",
                persona.name
            )));
        }
        personas.push(persona);
    }
    Ok(personas)
}

/// Read and parse a catalog file.
pub fn load_personas(path: impl AsRef<Path>) -> Result<Vec<Persona>, StoreError> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Catalog(format!("{}: {e}", path.display())))?;
    parse_personas(&yaml)
}

fn scalar_to_string(value: serde_yaml::Value) -> Result<String, StoreError> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(StoreError::Catalog(format!(
            "persona trait values must be scalars, got {other:?}"
        ))),
    }
}
