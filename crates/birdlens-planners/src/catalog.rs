//! Endpoint catalog and ontology text for the planner prompt.

use std::fs;
use std::path::Path;

use thiserror::Error;

const MAX_ENDPOINT_CHARS: usize = 150_000;
const MAX_ONTOLOGY_CHARS: usize = 100_000;

/// Catalog loading errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("endpoint catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// API endpoint specification and domain ontology, pre-rendered for prompt
/// embedding.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    endpoints_spec: String,
    ontology_spec: String,
}

impl PromptCatalog {
    pub fn new(endpoints_spec: impl Into<String>, ontology_spec: impl Into<String>) -> Self {
        Self {
            endpoints_spec: endpoints_spec.into(),
            ontology_spec: ontology_spec.into(),
        }
    }

    /// Load both files, failing on IO or JSON errors.
    pub fn load(endpoints_path: &Path, ontology_path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(endpoints_path)?;
        let parsed: serde_json::Value = serde_json::from_str(&raw)?;
        let endpoints_spec = serde_json::to_string_pretty(&parsed)?;
        let ontology_spec = fs::read_to_string(ontology_path)?;
        Ok(Self {
            endpoints_spec,
            ontology_spec,
        })
    }

    /// Load both files, substituting empty specs for anything unreadable.
    /// The planner still works without a catalog, it just plans blind.
    pub fn load_or_empty(endpoints_path: &Path, ontology_path: &Path) -> Self {
        let endpoints_spec = match fs::read_to_string(endpoints_path)
            .map_err(CatalogError::from)
            .and_then(|raw| {
                let parsed: serde_json::Value = serde_json::from_str(&raw)?;
                Ok(serde_json::to_string_pretty(&parsed)?)
            }) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(
                    path = %endpoints_path.display(),
                    error = %e,
                    "failed to load endpoint catalog"
                );
                "[]".to_string()
            }
        };

        let ontology_spec = match fs::read_to_string(ontology_path) {
            Ok(spec) => spec,
            Err(e) => {
                tracing::warn!(
                    path = %ontology_path.display(),
                    error = %e,
                    "failed to load ontology"
                );
                String::new()
            }
        };

        Self {
            endpoints_spec,
            ontology_spec,
        }
    }

    /// Endpoint spec bounded for prompt embedding.
    pub fn endpoints_for_prompt(&self) -> String {
        truncate_spec(&self.endpoints_spec, MAX_ENDPOINT_CHARS, "endpoint spec")
    }

    /// Ontology text bounded for prompt embedding.
    pub fn ontology_for_prompt(&self) -> String {
        truncate_spec(&self.ontology_spec, MAX_ONTOLOGY_CHARS, "ontology spec")
    }
}

fn truncate_spec(text: &str, max_chars: usize, label: &str) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    tracing::warn!(label, char_count, max_chars, "truncating spec for prompt");
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("\n... (truncated)");
    truncated
}
