use super::registry::{ModelCatalog, ModelVersion};
use crate::error::{ScoringError, ScoringResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSelection {
    pub model: String,
    pub version: ModelVersion,
    pub requested: Option<u64>,
    pub fallback_reason: Option<String>,
}

/// Picks one version out of a catalog.
///
/// A pinned version must exist. Without a pin the highest version number wins,
/// so a registry holding several versions never leaves the choice implicit.
#[derive(Debug, Clone)]
pub struct VersionSelector {
    pub catalog: ModelCatalog,
}

impl VersionSelector {
    pub fn new(catalog: ModelCatalog) -> Self {
        Self { catalog }
    }

    pub fn select(&self, requested: Option<u64>) -> ScoringResult<VersionSelection> {
        let name = self.catalog.name.clone();
        if let Some(requested_version) = requested {
            let Some(version) = self.catalog.get(requested_version).cloned() else {
                return Err(ScoringError::not_found(format!(
                    "model '{name}' has no version {requested_version}"
                )));
            };
            return Ok(VersionSelection {
                model: name,
                version,
                requested,
                fallback_reason: None,
            });
        }

        let Some(version) = self.catalog.latest().cloned() else {
            return Err(ScoringError::not_found(format!(
                "model '{name}' has no registered versions"
            )));
        };
        let fallback_reason = (self.catalog.versions.len() > 1).then(|| {
            format!(
                "No version specified; using latest of {} versions.",
                self.catalog.versions.len()
            )
        });
        Ok(VersionSelection {
            model: name,
            version,
            requested: None,
            fallback_reason,
        })
    }
}
