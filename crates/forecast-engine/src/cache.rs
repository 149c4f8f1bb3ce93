use std::path::PathBuf;

use forecast_contracts::models::{ModelCatalog, ModelVersion, VersionSelection, VersionSelector};
use forecast_contracts::{ScoringError, ScoringResult};

use crate::loader::resolve_single_file;

/// Local model cache laid out as `<root>/<name>/<version>/<artifact>`.
#[derive(Debug, Clone)]
pub struct ModelCache {
    root: PathBuf,
}

impl ModelCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn version_dir(&self, name: &str, version: u64) -> PathBuf {
        self.model_dir(name).join(version.to_string())
    }

    /// Versions present in the cache. Version directories without a file are
    /// skipped; directories holding several files are an error.
    pub fn catalog(&self, name: &str) -> ScoringResult<ModelCatalog> {
        validate_model_name(name)?;
        let dir = self.model_dir(name);
        if !dir.is_dir() {
            return Ok(ModelCatalog::new(name, Vec::new()));
        }

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(version) = path
                .file_name()
                .and_then(|value| value.to_str())
                .and_then(|value| value.parse::<u64>().ok())
            else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }
            let file = match resolve_single_file(&path) {
                Ok(file) => file,
                Err(ScoringError::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            let file_name = file
                .strip_prefix(&path)
                .map(|relative| relative.to_string_lossy().to_string())
                .unwrap_or_default();
            versions.push(ModelVersion {
                version,
                file_name,
                sha256: None,
            });
        }
        versions.sort_by_key(|item| item.version);
        Ok(ModelCatalog::new(name, versions))
    }

    /// Name-based lookup of a cached artifact path.
    pub fn model_path(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> ScoringResult<(VersionSelection, PathBuf)> {
        let catalog = self.catalog(name)?;
        if catalog.is_empty() {
            return Err(ScoringError::not_found(format!(
                "model '{name}' is not cached under {}",
                self.root.display()
            )));
        }
        let selection = VersionSelector::new(catalog).select(version)?;
        let path = self
            .version_dir(name, selection.version.version)
            .join(&selection.version.file_name);
        Ok((selection, path))
    }
}

pub(crate) fn validate_model_name(name: &str) -> ScoringResult<()> {
    if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ScoringError::not_found(format!("invalid model name '{name}'")));
    }
    Ok(())
}
