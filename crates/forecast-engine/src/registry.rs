use std::path::{Path, PathBuf};

use forecast_contracts::models::{
    load_model_file, ModelCatalog, ModelVersion, VersionSelection, VersionSelector,
};
use forecast_contracts::workspace::Workspace;
use forecast_contracts::{ScoringError, ScoringResult};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::cache::{validate_model_name, ModelCache};
use crate::loader::{LoadedModel, ModelSource};

/// HTTP model registry.
///
/// `GET {base}/models/{name}` lists versions; the artifact of a version is at
/// `GET {base}/models/{name}/versions/{version}/artifact`.
pub struct RemoteModelRegistry {
    api_base: String,
    token: Option<String>,
    http: HttpClient,
}

impl RemoteModelRegistry {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            token,
            http: HttpClient::new(),
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.http.get(url);
        match self.token.as_deref() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    pub fn catalog(&self, name: &str) -> ScoringResult<ModelCatalog> {
        let url = format!("{}/models/{name}", self.api_base);
        let response = self.get(&url).send().map_err(|err| {
            ScoringError::registry(format!("failed listing model '{name}' ({url}): {err}"))
        })?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ScoringError::not_found(format!(
                "model '{name}' is not registered at {}",
                self.api_base
            )));
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScoringError::registry(format!(
                "listing model '{name}' failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let mut catalog: ModelCatalog = response.json().map_err(|err| {
            ScoringError::registry(format!("invalid catalog for model '{name}': {err}"))
        })?;
        if catalog.name.is_empty() {
            catalog.name = name.to_string();
        }
        Ok(catalog)
    }

    /// Downloads one version into the cache and returns the artifact path.
    ///
    /// The artifact is staged next to the version directories and renamed into
    /// place only after its checksum matched, so a failed download leaves no
    /// file the cache would pick up.
    pub fn download(
        &self,
        name: &str,
        version: &ModelVersion,
        cache: &ModelCache,
    ) -> ScoringResult<PathBuf> {
        let file_name = Path::new(&version.file_name)
            .file_name()
            .map(|value| value.to_os_string())
            .ok_or_else(|| {
                ScoringError::registry(format!(
                    "model '{name}' version {} has invalid file name '{}'",
                    version.version, version.file_name
                ))
            })?;

        let url = format!(
            "{}/models/{name}/versions/{}/artifact",
            self.api_base, version.version
        );
        let response = self.get(&url).send().map_err(|err| {
            ScoringError::registry(format!("failed downloading model artifact ({url}): {err}"))
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScoringError::registry(format!(
                "model artifact download failed ({}): {}",
                status.as_u16(),
                truncate_text(&body, 512)
            )));
        }
        let bytes = response.bytes().map_err(|err| {
            ScoringError::registry(format!("failed reading model artifact ({url}): {err}"))
        })?;

        if let Some(expected) = version.sha256.as_deref() {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(ScoringError::registry(format!(
                    "checksum mismatch for model '{name}' version {}: expected {expected}, got {actual}",
                    version.version
                )));
            }
        }

        let model_dir = cache.model_dir(name);
        std::fs::create_dir_all(&model_dir)?;
        let staging = model_dir.join(format!(".download-{}", Uuid::new_v4()));
        std::fs::write(&staging, &bytes)?;

        let version_dir = cache.version_dir(name, version.version);
        std::fs::create_dir_all(&version_dir)?;
        let target = version_dir.join(file_name);
        if let Err(err) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(err.into());
        }
        Ok(target)
    }
}

/// Batch-path model lookup: local cache first, remote registry on a miss.
pub struct ModelResolver {
    cache: ModelCache,
    remote: Option<RemoteModelRegistry>,
}

impl ModelResolver {
    pub fn new(cache: ModelCache, remote: Option<RemoteModelRegistry>) -> Self {
        Self { cache, remote }
    }

    pub fn from_workspace(workspace: &Workspace) -> Self {
        let remote = workspace
            .registry_url
            .as_deref()
            .map(|url| RemoteModelRegistry::new(url, workspace.registry_token.clone()));
        Self::new(ModelCache::new(&workspace.models_dir), remote)
    }

    /// Returns the artifact path, the selected version and whether it was
    /// downloaded.
    pub fn resolve(
        &self,
        name: &str,
        version: Option<u64>,
    ) -> ScoringResult<(PathBuf, VersionSelection, bool)> {
        validate_model_name(name)?;
        let cache_miss = match self.cache.model_path(name, version) {
            Ok((selection, path)) => return Ok((path, selection, false)),
            Err(ScoringError::NotFound(reason)) => reason,
            Err(err) => return Err(err),
        };

        let Some(remote) = &self.remote else {
            return Err(ScoringError::not_found(format!(
                "{cache_miss}; no model registry configured"
            )));
        };
        let selection = VersionSelector::new(remote.catalog(name)?).select(version)?;
        let path = remote.download(name, &selection.version, &self.cache)?;
        Ok((path, selection, true))
    }
}

impl ModelSource for ModelResolver {
    fn load_model(&self, name: &str, version: Option<u64>) -> ScoringResult<LoadedModel> {
        let (path, selection, downloaded) = self.resolve(name, version)?;
        let handle = load_model_file(&path)?;
        Ok(LoadedModel {
            handle,
            path,
            selection: Some(selection),
            downloaded,
        })
    }
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
