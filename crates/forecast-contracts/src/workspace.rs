use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKSPACE_FILE: &str = "workspace.json";
pub const REGISTRY_URL_ENV: &str = "FORECAST_REGISTRY_URL";
pub const REGISTRY_TOKEN_ENV: &str = "FORECAST_REGISTRY_TOKEN";

/// Where a batch job finds datasets and models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,
    /// Local model cache, laid out as `<name>/<version>/<artifact>`.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default)]
    pub registry_url: Option<String>,
    /// Only ever read from the environment.
    #[serde(skip)]
    pub registry_token: Option<String>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            name: default_name(),
            datasets_dir: default_datasets_dir(),
            models_dir: default_models_dir(),
            registry_url: None,
            registry_token: None,
        }
    }
}

impl Workspace {
    /// Loads the workspace from `path`, or from `./workspace.json` when it
    /// exists, or falls back to defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut workspace = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("workspace config not found: {}", path.display());
                }
                Self::from_file(path)?
            }
            None => {
                let fallback = Path::new(DEFAULT_WORKSPACE_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        workspace.apply_env();
        Ok(workspace)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading workspace config {}", path.display()))?;
        let mut workspace: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid workspace config {}", path.display()))?;
        // Relative directories are resolved against the config file.
        if let Some(base) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            workspace.datasets_dir = rebase(base, &workspace.datasets_dir);
            workspace.models_dir = rebase(base, &workspace.models_dir);
        }
        Ok(workspace)
    }

    fn apply_env(&mut self) {
        if let Some(url) = non_empty_env(REGISTRY_URL_ENV) {
            self.registry_url = Some(url);
        }
        self.registry_token = non_empty_env(REGISTRY_TOKEN_ENV);
        self.registry_url = self
            .registry_url
            .take()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn rebase(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

fn default_name() -> String {
    "default".to_string()
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("./datasets")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}
