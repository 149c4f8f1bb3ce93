use serde::{Deserialize, Serialize};

/// One registered version of a named model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: u64,
    pub file_name: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Versions known for one model name, as listed by a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub versions: Vec<ModelVersion>,
}

impl ModelCatalog {
    pub fn new(name: impl Into<String>, versions: Vec<ModelVersion>) -> Self {
        Self {
            name: name.into(),
            versions,
        }
    }

    pub fn get(&self, version: u64) -> Option<&ModelVersion> {
        self.versions.iter().find(|item| item.version == version)
    }

    pub fn latest(&self) -> Option<&ModelVersion> {
        self.versions.iter().max_by_key(|item| item.version)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
