use std::path::{Path, PathBuf};

use forecast_contracts::models::{load_model_file, ModelHandle, VersionSelection};
use forecast_contracts::{ScoringError, ScoringResult};
use walkdir::WalkDir;

/// A deserialized model together with where it came from.
#[derive(Clone)]
pub struct LoadedModel {
    pub handle: ModelHandle,
    pub path: PathBuf,
    /// Registry version picked for a named model; `None` for a bare file.
    pub selection: Option<VersionSelection>,
    /// Set when the artifact was fetched from the remote registry.
    pub downloaded: bool,
}

impl LoadedModel {
    pub fn from_file(path: impl Into<PathBuf>) -> ScoringResult<Self> {
        let path = path.into();
        let handle = load_model_file(&path)?;
        Ok(Self {
            handle,
            path,
            selection: None,
            downloaded: false,
        })
    }

    pub fn version(&self) -> Option<u64> {
        self.selection
            .as_ref()
            .map(|selection| selection.version.version)
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.selection
            .as_ref()
            .and_then(|selection| selection.fallback_reason.as_deref())
    }
}

/// Resolves a model name to a loaded model for the batch path.
pub trait ModelSource {
    fn load_model(&self, name: &str, version: Option<u64>) -> ScoringResult<LoadedModel>;
}

/// Every regular file under `root`, recursively, sorted by path. Symlinks
/// are not followed.
pub fn find_model_files(root: &Path) -> ScoringResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ScoringError::not_found(format!(
            "model directory {} does not exist",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// The one model artifact under `root`.
pub fn resolve_single_file(root: &Path) -> ScoringResult<PathBuf> {
    let mut files = find_model_files(root)?;
    match files.len() {
        0 => Err(ScoringError::not_found(format!(
            "no model file found under {}",
            root.display()
        ))),
        1 => Ok(files.remove(0)),
        count => {
            let listing = files
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<String>>()
                .join(", ");
            Err(ScoringError::ambiguous_model(format!(
                "found {count} model files under {}: {listing}",
                root.display()
            )))
        }
    }
}

/// Startup loader for the online path: the mounted directory must hold
/// exactly one artifact.
pub fn load_single_model(root: &Path) -> ScoringResult<LoadedModel> {
    LoadedModel::from_file(resolve_single_file(root)?)
}

#[cfg(test)]
mod tests {
    use forecast_contracts::table::Table;
    use forecast_contracts::ScoringError;
    use serde_json::json;

    use super::{find_model_files, load_single_model};

    fn write_constant(path: &std::path::Path, value: f64) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json!({"kind": "constant", "value": value}).to_string())?;
        Ok(())
    }

    #[test]
    fn empty_model_dir_is_not_found() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::create_dir_all(temp.path().join("nested"))?;
        let err = load_single_model(temp.path()).err();
        assert!(matches!(err, Some(ScoringError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn missing_model_dir_is_not_found() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let err = load_single_model(&temp.path().join("absent")).err();
        assert!(matches!(err, Some(ScoringError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn two_model_files_are_ambiguous() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write_constant(&temp.path().join("a").join("model.json"), 1.0)?;
        write_constant(&temp.path().join("b").join("model.json"), 2.0)?;
        let err = load_single_model(temp.path()).err();
        assert!(matches!(err, Some(ScoringError::AmbiguousModel(ref msg)) if msg.contains("found 2 model files")));
        Ok(())
    }

    #[test]
    fn single_nested_model_file_loads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("oj-forecast").join("3").join("model.json");
        write_constant(&path, 4.2)?;

        let loaded = load_single_model(temp.path())?;
        assert_eq!(loaded.path, path);
        let table = Table::from_payload(&json!({"feature1": [5]}))?;
        assert_eq!(loaded.handle.predict(&table)?, vec![4.2]);
        Ok(())
    }

    #[test]
    fn find_model_files_is_sorted_and_recursive() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write_constant(&temp.path().join("z.json"), 1.0)?;
        write_constant(&temp.path().join("deep").join("er").join("a.json"), 1.0)?;
        let files = find_model_files(temp.path())?;
        assert_eq!(
            files,
            vec![
                temp.path().join("deep").join("er").join("a.json"),
                temp.path().join("z.json"),
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn directory_symlink_cycle_is_not_followed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let model_dir = temp.path().join("model");
        let path = model_dir.join("model.json");
        write_constant(&path, 4.2)?;
        std::os::unix::fs::symlink(&model_dir, model_dir.join("loop"))?;

        assert_eq!(find_model_files(temp.path())?, vec![path.clone()]);
        assert_eq!(load_single_model(temp.path())?.path, path);
        Ok(())
    }
}
