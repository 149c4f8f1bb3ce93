use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use crate::error::{ScoringError, ScoringResult};
use crate::table::Table;

/// Lookup of tabular datasets by name.
pub trait DatasetRegistry {
    fn fetch(&self, name: &str) -> ScoringResult<Table>;
}

/// Datasets stored as CSV under a root directory.
///
/// `<root>/<name>.csv` is a single-file dataset; `<root>/<name>/` holds one or
/// more `*.csv` parts read in file-name order and concatenated.
#[derive(Debug, Clone)]
pub struct LocalDatasetRegistry {
    root: PathBuf,
}

impl LocalDatasetRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn parts(&self, name: &str) -> ScoringResult<Vec<PathBuf>> {
        if name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ScoringError::not_found(format!("invalid dataset name '{name}'")));
        }
        let single = self.root.join(format!("{name}.csv"));
        if single.is_file() {
            return Ok(vec![single]);
        }

        let dir = self.root.join(name);
        if dir.is_dir() {
            let mut parts = std::fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
                })
                .collect::<Vec<PathBuf>>();
            parts.sort();
            if !parts.is_empty() {
                return Ok(parts);
            }
        }

        Err(ScoringError::not_found(format!(
            "dataset '{name}' not found under {}",
            self.root.display()
        )))
    }
}

impl DatasetRegistry for LocalDatasetRegistry {
    fn fetch(&self, name: &str) -> ScoringResult<Table> {
        let mut table = Table::new();
        for part in self.parts(name)? {
            let file = File::open(&part)?;
            let chunk = Table::read_csv(BufReader::new(file)).map_err(|err| match err {
                ScoringError::Schema(msg) => {
                    ScoringError::schema(format!("{}: {msg}", part.display()))
                }
                other => other,
            })?;
            table.append(chunk)?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DatasetRegistry, LocalDatasetRegistry};
    use crate::error::ScoringError;

    #[test]
    fn fetch_reads_single_file_dataset() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(
            temp.path().join("oj_sales_ds.csv"),
            "WeekStarting,Store,Quantity\n1992-01-02,2,10\n",
        )?;
        let table = LocalDatasetRegistry::new(temp.path()).fetch("oj_sales_ds")?;
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column("Store"), Some(&[json!(2)][..]));
        Ok(())
    }

    #[test]
    fn fetch_concatenates_parts_in_name_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let dir = temp.path().join("oj_sales_ds");
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("part-2.csv"), "Store\n20\n")?;
        std::fs::write(dir.join("part-1.csv"), "Store\n10\n")?;
        std::fs::write(dir.join("README.md"), "ignored")?;

        let table = LocalDatasetRegistry::new(temp.path()).fetch("oj_sales_ds")?;
        assert_eq!(table.column("Store"), Some(&[json!(10), json!(20)][..]));
        Ok(())
    }

    #[test]
    fn fetch_missing_dataset_is_not_found() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let registry = LocalDatasetRegistry::new(temp.path());
        assert!(matches!(registry.fetch("missing"), Err(ScoringError::NotFound(_))));
        assert!(matches!(registry.fetch("../etc"), Err(ScoringError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn dot_names_do_not_read_the_datasets_root() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("oj_sales_ds.csv"), "Store\n10\n")?;
        std::fs::write(temp.path().join("other.csv"), "Store\n20\n")?;
        let registry = LocalDatasetRegistry::new(temp.path());
        assert!(matches!(registry.fetch("."), Err(ScoringError::NotFound(_))));
        assert!(matches!(registry.fetch(" "), Err(ScoringError::NotFound(_))));
        Ok(())
    }
}
