use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::forecaster::{Forecaster, ModelHandle};
use crate::error::{ScoringError, ScoringResult};
use crate::table::{cell_as_f64, cell_as_text, Table};

/// Serialized model, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Constant(ConstantModel),
    Linear(LinearModel),
}

impl ModelArtifact {
    pub fn into_handle(self) -> ModelHandle {
        match self {
            Self::Constant(model) => Arc::new(model),
            Self::Linear(model) => Arc::new(model),
        }
    }
}

/// Predicts the same value for every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantModel {
    pub value: f64,
}

impl Forecaster for ConstantModel {
    fn kind(&self) -> &str {
        "constant"
    }

    fn predict(&self, table: &Table) -> ScoringResult<Vec<f64>> {
        Ok(vec![self.value; table.row_count()])
    }
}

/// Linear model over numeric columns plus per-level weights for categorical
/// columns. Unknown levels contribute nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub coefficients: IndexMap<String, f64>,
    #[serde(default)]
    pub categories: IndexMap<String, IndexMap<String, f64>>,
}

impl LinearModel {
    fn required_column<'a>(
        table: &'a Table,
        name: &str,
    ) -> ScoringResult<&'a [serde_json::Value]> {
        table.column(name).ok_or_else(|| {
            let available = table.column_names().collect::<Vec<&str>>();
            ScoringError::schema(format!(
                "model expects column '{name}', input has {available:?}"
            ))
        })
    }
}

impl Forecaster for LinearModel {
    fn kind(&self) -> &str {
        "linear"
    }

    fn predict(&self, table: &Table) -> ScoringResult<Vec<f64>> {
        let mut out = vec![self.intercept; table.row_count()];

        for (name, weight) in &self.coefficients {
            let cells = Self::required_column(table, name)?;
            for (row, (acc, cell)) in out.iter_mut().zip(cells).enumerate() {
                let value = cell_as_f64(cell).ok_or_else(|| {
                    ScoringError::schema(format!(
                        "column '{name}' row {row}: expected a number, got {cell}"
                    ))
                })?;
                *acc += weight * value;
            }
        }

        for (name, levels) in &self.categories {
            let cells = Self::required_column(table, name)?;
            for (acc, cell) in out.iter_mut().zip(cells) {
                if let Some(weight) = cell_as_text(cell).and_then(|level| levels.get(&level)) {
                    *acc += weight;
                }
            }
        }

        Ok(out)
    }
}

/// Deserializes a model artifact file into a shareable handle.
pub fn load_model_file(path: &Path) -> ScoringResult<ModelHandle> {
    let raw = std::fs::read(path)?;
    let artifact: ModelArtifact = serde_json::from_slice(&raw).map_err(|err| {
        ScoringError::schema(format!(
            "cannot deserialize model artifact {}: {err}",
            path.display()
        ))
    })?;
    Ok(artifact.into_handle())
}
