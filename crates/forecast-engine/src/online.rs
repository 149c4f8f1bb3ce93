use std::path::{Path, PathBuf};

use forecast_contracts::models::{predict, Forecaster, ModelHandle};
use forecast_contracts::preprocess::preprocess;
use forecast_contracts::table::Table;
use forecast_contracts::{ScoringError, ScoringResult};
use serde_json::Value;

use crate::loader::load_single_model;

pub const MODEL_DIR_ENV: &str = "MODEL_DIR";

/// Request scorer for the online path.
///
/// Holds one read-only model handle for the life of the process. `score` has
/// no other state, so a single service may be called from many requests at
/// once.
#[derive(Clone)]
pub struct ScoringService {
    model: ModelHandle,
    model_path: Option<PathBuf>,
}

impl ScoringService {
    pub fn new(model: ModelHandle) -> Self {
        Self {
            model,
            model_path: None,
        }
    }

    /// Startup: loads the single artifact under `root`. Errors are fatal to
    /// the caller; the service must not be built without a model.
    pub fn from_model_dir(root: &Path) -> ScoringResult<Self> {
        let loaded = load_single_model(root)?;
        Ok(Self {
            model: loaded.handle,
            model_path: Some(loaded.path),
        })
    }

    pub fn model(&self) -> &dyn Forecaster {
        self.model.as_ref()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn score(&self, body: &str) -> ScoringResult<Vec<f64>> {
        let request: Value = serde_json::from_str(body)
            .map_err(|err| ScoringError::invalid_payload(format!("malformed JSON: {err}")))?;
        let Some(request) = request.as_object() else {
            return Err(ScoringError::invalid_payload(
                "request body must be a JSON object",
            ));
        };
        let Some(data) = request.get("data") else {
            return Err(ScoringError::invalid_payload("missing 'data' key"));
        };
        let table = preprocess(Table::from_payload(data)?)?;
        predict(self.model.as_ref(), &table)
    }

    pub fn handle(&self, body: &str) -> ScoreResponse {
        ScoreResponse::from_result(self.score(body))
    }
}

/// Wire form of a scoring result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreResponse {
    Forecast(Vec<f64>),
    Rejected { kind: &'static str, message: String },
}

impl ScoreResponse {
    pub fn from_result(result: ScoringResult<Vec<f64>>) -> Self {
        match result {
            Ok(forecasts) => Self::Forecast(forecasts),
            Err(err) => Self::Rejected {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Forecast(_) => 200,
            Self::Rejected { .. } => 400,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Forecast(_) => "application/json",
            Self::Rejected { .. } => "text/plain; charset=utf-8",
        }
    }

    pub fn body(&self) -> String {
        match self {
            Self::Forecast(forecasts) => {
                serde_json::to_string(forecasts).unwrap_or_else(|_| "[]".to_string())
            }
            Self::Rejected { message, .. } => format!("Error: {message}"),
        }
    }
}
