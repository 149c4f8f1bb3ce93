//! Scoring runners for the sales-forecast model: model resolution (mounted
//! directory, local cache, remote registry), the batch job and the online
//! request scorer.

mod batch;
mod cache;
mod loader;
mod online;
mod registry;

pub use batch::{
    BatchJob, BatchReport, BatchRunner, BatchStage, DEFAULT_DATASET_NAME, DEFAULT_OUTPUT_DIR,
    DEFAULT_OUTPUT_FILE, FORECAST_COLUMN,
};
pub use cache::ModelCache;
pub use loader::{find_model_files, load_single_model, resolve_single_file, LoadedModel, ModelSource};
pub use online::{ScoreResponse, ScoringService, MODEL_DIR_ENV};
pub use registry::{ModelResolver, RemoteModelRegistry};
