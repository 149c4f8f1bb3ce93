use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use forecast_contracts::datasets::DatasetRegistry;
use forecast_contracts::events::{EventPayload, EventWriter};
use forecast_contracts::models::predict;
use forecast_contracts::preprocess::preprocess;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::loader::ModelSource;

pub const DEFAULT_DATASET_NAME: &str = "oj_sales_ds";
pub const DEFAULT_OUTPUT_DIR: &str = "./outputs";
pub const DEFAULT_OUTPUT_FILE: &str = "predictions.csv";
pub const FORECAST_COLUMN: &str = "forecast";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub dataset_name: String,
    pub model_name: String,
    pub model_version: Option<u64>,
    pub output_dir: PathBuf,
    pub output_file: String,
}

impl BatchJob {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
            model_name: model_name.into(),
            model_version: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Start,
    DatasetFetched,
    ModelLoaded,
    Preprocessed,
    Predicted,
    Written,
    Done,
}

impl BatchStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::DatasetFetched => "dataset_fetched",
            Self::ModelLoaded => "model_loaded",
            Self::Preprocessed => "preprocessed",
            Self::Predicted => "predicted",
            Self::Written => "written",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub job_id: String,
    pub rows: usize,
    pub model_path: PathBuf,
    pub model_version: Option<u64>,
    pub downloaded: bool,
    pub output_path: PathBuf,
}

/// Runs one batch scoring job from dataset to CSV.
///
/// Any failure aborts the job; the output file is only created once the
/// predictions are complete. The event log is the one file written on failure.
pub struct BatchRunner<'a> {
    datasets: &'a dyn DatasetRegistry,
    models: &'a dyn ModelSource,
    events: EventWriter,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        datasets: &'a dyn DatasetRegistry,
        models: &'a dyn ModelSource,
        events: EventWriter,
    ) -> Self {
        Self {
            datasets,
            models,
            events,
        }
    }

    pub fn new_job_id() -> String {
        format!("batch-{}", Uuid::new_v4())
    }

    pub fn run(&self, job: &BatchJob) -> Result<BatchReport> {
        let mut stage = BatchStage::Start;
        let result = self.run_stages(job, &mut stage);
        if let Err(err) = &result {
            let _ = self.events.emit(
                "batch_failed",
                payload(json!({
                    "last_stage": stage.as_str(),
                    "error": format!("{err:#}"),
                })),
            );
        }
        result
    }

    fn run_stages(&self, job: &BatchJob, stage: &mut BatchStage) -> Result<BatchReport> {
        self.events.emit(
            "batch_started",
            payload(json!({
                "dataset": job.dataset_name,
                "model": job.model_name,
                "model_version": job.model_version,
                "output_path": job.output_path().to_string_lossy(),
            })),
        )?;

        let data = self
            .datasets
            .fetch(&job.dataset_name)
            .with_context(|| format!("failed fetching dataset '{}'", job.dataset_name))?;
        *stage = BatchStage::DatasetFetched;
        self.events.emit(
            stage.as_str(),
            payload(json!({
                "dataset": job.dataset_name,
                "rows": data.row_count(),
                "columns": data.column_names().collect::<Vec<&str>>(),
            })),
        )?;

        println!("Loading model...");
        let model = self
            .models
            .load_model(&job.model_name, job.model_version)
            .with_context(|| format!("failed loading model '{}'", job.model_name))?;
        if model.downloaded {
            println!("Model not found in cache. Downloaded from registry.");
        }
        if let Some(reason) = model.fallback_reason() {
            println!("{reason}");
        }
        *stage = BatchStage::ModelLoaded;
        self.events.emit(
            stage.as_str(),
            payload(json!({
                "model": job.model_name,
                "kind": model.handle.kind(),
                "version": model.version(),
                "requested_version": job.model_version,
                "fallback_reason": model.fallback_reason(),
                "path": model.path.to_string_lossy(),
                "downloaded": model.downloaded,
            })),
        )?;

        println!("Preprocessing data...");
        let mut data = preprocess(data).context("failed preprocessing dataset")?;
        *stage = BatchStage::Preprocessed;
        self.events.emit(
            stage.as_str(),
            payload(json!({ "columns": data.column_names().collect::<Vec<&str>>() })),
        )?;

        println!("Generating predictions data...");
        let forecasts = predict(model.handle.as_ref(), &data).context("prediction failed")?;
        data.insert_column(
            FORECAST_COLUMN,
            forecasts.iter().copied().map(Value::from).collect(),
        )?;
        *stage = BatchStage::Predicted;
        self.events.emit(stage.as_str(), payload(json!({ "rows": forecasts.len() })))?;

        println!("Saving predictions in folder {}...", job.output_dir.display());
        std::fs::create_dir_all(&job.output_dir).with_context(|| {
            format!("failed creating output dir {}", job.output_dir.display())
        })?;
        let output_path = job.output_path();
        let staging = job
            .output_dir
            .join(format!(".{}.{}.tmp", job.output_file, Uuid::new_v4()));
        let written = File::create(&staging)
            .map_err(anyhow::Error::from)
            .and_then(|file| data.write_csv(BufWriter::new(file)).map_err(anyhow::Error::from))
            .and_then(|()| std::fs::rename(&staging, &output_path).map_err(anyhow::Error::from));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&staging);
            return Err(err.context(format!("failed writing {}", output_path.display())));
        }
        *stage = BatchStage::Written;
        self.events.emit(
            "predictions_written",
            payload(json!({
                "path": output_path.to_string_lossy(),
                "rows": data.row_count(),
            })),
        )?;

        *stage = BatchStage::Done;
        println!("Finished.");
        Ok(BatchReport {
            job_id: self.events.job_id().to_string(),
            rows: data.row_count(),
            model_version: model.version(),
            model_path: model.path,
            downloaded: model.downloaded,
            output_path,
        })
    }
}

fn payload(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
