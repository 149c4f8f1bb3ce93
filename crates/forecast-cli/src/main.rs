use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecast_contracts::datasets::LocalDatasetRegistry;
use forecast_contracts::events::EventWriter;
use forecast_contracts::workspace::{non_empty_env, Workspace};
use forecast_engine::{
    BatchJob, BatchRunner, ModelResolver, ScoringService, DEFAULT_DATASET_NAME,
    DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILE, MODEL_DIR_ENV,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Parser)]
#[command(name = "forecast-rs", version, about = "Sales forecast batch and online scoring")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score a registered dataset and write predictions as CSV
    Batch(BatchArgs),
    /// Serve predictions over HTTP from a mounted model directory
    Serve(ServeArgs),
}

#[derive(Debug, Parser)]
struct BatchArgs {
    #[arg(long, default_value = DEFAULT_DATASET_NAME)]
    dataset_name: String,
    #[arg(long)]
    model_name: String,
    /// Pin a registry version instead of taking the latest
    #[arg(long)]
    model_version: Option<u64>,
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
    output_file: String,
    /// Workspace config; defaults to ./workspace.json when present
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Event log; defaults to <output-dir>/events.jsonl, also written on failure
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    /// Directory holding exactly one model artifact (falls back to $MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("forecast-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Batch(args) => run_batch(args),
        Command::Serve(args) => run_serve(args),
    }
}

fn run_batch(args: BatchArgs) -> Result<i32> {
    let workspace = Workspace::load(args.workspace.as_deref())?;
    let datasets = LocalDatasetRegistry::new(&workspace.datasets_dir);
    let models = ModelResolver::from_workspace(&workspace);
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.output_dir.join("events.jsonl"));
    let events = EventWriter::new(events_path, BatchRunner::new_job_id());

    let job = BatchJob {
        dataset_name: args.dataset_name,
        model_name: args.model_name,
        model_version: args.model_version,
        output_dir: args.output_dir,
        output_file: args.output_file,
    };
    let report = BatchRunner::new(&datasets, &models, events).run(&job)?;
    println!(
        "Wrote {} predictions to {}",
        report.rows,
        report.output_path.display()
    );
    Ok(0)
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    init_tracing();

    let model_dir = args
        .model_dir
        .or_else(|| non_empty_env(MODEL_DIR_ENV).map(PathBuf::from))
        .with_context(|| format!("no model directory: pass --model-dir or set {MODEL_DIR_ENV}"))?;
    let scorer = ScoringService::from_model_dir(&model_dir)
        .with_context(|| format!("failed loading model from {}", model_dir.display()))?;
    tracing::info!(
        "Loaded model: '{}' ({})",
        scorer
            .model_path()
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
        scorer.model().kind()
    );

    let addr = listen_addr(args.host, args.port)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed starting async runtime")?;
    runtime.block_on(server::serve(addr, scorer))?;
    Ok(0)
}

fn listen_addr(host: Option<String>, port: Option<u16>) -> Result<SocketAddr> {
    let host = host
        .or_else(|| non_empty_env("HOST"))
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let port = match port {
        Some(port) => port,
        None => env::var("PORT")
            .ok()
            .map(|value| value.trim().parse::<u16>())
            .transpose()
            .context("PORT must be a valid port number")?
            .unwrap_or(8080),
    };
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forecast_rs=info,tower_http=info".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{listen_addr, Cli, Command};

    #[test]
    fn batch_args_fall_back_to_defaults() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["forecast-rs", "batch", "--model-name", "oj-forecast"])?;
        let Command::Batch(args) = cli.command else {
            anyhow::bail!("expected batch command");
        };
        assert_eq!(args.dataset_name, "oj_sales_ds");
        assert_eq!(args.model_name, "oj-forecast");
        assert_eq!(args.model_version, None);
        assert_eq!(args.output_dir, PathBuf::from("./outputs"));
        assert_eq!(args.output_file, "predictions.csv");
        Ok(())
    }

    #[test]
    fn batch_requires_model_name() {
        assert!(Cli::try_parse_from(["forecast-rs", "batch"]).is_err());
    }

    #[test]
    fn serve_accepts_explicit_address() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "forecast-rs",
            "serve",
            "--model-dir",
            "/mnt/models",
            "--port",
            "9000",
        ])?;
        let Command::Serve(args) = cli.command else {
            anyhow::bail!("expected serve command");
        };
        assert_eq!(args.model_dir, Some(PathBuf::from("/mnt/models")));
        let addr = listen_addr(Some("127.0.0.1".to_string()), args.port)?;
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
        Ok(())
    }
}
