use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use credit_default_predictor::ml::{Dataset, ModelService, PredictionRecord};
use credit_default_predictor::{metrics, AppError, Config};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "credit-default-cli")]
#[command(about = "Credit card default predictor", long_about = None, version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Model artifact location (overrides artifact.path)
    #[arg(short, long, global = true)]
    artifact: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and save the artifact
    Train {
        /// Labeled CSV dataset (overrides training.dataset_path)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Train on N generated rows instead of a file
        #[arg(long, value_name = "N", conflicts_with = "dataset")]
        synthetic: Option<usize>,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Score one JSON record
    Predict {
        /// JSON file with a single record, or - for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Score a batch of JSON records atomically
    Batch {
        /// JSON file with {"records": [...]} or an array, or - for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// List the model's features with descriptions
    Features,

    /// Show the model status
    Status,

    /// Write a synthetic dataset shaped like the UCI credit card data
    Synth {
        #[arg(short, long, default_value = "30000")]
        rows: usize,

        #[arg(short, long, default_value = "42")]
        seed: u64,

        #[arg(short, long, default_value = "UCI_Credit_Card.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<AppError>() {
            Some(app) => eprintln!("Error [{}]: {:#}", app.error_code(), e),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = cli.artifact {
        config.artifact.path = path;
    }
    if cli.json_logs {
        config.observability.json_logs = true;
    }

    init_tracing(&config);

    if config.observability.metrics_enabled {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    match cli.command {
        Commands::Synth { rows, seed, output } => {
            let dataset = Dataset::synthetic(rows, seed);
            dataset
                .write_csv_path(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(rows, seed, path = %output.display(), "Synthetic dataset written");
        }

        Commands::Train {
            dataset,
            synthetic,
            timeout_secs,
        } => {
            if let Some(path) = dataset {
                config.training.dataset_path = path;
            }
            let service = ModelService::from_config(&config);

            let run = async {
                match synthetic {
                    Some(rows) => {
                        service
                            .train_from(Dataset::synthetic(rows, config.training.seed))
                            .await
                    }
                    None => service.train().await,
                }
            };

            let heldout = match timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), run).await {
                    Ok(result) => result?,
                    Err(_) => bail!("training did not finish within {} seconds", secs),
                },
                None => run.await?,
            };

            print_json(&json!({
                "status": "success",
                "accuracy": heldout.accuracy,
                "metrics": heldout,
                "artifact": config.artifact.path,
            }))?;
        }

        Commands::Predict { input } => {
            let service = loaded_service(&config)?;
            let record: PredictionRecord = serde_json::from_str(&read_input(&input)?)
                .context("input must be a JSON object of feature values")?;
            let result = service.predict(&record)?;
            print_json(&result)?;
        }

        Commands::Batch { input } => {
            let service = loaded_service(&config)?;
            let records = parse_batch(&read_input(&input)?)?;
            let predictions = service.predict_batch(&records)?;
            print_json(&json!({ "predictions": predictions }))?;
        }

        Commands::Features => {
            let service = loaded_service(&config)?;
            let features = service.features()?;
            print_json(&json!({ "count": features.len(), "features": features }))?;
        }

        Commands::Status => {
            let service = ModelService::from_config(&config);
            if let Err(e) = service.initialize() {
                tracing::warn!("Artifact could not be loaded: {}", e);
            }
            print_json(&service.status())?;
        }
    }

    if cli.print_metrics {
        eprint!("{}", metrics::gather_metrics());
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Service with the stored artifact active
fn loaded_service(config: &Config) -> anyhow::Result<ModelService> {
    let service = ModelService::from_config(config);
    if !service.initialize()? {
        return Err(AppError::ModelNotLoaded.into());
    }
    Ok(service)
}

fn read_input(input: &str) -> anyhow::Result<String> {
    let mut buffer = String::new();
    if input == "-" {
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
    } else {
        buffer = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input))?;
    }
    Ok(buffer)
}

/// Accept `{"records": [...]}` or a bare array of records
fn parse_batch(text: &str) -> anyhow::Result<Vec<PredictionRecord>> {
    let value: Value = serde_json::from_str(text).context("batch input is not valid JSON")?;
    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(items)) => items,
            _ => bail!("batch input object must contain a \"records\" array"),
        },
        _ => bail!("batch input must be an array or an object with \"records\""),
    };

    records
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(PredictionRecord::from(map)),
            _ => bail!("record {} is not a JSON object", i),
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
