//! CLI interface for aqua-monitor

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::classifier::classify;
use crate::config::Config;
use crate::dataset::DatasetStore;
use crate::error::TrainError;
use crate::model::{ForestEstimator, ModelRegistry};
use crate::monitor::{Monitor, SelfLearning};
use crate::publisher::{BroadcastPublisher, Publisher};
use crate::sampler::{DeviceConnector, SerialConnector};
use crate::server::{self, ServerState};
use crate::trainer::{Trainer, TrainingReason};
use crate::types::{required_columns, Observation, PerTarget};

#[derive(Parser)]
#[command(name = "aqua-monitor")]
#[command(about = "Live water quality monitoring with self-learning predictors", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dataset CSV, overrides [data].dataset_path
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Model artifact directory, overrides [data].models_dir
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train if needed, then serve live results to viewers
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Sensor device path or tcp://host:port bridge
        #[arg(long)]
        device: Option<String>,
        /// Skip the sensor device and sample synthetic readings
        #[arg(long)]
        no_device: bool,
    },
    /// Fit and persist the three predictors
    Train {
        /// Retrain even when artifacts already exist
        #[arg(short, long)]
        force: bool,
    },
    /// Classify one set of readings without the models
    Classify {
        #[arg(long, allow_negative_numbers = true)]
        ph: f64,
        #[arg(long)]
        turbidity: f64,
        /// Dissolved oxygen, mg/L
        #[arg(long = "do")]
        dissolved_oxygen: f64,
        #[arg(long)]
        bod: f64,
    },
    /// Print the effective configuration
    Config,
}

/// Components shared by the serve and train commands
struct Components {
    registry: Arc<ModelRegistry>,
    publisher: BroadcastPublisher,
    store: Arc<DatasetStore>,
    trainer: Arc<Trainer>,
}

impl Components {
    fn build(config: &Config) -> Self {
        let store = Arc::new(DatasetStore::new(&config.data.dataset_path));
        let registry = Arc::new(ModelRegistry::new(&config.data.models_dir));
        let publisher = BroadcastPublisher::new(config.server.channel_capacity);
        let estimator = Arc::new(ForestEstimator::new(config.training.forest_params()));
        let trainer = Arc::new(Trainer::new(
            store.clone(),
            registry.clone(),
            estimator,
            Arc::new(publisher.clone()) as Arc<dyn Publisher>,
        ));

        Self { registry, publisher, store, trainer }
    }
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dataset) = cli.dataset {
        config.data.dataset_path = dataset;
    }
    if let Some(models_dir) = cli.models_dir {
        config.data.models_dir = models_dir;
    }

    match cli.command {
        Commands::Serve { port, host, device, no_device } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(device) = device {
                config.sampling.device = device;
            }
            if no_device {
                config.sampling.use_device = false;
            }
            serve(config).await
        }
        Commands::Train { force } => train(&config, force).await,
        Commands::Classify { ph, turbidity, dissolved_oxygen, bod } => {
            print_classification(ph, turbidity, dissolved_oxygen, bod);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Run one training pass on the blocking pool
async fn run_training(trainer: Arc<Trainer>, force: bool) -> Result<()> {
    let result = tokio::task::spawn_blocking(move || trainer.train(force))
        .await
        .context("Training task panicked")?;

    match result {
        Ok(outcome) => {
            match outcome.reason {
                TrainingReason::Skipped => println!("✓ Models already exist, training skipped"),
                TrainingReason::Trained { rows } => {
                    println!("✓ Models trained on {} complete rows", rows)
                }
            }
            Ok(())
        }
        Err(e) => {
            report_training_failure(&e);
            bail!("Model training failed: {}", e)
        }
    }
}

fn report_training_failure(err: &TrainError) {
    match err {
        TrainError::Schema(schema) => {
            eprintln!("✗ FATAL: dataset is missing required columns: {}", schema.missing.join(", "));
            eprintln!("  The CSV header must contain these exact (case-sensitive) names:");
            eprintln!("  {}", required_columns().join(", "));
        }
        TrainError::DatasetNotFound(path) => {
            eprintln!("✗ FATAL: dataset not found at {}", path.display());
            eprintln!("  Required columns: {}", required_columns().join(", "));
        }
        other => eprintln!("✗ FATAL: {}", other),
    }
}

async fn train(config: &Config, force: bool) -> Result<()> {
    let components = Components::build(config);
    run_training(components.trainer, force).await
}

async fn serve(config: Config) -> Result<()> {
    let components = Components::build(&config);

    run_training(components.trainer.clone(), false).await?;

    components
        .registry
        .load()
        .context("FATAL: could not load ML models after training")?;

    let connector: Option<Arc<dyn DeviceConnector>> = if config.sampling.use_device {
        Some(Arc::new(SerialConnector::new(config.sampling.device.clone())))
    } else {
        None
    };

    let feedback = Arc::new(SelfLearning::new(
        components.store.clone(),
        components.trainer.clone(),
    ));
    let monitor = Arc::new(Monitor::new(
        components.registry.clone(),
        Arc::new(components.publisher.clone()),
        feedback,
        connector,
        config.sampling.monitor_settings(),
    ));

    info!(
        "Dataset {}, models in {}",
        components.store.path().display(),
        components.registry.models_dir().display()
    );

    let state = ServerState {
        monitor,
        publisher: components.publisher,
    };
    server::start(&config.server.host, config.server.port, state).await
}

fn print_classification(ph: f64, turbidity: f64, dissolved_oxygen: f64, bod: f64) {
    // Only pH and turbidity among the inputs, and DO and BOD among the
    // targets, take part in classification
    let observation = Observation::new(ph, 0.0, turbidity, 0.0);
    let predictions = PerTarget {
        bod,
        cod: 0.0,
        dissolved_oxygen,
    };
    let verdict = classify(&observation, &predictions);

    println!("Water quality: {}", verdict.status);
    for reason in &verdict.reasons {
        println!("  - {}", reason);
    }
}
