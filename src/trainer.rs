//! Trainer - fits and persists one predictor per target
//!
//! Narrates each phase to viewers. A pass either persists and serves all three
//! artifacts or none of them; a failed retrain leaves the served set
//! authoritative.

use std::sync::Arc;

use tracing::{error, info};

use crate::dataset::DatasetStore;
use crate::error::TrainError;
use crate::model::{Estimator, ModelRegistry, ModelSet};
use crate::publisher::Publisher;
use crate::types::PerTarget;

pub const STATUS_LOADING: &str = "Loading and cleaning data...";
pub const STATUS_CLEANED: &str = "Data cleaned. Starting model training...";
pub const STATUS_TRAINED: &str = "Models trained! System is now live.";

/// Why a training call did or didn't fit new models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingReason {
    /// All artifacts already existed and no retrain was requested
    Skipped,
    /// Fitted and persisted on this many complete rows
    Trained { rows: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingOutcome {
    pub trained: bool,
    pub reason: TrainingReason,
}

impl TrainingOutcome {
    fn skipped() -> Self {
        Self { trained: false, reason: TrainingReason::Skipped }
    }

    fn trained(rows: usize) -> Self {
        Self { trained: true, reason: TrainingReason::Trained { rows } }
    }
}

/// Status line shown to viewers for a failed pass
pub fn failure_status(err: &TrainError) -> String {
    match err {
        TrainError::Schema(schema) => {
            format!("Error: CSV missing columns: {}", schema.missing.join(", "))
        }
        TrainError::DatasetNotFound(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            format!("Error: {} not found.", name)
        }
        other => format!("Training Error: {}", other),
    }
}

pub struct Trainer {
    store: Arc<DatasetStore>,
    registry: Arc<ModelRegistry>,
    estimator: Arc<dyn Estimator>,
    publisher: Arc<dyn Publisher>,
}

impl Trainer {
    pub fn new(
        store: Arc<DatasetStore>,
        registry: Arc<ModelRegistry>,
        estimator: Arc<dyn Estimator>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self { store, registry, estimator, publisher }
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Train every target. Without `force_retrain`, existing artifacts are
    /// kept and the dataset is not read. Blocking; run it off the async
    /// runtime.
    pub fn train(&self, force_retrain: bool) -> Result<TrainingOutcome, TrainError> {
        if !force_retrain && self.registry.artifacts_exist() {
            info!("Models already exist. Skipping initial training.");
            return Ok(TrainingOutcome::skipped());
        }

        info!("Starting model training (retrain: {})", force_retrain);
        self.publisher.publish_status(STATUS_LOADING);

        match self.fit_and_persist() {
            Ok(rows) => {
                info!("Model training successful on {} rows", rows);
                self.publisher.publish_status(STATUS_TRAINED);
                Ok(TrainingOutcome::trained(rows))
            }
            Err(e) => {
                error!("Model training failed: {}", e);
                self.publisher.publish_status(&failure_status(&e));
                Err(e)
            }
        }
    }

    fn fit_and_persist(&self) -> Result<usize, TrainError> {
        let dataset = self.store.load()?;
        info!(
            "Dataset loaded with {} rows, columns: {:?}",
            dataset.len(),
            dataset.columns
        );

        let rows = dataset.complete_rows();
        info!("Data cleaned. {} complete rows remain for training.", rows.len());
        self.publisher.publish_status(STATUS_CLEANED);

        let set: ModelSet = PerTarget::try_from_fn(|target| {
            info!("Training model for {}", target);
            self.estimator
                .fit(target, &rows)
                .map_err(|source| TrainError::Training { target, source })
        })?;

        self.registry.commit(set).map_err(TrainError::Persist)?;
        Ok(rows.len())
    }
}
