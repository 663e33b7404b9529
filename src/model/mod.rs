//! Trained predictors
//!
//! One [`ModelArtifact`] per target, produced by an [`Estimator`] and served
//! from the [`ModelRegistry`].

pub mod forest;
pub mod registry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::TrainingRow;
use crate::error::{FitError, TickError};
use crate::types::{
    round_to, FeatureWeights, ImportanceSet, Observation, PerTarget, PredictionSet, Target,
    FEATURE_COUNT,
};

pub use forest::{ForestParams, RandomForest};
pub use registry::ModelRegistry;

/// A trained, persistable predictor for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub target: Target,
    pub trained_at: DateTime<Utc>,
    /// Complete rows the model was fitted on
    pub rows: usize,
    model: RandomForest,
}

impl ModelArtifact {
    pub fn new(target: Target, rows: usize, model: RandomForest) -> Self {
        Self {
            target,
            trained_at: Utc::now(),
            rows,
            model,
        }
    }

    pub fn predict(&self, observation: &Observation) -> f64 {
        self.model.predict(&observation.features())
    }

    /// Native contribution weights, as fractions in `Feature::ALL` order
    pub fn feature_importances(&self) -> [f64; FEATURE_COUNT] {
        self.model.feature_importances()
    }
}

/// A complete set of artifacts, one per target
pub type ModelSet = PerTarget<ModelArtifact>;

impl PerTarget<ModelArtifact> {
    /// Run every model, rounding to two decimals for presentation
    pub fn predict(&self, observation: &Observation) -> Result<PredictionSet, TickError> {
        PerTarget::try_from_fn(|target| {
            let value = self.get(target).predict(observation);
            if value.is_finite() {
                Ok(round_to(value, 2))
            } else {
                Err(TickError::Prediction {
                    target,
                    reason: format!("model produced {}", value),
                })
            }
        })
    }

    /// Per-target feature importances in percent
    pub fn importances(&self) -> ImportanceSet {
        self.map(|_, artifact| FeatureWeights::from_fractions(&artifact.feature_importances()))
    }
}

/// Fits one target's predictor from cleaned rows
pub trait Estimator: Send + Sync {
    fn fit(&self, target: Target, rows: &[TrainingRow]) -> Result<ModelArtifact, FitError>;
}

/// Random forest with fixed hyperparameters
#[derive(Debug, Clone, Default)]
pub struct ForestEstimator {
    params: ForestParams,
}

impl ForestEstimator {
    pub fn new(params: ForestParams) -> Self {
        Self { params }
    }
}

impl Estimator for ForestEstimator {
    fn fit(&self, target: Target, rows: &[TrainingRow]) -> Result<ModelArtifact, FitError> {
        let x: Vec<[f64; FEATURE_COUNT]> = rows.iter().map(|r| r.features).collect();
        let y: Vec<f64> = rows.iter().map(|r| *r.targets.get(target)).collect();
        let model = RandomForest::fit(&x, &y, &self.params)?;
        Ok(ModelArtifact::new(target, rows.len(), model))
    }
}
