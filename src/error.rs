//! Error taxonomy
//!
//! Boot-time dataset and registry errors are fatal; everything raised while
//! the sampling loop runs is contained and reported as a status event.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{required_columns, Target};

/// The dataset header lacks one or more required columns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "dataset is missing required column(s): {}; the header must contain these exact (case-sensitive) names: {}",
    .missing.join(", "),
    required_columns().join(", ")
)]
pub struct SchemaError {
    pub missing: Vec<String>,
}

/// Failures reading or appending the dataset file
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A regressor could not be fitted
#[derive(Debug, Error)]
pub enum FitError {
    #[error("no complete rows to train on")]
    Empty,
    #[error("feature and label counts differ ({features} vs {labels})")]
    LengthMismatch { features: usize, labels: usize },
    #[error("{0}")]
    Other(String),
}

/// Outcome of a failed training pass
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("dataset file not found: {}", .0.display())]
    DatasetNotFound(PathBuf),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("training {target} model failed: {source}")]
    Training {
        target: Target,
        #[source]
        source: FitError,
    },
    #[error("could not read dataset: {0}")]
    Dataset(DatasetError),
    #[error("could not persist models: {0}")]
    Persist(#[source] std::io::Error),
}

impl From<DatasetError> for TrainError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::NotFound(path) => TrainError::DatasetNotFound(path),
            DatasetError::Schema(schema) => TrainError::Schema(schema),
            other => TrainError::Dataset(other),
        }
    }
}

/// The persisted model set could not be loaded
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{target} model artifact missing at {}", .path.display())]
    Missing { target: Target, path: PathBuf },
    #[error("{target} model artifact at {} is corrupt: {source}", .path.display())]
    Corrupt {
        target: Target,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading {target} model artifact failed: {source}")]
    Io {
        target: Target,
        #[source]
        source: std::io::Error,
    },
}

/// Sensor link failures
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not connect to sensor device {device}: {reason}")]
    Connect { device: String, reason: String },
    #[error("timed out waiting for a sensor line")]
    Timeout,
    #[error("sensor link closed")]
    Closed,
    #[error("malformed sensor line: {0:?}")]
    Malformed(String),
    #[error("sensor read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-tick failure; logged, followed by a cooldown, never fatal
#[derive(Debug, Error)]
pub enum TickError {
    #[error("{target} prediction failed: {reason}")]
    Prediction { target: Target, reason: String },
    #[error("no model set is being served")]
    ModelsUnavailable,
}

/// Self-learning failure; logged by the detached task, never propagated
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("could not append observation: {0}")]
    Append(#[from] DatasetError),
    #[error("retrain failed: {0}")]
    Retrain(#[from] TrainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_missing_and_required_columns() {
        let err = SchemaError { missing: vec!["DO".to_string()] };
        let msg = err.to_string();
        assert!(msg.contains("column(s): DO;"), "{}", msg);
        assert!(msg.contains("pH, TDS, Turbidity, Temperature, BOD, COD, DO"), "{}", msg);
    }

    #[test]
    fn test_dataset_error_maps_into_train_error() {
        let err: TrainError = DatasetError::NotFound(PathBuf::from("data.csv")).into();
        assert!(matches!(err, TrainError::DatasetNotFound(_)));

        let err: TrainError = DatasetError::Schema(SchemaError { missing: vec!["BOD".into()] }).into();
        match err {
            TrainError::Schema(s) => assert_eq!(s.missing, vec!["BOD".to_string()]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
