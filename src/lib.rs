//! Aqua Monitor - Water Quality Monitoring Library
//!
//! A live water-quality monitor with:
//! - CSV dataset store with schema validation and atomic appends
//! - Random forest predictors for BOD, COD and dissolved oxygen
//! - Model registry with all-or-nothing persistence and swaps
//! - Rule-based Good / Moderate / Hazardous classification
//! - Sensor device sampling with a synthetic fallback
//! - Self-learning retrains fed by every published sample
//! - WebSocket push of status and results to viewers
//!
//! # Example
//!
//! ```
//! use aqua_monitor::classifier::{classify, QualityStatus};
//! use aqua_monitor::types::{Observation, PerTarget};
//!
//! let observation = Observation::new(7.2, 450.0, 1.0, 24.0);
//! let predictions = PerTarget { bod: 2.0, cod: 10.0, dissolved_oxygen: 7.5 };
//! let verdict = classify(&observation, &predictions);
//! assert_eq!(verdict.status, QualityStatus::Good);
//! ```

// Core modules
pub mod types;
pub mod error;
pub mod dataset;
pub mod model;
pub mod classifier;
pub mod publisher;
pub mod trainer;
pub mod sampler;
pub mod monitor;

// Application glue
pub mod config;
pub mod server;
pub mod cli;

// Re-export commonly used types for convenience
pub use classifier::{classify, QualityStatus, QualityVerdict};
pub use config::Config;
pub use dataset::DatasetStore;
pub use error::{
    DatasetError, DeviceError, FeedbackError, FitError, RegistryError, SchemaError, TickError,
    TrainError,
};
pub use model::{Estimator, ForestEstimator, ModelRegistry, ModelSet};
pub use monitor::{Monitor, MonitorSettings, Phase, SelfLearning};
pub use publisher::{BroadcastPublisher, Event, MemoryPublisher, Publisher};
pub use sampler::{Sampler, SourceKind, SyntheticSource};
pub use trainer::{Trainer, TrainingOutcome, TrainingReason};
pub use types::{Observation, PerTarget, PredictionSet, ResultPacket};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
