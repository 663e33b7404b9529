//! Self-learning feedback
//!
//! Each published observation is appended to the dataset with its predicted
//! targets as labels, then a forced retrain runs. These passes are detached
//! from the sampling loop and may overlap one another; appends are serialised
//! by the dataset store, training passes are not.
//!
//! Predicted values are treated as ground truth here, so over time the models
//! drift toward their own earlier outputs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dataset::DatasetStore;
use crate::error::FeedbackError;
use crate::trainer::{Trainer, TrainingOutcome};
use crate::types::LabeledRow;

pub struct SelfLearning {
    store: Arc<DatasetStore>,
    trainer: Arc<Trainer>,
    in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SelfLearning {
    pub fn new(store: Arc<DatasetStore>, trainer: Arc<Trainer>) -> Self {
        Self {
            store,
            trainer,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Retrain passes currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Append `row` and retrain, blocking the calling thread
    pub fn feedback(&self, row: &LabeledRow) -> Result<TrainingOutcome, FeedbackError> {
        let _guard = InFlight::enter(&self.in_flight);
        self.store.append(row)?;
        Ok(self.trainer.train(true)?)
    }

    /// Run [`feedback`](Self::feedback) on the blocking pool. Failures are
    /// logged inside the task. The sampling loop drops the handle without
    /// awaiting it.
    pub fn dispatch(self: &Arc<Self>, row: LabeledRow) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || match this.feedback(&row) {
            Ok(outcome) => debug!("Self-learning pass finished: {:?}", outcome.reason),
            Err(e) => warn!("Error during self-learning: {}", e),
        })
    }
}
