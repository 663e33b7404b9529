//! Sampling loop
//!
//! One loop per process samples, predicts, classifies and publishes, then
//! hands the observation to self-learning without waiting for it. The loop
//! starts on the first viewer connection and never stops on a per-tick error.

pub mod feedback;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::error::TickError;
use crate::model::ModelRegistry;
use crate::publisher::Publisher;
use crate::sampler::{DeviceConnector, Sampler, SourceKind, SyntheticSource};
use crate::types::{LabeledRow, ResultPacket};

pub use feedback::SelfLearning;

/// Shown to viewers when the loop can't start for lack of models
pub const STATUS_MODELS_UNAVAILABLE: &str = "Error: Could not load ML models. Please restart.";

/// Where the loop is within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Sampling = 1,
    Predicting = 2,
    Classifying = 3,
    Publishing = 4,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Phase::Sampling,
            2 => Phase::Predicting,
            3 => Phase::Classifying,
            4 => Phase::Publishing,
            _ => Phase::Idle,
        }
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    /// Wait after each tick's work
    pub interval: Duration,
    /// Extra pause after a failed tick
    pub cooldown: Duration,
    /// Bound on each device read
    pub read_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Published(ResultPacket),
    /// No observation this cycle
    Skipped,
}

/// Snapshot served on `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub phase: Phase,
    pub source: Option<SourceKind>,
    pub ticks_completed: u64,
    pub ticks_failed: u64,
    pub retrains_in_flight: usize,
}

pub struct Monitor {
    registry: Arc<ModelRegistry>,
    publisher: Arc<dyn Publisher>,
    feedback: Arc<SelfLearning>,
    connector: Option<Arc<dyn DeviceConnector>>,
    settings: MonitorSettings,
    started: AtomicBool,
    phase: AtomicU8,
    ticks: AtomicU64,
    failures: AtomicU64,
    source: RwLock<Option<SourceKind>>,
}

impl Monitor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        publisher: Arc<dyn Publisher>,
        feedback: Arc<SelfLearning>,
        connector: Option<Arc<dyn DeviceConnector>>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            registry,
            publisher,
            feedback,
            connector,
            settings,
            started: AtomicBool::new(false),
            phase: AtomicU8::new(Phase::Idle as u8),
            ticks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            source: RwLock::new(None),
        }
    }

    /// Start the loop unless it already runs. Returns whether this call
    /// started it.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.run().await });
        true
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Cycles that ended in an error; the loop carried on after each
    pub fn ticks_failed(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        *self.source.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running(),
            phase: self.phase(),
            source: self.source_kind(),
            ticks_completed: self.ticks_completed(),
            ticks_failed: self.ticks_failed(),
            retrains_in_flight: self.feedback.in_flight(),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Pick the observation source for this process
    pub async fn establish_sampler(&self) -> Sampler {
        let sampler = Sampler::establish(
            self.connector.as_deref(),
            self.settings.read_timeout,
            SyntheticSource::new(),
        )
        .await;
        *self.source.write().unwrap_or_else(|p| p.into_inner()) = Some(sampler.kind());
        sampler
    }

    async fn run(&self) {
        info!("Starting sampling loop");
        let mut sampler = self.establish_sampler().await;

        if self.registry.snapshot().is_none() {
            if let Err(e) = self.registry.load() {
                error!("FATAL: could not load ML models, sampling loop not started: {}", e);
                self.publisher.publish_status(STATUS_MODELS_UNAVAILABLE);
                return;
            }
        }

        loop {
            match self.tick(&mut sampler).await {
                Ok(TickOutcome::Published(packet)) => {
                    debug!("Published {} sample", packet.quality.status);
                }
                Ok(TickOutcome::Skipped) => {}
                Err(e) => {
                    warn!("Error in sampling cycle: {}", e);
                    self.failures.fetch_add(1, Ordering::AcqRel);
                    self.set_phase(Phase::Idle);
                    tokio::time::sleep(self.settings.cooldown).await;
                }
            }
            self.set_phase(Phase::Idle);
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// One cycle: sample, predict, classify, publish, dispatch self-learning.
    /// The model set is snapshotted once so a concurrent retrain can't change
    /// it part way through.
    pub async fn tick(&self, sampler: &mut Sampler) -> Result<TickOutcome, TickError> {
        self.set_phase(Phase::Sampling);
        let observation = match sampler.sample().await {
            Ok(observation) => observation,
            Err(e) => {
                debug!("No observation this cycle: {}", e);
                return Ok(TickOutcome::Skipped);
            }
        };

        self.set_phase(Phase::Predicting);
        let models = self.registry.snapshot().ok_or(TickError::ModelsUnavailable)?;
        let predictions = models.predict(&observation)?;
        let importances = models.importances();

        self.set_phase(Phase::Classifying);
        let quality = classify(&observation, &predictions);

        self.set_phase(Phase::Publishing);
        let packet = ResultPacket {
            inputs: observation,
            predictions,
            quality,
            importances,
        };
        self.publisher.publish_result(&packet);
        self.ticks.fetch_add(1, Ordering::AcqRel);

        // Detached: the next tick never waits on a retrain
        drop(self.feedback.dispatch(LabeledRow::new(observation, predictions)));

        Ok(TickOutcome::Published(packet))
    }
}
