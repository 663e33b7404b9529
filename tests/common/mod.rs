//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aqua_monitor::dataset::{DatasetStore, TrainingRow};
use aqua_monitor::error::FitError;
use aqua_monitor::model::{
    Estimator, ForestEstimator, ForestParams, ModelArtifact, ModelRegistry, RandomForest,
};
use aqua_monitor::publisher::{MemoryPublisher, Publisher};
use aqua_monitor::trainer::Trainer;
use aqua_monitor::types::Target;

pub const HEADER: &str = "pH,TDS,Turbidity,Temperature,BOD,COD,DO";

/// Deterministic rows with targets that depend on the features
pub fn sample_rows(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let ph = 6.5 + (i % 10) as f64 * 0.2;
            let tds = 300.0 + i as f64 * 15.0;
            let turbidity = 0.5 + (i % 7) as f64 * 0.9;
            let temperature = 20.0 + (i % 5) as f64 * 3.0;
            let bod = 1.0 + turbidity * 0.6;
            let cod = bod * 4.0 + tds / 200.0;
            let dissolved_oxygen = 9.0 - temperature * 0.15;
            format!(
                "{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
                ph, tds, turbidity, temperature, bod, cod, dissolved_oxygen
            )
        })
        .collect()
}

pub fn write_csv(path: &Path, header: &str, rows: &[String]) {
    let mut contents = String::from(header);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    std::fs::write(path, contents).unwrap();
}

pub fn small_forest() -> ForestParams {
    ForestParams {
        n_estimators: 8,
        ..ForestParams::default()
    }
}

/// Dataset, registry and trainer rooted in one directory
pub struct Fixture {
    pub dataset_path: PathBuf,
    pub models_dir: PathBuf,
    pub store: Arc<DatasetStore>,
    pub registry: Arc<ModelRegistry>,
    pub publisher: Arc<MemoryPublisher>,
}

impl Fixture {
    pub fn new(root: &Path) -> Self {
        let dataset_path = root.join("wastewater_data.csv");
        let models_dir = root.join("models");
        Self {
            store: Arc::new(DatasetStore::new(&dataset_path)),
            registry: Arc::new(ModelRegistry::new(&models_dir)),
            publisher: Arc::new(MemoryPublisher::new()),
            dataset_path,
            models_dir,
        }
    }

    pub fn with_dataset(root: &Path, rows: usize) -> Self {
        let fixture = Self::new(root);
        write_csv(&fixture.dataset_path, HEADER, &sample_rows(rows));
        fixture
    }

    pub fn trainer(&self) -> Arc<Trainer> {
        self.trainer_with(Arc::new(ForestEstimator::new(small_forest())))
    }

    pub fn trainer_with(&self, estimator: Arc<dyn Estimator>) -> Arc<Trainer> {
        Arc::new(Trainer::new(
            self.store.clone(),
            self.registry.clone(),
            estimator,
            self.publisher.clone() as Arc<dyn Publisher>,
        ))
    }

    pub fn artifact_bytes(&self) -> Vec<Vec<u8>> {
        Target::ALL
            .iter()
            .map(|t| std::fs::read(self.registry.artifact_path(*t)).unwrap())
            .collect()
    }

    pub fn line_count(&self) -> usize {
        std::fs::read_to_string(&self.dataset_path).unwrap().lines().count()
    }
}

/// Fits normally except for one target
pub struct FailingEstimator {
    pub fail_on: Target,
    pub inner: ForestEstimator,
}

impl FailingEstimator {
    pub fn new(fail_on: Target) -> Self {
        Self {
            fail_on,
            inner: ForestEstimator::new(small_forest()),
        }
    }
}

impl Estimator for FailingEstimator {
    fn fit(&self, target: Target, rows: &[TrainingRow]) -> Result<ModelArtifact, FitError> {
        if target == self.fail_on {
            return Err(FitError::Other(format!("injected failure for {}", target)));
        }
        self.inner.fit(target, rows)
    }
}

/// Fits one target on labels at `f64::MAX`, so its ensemble mean overflows
/// and every prediction for that target is infinite
pub struct OverflowingEstimator {
    pub target: Target,
    pub inner: ForestEstimator,
}

impl OverflowingEstimator {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            inner: ForestEstimator::new(small_forest()),
        }
    }
}

impl Estimator for OverflowingEstimator {
    fn fit(&self, target: Target, rows: &[TrainingRow]) -> Result<ModelArtifact, FitError> {
        if target != self.target {
            return self.inner.fit(target, rows);
        }
        let x: Vec<_> = rows.iter().map(|r| r.features).collect();
        let y = vec![f64::MAX; rows.len()];
        let model = RandomForest::fit(&x, &y, &small_forest())?;
        Ok(ModelArtifact::new(target, rows.len(), model))
    }
}
