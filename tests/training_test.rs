//! Trainer and model registry behaviour against real files

mod common;

use std::sync::Arc;

use aqua_monitor::dataset::DatasetStore;
use aqua_monitor::error::TrainError;
use aqua_monitor::model::ForestEstimator;
use aqua_monitor::publisher::Publisher;
use aqua_monitor::trainer::{
    Trainer, TrainingReason, STATUS_CLEANED, STATUS_LOADING, STATUS_TRAINED,
};
use aqua_monitor::types::{Observation, PerTarget, Target};
use common::{sample_rows, write_csv, FailingEstimator, Fixture};

#[test]
fn test_fresh_training_persists_and_serves_all_targets() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 40);
    let trainer = fixture.trainer();

    let outcome = trainer.train(false).unwrap();
    assert!(outcome.trained);
    assert_eq!(outcome.reason, TrainingReason::Trained { rows: 40 });

    for target in Target::ALL {
        assert!(fixture.registry.artifact_path(target).exists(), "{} missing", target);
    }
    assert_eq!(
        fixture.publisher.statuses(),
        vec![STATUS_LOADING, STATUS_CLEANED, STATUS_TRAINED]
    );

    let models = fixture.registry.snapshot().expect("models served after training");
    let predictions = models.predict(&Observation::new(7.0, 500.0, 2.0, 25.0)).unwrap();
    assert!(predictions.bod > 0.0);
    assert!(predictions.cod > predictions.bod);
}

#[test]
fn test_missing_column_is_reported_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let rows: Vec<String> = sample_rows(10)
        .iter()
        .map(|r| r.rsplit_once(',').unwrap().0.to_string())
        .collect();
    write_csv(&fixture.dataset_path, "pH,TDS,Turbidity,Temperature,BOD,COD", &rows);

    let err = fixture.trainer().train(false).unwrap_err();
    match &err {
        TrainError::Schema(schema) => assert_eq!(schema.missing, vec!["DO".to_string()]),
        other => panic!("expected schema error, got {:?}", other),
    }

    let statuses = fixture.publisher.statuses();
    assert_eq!(statuses.last().unwrap(), "Error: CSV missing columns: DO");
    assert!(!fixture.registry.artifacts_exist());
}

#[test]
fn test_missing_dataset_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());

    let err = fixture.trainer().train(false).unwrap_err();
    assert!(matches!(err, TrainError::DatasetNotFound(_)));
    assert_eq!(
        fixture.publisher.statuses().last().unwrap(),
        "Error: wastewater_data.csv not found."
    );
}

#[test]
fn test_existing_artifacts_skip_training_without_reading_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 30);
    fixture.trainer().train(false).unwrap();
    let before = fixture.artifact_bytes();
    let statuses_before = fixture.publisher.statuses().len();

    std::fs::remove_file(&fixture.dataset_path).unwrap();
    let outcome = fixture.trainer().train(false).unwrap();

    assert!(!outcome.trained);
    assert_eq!(outcome.reason, TrainingReason::Skipped);
    assert_eq!(fixture.artifact_bytes(), before);
    assert_eq!(fixture.publisher.statuses().len(), statuses_before);
}

#[test]
fn test_incomplete_rows_are_dropped_before_fitting() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(dir.path());
    let mut rows = sample_rows(20);
    rows.push("7.1,,1.2,24.0,2.0,9.0,7.5".to_string());
    rows.push("7.1,420.0,1.2,24.0,2.0,9.0,".to_string());
    rows.push("7.1,420.0,NaN,24.0,2.0,9.0,7.5".to_string());
    write_csv(&fixture.dataset_path, common::HEADER, &rows);

    let outcome = fixture.trainer().train(true).unwrap();
    assert_eq!(outcome.reason, TrainingReason::Trained { rows: 20 });
}

#[test]
fn test_failed_retrain_keeps_previous_models() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 30);
    fixture.trainer().train(false).unwrap();
    let served = fixture.registry.snapshot().unwrap();
    let before = fixture.artifact_bytes();

    let failing = fixture.trainer_with(Arc::new(FailingEstimator::new(Target::Cod)));
    let err = failing.train(true).unwrap_err();
    assert!(matches!(err, TrainError::Training { target: Target::Cod, .. }));

    // Nothing on disk or in memory changed, including the BOD artifact fitted
    // before the failure
    assert_eq!(fixture.artifact_bytes(), before);
    assert!(Arc::ptr_eq(&served, &fixture.registry.snapshot().unwrap()));

    let leftovers: Vec<_> = std::fs::read_dir(&fixture.models_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let last = fixture.publisher.statuses().last().cloned().unwrap();
    assert!(last.starts_with("Training Error: "), "{}", last);
}

#[test]
fn test_retrain_swaps_whole_set_and_old_snapshot_stays_usable() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 30);
    fixture.trainer().train(false).unwrap();
    let old = fixture.registry.snapshot().unwrap();

    write_csv(&fixture.dataset_path, common::HEADER, &sample_rows(60));
    fixture.trainer().train(true).unwrap();
    let new = fixture.registry.snapshot().unwrap();

    assert!(!Arc::ptr_eq(&old, &new));
    for target in Target::ALL {
        assert_eq!(new.get(target).rows, 60);
        assert_eq!(old.get(target).rows, 30);
    }
    // A cycle still holding the old snapshot can finish with it
    assert!(old.predict(&Observation::new(7.0, 500.0, 2.0, 25.0)).is_ok());
}

#[test]
fn test_corrupt_artifact_fails_registry_load() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 20);
    fixture.trainer().train(false).unwrap();

    std::fs::write(fixture.registry.artifact_path(Target::Do), b"{ not json").unwrap();
    let fresh = aqua_monitor::model::ModelRegistry::new(&fixture.models_dir);
    assert!(fresh.load().is_err());
    assert!(fresh.snapshot().is_none());
}

#[test]
fn test_overlapping_retrains_serve_one_pass_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 30);
    fixture.trainer().train(false).unwrap();

    let larger_path = dir.path().join("larger.csv");
    write_csv(&larger_path, common::HEADER, &sample_rows(60));
    let larger = Arc::new(Trainer::new(
        Arc::new(DatasetStore::new(&larger_path)),
        fixture.registry.clone(),
        Arc::new(ForestEstimator::new(common::small_forest())),
        fixture.publisher.clone() as Arc<dyn Publisher>,
    ));
    let smaller = fixture.trainer();

    std::thread::scope(|scope| {
        for trainer in [smaller, larger] {
            scope.spawn(move || {
                for _ in 0..4 {
                    let outcome = trainer.train(true).unwrap();
                    let TrainingReason::Trained { rows } = outcome.reason else {
                        panic!("forced retrain skipped");
                    };
                    assert!(rows == 30 || rows == 60);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..40 {
                let rows = fixture.registry.snapshot().unwrap().map(|_, a| a.rows);
                assert!(
                    rows.bod == rows.cod && rows.cod == rows.dissolved_oxygen,
                    "mixed set served: {:?}",
                    rows
                );
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
        });
    });

    // What is served is exactly what is on disk
    let served = fixture.registry.snapshot().unwrap().map(|_, a| a.rows);
    let on_disk = fixture.registry.read_all().unwrap().map(|_, a| a.rows);
    assert_eq!(served, on_disk);
}

#[test]
fn test_successful_retrain_serves_the_fitted_set() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = Fixture::with_dataset(dir.path(), 30);
    fixture.trainer().train(false).unwrap();

    write_csv(&fixture.dataset_path, common::HEADER, &sample_rows(45));
    let outcome = fixture.trainer().train(true).unwrap();

    assert_eq!(outcome.reason, TrainingReason::Trained { rows: 45 });
    let served = fixture.registry.snapshot().unwrap();
    assert_eq!(served.map(|_, a| a.rows), PerTarget { bod: 45, cod: 45, dissolved_oxygen: 45 });
    assert_eq!(fixture.publisher.statuses().last().unwrap(), STATUS_TRAINED);
}
