//! Dataset Store - append-only CSV of historical observations
//!
//! The header fixes the column order. Rows are never rewritten: the self-learning
//! loop only appends, one record per write.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{DatasetError, SchemaError};
use crate::types::{
    required_columns, Feature, LabeledRow, PerTarget, PredictionSet, Target, FEATURE_COUNT,
};

/// One dataset row restricted to the required columns; cells that are empty or
/// non-numeric are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub features: [Option<f64>; FEATURE_COUNT],
    pub targets: PerTarget<Option<f64>>,
}

impl DatasetRow {
    /// The row as training input, or `None` if any required cell is missing
    pub fn complete(&self) -> Option<TrainingRow> {
        let mut features = [0.0; FEATURE_COUNT];
        for (slot, value) in features.iter_mut().zip(self.features.iter()) {
            *slot = (*value)?;
        }
        let targets = PerTarget::try_from_fn(|t| (*self.targets.get(t)).ok_or(())).ok()?;
        Some(TrainingRow { features, targets })
    }
}

/// A fully populated row, ready for fitting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingRow {
    pub features: [f64; FEATURE_COUNT],
    pub targets: PredictionSet,
}

/// A loaded dataset
#[derive(Debug, Clone)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop every row missing any required value
    pub fn complete_rows(&self) -> Vec<TrainingRow> {
        self.rows.iter().filter_map(DatasetRow::complete).collect()
    }
}

/// Positions of the required columns within a header
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    features: [usize; FEATURE_COUNT],
    targets: PerTarget<usize>,
}

/// Check that every required column is present, reporting all that are not
pub fn validate_schema(columns: &[String]) -> Result<(), SchemaError> {
    column_index(columns).map(|_| ())
}

fn column_index(columns: &[String]) -> Result<ColumnIndex, SchemaError> {
    let position = |name: &str| columns.iter().position(|c| c == name);

    let missing: Vec<String> = required_columns()
        .into_iter()
        .filter(|name| position(*name).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError { missing });
    }

    let mut features = [0; FEATURE_COUNT];
    for feature in Feature::ALL {
        features[feature.index()] = position(feature.column()).unwrap_or_default();
    }
    let targets = PerTarget::from_fn(|t: Target| position(t.column()).unwrap_or_default());
    Ok(ColumnIndex { features, targets })
}

fn parse_cell(cell: Option<&str>) -> Option<f64> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Handle to the dataset file
#[derive(Debug)]
pub struct DatasetStore {
    path: PathBuf,
    /// Serialises appends from overlapping retrain tasks
    append_lock: Mutex<()>,
}

impl DatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn open(&self) -> Result<File, DatasetError> {
        File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DatasetError::NotFound(self.path.clone()),
            _ => DatasetError::Io(e),
        })
    }

    /// Read only the header row
    pub fn header(&self) -> Result<Vec<String>, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(self.open()?);
        Ok(reader.headers()?.iter().map(|h| h.trim().to_string()).collect())
    }

    /// Load every row, validating the schema first
    pub fn load(&self) -> Result<Dataset, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(self.open()?);

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let index = column_index(&columns)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut features = [None; FEATURE_COUNT];
            for (slot, col) in features.iter_mut().zip(index.features.iter()) {
                *slot = parse_cell(record.get(*col));
            }
            let targets = index.targets.map(|_, col| parse_cell(record.get(*col)));
            rows.push(DatasetRow { features, targets });
        }

        debug!("Loaded {} rows from {}", rows.len(), self.path.display());
        Ok(Dataset { columns, rows })
    }

    /// Append one row, reindexed to the current header. Columns the row doesn't
    /// carry are written empty. Prior bytes are never touched.
    pub fn append(&self, row: &LabeledRow) -> Result<(), DatasetError> {
        let columns = self.header()?;
        if columns.is_empty() {
            return Err(SchemaError {
                missing: required_columns().into_iter().map(str::to_string).collect(),
            }
            .into());
        }

        let fields: Vec<String> = columns
            .iter()
            .map(|c| row.value(c).map(|v| v.to_string()).unwrap_or_default())
            .collect();

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DatasetError::NotFound(self.path.clone()),
                _ => DatasetError::Io(e),
            })?;

        let mut record = Vec::new();
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                record.push(b'\n');
            }
        }
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut record);
            writer.write_record(&fields)?;
            writer.flush()?;
        }

        // One write per record so concurrent appenders never interleave
        file.write_all(&record)?;
        debug!("Appended 1 row to {}", self.path.display());
        Ok(())
    }
}
