//! Shared types used across modules
//!
//! Sensor observations, per-target values and the result packet pushed to
//! viewers. Column names here are the dataset header names.

use serde::{Deserialize, Serialize};

use crate::classifier::QualityVerdict;

/// Number of sensor features fed to every model
pub const FEATURE_COUNT: usize = 4;

/// Sensor feature columns, in model input order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "pH")]
    Ph,
    #[serde(rename = "TDS")]
    Tds,
    Turbidity,
    Temperature,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Ph,
        Feature::Tds,
        Feature::Turbidity,
        Feature::Temperature,
    ];

    /// Dataset column name
    pub fn column(&self) -> &'static str {
        match self {
            Feature::Ph => "pH",
            Feature::Tds => "TDS",
            Feature::Turbidity => "Turbidity",
            Feature::Temperature => "Temperature",
        }
    }

    /// Position in the model input vector
    pub fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Predicted water-quality metrics, one model each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "BOD")]
    Bod,
    #[serde(rename = "COD")]
    Cod,
    #[serde(rename = "DO")]
    Do,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Bod, Target::Cod, Target::Do];

    /// Dataset column name
    pub fn column(&self) -> &'static str {
        match self {
            Target::Bod => "BOD",
            Target::Cod => "COD",
            Target::Do => "DO",
        }
    }

    /// File name of the persisted artifact for this target
    pub fn artifact_file(&self) -> &'static str {
        match self {
            Target::Bod => "bod_model.json",
            Target::Cod => "cod_model.json",
            Target::Do => "do_model.json",
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// All columns a dataset must carry: the four features, then the three targets
pub fn required_columns() -> Vec<&'static str> {
    Feature::ALL
        .iter()
        .map(|f| f.column())
        .chain(Target::ALL.iter().map(|t| t.column()))
        .collect()
}

/// One sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "pH")]
    pub ph: f64,
    #[serde(rename = "TDS")]
    pub tds: f64,
    #[serde(rename = "Turbidity")]
    pub turbidity: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
}

impl Observation {
    pub fn new(ph: f64, tds: f64, turbidity: f64, temperature: f64) -> Self {
        Self { ph, tds, turbidity, temperature }
    }

    /// Build from a feature vector in `Feature::ALL` order
    pub fn from_features(values: [f64; FEATURE_COUNT]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Model input vector in `Feature::ALL` order
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [self.ph, self.tds, self.turbidity, self.temperature]
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.features()[feature.index()]
    }
}

/// One value per predicted target
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerTarget<T> {
    #[serde(rename = "BOD")]
    pub bod: T,
    #[serde(rename = "COD")]
    pub cod: T,
    #[serde(rename = "DO")]
    pub dissolved_oxygen: T,
}

impl<T> PerTarget<T> {
    pub fn from_fn(mut f: impl FnMut(Target) -> T) -> Self {
        Self {
            bod: f(Target::Bod),
            cod: f(Target::Cod),
            dissolved_oxygen: f(Target::Do),
        }
    }

    /// Build target by target in `Target::ALL` order, stopping at the first error
    pub fn try_from_fn<E>(mut f: impl FnMut(Target) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            bod: f(Target::Bod)?,
            cod: f(Target::Cod)?,
            dissolved_oxygen: f(Target::Do)?,
        })
    }

    pub fn get(&self, target: Target) -> &T {
        match target {
            Target::Bod => &self.bod,
            Target::Cod => &self.cod,
            Target::Do => &self.dissolved_oxygen,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Target, &T) -> U) -> PerTarget<U> {
        PerTarget::from_fn(|target| f(target, self.get(target)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Target, &T)> {
        Target::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}

/// Predicted BOD, COD and DO for one observation
pub type PredictionSet = PerTarget<f64>;

/// Relative contribution of each feature, in percent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureWeights {
    #[serde(rename = "pH")]
    pub ph: f64,
    #[serde(rename = "TDS")]
    pub tds: f64,
    #[serde(rename = "Turbidity")]
    pub turbidity: f64,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
}

impl FeatureWeights {
    /// Convert raw importances (fractions summing to ~1) into percentages
    /// rounded to one decimal.
    pub fn from_fractions(fractions: &[f64; FEATURE_COUNT]) -> Self {
        let pct = |v: f64| round_to(v * 100.0, 1);
        Self {
            ph: pct(fractions[0]),
            tds: pct(fractions[1]),
            turbidity: pct(fractions[2]),
            temperature: pct(fractions[3]),
        }
    }
}

/// Per-target feature importances
pub type ImportanceSet = PerTarget<FeatureWeights>;

/// An observation labelled with target values, as appended to the dataset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledRow {
    pub observation: Observation,
    pub labels: PredictionSet,
}

impl LabeledRow {
    pub fn new(observation: Observation, labels: PredictionSet) -> Self {
        Self { observation, labels }
    }

    /// Value for a dataset column, `None` for columns this row doesn't carry
    pub fn value(&self, column: &str) -> Option<f64> {
        Feature::ALL
            .iter()
            .find(|f| f.column() == column)
            .map(|f| self.observation.get(*f))
            .or_else(|| {
                Target::ALL
                    .iter()
                    .find(|t| t.column() == column)
                    .map(|t| *self.labels.get(*t))
            })
    }
}

/// Combined per-cycle packet pushed to viewers as `update_data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPacket {
    pub inputs: Observation,
    pub predictions: PredictionSet,
    pub quality: QualityVerdict,
    pub importances: ImportanceSet,
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
