//! Water safety classification
//!
//! Hazardous rules are checked first and, if any fire, Moderate rules are not
//! consulted at all. Every firing rule within a tier contributes a reason.

use serde::{Deserialize, Serialize};

use crate::types::{Observation, PredictionSet};

pub const PH_SAFE_MIN: f64 = 6.5;
pub const PH_SAFE_MAX: f64 = 8.5;
pub const TURBIDITY_HAZARD: f64 = 5.0;
pub const TURBIDITY_ELEVATED: f64 = 1.0;
pub const DO_HAZARD: f64 = 4.0;
pub const DO_LOW: f64 = 5.0;
pub const BOD_HAZARD: f64 = 6.0;
pub const BOD_ELEVATED: f64 = 2.0;

/// Reason given when nothing is out of range
pub const GOOD_REASON: &str = "All parameters are within optimal range.";

/// Safety tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityStatus {
    Good,
    Moderate,
    Hazardous,
}

impl std::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityStatus::Good => write!(f, "Good"),
            QualityStatus::Moderate => write!(f, "Moderate"),
            QualityStatus::Hazardous => write!(f, "Hazardous"),
        }
    }
}

/// Tier plus the human-readable reasons behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub status: QualityStatus,
    pub reasons: Vec<String>,
}

/// Classify one sample from its raw inputs and predicted targets
pub fn classify(observation: &Observation, predictions: &PredictionSet) -> QualityVerdict {
    let ph = observation.ph;
    let turbidity = observation.turbidity;
    let dissolved_oxygen = predictions.dissolved_oxygen;
    let bod = predictions.bod;

    let mut hazards = Vec::new();
    if !(PH_SAFE_MIN..=PH_SAFE_MAX).contains(&ph) {
        hazards.push(format!(
            "pH ({:.1}) is outside safe range ({}-{})",
            ph, PH_SAFE_MIN, PH_SAFE_MAX
        ));
    }
    if turbidity > TURBIDITY_HAZARD {
        hazards.push(format!("Turbidity ({:.1} NTU) is too high (> {})", turbidity, TURBIDITY_HAZARD));
    }
    if dissolved_oxygen < DO_HAZARD {
        hazards.push(format!("DO ({:.1} mg/L) is too low (< {})", dissolved_oxygen, DO_HAZARD));
    }
    if bod > BOD_HAZARD {
        hazards.push(format!("BOD ({:.1} mg/L) is too high (> {})", bod, BOD_HAZARD));
    }
    if !hazards.is_empty() {
        return QualityVerdict { status: QualityStatus::Hazardous, reasons: hazards };
    }

    let mut concerns = Vec::new();
    if turbidity > TURBIDITY_ELEVATED {
        concerns.push(format!("Turbidity ({:.1} NTU) is elevated (> {})", turbidity, TURBIDITY_ELEVATED));
    }
    if dissolved_oxygen < DO_LOW {
        concerns.push(format!("DO ({:.1} mg/L) is low (< {})", dissolved_oxygen, DO_LOW));
    }
    if bod > BOD_ELEVATED {
        concerns.push(format!("BOD ({:.1} mg/L) is elevated (> {})", bod, BOD_ELEVATED));
    }
    if !concerns.is_empty() {
        return QualityVerdict { status: QualityStatus::Moderate, reasons: concerns };
    }

    QualityVerdict {
        status: QualityStatus::Good,
        reasons: vec![GOOD_REASON.to_string()],
    }
}
