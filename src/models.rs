//! Data models for analysis results and related structures
//!
//! Defines the core data structures used throughout the crate. An
//! [`AnalysisResult`] can only be assembled through [`AnalysisResult::from_detection`],
//! which derives every dependent field, so a result is consistent and immutable
//! once produced.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Confidence (percent) below which a non-positive verdict becomes uncertain
pub const UNCERTAIN_CONFIDENCE_THRESHOLD: f64 = 70.0;

/// Parasite counts strictly above this are at least moderate severity
pub const MODERATE_PARASITE_THRESHOLD: u32 = 5;

/// Parasite counts strictly above this are high severity
pub const HIGH_PARASITE_THRESHOLD: u32 = 15;

/// Client-side verdict for one analysed image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Positive,
    Negative,
    Uncertain,
}

impl Prediction {
    /// Classify a backend verdict.
    ///
    /// A positive verdict is kept as-is. Anything else reads as negative and is
    /// promoted to uncertain when the confidence is under 70%.
    pub fn classify(backend_positive: bool, confidence: f64) -> Self {
        if backend_positive {
            Prediction::Positive
        } else if confidence < UNCERTAIN_CONFIDENCE_THRESHOLD {
            Prediction::Uncertain
        } else {
            Prediction::Negative
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Positive => "positive",
            Prediction::Negative => "negative",
            Prediction::Uncertain => "uncertain",
        }
    }

    /// Clinical follow-up lines shown alongside a result
    pub fn recommendations(&self) -> [&'static str; 3] {
        match self {
            Prediction::Positive => [
                "Immediate medical attention recommended",
                "Confirm with microscopy examination",
                "Start treatment protocol",
            ],
            Prediction::Uncertain => [
                "Manual microscopy review recommended",
                "Consider re-sampling if image quality is low",
                "Monitor patient symptoms closely",
            ],
            Prediction::Negative => [
                "No parasites detected in this sample",
                "Consider clinical symptoms",
                "Repeat test if symptoms persist",
            ],
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Prediction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Prediction::Positive),
            "negative" => Ok(Prediction::Negative),
            "uncertain" => Ok(Prediction::Uncertain),
            other => Err(format!("Unknown prediction: {}", other)),
        }
    }
}

/// Three-tier classification derived from the parasite count
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
}

impl Severity {
    /// `> 15` is high, `> 5` is moderate, everything else is low.
    pub fn from_parasite_count(count: u32) -> Self {
        if count > HIGH_PARASITE_THRESHOLD {
            Severity::High
        } else if count > MODERATE_PARASITE_THRESHOLD {
            Severity::Moderate
        } else {
            Severity::Low
        }
    }

    /// Map the prediction service's free-form severity vocabulary
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" | "severe" => Severity::High,
            "medium" | "moderate" => Severity::Moderate,
            _ => Severity::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Moderate => "moderate",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split of the detected parasites across life-cycle stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParasiteStages {
    pub ring: u32,
    pub trophozoite: u32,
    pub schizont: u32,
}

impl ParasiteStages {
    /// Fixed 50/30/remainder allocation; schizont absorbs the rounding.
    pub fn split(total: u32) -> Self {
        let ring = total / 2;
        let trophozoite = (u64::from(total) * 3 / 10) as u32;
        Self {
            ring,
            trophozoite,
            schizont: total - ring - trophozoite,
        }
    }

    pub fn total(&self) -> u32 {
        self.ring + self.trophozoite + self.schizont
    }
}

/// Placeholder detection rectangle in a 500x500 frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f64,
}

/// Raw inputs a predictor hands over to build a result
#[derive(Debug, Clone)]
pub struct Detection {
    pub prediction: Prediction,
    /// Percentage, clamped into [0, 100] on assembly
    pub confidence: f64,
    pub parasites_detected: u32,
    pub cells_analyzed: u32,
    pub processing_time_secs: f64,
    pub bounding_boxes: Vec<BoundingBox>,
}

/// Outcome of analysing one blood-smear image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    id: String,
    prediction: Prediction,
    confidence: f64,
    parasites_detected: u32,
    parasite_stages: ParasiteStages,
    infection_rate: f64,
    cells_analyzed: u32,
    infected_cells: u32,
    severity: Severity,
    processing_time: f64,
    bounding_boxes: Vec<BoundingBox>,
}

impl AnalysisResult {
    /// Assemble a result, deriving stages, infection rate and severity
    pub fn from_detection(detection: Detection) -> Self {
        let parasites = detection.parasites_detected;
        let cells_analyzed = detection.cells_analyzed.max(parasites);

        let infection_rate = if cells_analyzed == 0 {
            0.0
        } else {
            round_to(parasites as f64 / cells_analyzed as f64 * 100.0, 2)
        };

        let confidence = if detection.confidence.is_finite() {
            round_to(detection.confidence.clamp(0.0, 100.0), 1)
        } else {
            0.0
        };

        let mut bounding_boxes = detection.bounding_boxes;
        bounding_boxes.truncate(parasites as usize);

        Self {
            id: format!("analysis-{}", Uuid::new_v4()),
            prediction: detection.prediction,
            confidence,
            parasites_detected: parasites,
            parasite_stages: ParasiteStages::split(parasites),
            infection_rate,
            cells_analyzed,
            infected_cells: parasites,
            severity: Severity::from_parasite_count(parasites),
            processing_time: round_to(detection.processing_time_secs.max(0.0), 1),
            bounding_boxes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prediction(&self) -> Prediction {
        self.prediction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn parasites_detected(&self) -> u32 {
        self.parasites_detected
    }

    pub fn parasite_stages(&self) -> ParasiteStages {
        self.parasite_stages
    }

    /// Percentage of analysed cells found infected, two decimals
    pub fn infection_rate(&self) -> f64 {
        self.infection_rate
    }

    pub fn cells_analyzed(&self) -> u32 {
        self.cells_analyzed
    }

    pub fn infected_cells(&self) -> u32 {
        self.infected_cells
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Seconds, one decimal
    pub fn processing_time(&self) -> f64 {
        self.processing_time
    }

    pub fn bounding_boxes(&self) -> &[BoundingBox] {
        &self.bounding_boxes
    }

    pub fn recommendations(&self) -> [&'static str; 3] {
        self.prediction.recommendations()
    }

    /// Whether the derived fields agree with each other.
    ///
    /// Always true for results built by [`AnalysisResult::from_detection`];
    /// deserialized results must be checked before they are trusted.
    pub fn is_consistent(&self) -> bool {
        let stages = &self.parasite_stages;
        let stage_total =
            u64::from(stages.ring) + u64::from(stages.trophozoite) + u64::from(stages.schizont);

        stage_total == u64::from(self.parasites_detected)
            && self.infected_cells == self.parasites_detected
            && self.cells_analyzed >= self.parasites_detected
            && self.severity == Severity::from_parasite_count(self.parasites_detected)
            && (0.0..=100.0).contains(&self.confidence)
            && self.bounding_boxes.len() <= self.parasites_detected as usize
    }
}

/// Patient gender as captured on the analysis form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("Unknown gender: {}", other)),
        }
    }
}

/// Optional descriptive metadata attached before saving a result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 64, message = "Patient ID must be between 1 and 64 characters"))]
    pub patient_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 150, message = "Age must be between 0 and 150"))]
    pub age: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    /// Date the smear was collected (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

/// A saved analysis as persisted in the history slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHistoryItem {
    /// Same as `results.id`
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Inline `data:` URL of the analysed image
    pub image_data: String,
    pub results: AnalysisResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
}

impl AnalysisHistoryItem {
    /// Wrap a result for persistence, stamped with the current time
    pub fn new(image_data: String, results: AnalysisResult, patient_info: Option<PatientInfo>) -> Self {
        Self {
            id: results.id().to_string(),
            timestamp: Utc::now(),
            image_data,
            results,
            patient_info,
        }
    }

    /// Case-insensitive match against the patient ID or the analysis ID
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        let patient_match = self
            .patient_info
            .as_ref()
            .and_then(|p| p.patient_id.as_deref())
            .map(|id| id.to_lowercase().contains(&term))
            .unwrap_or(false);

        patient_match || self.id.to_lowercase().contains(&term)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
