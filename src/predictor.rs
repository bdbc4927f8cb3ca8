//! Prediction strategy
//!
//! A [`Predictor`] turns an uploaded image into an [`AnalysisResult`]. Two
//! implementations exist: the service-backed [`crate::remote::RemotePredictor`]
//! and the offline [`crate::synthetic::SyntheticPredictor`].
//!
//! The prediction service reports a verdict, a confidence and optionally a
//! parasite count and severity label. It never reports cell counts or geometry,
//! so both are synthesised here as visual placeholders.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::{AnalysisResult, BoundingBox, Detection, Prediction, Severity};
use crate::report::{ReportDocument, ReportRequest};
use crate::upload::ImageUpload;

/// Side length of the coordinate frame placeholder boxes live in
pub const FRAME_SIZE: u32 = 500;

/// Cell counts are drawn from `CELLS_ANALYZED_MIN..CELLS_ANALYZED_MAX`
pub const CELLS_ANALYZED_MIN: u32 = 2000;
pub const CELLS_ANALYZED_MAX: u32 = 3000;

/// Largest parasite count accepted from the service; kept under
/// `CELLS_ANALYZED_MIN` so synthesised cell counts always cover it
pub const MAX_PARASITE_COUNT: u32 = 1000;

/// Verdict labels the service uses for an infected sample
pub const POSITIVE_LABELS: [&str; 2] = ["positive", "Parasitized"];

const BOX_MARGIN: u32 = 50;
const BOX_MIN_SIZE: u32 = 25;
const BOX_SIZE_SPREAD: u32 = 15;

/// Strategy producing analysis results for uploaded images
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Analyse one image.
    ///
    /// # Errors
    /// Returns [`AppError::PredictionFailed`] when no result could be obtained.
    async fn analyze(&self, upload: &ImageUpload) -> AppResult<AnalysisResult>;

    /// Render a downloadable report for a result.
    ///
    /// # Errors
    /// Returns [`AppError::ReportGenerationFailed`]; predictors without a report
    /// service always fail.
    async fn generate_report(&self, _request: &ReportRequest) -> AppResult<ReportDocument> {
        Err(AppError::ReportGenerationFailed(format!(
            "the {} predictor has no report service",
            self.name()
        )))
    }
}

/// A JSON number that some service versions send as a string ("97.50")
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    pub fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
        .filter(|v| v.is_finite())
    }
}

/// Body of a successful `POST /api/predict`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    pub prediction: String,
    #[serde(default)]
    pub confidence: Option<Numeric>,
    #[serde(default)]
    pub parasite_count: Option<Numeric>,
    #[serde(default)]
    pub severity: Option<String>,
}

impl PredictResponse {
    pub fn is_positive(&self) -> bool {
        POSITIVE_LABELS.iter().any(|label| *label == self.prediction)
    }

    /// Reported confidence, 0 when absent or unreadable
    pub fn confidence(&self) -> f64 {
        self.confidence.as_ref().and_then(Numeric::value).unwrap_or(0.0)
    }

    /// Reported parasite count, 0 when absent, unreadable or negative.
    ///
    /// # Errors
    /// Returns [`AppError::PredictionFailed`] when the count exceeds
    /// [`MAX_PARASITE_COUNT`].
    pub fn parasite_count(&self) -> AppResult<u32> {
        let count = match self.parasite_count.as_ref().and_then(Numeric::value) {
            Some(v) if v > 0.0 => v.floor(),
            _ => return Ok(0),
        };

        if count > f64::from(MAX_PARASITE_COUNT) {
            warn!(parasite_count = count, "Service reported an implausible parasite count");
            return Err(AppError::PredictionFailed(format!(
                "Parasite count {} exceeds the supported maximum of {}",
                count, MAX_PARASITE_COUNT
            )));
        }

        Ok(count as u32)
    }
}

/// Reshape a service response into a result, filling in the fields it omits
pub fn normalize_response<R: Rng + ?Sized>(
    response: &PredictResponse,
    elapsed_secs: f64,
    rng: &mut R,
) -> AppResult<AnalysisResult> {
    let confidence = response.confidence();
    let parasites = response.parasite_count()?;

    let result = AnalysisResult::from_detection(Detection {
        prediction: Prediction::classify(response.is_positive(), confidence),
        confidence,
        parasites_detected: parasites,
        cells_analyzed: sample_cells_analyzed(rng),
        processing_time_secs: elapsed_secs,
        bounding_boxes: placeholder_boxes(rng, parasites),
    });

    // Severity always follows the count; the label is only cross-checked.
    if let Some(label) = response.severity.as_deref() {
        let reported = Severity::from_label(label);
        if reported != result.severity() {
            warn!(
                analysis_id = %result.id(),
                reported_label = %label,
                reported = %reported,
                derived = %result.severity(),
                "Service severity disagrees with parasite count"
            );
        }
    }

    Ok(result)
}

pub fn sample_cells_analyzed<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(CELLS_ANALYZED_MIN..CELLS_ANALYZED_MAX)
}

/// One randomly placed box per parasite, for visualisation only
pub fn placeholder_boxes<R: Rng + ?Sized>(rng: &mut R, count: u32) -> Vec<BoundingBox> {
    let span = FRAME_SIZE - 2 * BOX_MARGIN;

    (0..count)
        .map(|_| BoundingBox {
            x: BOX_MARGIN + rng.gen_range(0..span),
            y: BOX_MARGIN + rng.gen_range(0..span),
            width: BOX_MIN_SIZE + rng.gen_range(0..BOX_SIZE_SPREAD),
            height: BOX_MIN_SIZE + rng.gen_range(0..BOX_SIZE_SPREAD),
            confidence: 0.8 + rng.gen::<f64>() * 0.19,
        })
        .collect()
}
