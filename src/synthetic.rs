//! Synthetic Analysis Generator
//!
//! ══════════════════════════════════════════════════════════════════════════════
//! OFFLINE STAND-IN FOR THE PREDICTION SERVICE
//! ══════════════════════════════════════════════════════════════════════════════
//!
//! This file fabricates plausible analysis results for development and demos
//! when no prediction service is configured. Nothing here looks at the image:
//! every field is drawn from a seedable random generator.
//!
//! DRAW ORDER:
//! 1. Verdict - positive with probability 0.6, otherwise uncertain with
//!    probability 0.3, otherwise negative
//! 2. Parasite count and confidence, conditioned on the verdict
//! 3. Simulated latency of 2.0-4.0 seconds, reported as processing time
//! 4. Cell count and placeholder boxes, as for service-backed results

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::{AnalysisResult, Detection, Prediction};
use crate::predictor::{placeholder_boxes, sample_cells_analyzed, Predictor};
use crate::upload::ImageUpload;

/// Probability of a positive verdict
const POSITIVE_PROBABILITY: f64 = 0.6;

/// Probability of an uncertain verdict once positive was ruled out
const UNCERTAIN_PROBABILITY: f64 = 0.3;

const MIN_LATENCY_SECS: f64 = 2.0;
const MAX_LATENCY_SECS: f64 = 4.0;

/// Confidence model for one verdict: normal noise clamped to a band
struct ConfidenceProfile {
    mean: f64,
    std_dev: f64,
    min: f64,
    max: f64,
}

impl ConfidenceProfile {
    fn for_prediction(prediction: Prediction) -> Self {
        match prediction {
            Prediction::Positive => Self { mean: 92.0, std_dev: 4.0, min: 80.0, max: 99.5 },
            Prediction::Uncertain => Self { mean: 62.0, std_dev: 4.0, min: 50.0, max: 69.9 },
            Prediction::Negative => Self { mean: 95.0, std_dev: 2.5, min: 85.0, max: 99.9 },
        }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        Normal::new(self.mean, self.std_dev)
            .map(|noise| noise.sample(rng))
            .unwrap_or(self.mean)
            .clamp(self.min, self.max)
    }
}

/// Predictor that fabricates results without contacting any service
pub struct SyntheticPredictor {
    rng: Mutex<StdRng>,
    simulate_latency: bool,
}

impl SyntheticPredictor {
    /// Create a generator; `seed` makes the sequence of results reproducible
    pub fn new(seed: Option<u64>, simulate_latency: bool) -> Self {
        info!(
            seed = ?seed,
            simulate_latency = simulate_latency,
            "Initializing synthetic predictor (results are NOT real detections)"
        );

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng: Mutex::new(rng),
            simulate_latency,
        }
    }

    /// Draw one result and the latency it pretends to have taken
    fn draw(&self) -> (Detection, f64) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let prediction = if rng.gen::<f64>() < POSITIVE_PROBABILITY {
            Prediction::Positive
        } else if rng.gen::<f64>() < UNCERTAIN_PROBABILITY {
            Prediction::Uncertain
        } else {
            Prediction::Negative
        };

        let parasites = match prediction {
            Prediction::Positive => rng.gen_range(3..=30),
            Prediction::Uncertain => rng.gen_range(0..=3),
            Prediction::Negative => 0,
        };

        let confidence = ConfidenceProfile::for_prediction(prediction).sample(&mut *rng);
        let latency = rng.gen_range(MIN_LATENCY_SECS..MAX_LATENCY_SECS);

        let detection = Detection {
            prediction,
            confidence,
            parasites_detected: parasites,
            cells_analyzed: sample_cells_analyzed(&mut *rng),
            processing_time_secs: latency,
            bounding_boxes: placeholder_boxes(&mut *rng, parasites),
        };

        (detection, latency)
    }
}

#[async_trait]
impl Predictor for SyntheticPredictor {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn analyze(&self, upload: &ImageUpload) -> AppResult<AnalysisResult> {
        let (detection, latency) = self.draw();

        if self.simulate_latency {
            tokio::time::sleep(Duration::from_secs_f64(latency)).await;
        }

        let result = AnalysisResult::from_detection(detection);

        debug!(
            analysis_id = %result.id(),
            file_name = %upload.file_name(),
            prediction = %result.prediction(),
            confidence = result.confidence(),
            parasites = result.parasites_detected(),
            "Generated synthetic analysis"
        );

        Ok(result)
    }
}
