//! Service-backed predictor
//!
//! Uploads the image to `POST {base}/api/predict` and requests reports from
//! `POST {base}/api/generate-report`. One attempt per call, no retries, and
//! no timeout beyond the transport's own.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::AnalysisResult;
use crate::predictor::{normalize_response, PredictResponse, Predictor};
use crate::report::{ReportDocument, ReportRequest, PDF_CONTENT_TYPE};
use crate::upload::ImageUpload;

const PREDICT_PATH: &str = "api/predict";
const REPORT_PATH: &str = "api/generate-report";

/// Predictor backed by the remote prediction service
pub struct RemotePredictor {
    client: reqwest::Client,
    base_url: String,
    /// Source for the placeholder fields the service does not report
    rng: Mutex<StdRng>,
}

impl RemotePredictor {
    /// Create a predictor for the service at `base_url`
    pub fn new(base_url: &str) -> Self {
        Self::with_rng(base_url, StdRng::from_entropy())
    }

    /// Create a predictor whose placeholder fields are reproducible
    pub fn with_seed(base_url: &str, seed: u64) -> Self {
        Self::with_rng(base_url, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base_url: &str, rng: StdRng) -> Self {
        info!(base_url = %base_url, "Initializing remote predictor");

        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rng: Mutex::new(rng),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl Predictor for RemotePredictor {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn analyze(&self, upload: &ImageUpload) -> AppResult<AnalysisResult> {
        let started = Instant::now();

        let part = Part::bytes(upload.bytes().to_vec())
            .file_name(upload.file_name().to_string())
            .mime_str(upload.media_type())
            .map_err(|e| AppError::PredictionFailed(format!("Invalid media type: {}", e)))?;
        let form = Form::new().part("file", part);

        debug!(
            file_name = %upload.file_name(),
            size = upload.size(),
            "Sending image to prediction service"
        );

        let response = self
            .client
            .post(self.url(PREDICT_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Prediction request failed");
                AppError::PredictionFailed(format!("Prediction request error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Prediction service returned an error status");
            return Err(AppError::PredictionFailed(format!(
                "Prediction service error {}: {}",
                status, error_text
            )));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| AppError::PredictionFailed(format!("Response parse error: {}", e)))?;

        let elapsed = started.elapsed().as_secs_f64();
        let result = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            normalize_response(&body, elapsed, &mut *rng)?
        };

        info!(
            analysis_id = %result.id(),
            prediction = %result.prediction(),
            confidence = result.confidence(),
            parasites = result.parasites_detected(),
            processing_time = result.processing_time(),
            "Remote analysis completed"
        );

        Ok(result)
    }

    async fn generate_report(&self, request: &ReportRequest) -> AppResult<ReportDocument> {
        let response = self
            .client
            .post(self.url(REPORT_PATH))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                AppError::ReportGenerationFailed(format!("Report request error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ReportGenerationFailed(format!(
                "Report service error {}: {}",
                status, error_text
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(PDF_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::ReportGenerationFailed(format!("Report download error: {}", e)))?;

        let document = ReportDocument {
            file_name: request.file_name(),
            content_type,
            bytes: bytes.to_vec(),
        };

        info!(
            file_name = %document.file_name,
            size = document.bytes.len(),
            "Report generated"
        );

        Ok(document)
    }
}
