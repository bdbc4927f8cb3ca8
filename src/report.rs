//! Report generation payloads
//!
//! The report service renders a PDF from a result summary, the patient
//! metadata and the inline image. Nothing is rendered locally.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{AnalysisResult, PatientInfo, Prediction, Severity};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Body of `POST /api/generate-report`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Sent as `{}` when no metadata was entered
    pub patient_info: PatientInfo,
    pub results: ReportSummary,
    pub image_data: String,
}

/// The subset of a result the report service consumes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub prediction: Prediction,
    pub confidence: f64,
    pub parasite_count: u32,
    pub severity: Severity,
}

impl ReportRequest {
    pub fn new(image_data: String, result: &AnalysisResult, patient_info: Option<&PatientInfo>) -> Self {
        Self {
            patient_info: patient_info.cloned().unwrap_or_default(),
            results: ReportSummary {
                prediction: result.prediction(),
                confidence: result.confidence(),
                parasite_count: result.parasites_detected(),
                severity: result.severity(),
            },
            image_data,
        }
    }

    /// Download name for the rendered report, dated today
    pub fn file_name(&self) -> String {
        report_file_name(self.patient_info.patient_id.as_deref(), Utc::now().date_naive())
    }
}

/// `malaria_report_<patient>_<YYYY-MM-DD>.pdf`
pub fn report_file_name(patient_id: Option<&str>, date: NaiveDate) -> String {
    format!(
        "malaria_report_{}_{}.pdf",
        patient_id.unwrap_or("patient"),
        date.format("%Y-%m-%d")
    )
}

/// Rendered report as returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReportDocument {
    /// Write the document into `dir` under its file name
    pub async fn save_to(&self, dir: &Path) -> AppResult<PathBuf> {
        let path = dir.join(&self.file_name);

        let write_error = |e: std::io::Error| {
            AppError::ReportGenerationFailed(format!("Could not write {}: {}", path.display(), e))
        };

        tokio::fs::create_dir_all(dir).await.map_err(write_error)?;
        tokio::fs::write(&path, &self.bytes).await.map_err(write_error)?;

        info!(path = %path.display(), size = self.bytes.len(), "Report saved");
        Ok(path)
    }
}
