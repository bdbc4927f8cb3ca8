//! Analysis workflow
//!
//! Wires a [`Predictor`] to the [`HistoryStore`]: validate the upload, run the
//! analysis, optionally save the result, optionally fetch a report.
//!
//! Each analysis is stamped with a generation number when it starts. Starting
//! another analysis supersedes every earlier one, and a superseded result is
//! discarded when it arrives instead of being shown.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{PredictorMode, Settings};
use crate::error::AppResult;
use crate::history::HistoryStore;
use crate::models::{AnalysisHistoryItem, AnalysisResult, PatientInfo};
use crate::predictor::Predictor;
use crate::remote::RemotePredictor;
use crate::report::{ReportDocument, ReportRequest};
use crate::storage::{FileStorage, Storage, HISTORY_STORAGE_KEY};
use crate::synthetic::SyntheticPredictor;
use crate::upload::ImageUpload;
use crate::validation::{validate_patient_info, validate_upload};

/// Build the predictor selected by configuration
pub fn predictor_from_settings(settings: &Settings) -> Arc<dyn Predictor> {
    match &settings.prediction.mode {
        PredictorMode::Remote { api_url } => Arc::new(RemotePredictor::new(api_url)),
        PredictorMode::Synthetic => Arc::new(SyntheticPredictor::new(
            settings.synthetic.seed,
            settings.synthetic.simulate_latency,
        )),
    }
}

/// Marks one analysis request; compare against the service to detect staleness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
}

impl RequestTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Analysis workflow over a predictor and a history store
pub struct AnalysisService<S: Storage> {
    predictor: Arc<dyn Predictor>,
    history: HistoryStore<S>,
    max_upload_bytes: usize,
    generation: AtomicU64,
}

impl AnalysisService<FileStorage> {
    /// Service configured from settings, with file-backed history
    pub fn from_settings(settings: &Settings) -> Self {
        let storage = FileStorage::new(&settings.history.dir, HISTORY_STORAGE_KEY);
        info!(
            predictor_mode = ?settings.prediction.mode,
            history_path = %storage.path().display(),
            "Initializing analysis service"
        );

        Self::new(
            predictor_from_settings(settings),
            HistoryStore::new(storage),
            settings.upload.max_bytes,
        )
    }
}

impl<S: Storage> AnalysisService<S> {
    pub fn new(predictor: Arc<dyn Predictor>, history: HistoryStore<S>, max_upload_bytes: usize) -> Self {
        Self {
            predictor,
            history,
            max_upload_bytes,
            generation: AtomicU64::new(0),
        }
    }

    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    pub fn predictor_name(&self) -> &'static str {
        self.predictor.name()
    }

    /// Start a new request, superseding all earlier ones
    pub fn begin_request(&self) -> RequestTicket {
        RequestTicket {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Whether no request has started since `ticket` was issued
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Validate and analyse an upload.
    ///
    /// Returns `Ok(None)` when a newer analysis started while this one was in
    /// flight, even if this one failed. History is never touched.
    pub async fn analyze(&self, upload: &ImageUpload) -> AppResult<Option<AnalysisResult>> {
        validate_upload(upload, self.max_upload_bytes)?;

        let ticket = self.begin_request();
        debug!(
            generation = ticket.generation(),
            predictor = self.predictor.name(),
            file_name = %upload.file_name(),
            "Analysis started"
        );

        let outcome = self.predictor.analyze(upload).await;

        // A superseded request is dropped whether it succeeded or failed.
        if !self.is_current(ticket) {
            debug!(
                generation = ticket.generation(),
                failed = outcome.is_err(),
                "Discarding superseded analysis outcome"
            );
            return Ok(None);
        }

        outcome.map(Some)
    }

    /// Persist a result with its image and optional patient metadata
    pub fn save(
        &self,
        upload: &ImageUpload,
        result: AnalysisResult,
        patient_info: Option<PatientInfo>,
    ) -> AppResult<AnalysisHistoryItem> {
        if let Some(info) = &patient_info {
            validate_patient_info(info)?;
        }

        let item = AnalysisHistoryItem::new(upload.to_data_url(), result, patient_info);
        let stored = self.history.append(item)?;

        info!(analysis_id = %stored.id, "Analysis saved");
        Ok(stored)
    }

    /// Ask the report service for a PDF of a result
    pub async fn generate_report(
        &self,
        image_data: String,
        result: &AnalysisResult,
        patient_info: Option<&PatientInfo>,
    ) -> AppResult<ReportDocument> {
        let request = ReportRequest::new(image_data, result, patient_info);
        self.predictor.generate_report(&request).await
    }

    /// Fetch a report and write it into `dir`
    pub async fn download_report(
        &self,
        image_data: String,
        result: &AnalysisResult,
        patient_info: Option<&PatientInfo>,
        dir: &Path,
    ) -> AppResult<std::path::PathBuf> {
        let document = self.generate_report(image_data, result, patient_info).await?;
        document.save_to(dir).await
    }
}
