//! Malaria Detector
//!
//! Client side of a blood-smear analysis workflow: upload an image, obtain an
//! analysis from the prediction service (or from the synthetic stand-in when
//! none is configured), and keep a bounded local history of saved results.
//!
//! ⚠️ DISCLAIMER:
//! Results are a screening aid only. Positive and uncertain results must be
//! confirmed by a trained microscopist.

pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod predictor;
pub mod remote;
pub mod report;
pub mod service;
pub mod storage;
pub mod synthetic;
pub mod upload;
pub mod validation;

pub use config::{PredictorMode, Settings};
pub use error::{AppError, AppResult};
pub use history::{HistoryQuery, HistoryStore, SortOrder};
pub use models::{AnalysisHistoryItem, AnalysisResult, PatientInfo, Prediction, Severity};
pub use predictor::Predictor;
pub use service::AnalysisService;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use upload::ImageUpload;
