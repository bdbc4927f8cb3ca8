//! Centralized error handling module
//!
//! Provides unified error types and the user-facing error report for the entire crate.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Application-wide error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Report generation failed: {0}")]
    ReportGenerationFailed(String),

    /// Only ever logged; history reads degrade to an empty list instead.
    #[error("History data corrupted: {0}")]
    HistoryReadCorrupted(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Stable machine-readable classification
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::PredictionFailed(_) => "PREDICTION_FAILED",
            AppError::ReportGenerationFailed(_) => "REPORT_GENERATION_FAILED",
            AppError::HistoryReadCorrupted(_) => "HISTORY_READ_CORRUPTED",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Message that is safe to show to the user as-is
    pub fn user_message(&self) -> String {
        match self {
            AppError::PredictionFailed(_) => {
                "Failed to analyze image. Please check your connection and try again.".to_string()
            }
            AppError::ReportGenerationFailed(_) => {
                "Failed to download report. Please try again.".to_string()
            }
            AppError::HistoryReadCorrupted(_) | AppError::Storage(_) => {
                "Analysis history could not be updated. Please try again.".to_string()
            }
            AppError::ValidationError(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
        }
    }

    /// Build the single user-facing report for this error
    pub fn report(&self) -> ErrorReport {
        let report = ErrorReport::new(self.error_type(), &self.user_message());

        error!(
            correlation_id = %report.correlation_id,
            error_type = %report.error_type,
            detail = %self,
            "Error report generated"
        );

        report
    }
}

/// Standardized user-facing error format
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    /// Unique correlation ID for tracing
    pub correlation_id: String,
    /// Error type classification
    pub error_type: String,
    /// Human-readable error message (safe for users)
    pub message: String,
    /// Timestamp of the error
    pub timestamp: String,
}

impl ErrorReport {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts every event that reaches the subscriber
    struct EventCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for EventCounter {
        fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_storage_error_logged_once_per_report() {
        let events = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(EventCounter(events.clone()));

        tracing::subscriber::with_default(subscriber, || {
            let error = AppError::Storage("disk full".to_string());

            let message = error.user_message();
            assert_eq!(message, "Analysis history could not be updated. Please try again.");
            assert_eq!(events.load(Ordering::SeqCst), 0);

            error.report();
            assert_eq!(events.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_prediction_failure_hides_transport_detail() {
        let error = AppError::PredictionFailed("connection refused".to_string());
        let message = error.user_message();
        assert!(!message.contains("connection refused"));
        assert!(message.contains("try again"));
    }

    #[test]
    fn test_validation_message_passes_through() {
        let error = AppError::ValidationError("Please upload an image file".to_string());
        assert_eq!(error.user_message(), "Please upload an image file");
        assert_eq!(error.error_type(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_error_report_format() {
        let report = AppError::ReportGenerationFailed("HTTP 500".to_string()).report();
        assert!(!report.correlation_id.is_empty());
        assert_eq!(report.error_type, "REPORT_GENERATION_FAILED");
        assert_eq!(report.message, "Failed to download report. Please try again.");
        assert_eq!(
            report.to_string(),
            "REPORT_GENERATION_FAILED: Failed to download report. Please try again."
        );
    }
}
