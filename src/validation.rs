//! Input validation module
//!
//! Validates image uploads before they reach a predictor, and patient
//! metadata before it is saved alongside a result.

use chrono::Utc;
use tracing::{debug, warn};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::PatientInfo;
use crate::upload::{ImageUpload, MEDIA_TYPE_JPEG, MEDIA_TYPE_PNG, MEDIA_TYPE_TIFF};

/// Upload validation constraints
pub struct UploadConstraints;

impl UploadConstraints {
    /// Media types the prediction service accepts
    pub const ACCEPTED_MEDIA_TYPES: [&'static str; 3] = [MEDIA_TYPE_JPEG, MEDIA_TYPE_PNG, MEDIA_TYPE_TIFF];

    /// 10MB
    pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;
}

/// Validate an image upload against the accepted media types and size limit
pub fn validate_upload(upload: &ImageUpload, max_bytes: usize) -> AppResult<()> {
    let accepted = UploadConstraints::ACCEPTED_MEDIA_TYPES
        .iter()
        .any(|media_type| *media_type == upload.media_type());

    if !accepted {
        warn!(
            file_name = %upload.file_name(),
            media_type = %upload.media_type(),
            "Rejected upload with unsupported media type"
        );
        return Err(AppError::ValidationError(
            "Please upload an image file".to_string(),
        ));
    }

    if upload.size() == 0 {
        return Err(AppError::ValidationError(
            "The selected file is empty".to_string(),
        ));
    }

    if upload.size() > max_bytes {
        warn!(
            file_name = %upload.file_name(),
            size = upload.size(),
            max_bytes = max_bytes,
            "Rejected oversized upload"
        );
        return Err(AppError::ValidationError(format!(
            "File size must be less than {}",
            format_size_limit(max_bytes)
        )));
    }

    debug!(file_name = %upload.file_name(), "Upload validation passed");
    Ok(())
}

/// Whole megabytes when exact, otherwise one decimal in MB or KB
fn format_size_limit(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;

    if bytes >= MB {
        if bytes % MB == 0 {
            format!("{}MB", bytes / MB)
        } else {
            format!("{:.1}MB", bytes as f64 / MB as f64)
        }
    } else if bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    }
}

/// Validate patient metadata attached to a saved analysis
pub fn validate_patient_info(info: &PatientInfo) -> AppResult<()> {
    if let Err(validation_errors) = info.validate() {
        let error_messages: Vec<String> = validation_errors
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let msgs: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|c| c.as_ref()))
                    .collect();
                format!("{}: {}", field, msgs.join(", "))
            })
            .collect();

        warn!(errors = ?error_messages, "Patient info validation failed");
        return Err(AppError::ValidationError(error_messages.join("; ")));
    }

    if let Some(date) = info.collection_date {
        if date > Utc::now().date_naive() {
            return Err(AppError::ValidationError(format!(
                "Collection date {} is in the future",
                date
            )));
        }
    }

    Ok(())
}
