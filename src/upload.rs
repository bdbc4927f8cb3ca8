//! Uploaded image handling
//!
//! An [`ImageUpload`] is the raw image content plus its declared media type, as
//! handed from the upload step to a predictor.

use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::Path;
use tracing::debug;

use crate::error::{AppError, AppResult};

pub const MEDIA_TYPE_JPEG: &str = "image/jpeg";
pub const MEDIA_TYPE_PNG: &str = "image/png";
pub const MEDIA_TYPE_TIFF: &str = "image/tiff";

/// Fallback for files whose extension says nothing about their content
pub const MEDIA_TYPE_UNKNOWN: &str = "application/octet-stream";

/// Image selected for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    file_name: String,
    media_type: String,
    bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read an image from disk, declaring its media type from the extension
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            AppError::ValidationError(format!("Could not read {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let media_type = media_type_for_path(path);

        debug!(file_name = %file_name, media_type = media_type, size = bytes.len(), "Loaded image upload");

        Ok(Self::new(file_name, media_type, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Inline `data:` URL form used for history and report payloads
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

/// Media type implied by a file extension
pub fn media_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => MEDIA_TYPE_JPEG,
        "png" => MEDIA_TYPE_PNG,
        "tif" | "tiff" => MEDIA_TYPE_TIFF,
        _ => MEDIA_TYPE_UNKNOWN,
    }
}
