//! # Error Types
//!
//! This module defines error types used throughout the certpress library.
//!
//! Only conditions without a safe visual fallback surface as errors. A missing
//! background image or a broken image layer is logged and painted around, never
//! raised.

use thiserror::Error;

/// Main error type for certpress operations
#[derive(Debug, Error)]
pub enum CertError {
    /// Template JSON is well-formed but violates the model (zero size, bad kind)
    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    /// No template with the requested identifier
    #[error("Template not found (ID: {0})")]
    TemplateNotFound(String),

    /// Spreadsheet could not be read into rows
    #[error("Row source error: {0}")]
    RowSource(String),

    /// Requested output file extension has no backend
    #[error("Unsupported output format: {0}")]
    UnsupportedOutput(String),

    /// Painting or encoding failed
    #[error("Render error: {0}")]
    Render(String),

    /// Image decoding or download error
    #[error("Image error: {0}")]
    Image(String),

    /// Paginated document construction error
    #[error("PDF error: {0}")]
    Pdf(String),

    /// External document overlay helper failed
    #[error("Overlay error: {0}")]
    Overlay(String),

    /// Work exceeded its time budget and was terminated
    #[error("{label} timed out after {ms}ms")]
    Timeout { label: String, ms: u64 },

    /// Archive creation error
    #[error("Archive error: {0}")]
    Archive(String),

    /// Caller input rejected before any work started
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No batch with the requested identifier
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CertError {
    /// Build a timeout error for a labeled unit of work.
    pub fn timeout(label: impl Into<String>, duration: std::time::Duration) -> Self {
        CertError::Timeout {
            label: label.into(),
            ms: duration.as_millis() as u64,
        }
    }
}

impl From<serde_json::Error> for CertError {
    fn from(e: serde_json::Error) -> Self {
        CertError::InvalidTemplate(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_message() {
        let err = CertError::timeout("render of row 3", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "render of row 3 timed out after 1500ms");
    }
}
