//! Error types for conversion orchestration.

use crate::diagnostics::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Internal error type for the orchestration pipeline.
///
/// These are the failures detected while driving the external tools. At the
/// orchestrator boundary every variant is classified into an
/// [`ErrorCode`](crate::diagnostics::ErrorCode), recorded, and surfaced to
/// callers as a [`ConversionFailure`].
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The conversion engine binary could not be located.
    #[error("conversion engine '{0}' not found. Install Calibre and ensure 'ebook-convert' is in PATH")]
    EngineNotFound(String),

    /// An external process failed to start or an I/O operation failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An external process exceeded its deadline and was killed.
    #[error("'{program}' timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    /// The engine exited with a non-zero status.
    #[error("engine exited with status {status}: {message}")]
    EngineFailed { status: i32, message: String },

    /// The engine exited successfully but the expected output file is missing.
    /// Exit code zero alone is not proof of success.
    #[error("engine reported success but produced no file at {0}")]
    MissingOutput(PathBuf),

    /// Input file does not exist.
    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    /// Input file exists but is empty.
    #[error("input file is empty: {0}")]
    EmptyInput(PathBuf),

    /// Input file exceeds the configured size cap.
    #[error("input file is {size} bytes, above the {limit} byte limit")]
    InputTooLarge { size: u64, limit: u64 },

    /// Input extension is not in the supported set.
    #[error("unsupported input format: .{extension}")]
    UnsupportedInput { extension: String },

    /// A target format tag outside the closed set.
    #[error("unknown target format: {0}")]
    UnknownFormat(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// The failure descriptor returned to callers of
/// [`Converter::convert`](crate::converter::Converter::convert).
///
/// Carries the shareable identifier correlating the user-visible message with
/// the detailed [`ErrorRecord`](crate::diagnostics::ErrorRecord) in history.
/// The rendered message never contains raw engine output.
#[derive(Debug, Clone)]
pub struct ConversionFailure {
    /// Unique, human-shareable identifier, e.g. `ERR-20260823-1A2B3C4D`.
    pub error_id: String,
    /// Classified error code.
    pub code: ErrorCode,
    /// Rendered user-facing explanation for this code.
    pub message: String,
}

impl std::fmt::Display for ConversionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conversion failed with code {} ({}), error id {}",
            self.code.code(),
            self.code.name(),
            self.error_id
        )
    }
}

impl std::error::Error for ConversionFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_engine_not_found() {
        let err = ConversionError::EngineNotFound("ebook-convert".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("ebook-convert"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn test_error_display_timeout() {
        let err = ConversionError::Timeout {
            program: "ebook-convert".to_string(),
            timeout_secs: 1800,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("1800 seconds"));
    }

    #[test]
    fn test_error_display_missing_output() {
        let err = ConversionError::MissingOutput(PathBuf::from("/tmp/book_converted.epub"));
        let msg = format!("{}", err);
        assert!(msg.contains("book_converted.epub"));
        assert!(msg.contains("no file"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ConversionError = io_err.into();
        assert!(matches!(err, ConversionError::Io(_)));
    }

    #[test]
    fn test_failure_display_carries_code_and_id() {
        let failure = ConversionFailure {
            error_id: "ERR-20260823-DEADBEEF".to_string(),
            code: ErrorCode::ConversionTimeout,
            message: "user text".to_string(),
        };
        let msg = format!("{}", failure);
        assert!(msg.contains("102"));
        assert!(msg.contains("CONVERSION_TIMEOUT"));
        assert!(msg.contains("ERR-20260823-DEADBEEF"));
    }
}
