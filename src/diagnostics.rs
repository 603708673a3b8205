//! Failure taxonomy, heuristic classification, and the error ledger.
//!
//! Every failure surfaced by the orchestrator is classified into one
//! [`ErrorCode`], recorded in the [`ErrorManager`] history, and handed to the
//! caller as a short shareable identifier. The numeric code values are part
//! of the external contract: they appear in user-facing messages and support
//! requests and must stay stable across versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::error;
use uuid::Uuid;

/// Canonical error codes, grouped by hundred-range.
///
/// 100s conversion, 200s filesystem, 300s validation, 400s system resources,
/// 500s unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Conversion failures (100-199)
    ConversionFailed = 101,
    ConversionTimeout = 102,
    ConversionInvalidFormat = 103,
    ConversionCorruptedFile = 104,
    ConversionMemoryError = 105,

    // Filesystem failures (200-299)
    FileNotFound = 201,
    FileAccessDenied = 202,
    FileTooLarge = 203,
    FileInvalidType = 204,

    // Validation failures (300-399)
    ValidationFailed = 301,
    ValidationUnsupportedFormat = 302,
    ValidationEmptyFile = 303,

    // System-resource failures (400-499)
    SystemOutOfMemory = 401,
    SystemDiskFull = 402,
    SystemEngineError = 403,

    // Unknown (500-599)
    UnknownError = 501,
}

impl ErrorCode {
    /// The stable numeric value surfaced to users and support.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Stable identifier name, used in log lines.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::ConversionFailed => "CONVERSION_FAILED",
            ErrorCode::ConversionTimeout => "CONVERSION_TIMEOUT",
            ErrorCode::ConversionInvalidFormat => "CONVERSION_INVALID_FORMAT",
            ErrorCode::ConversionCorruptedFile => "CONVERSION_CORRUPTED_FILE",
            ErrorCode::ConversionMemoryError => "CONVERSION_MEMORY_ERROR",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::FileAccessDenied => "FILE_ACCESS_DENIED",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::FileInvalidType => "FILE_INVALID_TYPE",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::ValidationUnsupportedFormat => "VALIDATION_UNSUPPORTED_FORMAT",
            ErrorCode::ValidationEmptyFile => "VALIDATION_EMPTY_FILE",
            ErrorCode::SystemOutOfMemory => "SYSTEM_OUT_OF_MEMORY",
            ErrorCode::SystemDiskFull => "SYSTEM_DISK_FULL",
            ErrorCode::SystemEngineError => "SYSTEM_ENGINE_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

// Keyword groups checked in order. The order is part of the observable
// contract: a bare "time" in an otherwise unrelated message classifies as a
// timeout, so callers must not rely on the result being a certified
// diagnosis — it is an actionable hint.
const TIMEOUT_TERMS: &[&str] = &["timeout", "timed out", "time"];
const MEMORY_TERMS: &[&str] = &["memory", "cannot allocate", "oom"];
const CORRUPTION_TERMS: &[&str] = &["corrupt", "damaged", "malformed", "truncated"];
const FORMAT_TERMS: &[&str] = &["format", "unsupported", "unknown file type"];

/// Classify an engine failure text into one [`ErrorCode`].
///
/// Best-effort substring matching over the lower-cased text; always returns
/// exactly one code, defaulting to [`ErrorCode::ConversionFailed`].
pub fn classify_failure(text: &str) -> ErrorCode {
    let text = text.to_lowercase();

    let matches_any = |terms: &[&str]| terms.iter().any(|t| text.contains(t));

    if matches_any(TIMEOUT_TERMS) {
        ErrorCode::ConversionTimeout
    } else if matches_any(MEMORY_TERMS) {
        ErrorCode::ConversionMemoryError
    } else if matches_any(CORRUPTION_TERMS) {
        ErrorCode::ConversionCorruptedFile
    } else if matches_any(FORMAT_TERMS) {
        ErrorCode::ConversionInvalidFormat
    } else {
        ErrorCode::ConversionFailed
    }
}

/// One recorded failure. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Generated identifier, e.g. `ERR-20260823-1A2B3C4D`.
    pub error_id: String,
    /// Classified error code.
    pub code: ErrorCode,
    /// Underlying failure text, if any (raw engine output lands here, never
    /// in user-facing messages).
    pub failure: Option<String>,
    /// Free-form context (file name, target format, sizes, ...).
    pub context: HashMap<String, String>,
    /// Requester identifier for attribution, if the caller supplied one.
    pub requester: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Process-wide error ledger with unique, human-shareable identifiers.
///
/// Explicitly constructed and owned (typically created at service start and
/// shared via `Arc`); history is append-only for the lifetime of the process
/// and safe for concurrent appends. The internal lock is never held across an
/// await point.
#[derive(Debug, Default)]
pub struct ErrorManager {
    history: Mutex<Vec<ErrorRecord>>,
}

impl ErrorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a globally unique error identifier: a date stamp plus a
    /// random suffix, short enough to read over the phone.
    fn generate_error_id() -> String {
        let uuid = Uuid::new_v4().simple().to_string();
        format!(
            "ERR-{}-{}",
            Utc::now().format("%Y%m%d"),
            uuid[..8].to_uppercase()
        )
    }

    /// Record a failure and return its unique identifier.
    ///
    /// Writes one structured log line; the record itself is appended to the
    /// in-memory history for diagnostics tooling.
    pub fn log_error(
        &self,
        code: ErrorCode,
        failure: Option<String>,
        context: HashMap<String, String>,
        requester: Option<String>,
    ) -> String {
        let error_id = Self::generate_error_id();

        let record = ErrorRecord {
            error_id: error_id.clone(),
            code,
            failure,
            context,
            requester,
            created_at: Utc::now(),
        };

        error!(
            error_id = %record.error_id,
            code = record.code.code(),
            name = record.code.name(),
            failure = record.failure.as_deref().unwrap_or(""),
            requester = record.requester.as_deref().unwrap_or(""),
            context = %serde_json::to_string(&record.context).unwrap_or_default(),
            "conversion error recorded"
        );

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push(record);

        error_id
    }

    /// Render the fixed, code-specific user-facing explanation.
    ///
    /// The message never contains raw engine output, only the template for
    /// the code plus the numeric value and the shareable identifier.
    pub fn get_user_message(&self, code: ErrorCode, error_id: &str) -> String {
        let (title, causes, solutions) = message_template(code);

        let causes = causes
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        let solutions = solutions
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{title}\n\n\
             Possible causes:\n{causes}\n\n\
             Try:\n{solutions}\n\n\
             Error code: {code} | ID: {error_id}\n\
             Include this code when contacting support.",
            title = title,
            causes = causes,
            solutions = solutions,
            code = code.code(),
            error_id = error_id,
        )
    }

    /// Snapshot of the full history, oldest first.
    pub fn history(&self) -> Vec<ErrorRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Look up a single record by its identifier.
    pub fn record(&self, error_id: &str) -> Option<ErrorRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.error_id == error_id)
            .cloned()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Template = (
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
);

fn message_template(code: ErrorCode) -> Template {
    match code {
        ErrorCode::ConversionFailed => (
            "The file could not be converted",
            &[
                "The file is damaged or has an unsupported internal structure",
                "Not enough memory to process the document",
                "A problem with the source format",
            ],
            &[
                "Pick a different target format",
                "Check the file for integrity",
                "Send the file again",
            ],
        ),
        ErrorCode::ConversionTimeout => (
            "The conversion timed out",
            &[
                "The file is too large to process",
                "The document structure is very complex",
                "The server is overloaded",
            ],
            &[
                "Try a smaller file",
                "Retry later",
                "Split the document into parts",
            ],
        ),
        ErrorCode::FileTooLarge => (
            "The file is too large",
            &[
                "The file exceeds the size limit",
                "The file contains many images",
                "An uncompressed source format",
            ],
            &[
                "Compress the file before sending",
                "Remove unneeded images",
                "Split it into several files",
            ],
        ),
        ErrorCode::ValidationUnsupportedFormat => (
            "Unsupported format",
            &[
                "The file format is not supported",
                "The file extension is wrong",
                "Damaged metadata",
            ],
            &[
                "Check the list of supported formats",
                "Convert to a supported format first",
                "Fix the file extension",
            ],
        ),
        _ => (
            "An error occurred",
            &["An unknown error in the system"],
            &["Retry later", "Contact the administrator"],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    // ========== classify_failure tests ==========

    #[test]
    fn test_classify_timeout_terms() {
        assert_eq!(
            classify_failure("process timed out waiting for pipeline"),
            ErrorCode::ConversionTimeout
        );
        assert_eq!(
            classify_failure("timeout exceeded"),
            ErrorCode::ConversionTimeout
        );
    }

    #[test]
    fn test_classify_preserves_time_false_positive() {
        // Ordered matching: a bare "time" wins even in an unrelated message.
        // This tie-break order is deliberate and observable.
        assert_eq!(
            classify_failure("runtime assertion failed in parser"),
            ErrorCode::ConversionTimeout
        );
    }

    #[test]
    fn test_classify_memory_terms() {
        assert_eq!(
            classify_failure("fatal: out of memory"),
            ErrorCode::ConversionMemoryError
        );
        assert_eq!(
            classify_failure("cannot allocate 4096 bytes"),
            ErrorCode::ConversionMemoryError
        );
    }

    #[test]
    fn test_classify_corruption_terms() {
        assert_eq!(
            classify_failure("input file appears corrupted"),
            ErrorCode::ConversionCorruptedFile
        );
        assert_eq!(
            classify_failure("malformed xml near line 3"),
            ErrorCode::ConversionCorruptedFile
        );
    }

    #[test]
    fn test_classify_format_terms() {
        assert_eq!(
            classify_failure("unsupported image codec"),
            ErrorCode::ConversionInvalidFormat
        );
        assert_eq!(
            classify_failure("could not detect input format"),
            ErrorCode::ConversionInvalidFormat
        );
    }

    #[test]
    fn test_classify_is_total() {
        assert_eq!(classify_failure(""), ErrorCode::ConversionFailed);
        assert_eq!(
            classify_failure("something completely unrelated"),
            ErrorCode::ConversionFailed
        );
    }

    #[test]
    fn test_classify_timeout_beats_memory() {
        // Groups are checked in order; timeout terms win when both match.
        assert_eq!(
            classify_failure("timed out while allocating memory"),
            ErrorCode::ConversionTimeout
        );
    }

    // ========== ErrorCode tests ==========

    #[test]
    fn test_error_code_numeric_contract() {
        assert_eq!(ErrorCode::ConversionFailed.code(), 101);
        assert_eq!(ErrorCode::ConversionTimeout.code(), 102);
        assert_eq!(ErrorCode::ConversionInvalidFormat.code(), 103);
        assert_eq!(ErrorCode::ConversionCorruptedFile.code(), 104);
        assert_eq!(ErrorCode::ConversionMemoryError.code(), 105);
        assert_eq!(ErrorCode::FileNotFound.code(), 201);
        assert_eq!(ErrorCode::FileTooLarge.code(), 203);
        assert_eq!(ErrorCode::ValidationUnsupportedFormat.code(), 302);
        assert_eq!(ErrorCode::ValidationEmptyFile.code(), 303);
        assert_eq!(ErrorCode::SystemEngineError.code(), 403);
        assert_eq!(ErrorCode::UnknownError.code(), 501);
    }

    // ========== ErrorManager tests ==========

    #[test]
    fn test_log_error_returns_prefixed_id() {
        let manager = ErrorManager::new();
        let id = manager.log_error(
            ErrorCode::ConversionFailed,
            None,
            HashMap::new(),
            None,
        );
        assert!(id.starts_with("ERR-"));
        // ERR-YYYYMMDD-XXXXXXXX
        assert_eq!(id.len(), "ERR-".len() + 8 + 1 + 8);
    }

    #[test]
    fn test_log_error_ids_are_unique() {
        let manager = ErrorManager::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let id = manager.log_error(
                ErrorCode::ConversionFailed,
                None,
                HashMap::new(),
                None,
            );
            assert!(seen.insert(id), "duplicate error id generated");
        }
    }

    #[test]
    fn test_log_error_ids_unique_under_concurrency() {
        let manager = Arc::new(ErrorManager::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(std::thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        manager.log_error(
                            ErrorCode::UnknownError,
                            None,
                            HashMap::new(),
                            None,
                        )
                    })
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate error id under concurrency");
            }
        }
        assert_eq!(manager.len(), 8 * 50);
    }

    #[test]
    fn test_history_is_append_only_and_queryable() {
        let manager = ErrorManager::new();
        assert!(manager.is_empty());

        let mut context = HashMap::new();
        context.insert("file_name".to_string(), "book.pdf".to_string());
        let id = manager.log_error(
            ErrorCode::ConversionTimeout,
            Some("engine produced no output for 30 minutes".to_string()),
            context,
            Some("user-42".to_string()),
        );

        let record = manager.record(&id).expect("record stored");
        assert_eq!(record.code, ErrorCode::ConversionTimeout);
        assert_eq!(record.requester.as_deref(), Some("user-42"));
        assert_eq!(record.context["file_name"], "book.pdf");

        manager.log_error(ErrorCode::FileNotFound, None, HashMap::new(), None);
        let history = manager.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].error_id, id);
    }

    #[test]
    fn test_user_message_contains_code_and_id() {
        let manager = ErrorManager::new();
        let id = manager.log_error(
            ErrorCode::ConversionTimeout,
            None,
            HashMap::new(),
            None,
        );
        let message = manager.get_user_message(ErrorCode::ConversionTimeout, &id);
        assert!(message.contains("102"));
        assert!(message.contains(&id));
        assert!(message.contains("timed out"));
    }

    #[test]
    fn test_user_message_falls_back_to_generic_template() {
        let manager = ErrorManager::new();
        let message = manager.get_user_message(ErrorCode::SystemDiskFull, "ERR-X");
        assert!(message.contains("An error occurred"));
        assert!(message.contains("402"));
    }

    #[test]
    fn test_user_message_never_embeds_failure_text() {
        let manager = ErrorManager::new();
        let id = manager.log_error(
            ErrorCode::ConversionFailed,
            Some("Traceback (most recent call last): boom".to_string()),
            HashMap::new(),
            None,
        );
        let message = manager.get_user_message(ErrorCode::ConversionFailed, &id);
        assert!(!message.contains("Traceback"));
    }
}
