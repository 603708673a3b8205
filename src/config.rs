//! Configuration and request/result types for conversion orchestration.

use crate::error::{ConversionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for the converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to the conversion engine binary. If `None`, searches PATH and
    /// common install locations for `ebook-convert`.
    pub engine_path: Option<PathBuf>,

    /// Path to the Ghostscript binary used for PDF pre-optimization.
    /// If `None`, searches PATH for `gs`. Optimization is best-effort, so a
    /// missing binary is not an error.
    pub optimizer_path: Option<PathBuf>,

    /// Directory for intermediate optimized files.
    /// Default: system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Engine deadline on the standard path.
    /// Default: 60 seconds.
    pub standard_timeout: Duration,

    /// Engine deadline on the large-file path.
    /// Default: 30 minutes.
    pub large_timeout: Duration,

    /// Deadline for the pre-optimization step.
    /// Default: 5 minutes.
    pub optimize_timeout: Duration,

    /// Per-read timeout while polling engine output on the large-file path.
    /// Default: 30 seconds.
    pub read_timeout: Duration,

    /// How often a synthetic progress event is emitted when the engine is
    /// silent. Default: 2 minutes.
    pub progress_cadence: Duration,

    /// Optional cap on input size in bytes. `None` disables the check; the
    /// upload layer usually enforces its own limit.
    pub max_input_bytes: Option<u64>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            optimizer_path: None,
            temp_dir: None,
            standard_timeout: Duration::from_secs(60),
            large_timeout: Duration::from_secs(1800),
            optimize_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(30),
            progress_cadence: Duration::from_secs(120),
            max_input_bytes: None,
        }
    }
}

impl ConverterConfig {
    /// Set the engine binary path.
    pub fn engine_path(mut self, path: PathBuf) -> Self {
        self.engine_path = Some(path);
        self
    }

    /// Set the optimizer binary path.
    pub fn optimizer_path(mut self, path: PathBuf) -> Self {
        self.optimizer_path = Some(path);
        self
    }

    /// Set the temporary directory for intermediate files.
    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }

    /// Set the standard-path deadline.
    pub fn standard_timeout(mut self, timeout: Duration) -> Self {
        self.standard_timeout = timeout;
        self
    }

    /// Set the large-file-path deadline.
    pub fn large_timeout(mut self, timeout: Duration) -> Self {
        self.large_timeout = timeout;
        self
    }

    /// Set the pre-optimization deadline.
    pub fn optimize_timeout(mut self, timeout: Duration) -> Self {
        self.optimize_timeout = timeout;
        self
    }

    /// Set the per-read poll timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the synthetic progress cadence.
    pub fn progress_cadence(mut self, cadence: Duration) -> Self {
        self.progress_cadence = cadence;
        self
    }

    /// Cap the accepted input size.
    pub fn max_input_bytes(mut self, limit: u64) -> Self {
        self.max_input_bytes = Some(limit);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.standard_timeout.is_zero() || self.large_timeout.is_zero() {
            return Err(ConversionError::InvalidConfig(
                "conversion timeouts must be greater than 0".to_string(),
            ));
        }
        if self.read_timeout.is_zero() || self.progress_cadence.is_zero() {
            return Err(ConversionError::InvalidConfig(
                "read_timeout and progress_cadence must be greater than 0".to_string(),
            ));
        }
        if self.optimize_timeout.is_zero() {
            return Err(ConversionError::InvalidConfig(
                "optimize_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Target output format. A closed set: the engine supports more, but these
/// are the tags this orchestrator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Epub,
    Mobi,
    Pdf,
    Txt,
    Fb2,
    Html,
}

impl OutputFormat {
    /// Lower-case format tag.
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Mobi => "mobi",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Txt => "txt",
            OutputFormat::Fb2 => "fb2",
            OutputFormat::Html => "html",
        }
    }

    /// File extension without the dot; identical to the tag.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// All accepted formats.
    pub fn all() -> &'static [OutputFormat] {
        &[
            OutputFormat::Epub,
            OutputFormat::Mobi,
            OutputFormat::Pdf,
            OutputFormat::Txt,
            OutputFormat::Fb2,
            OutputFormat::Html,
        ]
    }
}

impl FromStr for OutputFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "epub" => Ok(OutputFormat::Epub),
            "mobi" => Ok(OutputFormat::Mobi),
            "pdf" => Ok(OutputFormat::Pdf),
            "txt" => Ok(OutputFormat::Txt),
            "fb2" => Ok(OutputFormat::Fb2),
            "html" => Ok(OutputFormat::Html),
            other => Err(ConversionError::UnknownFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversion request. Immutable once created.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Path to the local input file.
    pub input_path: PathBuf,

    /// Target format.
    pub target_format: OutputFormat,

    /// Optional requester identifier, recorded with any failure.
    pub requester_id: Option<String>,

    /// Optional bounded progress sink. Events are sent with `try_send`; a
    /// full or dropped channel never blocks the conversion.
    pub progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl ConversionRequest {
    /// Create a new conversion request.
    pub fn new(input_path: impl Into<PathBuf>, target_format: OutputFormat) -> Self {
        Self {
            input_path: input_path.into(),
            target_format,
            requester_id: None,
            progress: None,
        }
    }

    /// Attach a requester identifier for error attribution.
    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }
}

/// Result of a successful conversion. Ownership of the output file transfers
/// to the caller, who is responsible for eventual deletion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    /// Path to the converted file.
    pub output_path: PathBuf,

    /// Output size in bytes.
    pub output_bytes: u64,

    /// Wall-clock duration of the whole request.
    pub duration: Duration,

    /// Target format.
    pub target_format: OutputFormat,
}

/// A human-readable progress notification. Purely informational; never
/// retried or persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,

    /// Human-readable status, e.g. "Optimizing PDF file...".
    pub message: String,
}

impl ProgressEvent {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Push an event without ever blocking: a slow consumer drops events rather
/// than stalling the conversion task.
pub(crate) fn try_emit(sink: Option<&mpsc::Sender<ProgressEvent>>, message: impl Into<String>) {
    if let Some(sender) = sink {
        let _ = sender.try_send(ProgressEvent::now(message));
    }
}
