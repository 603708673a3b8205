//! Main conversion orchestrator.
//!
//! Validates the input, picks the standard or large-file strategy by size,
//! drives the external engine through [`process`], and routes every failure
//! through the [`diagnostics`](crate::diagnostics) ledger so callers receive
//! a shareable error identifier instead of raw engine output.

use crate::config::{
    try_emit, ConversionRequest, ConversionResult, ConverterConfig, OutputFormat, ProgressEvent,
};
use crate::diagnostics::{classify_failure, ErrorCode, ErrorManager};
use crate::error::{ConversionError, ConversionFailure, Result};
use crate::naming;
use crate::optimize::PreOptimizer;
use crate::process::{self, CapturedOutput, ProgressMonitor};
use crate::profile;
use crate::sizing;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Orchestrates document conversions against an external engine.
///
/// One `Converter` serves many concurrent requests; each request owns its
/// own subprocess and temporary files. The only shared state is the
/// append-only error history.
pub struct Converter {
    config: ConverterConfig,
    engine_path: PathBuf,
    optimizer: PreOptimizer,
    monitor: ProgressMonitor,
    errors: Arc<ErrorManager>,
}

impl Converter {
    /// Create a converter with its own error ledger.
    pub fn new(config: ConverterConfig) -> Result<Self> {
        Self::with_error_manager(config, Arc::new(ErrorManager::new()))
    }

    /// Create a converter sharing an externally owned error ledger, so
    /// diagnostics tooling can read the history independently.
    pub fn with_error_manager(config: ConverterConfig, errors: Arc<ErrorManager>) -> Result<Self> {
        config.validate()?;

        let engine_path = Self::find_engine(&config)?;
        info!("Found conversion engine at: {:?}", engine_path);

        Ok(Self {
            optimizer: PreOptimizer::new(&config),
            monitor: ProgressMonitor::new(config.read_timeout, config.progress_cadence),
            engine_path,
            errors,
            config,
        })
    }

    /// Find the conversion engine binary.
    fn find_engine(config: &ConverterConfig) -> Result<PathBuf> {
        // Explicit path wins, but must exist.
        if let Some(ref path) = config.engine_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(ConversionError::EngineNotFound(path.display().to_string()));
        }

        // Common install locations.
        let candidates = [
            "/usr/bin/ebook-convert",
            "/opt/calibre/ebook-convert",
            "/Applications/calibre.app/Contents/MacOS/ebook-convert",
        ];
        for candidate in candidates {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Ok(path);
            }
        }

        which::which("ebook-convert")
            .map_err(|_| ConversionError::EngineNotFound("ebook-convert".to_string()))
    }

    /// The shared error ledger.
    pub fn error_manager(&self) -> Arc<ErrorManager> {
        Arc::clone(&self.errors)
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert a document to the requested format.
    ///
    /// On success the output file belongs to the caller. On failure the
    /// returned [`ConversionFailure`] carries the classified code and the
    /// identifier of the history record; raw engine output is never
    /// surfaced here.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> std::result::Result<ConversionResult, ConversionFailure> {
        let start = Instant::now();

        let input_bytes = match self.validate_input(&request) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.record_failure(e, &request, None)),
        };

        info!(
            input = %request.input_path.display(),
            format = %request.target_format,
            size_mib = format!("{:.1}", sizing::mib(input_bytes)),
            "starting conversion"
        );

        let sink = request.progress.as_ref();
        let outcome = if sizing::takes_large_path(input_bytes) {
            self.convert_large(&request, input_bytes, sink).await
        } else {
            self.convert_standard(&request, input_bytes).await
        };

        let output_path = match outcome {
            Ok(path) => path,
            Err(e) => return Err(self.record_failure(e, &request, Some(input_bytes))),
        };

        let output_bytes = match std::fs::metadata(&output_path) {
            Ok(meta) => meta.len(),
            Err(e) => return Err(self.record_failure(e.into(), &request, Some(input_bytes))),
        };

        let duration = start.elapsed();
        info!(
            output = %output_path.display(),
            output_mib = format!("{:.1}", sizing::mib(output_bytes)),
            minutes = format!("{:.1}", duration.as_secs_f64() / 60.0),
            "conversion finished"
        );
        try_emit(
            sink,
            format!(
                "Conversion complete: {:.1} MiB in {:.1} minutes",
                sizing::mib(output_bytes),
                duration.as_secs_f64() / 60.0
            ),
        );

        Ok(ConversionResult {
            output_path,
            output_bytes,
            duration,
            target_format: request.target_format,
        })
    }

    /// Check the input exists and is acceptable; returns its size in bytes.
    fn validate_input(&self, request: &ConversionRequest) -> Result<u64> {
        let input = &request.input_path;

        let meta = std::fs::metadata(input)
            .map_err(|_| ConversionError::InputNotFound(input.clone()))?;
        if !meta.is_file() {
            return Err(ConversionError::InputNotFound(input.clone()));
        }
        if meta.len() == 0 {
            return Err(ConversionError::EmptyInput(input.clone()));
        }
        if let Some(limit) = self.config.max_input_bytes {
            if meta.len() > limit {
                return Err(ConversionError::InputTooLarge {
                    size: meta.len(),
                    limit,
                });
            }
        }
        if let Some(ext) = input.extension().and_then(|e| e.to_str()) {
            if !crate::is_supported_input(ext) {
                return Err(ConversionError::UnsupportedInput {
                    extension: ext.to_lowercase(),
                });
            }
        }

        Ok(meta.len())
    }

    /// Standard path: one engine run under the short deadline.
    async fn convert_standard(
        &self,
        request: &ConversionRequest,
        input_bytes: u64,
    ) -> Result<PathBuf> {
        let output_path = self.output_path_for(&request.input_path, request.target_format);
        let args = self.engine_args(
            &request.input_path,
            &output_path,
            request.target_format,
            input_bytes,
            false,
        );

        debug!(args = ?args, "standard-path engine invocation");
        let captured =
            process::run_with_deadline(&self.engine_path, &args, self.config.standard_timeout)
                .await?;

        self.check_outcome(captured, &output_path)
    }

    /// Large-file path: optional pre-optimization, extended deadline, and
    /// progress supervision. The intermediate optimized file is deleted in
    /// every outcome.
    async fn convert_large(
        &self,
        request: &ConversionRequest,
        input_bytes: u64,
        sink: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<PathBuf> {
        try_emit(
            sink,
            format!("Analyzing file ({:.1} MiB)...", sizing::mib(input_bytes)),
        );

        let working = self
            .optimizer
            .maybe_optimize(&request.input_path, input_bytes, sink)
            .await;
        let working_bytes = if working == request.input_path {
            input_bytes
        } else {
            std::fs::metadata(&working)
                .map(|m| m.len())
                .unwrap_or(input_bytes)
        };

        // The output name derives from the original input, not the scratch
        // file, so callers see a stable name either way.
        let output_path = self.output_path_for(&request.input_path, request.target_format);

        try_emit(
            sink,
            format!(
                "Starting conversion to {} (estimated ~{} minutes)",
                request.target_format.as_str().to_uppercase(),
                estimate_minutes(working_bytes, request.target_format)
            ),
        );

        let run = self
            .run_monitored(&working, &output_path, request.target_format, working_bytes, sink)
            .await;

        if working != request.input_path {
            match std::fs::remove_file(&working) {
                Ok(()) => debug!(path = %working.display(), "removed intermediate optimized file"),
                Err(e) => warn!(path = %working.display(), "failed to remove intermediate file: {e}"),
            }
        }

        self.check_outcome(run?, &output_path)
    }

    async fn run_monitored(
        &self,
        input: &Path,
        output_path: &Path,
        format: OutputFormat,
        input_bytes: u64,
        sink: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<CapturedOutput> {
        let args = self.engine_args(input, output_path, format, input_bytes, true);
        debug!(args = ?args, "large-path engine invocation");

        let child = process::spawn_piped(&self.engine_path, &args)?;
        self.monitor
            .supervise(
                child,
                &self.engine_path.display().to_string(),
                self.config.large_timeout,
                sink,
            )
            .await
    }

    /// Engine argument order: input, output, then tuning flags.
    fn engine_args(
        &self,
        input: &Path,
        output: &Path,
        format: OutputFormat,
        input_bytes: u64,
        verbose: bool,
    ) -> Vec<String> {
        let mut args = vec![input.display().to_string(), output.display().to_string()];
        if verbose {
            args.push("--verbose".to_string());
        }
        args.extend(profile::tuning_flags(format, input_bytes));
        args
    }

    fn output_path_for(&self, input: &Path, format: OutputFormat) -> PathBuf {
        let base = input.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        input.with_file_name(naming::output_file_name(base, format))
    }

    /// Zero exit code alone is not success; the output file must exist too.
    fn check_outcome(&self, captured: CapturedOutput, output_path: &Path) -> Result<PathBuf> {
        if !captured.success() {
            warn!(
                code = captured.status.code().unwrap_or(-1),
                "engine exited with failure"
            );
            return Err(ConversionError::EngineFailed {
                status: captured.status.code().unwrap_or(-1),
                message: captured.output,
            });
        }
        if !output_path.exists() {
            return Err(ConversionError::MissingOutput(output_path.to_path_buf()));
        }
        Ok(output_path.to_path_buf())
    }

    /// Classify, record, and wrap a failure for the caller.
    fn record_failure(
        &self,
        err: ConversionError,
        request: &ConversionRequest,
        input_bytes: Option<u64>,
    ) -> ConversionFailure {
        let code = match &err {
            ConversionError::InputNotFound(_) => ErrorCode::FileNotFound,
            ConversionError::EmptyInput(_) => ErrorCode::ValidationEmptyFile,
            ConversionError::InputTooLarge { .. } => ErrorCode::FileTooLarge,
            ConversionError::UnsupportedInput { .. } | ConversionError::UnknownFormat(_) => {
                ErrorCode::ValidationUnsupportedFormat
            }
            ConversionError::Timeout { .. } => ErrorCode::ConversionTimeout,
            ConversionError::EngineFailed { message, .. } => classify_failure(message),
            ConversionError::MissingOutput(_) => ErrorCode::ConversionFailed,
            ConversionError::EngineNotFound(_) => ErrorCode::SystemEngineError,
            ConversionError::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCode::FileAccessDenied
            }
            ConversionError::Io(_) | ConversionError::InvalidConfig(_) => ErrorCode::UnknownError,
        };

        let mut context = HashMap::new();
        context.insert(
            "file_name".to_string(),
            request
                .input_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        context.insert(
            "target_format".to_string(),
            request.target_format.as_str().to_string(),
        );
        if let Some(bytes) = input_bytes {
            context.insert(
                "file_size_mib".to_string(),
                format!("{:.1}", sizing::mib(bytes)),
            );
        }

        let error_id = self.errors.log_error(
            code,
            Some(err.to_string()),
            context,
            request.requester_id.clone(),
        );
        let message = self.errors.get_user_message(code, &error_id);

        warn!(%error_id, code = code.code(), "conversion failed");
        ConversionFailure {
            error_id,
            code,
            message,
        }
    }
}

/// Rough conversion-time estimate for the initial progress message.
fn estimate_minutes(bytes: u64, format: OutputFormat) -> u64 {
    let base = sizing::mib(bytes) * 0.1;
    let multiplier = match format {
        OutputFormat::Txt => 0.5,
        OutputFormat::Epub => 1.0,
        OutputFormat::Mobi => 1.2,
        OutputFormat::Pdf => 1.5,
        _ => 1.0,
    };
    ((base * multiplier).round() as u64).clamp(1, 30)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn config_with_fake_engine() -> ConverterConfig {
        // Any existing file works as an "engine" for constructor tests.
        ConverterConfig::default().engine_path(std::env::current_exe().unwrap())
    }

    #[test]
    fn test_new_fails_with_nonexistent_engine_path() {
        let config =
            ConverterConfig::default().engine_path(PathBuf::from("/nonexistent/ebook-convert"));
        let result = Converter::new(config);
        assert!(matches!(result, Err(ConversionError::EngineNotFound(_))));
    }

    #[test]
    fn test_new_accepts_existing_engine_path() {
        assert!(Converter::new(config_with_fake_engine()).is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = config_with_fake_engine().standard_timeout(std::time::Duration::ZERO);
        assert!(matches!(
            Converter::new(config),
            Err(ConversionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_output_path_is_next_to_input() {
        let converter = Converter::new(config_with_fake_engine()).unwrap();
        let output =
            converter.output_path_for(Path::new("/books/report.pdf"), OutputFormat::Epub);
        assert_eq!(output, PathBuf::from("/books/report_converted.epub"));
    }

    #[test]
    fn test_engine_args_order() {
        let converter = Converter::new(config_with_fake_engine()).unwrap();
        let args = converter.engine_args(
            Path::new("in.pdf"),
            Path::new("out.epub"),
            OutputFormat::Epub,
            MIB,
            true,
        );
        assert_eq!(args[0], "in.pdf");
        assert_eq!(args[1], "out.epub");
        assert_eq!(args[2], "--verbose");
        assert!(args.contains(&"--enable-heuristics".to_string()));
    }

    #[test]
    fn test_estimate_minutes_clamped() {
        assert_eq!(estimate_minutes(MIB, OutputFormat::Epub), 1);
        assert_eq!(estimate_minutes(1024 * MIB, OutputFormat::Pdf), 30);
        // 80 MiB epub: 80 * 0.1 = 8 minutes.
        assert_eq!(estimate_minutes(80 * MIB, OutputFormat::Epub), 8);
    }

    #[test]
    fn test_shared_error_manager_is_visible_to_owner() {
        let errors = Arc::new(ErrorManager::new());
        let converter =
            Converter::with_error_manager(config_with_fake_engine(), Arc::clone(&errors)).unwrap();
        assert!(Arc::ptr_eq(&converter.error_manager(), &errors));
    }
}
