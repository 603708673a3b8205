//! Best-effort PDF pre-optimization.
//!
//! Large raster-heavy PDFs make the downstream engine crawl; a Ghostscript
//! pass with a bounded resolution, deduplicated images, and compressed fonts
//! shrinks them first. The step must never block or fail the conversion: on
//! any problem the original input is used unchanged.

use crate::config::{try_emit, ConverterConfig, ProgressEvent};
use crate::error::Result;
use crate::process;
use crate::sizing;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Fixed Ghostscript quality target for ebook-bound PDFs.
const GS_FLAGS: &[&str] = &[
    "-sDEVICE=pdfwrite",
    "-dCompatibilityLevel=1.4",
    "-dPDFSETTINGS=/ebook",
    "-dNOPAUSE",
    "-dQUIET",
    "-dBATCH",
    "-dDetectDuplicateImages=true",
    "-dCompressFonts=true",
    "-r150",
];

/// Shrinks oversized PDF inputs before conversion.
#[derive(Debug)]
pub struct PreOptimizer {
    gs_path: Option<PathBuf>,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl PreOptimizer {
    pub fn new(config: &ConverterConfig) -> Self {
        let gs_path = config
            .optimizer_path
            .clone()
            .or_else(|| which::which("gs").ok());
        if gs_path.is_none() {
            debug!("ghostscript not found, PDF pre-optimization disabled");
        }

        Self {
            gs_path,
            timeout: config.optimize_timeout,
            temp_dir: config.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }

    /// Optimize `input` if it is a PDF above the optimization threshold.
    ///
    /// Returns the path the conversion should use: a freshly written
    /// temporary file on success, or `input` unchanged when the step does
    /// not apply or fails for any reason. A returned temporary file is owned
    /// by the orchestrator, which deletes it once the conversion step ends.
    pub async fn maybe_optimize(
        &self,
        input: &Path,
        input_bytes: u64,
        sink: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> PathBuf {
        let is_pdf = input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf || !sizing::wants_preoptimization(input_bytes) {
            return input.to_path_buf();
        }

        let Some(gs_path) = self.gs_path.as_deref() else {
            return input.to_path_buf();
        };

        try_emit(sink, "Optimizing PDF file...");

        match self.run_optimizer(gs_path, input).await {
            Ok(Some(optimized)) => {
                let before = sizing::mib(input_bytes);
                let after = std::fs::metadata(&optimized)
                    .map(|m| sizing::mib(m.len()))
                    .unwrap_or(before);
                info!("PDF optimized: {before:.1} MiB -> {after:.1} MiB");
                try_emit(
                    sink,
                    format!("PDF optimized: {before:.1} MiB -> {after:.1} MiB"),
                );
                optimized
            }
            Ok(None) => {
                warn!(input = %input.display(), "PDF optimization produced nothing, using original");
                input.to_path_buf()
            }
            Err(e) => {
                warn!(input = %input.display(), "PDF optimization failed, using original: {e}");
                input.to_path_buf()
            }
        }
    }

    /// Run Ghostscript into a uniquely named scratch file.
    ///
    /// `Ok(None)` means the tool ran but did not produce a usable file; the
    /// scratch file is removed in every non-success outcome.
    async fn run_optimizer(&self, gs_path: &Path, input: &Path) -> Result<Option<PathBuf>> {
        let scratch = tempfile::Builder::new()
            .prefix("optimized_")
            .suffix(".pdf")
            .tempfile_in(&self.temp_dir)?
            .into_temp_path()
            .keep()
            .map_err(|e| e.error)?;

        let mut args: Vec<String> = GS_FLAGS.iter().map(|f| f.to_string()).collect();
        args.push(format!("-sOutputFile={}", scratch.display()));
        args.push(input.display().to_string());

        let outcome = process::run_with_deadline(gs_path, &args, self.timeout).await;

        let usable = match &outcome {
            Ok(captured) if captured.success() => std::fs::metadata(&scratch)
                .map(|m| m.len() > 0)
                .unwrap_or(false),
            _ => false,
        };

        if !usable {
            let _ = std::fs::remove_file(&scratch);
            outcome?;
            return Ok(None);
        }

        Ok(Some(scratch))
    }
}
