//! # bookmill
//!
//! Document conversion orchestration around an external, black-box engine
//! (Calibre's `ebook-convert`). The engine's runtime is unpredictable —
//! seconds for small files, tens of minutes for large ones — and it has no
//! machine-readable progress protocol, so this crate supplies what the raw
//! tool lacks:
//!
//! - **Deadlines with guaranteed teardown**: a timed-out engine is killed,
//!   never left running.
//! - **Liveness without a protocol**: synthetic progress events on a fixed
//!   cadence, even when the engine is silent.
//! - **Large-file strategy**: Ghostscript pre-optimization, an extended
//!   timeout, and size-tuned engine flags for big, image-heavy inputs.
//! - **A stable failure taxonomy**: every opaque engine failure is classified
//!   into a numeric code and recorded under a short, shareable error id.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookmill::{ConversionRequest, Converter, ConverterConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let converter = Converter::new(ConverterConfig::default())?;
//!
//!     let request = ConversionRequest::new("report.pdf", OutputFormat::Epub);
//!     match converter.convert(request).await {
//!         Ok(result) => println!(
//!             "wrote {} ({} bytes) in {:?}",
//!             result.output_path.display(),
//!             result.output_bytes,
//!             result.duration
//!         ),
//!         Err(failure) => println!("{}", failure.message),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Progress streaming
//!
//! ```rust,no_run
//! use bookmill::{ConversionRequest, Converter, ConverterConfig, OutputFormat};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let converter = Converter::new(ConverterConfig::default())?;
//!
//!     let (tx, mut rx) = mpsc::channel(32);
//!     let request = ConversionRequest::new("archive.pdf", OutputFormat::Epub)
//!         .with_progress(tx);
//!
//!     let status = tokio::spawn(async move {
//!         while let Some(event) = rx.recv().await {
//!             println!("[{}] {}", event.timestamp, event.message);
//!         }
//!     });
//!
//!     let result = converter.convert(request).await;
//!     status.await?;
//!     println!("{:?}", result.map(|r| r.output_path));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod diagnostics;
pub mod error;
pub mod naming;
pub mod optimize;
pub mod process;
pub mod profile;
pub mod sizing;

// Re-export main types for convenience
pub use config::{
    ConversionRequest, ConversionResult, ConverterConfig, OutputFormat, ProgressEvent,
};
pub use converter::Converter;
pub use diagnostics::{classify_failure, ErrorCode, ErrorManager, ErrorRecord};
pub use error::{ConversionError, ConversionFailure, Result};
pub use optimize::PreOptimizer;
pub use process::ProgressMonitor;
pub use sizing::SizeClass;

/// Supported input file extensions.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["pdf", "epub", "fb2", "txt", "html"];

/// Check if an input file extension is supported.
pub fn is_supported_input(ext: &str) -> bool {
    SUPPORTED_INPUT_EXTENSIONS
        .iter()
        .any(|&e| e.eq_ignore_ascii_case(ext))
}

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_input_extensions() {
        assert!(is_supported_input("pdf"));
        assert!(is_supported_input("PDF"));
        assert!(is_supported_input("fb2"));
        assert!(!is_supported_input("docx"));
        assert!(!is_supported_input(""));
    }
}
