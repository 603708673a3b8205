//! Output file naming.
//!
//! Derives a safe, bounded-length output name from the input's base name and
//! the target format. Deterministic and idempotent: the same logical input
//! always yields the same name.

use crate::config::OutputFormat;

/// Marker appended to every successfully named output file.
pub const SUCCESS_MARKER: &str = "converted";

/// Base name used when sanitization strips the input name to nothing.
pub const FALLBACK_BASE_NAME: &str = "Converted_Book";

/// Maximum sanitized base-name length in characters.
pub const MAX_BASE_LEN: usize = 50;

/// Strip characters illegal on common filesystems and collapse whitespace.
///
/// Keeps alphanumeric characters (any script), spaces, hyphens, and
/// underscores; everything else is dropped. Runs of whitespace collapse to a
/// single space.
pub fn sanitize_base_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Produce the output file name: `<base>_<marker>.<extension>`.
///
/// The base name is sanitized, truncated to [`MAX_BASE_LEN`] characters, and
/// falls back to [`FALLBACK_BASE_NAME`] when nothing survives sanitization.
pub fn output_file_name(base: &str, format: OutputFormat) -> String {
    let mut safe = sanitize_base_name(base);

    if safe.chars().count() > MAX_BASE_LEN {
        safe = safe.chars().take(MAX_BASE_LEN).collect();
        safe = safe.trim_end().to_string();
    }

    if safe.is_empty() {
        safe = FALLBACK_BASE_NAME.to_string();
    }

    format!("{}_{}.{}", safe, SUCCESS_MARKER, format.extension())
}
