//! Shared size classification.
//!
//! Every size-dependent decision in the crate — path selection, the
//! pre-optimization trigger, and profile flag selection — goes through this
//! module, so the thresholds cannot drift apart.

/// Above this, the conversion profile adds structural-simplification flags.
pub const STRUCTURAL_FLAGS_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Above this, the orchestrator takes the large-file path.
pub const LARGE_FILE_THRESHOLD: u64 = 20 * 1024 * 1024;

/// Above this, PDF inputs are pre-optimized before conversion.
pub const OPTIMIZE_THRESHOLD: u64 = 30 * 1024 * 1024;

/// Above this, format-specific aggressive flags cap structural elements.
pub const AGGRESSIVE_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Coarse input size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// Below the large-file threshold; converted on the standard path.
    Standard,
    /// Large enough for the large-file path and extended timeout.
    Large,
    /// Large enough for aggressive profile flags on top of the large path.
    Huge,
}

impl SizeClass {
    /// Classify an input size in bytes.
    pub fn of(bytes: u64) -> Self {
        if bytes > AGGRESSIVE_THRESHOLD {
            SizeClass::Huge
        } else if bytes > LARGE_FILE_THRESHOLD {
            SizeClass::Large
        } else {
            SizeClass::Standard
        }
    }
}

/// Whether the orchestrator should take the large-file path.
pub fn takes_large_path(bytes: u64) -> bool {
    bytes > LARGE_FILE_THRESHOLD
}

/// Whether the profile should add structural-simplification flags.
pub fn needs_structural_flags(bytes: u64) -> bool {
    bytes > STRUCTURAL_FLAGS_THRESHOLD
}

/// Whether a PDF input is worth pre-optimizing before conversion.
pub fn wants_preoptimization(bytes: u64) -> bool {
    bytes > OPTIMIZE_THRESHOLD
}

/// Size in mebibytes, for logging and progress messages.
pub fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
