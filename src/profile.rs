//! Conversion profiles: engine tuning flags derived from target format and
//! input size.
//!
//! A pure mapping, recomputed per request and never mutated afterwards. The
//! flags keep the engine's internal document graph small for big inputs and
//! pin down metadata so the engine never waits for interactive input or
//! embeds nondeterministic values.

use crate::config::OutputFormat;
use crate::sizing;

/// Compute the ordered flag list for one engine invocation.
///
/// Total over its whole domain: every (format, size) pair yields a non-empty
/// list. Formats without a dedicated branch get the threshold-based generic
/// flags only.
pub fn tuning_flags(format: OutputFormat, input_bytes: u64) -> Vec<String> {
    let mut flags: Vec<String> = vec!["--enable-heuristics".to_string()];

    // Deterministic metadata defaults; the engine derives the title from the
    // file name, but the language must be pinned or it guesses.
    flags.push("--language".to_string());
    flags.push("en".to_string());

    if sizing::needs_structural_flags(input_bytes) {
        flags.extend(
            [
                "--max-levels=5",
                "--chapter-mark=none",
                "--page-breaks-before=/",
                "--remove-paragraph-spacing",
                "--linearize-tables",
            ]
            .map(String::from),
        );
    }

    match format {
        OutputFormat::Epub => {
            flags.extend(
                [
                    "--epub-version=2",
                    "--epub-flatten",
                    "--no-default-epub-cover",
                    "--disable-font-rescaling",
                    // Empty value clears any inherited font family.
                    "--embed-font-family=",
                    "--subset-embedded-fonts",
                    "--smarten-punctuation",
                ]
                .map(String::from),
            );
            if input_bytes > sizing::AGGRESSIVE_THRESHOLD {
                flags.extend(
                    [
                        "--max-toc-links=50",
                        "--duplicate-links-in-toc",
                        "--toc-threshold=6",
                    ]
                    .map(String::from),
                );
            }
        }
        OutputFormat::Mobi => {
            flags.extend(
                [
                    "--mobi-file-type=both",
                    "--mobi-ignore-margins",
                    "--mobi-keep-original-images=false",
                ]
                .map(String::from),
            );
        }
        OutputFormat::Txt => {
            flags.extend(["--formatting-type=plain", "--txt-output-encoding=utf-8"].map(String::from));
        }
        // Generic threshold-based flags only.
        OutputFormat::Pdf | OutputFormat::Fb2 | OutputFormat::Html => {}
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_flags_are_never_empty() {
        for format in OutputFormat::all() {
            for size in [0, 5 * MIB, 15 * MIB, 40 * MIB, 80 * MIB] {
                assert!(
                    !tuning_flags(*format, size).is_empty(),
                    "empty flags for {format} at {size} bytes"
                );
            }
        }
    }

    #[test]
    fn test_small_input_gets_no_structural_flags() {
        let flags = tuning_flags(OutputFormat::Html, 2 * MIB);
        assert!(!flags.iter().any(|f| f.starts_with("--max-levels")));
        assert!(flags.contains(&"--enable-heuristics".to_string()));
    }

    #[test]
    fn test_large_input_gets_structural_flags() {
        let flags = tuning_flags(OutputFormat::Pdf, 15 * MIB);
        assert!(flags.contains(&"--max-levels=5".to_string()));
        assert!(flags.contains(&"--chapter-mark=none".to_string()));
        assert!(flags.contains(&"--remove-paragraph-spacing".to_string()));
        assert!(flags.contains(&"--linearize-tables".to_string()));
    }

    #[test]
    fn test_epub_aggressive_flags_above_threshold_only() {
        let moderate = tuning_flags(OutputFormat::Epub, 30 * MIB);
        assert!(!moderate.contains(&"--max-toc-links=50".to_string()));

        let huge = tuning_flags(OutputFormat::Epub, 80 * MIB);
        assert!(huge.contains(&"--max-toc-links=50".to_string()));
        assert!(huge.contains(&"--toc-threshold=6".to_string()));
    }

    #[test]
    fn test_format_specific_flags() {
        let epub = tuning_flags(OutputFormat::Epub, MIB);
        assert!(epub.contains(&"--epub-version=2".to_string()));
        assert!(epub.contains(&"--no-default-epub-cover".to_string()));
        assert!(epub.contains(&"--embed-font-family=".to_string()));

        let mobi = tuning_flags(OutputFormat::Mobi, MIB);
        assert!(mobi.contains(&"--mobi-file-type=both".to_string()));

        let txt = tuning_flags(OutputFormat::Txt, MIB);
        assert!(txt.contains(&"--txt-output-encoding=utf-8".to_string()));
    }

    #[test]
    fn test_metadata_defaults_always_present() {
        for format in OutputFormat::all() {
            let flags = tuning_flags(*format, 0);
            let pos = flags.iter().position(|f| f == "--language").unwrap();
            assert_eq!(flags[pos + 1], "en");
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(
            tuning_flags(OutputFormat::Epub, 80 * MIB),
            tuning_flags(OutputFormat::Epub, 80 * MIB)
        );
    }
}
