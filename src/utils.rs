//! Small string and filesystem helpers shared across stages.
//!
//! - String truncation and whitespace cleanup for logs and scraped text
//! - Digit extraction for free-text counters ("12 comments")
//! - Slug derivation for category anchors
//! - JSON error detection for handling truncated model responses
//! - Output directory validation

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::PipelineError;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static NON_SLUG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("static regex"));
static HYPHEN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("static regex"));

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```
/// use show_directory::utils::truncate_for_log;
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// A model response cut off by a token limit fails with an EOF error rather
/// than a syntax error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Pull the digits out of free text and parse them, e.g. `"12\u{a0}comments"`
/// → 12. Text without digits (or too many) yields 0.
pub fn digits_in(text: &str) -> u32 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Convert a category display name to a stable, URL-safe slug.
///
/// Lowercases, strips anything that is not a word character, whitespace or
/// hyphen, then joins words with single hyphens. Applying it twice is a no-op.
///
/// # Examples
///
/// ```
/// use show_directory::utils::slugify;
/// assert_eq!(
///     slugify("Data Visualization & Dashboards"),
///     "data-visualization-dashboards"
/// );
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = NON_SLUG_CHARS.replace_all(&lowered, "");
    let hyphenated = WHITESPACE.replace_all(stripped.trim(), "-");
    HYPHEN_RUNS.replace_all(&hyphenated, "-").into_owned()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file so a
/// read-only data directory is reported before any network work starts.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Data directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééé", 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+4 bytes)"));
    }

    #[test]
    fn test_looks_truncated() {
        let result: Result<serde_json::Value, _> = serde_json::from_str(r#"{"1": "AI"#);
        let err = result.unwrap_err();
        assert!(looks_truncated(&err));

        let result: Result<serde_json::Value, _> = serde_json::from_str("{]");
        assert!(!looks_truncated(&result.unwrap_err()));
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }

    #[test]
    fn test_digits_in() {
        assert_eq!(digits_in("128 points"), 128);
        assert_eq!(digits_in("12\u{a0}comments"), 12);
        assert_eq!(digits_in("discuss"), 0);
        assert_eq!(digits_in(""), 0);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Data Visualization & Dashboards"),
            "data-visualization-dashboards"
        );
        assert_eq!(slugify("AI & LLM Tools"), "ai-llm-tools");
        assert_eq!(slugify("  Web3 -- Blockchain "), "web3-blockchain");
        assert_eq!(slugify("Other"), "other");
    }

    #[test]
    fn test_slugify_is_idempotent() {
        for name in [
            "Data Visualization & Dashboards",
            "Productivity & Browser Extensions",
            "Games/Entertainment!!",
        ] {
            let once = slugify(name);
            assert_eq!(slugify(&once), once);
        }
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }
}
