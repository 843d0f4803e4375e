//! Utility functions for file naming, log formatting and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Filename sanitization for downloaded documents
//! - Whitespace normalization for scraped titles
//! - String truncation for logging
//! - File system validation for the download root

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Longest file name [`sanitize_filename`] will produce, in characters.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Name used when nothing usable survives sanitization.
pub const FALLBACK_FILENAME: &str = "unnamed.pdf";

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace (including newlines) to single spaces and trim.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_ws("  Lecture\n   Notes "), "Lecture Notes");
/// ```
pub fn normalize_ws(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}

/// Turn an arbitrary title into a safe, bounded `.pdf` file name.
///
/// The input is percent-decoded, stripped of characters that are illegal in
/// common file systems (`< > : " / \ | ? *`) and of control characters, and
/// has its whitespace collapsed. A `.pdf` suffix is appended unless one is
/// already present (case-insensitive). The result never exceeds
/// [`MAX_FILENAME_CHARS`] characters; the stem is shortened so the suffix
/// survives.
///
/// # Returns
///
/// The sanitized name, or [`FALLBACK_FILENAME`] when the stem ends up empty.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_filename("Calc Notes"), "Calc Notes.pdf");
/// assert_eq!(sanitize_filename("a%2Fb?.PDF"), "ab.PDF");
/// assert_eq!(sanitize_filename("???"), "unnamed.pdf");
/// ```
pub fn sanitize_filename(raw: &str) -> String {
    let decoded = match urlencoding::decode(raw) {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned(),
    };

    let stripped: String = decoded
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = normalize_ws(&stripped);

    let (stem, suffix) = match split_pdf_suffix(&cleaned) {
        Some((stem, suffix)) => (stem.trim_end(), suffix),
        None => (cleaned.as_str(), ".pdf"),
    };
    if stem.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }

    let budget = MAX_FILENAME_CHARS - suffix.chars().count();
    let stem: String = stem.chars().take(budget).collect();
    format!("{}{}", stem.trim_end(), suffix)
}

/// `name` with ` (n)` inserted before its `.pdf` suffix.
///
/// Used to give a second file with the same sanitized name its own path. The
/// stem is shortened as needed so the result stays within
/// [`MAX_FILENAME_CHARS`].
///
/// # Examples
///
/// ```ignore
/// assert_eq!(numbered_filename("PDF.pdf", 2), "PDF (2).pdf");
/// ```
pub fn numbered_filename(name: &str, n: usize) -> String {
    let (stem, suffix) = split_pdf_suffix(name).unwrap_or((name, ""));
    let marker = format!(" ({n})");
    let budget = MAX_FILENAME_CHARS.saturating_sub(suffix.chars().count() + marker.chars().count());
    let stem: String = stem.chars().take(budget).collect();
    format!("{}{}{}", stem.trim_end(), marker, suffix)
}

/// Split `name` into stem and its original-case `.pdf` suffix, if it has one.
fn split_pdf_suffix(name: &str) -> Option<(&str, &str)> {
    let cut = name.len().checked_sub(4)?;
    if !name.is_char_boundary(cut) {
        return None;
    }
    let (stem, suffix) = name.split_at(cut);
    suffix.eq_ignore_ascii_case(".pdf").then_some((stem, suffix))
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped characters appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 chars)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max).collect();
        format!("{}…(+{} chars)", head, total - max)
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a scratch file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error + Send + Sync>> {
    fs::create_dir_all(path).await?;
    let scratch = path.join("..__write_test__");
    match stdfs::File::create(&scratch) {
        Ok(_) => {
            let _ = stdfs::remove_file(&scratch);
            info!("Download directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_appends_suffix() {
        assert_eq!(sanitize_filename("Calc Notes"), "Calc Notes.pdf");
        assert_eq!(sanitize_filename("Calc Notes.pdf"), "Calc Notes.pdf");
        assert_eq!(sanitize_filename("Calc Notes.PDF"), "Calc Notes.PDF");
    }

    #[test]
    fn test_sanitize_strips_forbidden_chars() {
        let out = sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#);
        assert_eq!(out, "abcdefghij.pdf");
        for c in FORBIDDEN_CHARS {
            assert!(!out.contains(*c));
        }
    }

    #[test]
    fn test_sanitize_percent_decodes() {
        assert_eq!(sanitize_filename("Linear%20Algebra"), "Linear Algebra.pdf");
        // a decoded slash is still stripped
        assert_eq!(sanitize_filename("a%2Fb"), "ab.pdf");
        // invalid utf-8 decodes lossily rather than failing
        assert!(sanitize_filename("bad%FFbyte").ends_with(".pdf"));
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(
            sanitize_filename("  Lecture\n    Notes\ton Topology "),
            "Lecture Notes on Topology.pdf"
        );
    }

    #[test]
    fn test_sanitize_degenerate_input() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("???"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("   "), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".pdf"), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("<>:.PDF"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_sanitize_bounds_length_and_keeps_suffix() {
        let long = "x".repeat(500);
        let out = sanitize_filename(&long);
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);
        assert!(out.ends_with(".pdf"));

        let wide = "é".repeat(300);
        let out = sanitize_filename(&wide);
        assert!(out.chars().count() <= MAX_FILENAME_CHARS);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn test_sanitize_invariants_over_samples() {
        let samples = [
            "Introduction to Linear Algebra",
            "math.AG_On *stacks*: a survey?",
            "%3Cscript%3E",
            "C:\\Windows\\notes",
            "日本語のタイトル",
            "ends with dot pdf.pdf.pdf",
        ];
        for s in samples {
            let out = sanitize_filename(s);
            assert!(out.to_lowercase().ends_with(".pdf"), "{out}");
            assert!(out.chars().count() <= MAX_FILENAME_CHARS);
            assert!(!out.contains(FORBIDDEN_CHARS), "{out}");
        }
    }

    #[test]
    fn test_numbered_filename_keeps_suffix_and_bound() {
        assert_eq!(numbered_filename("PDF.pdf", 2), "PDF (2).pdf");
        assert_eq!(numbered_filename("Notes.PDF", 13), "Notes (13).PDF");

        let full = sanitize_filename(&"z".repeat(500));
        let out = numbered_filename(&full, 2);
        assert_eq!(out.chars().count(), MAX_FILENAME_CHARS);
        assert!(out.ends_with(" (2).pdf"));
        assert_ne!(out, full);
    }

    #[test]
    fn test_normalize_ws() {
        assert_eq!(normalize_ws("  a \n\n b  "), "a b");
        assert_eq!(normalize_ws(""), "");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 chars)"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        // second call on an existing dir is fine
        ensure_writable_dir(&nested).await.unwrap();
    }
}
