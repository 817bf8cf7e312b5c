//! Filename rules: code sanitization, failure tags and stem/extension helpers.

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Longest code, in characters, used as a filename stem.
pub const MAX_CODE_CHARS: usize = 150;

/// Extension used when a source file has none.
pub const FALLBACK_EXTENSION: &str = "pdf";

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("static regex is valid"));

static UNDERSCORE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_+").expect("static regex is valid"));

/// Why a file ended up in `failed`. The tag becomes part of its new name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The file never stopped growing within the sampling budget.
    Unstable,
    /// A code was decoded but nothing filename-safe was left of it.
    EmptyBarcode,
    /// No page, in any orientation, yielded a code.
    NoBarcode,
    /// An unexpected error interrupted the pipeline.
    Exception,
    /// The worker queue was saturated when the file arrived.
    QueueFull,
}

impl FailureReason {
    pub const fn as_tag(self) -> &'static str {
        match self {
            FailureReason::Unstable => "unstable",
            FailureReason::EmptyBarcode => "empty_barcode",
            FailureReason::NoBarcode => "no_barcode",
            FailureReason::Exception => "exception",
            FailureReason::QueueFull => "queue_full",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A decoded code that is safe to use as a filename stem. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdentifyingCode(String);

impl IdentifyingCode {
    /// Sanitize raw decoder output. `None` when nothing usable remains.
    ///
    /// Control characters are dropped, path separators and other characters
    /// rejected by common filesystems become `_`, runs of `_` collapse, and
    /// separators, dots and whitespace are trimmed from both ends before and
    /// after the length cap.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let without_controls: String = raw.chars().filter(|c| !c.is_control()).collect();
        let replaced = UNSAFE_CHARS.replace_all(without_controls.trim(), "_");
        let collapsed = UNDERSCORE_RUNS.replace_all(&replaced, "_");
        let trimmed = trim_edges(&collapsed);

        let capped: String = trimmed.chars().take(MAX_CODE_CHARS).collect();
        let cleaned = trim_edges(&capped);
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentifyingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentifyingCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn trim_edges(value: &str) -> &str {
    value.trim_matches(|c: char| c == '_' || c == '.' || c.is_whitespace())
}

/// Filename without its last extension. Dot-files keep their full name.
pub fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name,
    }
}

/// Lower-cased extension of `path`, or [`FALLBACK_EXTENSION`].
pub fn file_extension(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => name[dot + 1..].to_ascii_lowercase(),
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Base name a failed file is filed under: `<stem>_<reason>`.
pub fn failure_base_name(path: &Path, reason: FailureReason) -> String {
    format!("{}_{}", file_stem(path), reason.as_tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn sanitize_keeps_plain_codes() {
        let code = IdentifyingCode::sanitize("ABC123").unwrap();
        assert_eq!(code.as_str(), "ABC123");
    }

    #[test]
    fn sanitize_strips_controls_and_replaces_unsafe_characters() {
        let code = IdentifyingCode::sanitize("  INV\u{0007}-2024/07:*?x\n").unwrap();
        assert_eq!(code.as_str(), "INV-2024_07_x");
    }

    #[test]
    fn sanitize_is_deterministic() {
        let raw = "A<B>C|\"D\"";
        let first = IdentifyingCode::sanitize(raw);
        let second = IdentifyingCode::sanitize(raw);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().as_str(), "A_B_C_D");
    }

    #[test]
    fn sanitize_yields_none_for_only_disallowed_characters() {
        assert_eq!(IdentifyingCode::sanitize("\\/:*?\"<>|"), None);
        assert_eq!(IdentifyingCode::sanitize("\u{0000}\u{001b}\t"), None);
        assert_eq!(IdentifyingCode::sanitize("   "), None);
        assert_eq!(IdentifyingCode::sanitize(".."), None);
        assert_eq!(IdentifyingCode::sanitize(""), None);
    }

    #[test]
    fn sanitize_caps_length() {
        let raw = "x".repeat(400);
        let code = IdentifyingCode::sanitize(&raw).unwrap();
        assert_eq!(code.as_str().chars().count(), MAX_CODE_CHARS);
    }

    #[test]
    fn stem_and_extension_follow_last_dot() {
        let path = PathBuf::from("/in/scan.final.PDF");
        assert_eq!(file_stem(&path), "scan.final");
        assert_eq!(file_extension(&path), "pdf");

        let hidden = PathBuf::from("/in/.pdf");
        assert_eq!(file_stem(&hidden), ".pdf");
        assert_eq!(file_extension(&hidden), FALLBACK_EXTENSION);
    }

    #[test]
    fn failure_names_carry_the_reason_tag() {
        let path = PathBuf::from("/work/scan1.pdf");
        assert_eq!(
            failure_base_name(&path, FailureReason::NoBarcode),
            "scan1_no_barcode"
        );
        assert_eq!(FailureReason::QueueFull.to_string(), "queue_full");
    }
}
