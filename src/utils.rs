//! Utility functions for text handling, file naming and output directories.
//!
//! - Char-boundary-safe truncation for logs, previews and length caps
//! - Code-fence stripping for model replies
//! - File-name sanitizing for entity-derived paths
//! - Edition naming and output directory probing

use chrono::{Local, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```").unwrap());

/// Classify a time into `"morning"` (00-08), `"afternoon"` (08-16) or
/// `"evening"` (16-24).
pub fn edition_for(time: NaiveTime) -> &'static str {
    match time.hour() {
        0..=7 => "morning",
        8..=15 => "afternoon",
        _ => "evening",
    }
}

/// Edition name for the current local time.
pub fn time_of_day() -> String {
    let tod = Local::now().time();
    let which = edition_for(tod);
    tracing::debug!(%tod, %which, "Computed time_of_day");
    which.to_string()
}

/// Truncate a string for logging.
///
/// Strings longer than `max` characters are cut and suffixed with
/// `"…(+N bytes)"`.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Cap `s` at `max` characters, appending `marker` when anything was cut.
///
/// Unlike [`truncate_for_log`] the cut never lands inside a multi-byte
/// character, so it is safe on Chinese text.
///
/// # Arguments
///
/// * `s` - The text to cap
/// * `max` - Maximum number of characters to keep
/// * `marker` - Appended only when the text was actually cut
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_chars("abcdef", 3, "[cut]"), "abc[cut]");
/// assert_eq!(truncate_chars("abc", 3, "[cut]"), "abc");
/// ```
pub fn truncate_chars(s: &str, max: usize, marker: &str) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}{}", &s[..cut], marker),
    }
}

/// First `max` characters followed by `"..."` when longer.
pub fn preview(s: &str, max: usize) -> String {
    truncate_chars(s, max, "...")
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Body of the first Markdown code fence in a model reply.
///
/// Models often wrap their answer in a fence and add a sentence before or
/// after it. The fence may appear anywhere in the reply.
///
/// # Returns
///
/// The trimmed content of the first fenced block, or the whole trimmed
/// reply when there is no complete fence.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(strip_code_fences("```json\n[0, 2]\n```"), "[0, 2]");
/// assert_eq!(strip_code_fences("结果如下：\n```json\n[0]\n```\n以上"), "[0]");
/// ```
pub fn strip_code_fences(s: &str) -> &str {
    match CODE_FENCE.captures(s).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => s.trim(),
    }
}

/// Outermost JSON array or object span in `s`.
///
/// Starts at the first `[` or `{` and ends at the last matching closer.
/// Used as a second chance when a reply mixes prose with unfenced JSON.
///
/// # Returns
///
/// `None` when there is no opener or no closer after it.
pub fn json_span(s: &str) -> Option<&str> {
    let start = s.find(['[', '{'])?;
    let close = if s[start..].starts_with('[') { ']' } else { '}' };
    let end = s.rfind(close).filter(|&end| end > start)?;
    Some(&s[start..=end])
}

/// Replace characters that are unsafe in file names.
///
/// `:` becomes `-`; `/ \ * ? " < > |` become `_`. Everything else,
/// including CJK characters and spaces, is kept.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(sanitize_file_name("A/B:C"), "A_B-C");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ':' => '-',
            '/' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Capitalize the first character of a string.
pub fn upcase(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub async fn ensure_writable_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
