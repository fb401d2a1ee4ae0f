//! Small shared helpers: ids, timestamps, text bounding and pattern matching.

mod pattern_match;

pub use pattern_match::PatternMatcher;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generates a new time-ordered run id.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Returns the current UTC time as an RFC 3339 string.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Truncates `text` to at most `max_chars` characters.
///
/// Returns the bounded text and whether anything was cut.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Shortens text for log lines and observations.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let (mut short, cut) = truncate_chars(text, max_chars);
    if cut {
        short.push_str("...");
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_v7() {
        assert_eq!(generate_run_id().get_version_num(), 7);
    }

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        let (short, cut) = truncate_chars("héllo wörld", 5);
        assert_eq!(short, "héllo");
        assert!(cut);

        let (same, cut) = truncate_chars("abc", 3);
        assert_eq!(same, "abc");
        assert!(!cut);
    }

    #[test]
    fn test_preview_marks_cut() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ab", 3), "ab");
    }
}
