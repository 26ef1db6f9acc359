//! Fixed-width text truncation.

/// Marker appended when text is cut to fit a storage field.
pub const TRUNCATION_MARKER: &str = " …[truncated]";

/// Truncate `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
///
/// Character counts, not bytes: summaries may contain non-ASCII text and
/// the storage field budget is in characters.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - marker_len;
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(truncate_with_marker("brief", 100), "brief");
    }

    #[test]
    fn long_text_is_cut_with_marker() {
        let text = "a".repeat(500);
        let out = truncate_with_marker(&text, 100);
        assert_eq!(out.chars().count(), 100);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn tiny_budget_skips_the_marker() {
        let out = truncate_with_marker("abcdefgh", 3);
        assert_eq!(out, "abc");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(50);
        let out = truncate_with_marker(&text, 20);
        assert_eq!(out.chars().count(), 20);
    }
}
