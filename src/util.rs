/// Truncate to at most `max_chars` characters without splitting a UTF-8 sequence.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate for log lines, appending `...` when something was cut.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(s, max_chars);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_short_input_unchanged() {
        assert_eq!(truncate_chars("merhaba", 300), "merhaba");
    }

    #[test]
    fn truncate_chars_respects_multibyte() {
        let s = "çğüşöı".repeat(100);
        let cut = truncate_chars(&s, 300);
        assert_eq!(cut.chars().count(), 300);
        assert!(s.starts_with(cut));
    }

    #[test]
    fn truncate_with_ellipsis_marks_cut() {
        assert_eq!(truncate_with_ellipsis("abcdef", 3), "abc...");
        assert_eq!(truncate_with_ellipsis("abc", 3), "abc");
    }
}
