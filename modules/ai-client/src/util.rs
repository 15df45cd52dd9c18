use std::sync::LazyLock;

use regex::Regex;

static FENCED_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?\s*(\[[\s\S]*?\])\s*```").expect("valid fenced-array regex")
});

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Locate the JSON array embedded in a free-text completion.
///
/// A fenced code block holding an array wins; otherwise the slice from the
/// first `[` to the last `]`. Returns `None` when neither is present. The
/// slice is not guaranteed to parse.
pub fn extract_json_array(response: &str) -> Option<&str> {
    if let Some(m) = FENCED_ARRAY.captures(response).and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    (start < end).then(|| &response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_char_boundary() {
        let text = "Hello 세계";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn fenced_block_wins_over_stray_brackets() {
        let text = "note [draft]\n```json\n[{\"name\": \"a\"}]\n```\ntrailing ]";
        assert_eq!(extract_json_array(text), Some("[{\"name\": \"a\"}]"));
    }

    #[test]
    fn unfenced_array_uses_outer_brackets() {
        let text = "Here you go: [{\"tags\": [\"x\"]}] hope it helps";
        assert_eq!(extract_json_array(text), Some("[{\"tags\": [\"x\"]}]"));
    }

    #[test]
    fn no_brackets_yields_none() {
        assert_eq!(extract_json_array("no events found"), None);
        assert_eq!(extract_json_array("] backwards ["), None);
    }
}
