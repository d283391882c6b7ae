//! Utility functions for notification channels

/// Maximum length of a gateway response body kept in error messages.
pub const MAX_BODY_LENGTH: usize = 512;

/// Maximum characters in a single SMS.
pub const SMS_MAX_CHARS: usize = 160;

/// Truncates to at most `max_chars` characters, marking the cut.
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}... [truncated]", &s[..idx]),
    }
}

/// Single-message SMS text: `subject - body`, cut to [`SMS_MAX_CHARS`].
pub fn sms_text(subject: &str, body: &str) -> String {
    let full = if body.is_empty() {
        subject.to_string()
    } else {
        format!("{subject} - {body}")
    };
    full.chars().take(SMS_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
        assert_eq!(truncate_string("héllo wörld", 4), "héll... [truncated]");
    }

    #[test]
    fn test_sms_text() {
        assert_eq!(sms_text("Door", "opened"), "Door - opened");
        assert_eq!(sms_text("Door", ""), "Door");

        let long = "x".repeat(300);
        assert_eq!(sms_text("S", &long).chars().count(), SMS_MAX_CHARS);
    }
}
