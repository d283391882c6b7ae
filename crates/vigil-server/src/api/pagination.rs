use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use vigil_storage::Cursor;

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 250;

#[derive(Deserialize)]
#[serde(untagged)]
enum U64Input {
    Number(u64),
    Text(String),
}

/// Accepts `limit=10` as well as `"limit": "10"`.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<U64Input>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(U64Input::Number(number)) => Ok(Some(number)),
        Some(U64Input::Text(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(DeError::custom),
    }
}

/// Page size: default 50, clamped to `1..=250`.
pub fn page_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

/// Opaque cursor: base64url of `{created_at_ms}:{id}`.
pub fn encode_cursor(cursor: &Cursor) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", cursor.created_at_ms, cursor.id))
}

pub fn decode_cursor(raw: &str) -> Result<Cursor, String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim())
        .map_err(|_| "invalid cursor".to_string())?;
    let text = String::from_utf8(bytes).map_err(|_| "invalid cursor".to_string())?;
    let (ts, id) = text
        .split_once(':')
        .ok_or_else(|| "invalid cursor".to_string())?;
    let created_at_ms = ts
        .parse::<i64>()
        .map_err(|_| "invalid cursor".to_string())?;
    if id.is_empty() {
        return Err("invalid cursor".to_string());
    }
    Ok(Cursor {
        created_at_ms,
        id: id.to_string(),
    })
}

/// `(start, end]` in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Resolves the listing window. `end` defaults to `now`, `start` to one
/// day before `end`. The window must be non-empty and at most
/// `max_span_days` wide.
pub fn resolve_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_span_days: i64,
) -> Result<Window, String> {
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end - Duration::days(1));
    if start >= end {
        return Err("start must be before end".to_string());
    }
    if end - start > Duration::days(max_span_days) {
        return Err(format!("window must not exceed {max_span_days} days"));
    }
    Ok(Window {
        start_ms: start.timestamp_millis(),
        end_ms: end.timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(page_limit(None), 50);
        assert_eq!(page_limit(Some(0)), 1);
        assert_eq!(page_limit(Some(10)), 10);
        assert_eq!(page_limit(Some(10_000)), 250);
    }

    #[test]
    fn cursor_is_url_safe_and_reversible() {
        let cursor = Cursor {
            created_at_ms: 1_700_000_000_123,
            id: "7123456789".into(),
        };
        let raw = encode_cursor(&cursor);
        assert!(!raw.contains('=') && !raw.contains('+') && !raw.contains('/'));
        assert_eq!(decode_cursor(&raw).unwrap(), cursor);
    }

    #[test]
    fn garbage_cursor_is_rejected() {
        assert!(decode_cursor("!!!").is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("no-colon")).is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("abc:1")).is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("12:")).is_err());
    }

    #[test]
    fn window_defaults_to_last_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let w = resolve_window(None, None, now, 90).unwrap();
        assert_eq!(w.end_ms, now.timestamp_millis());
        assert_eq!(w.end_ms - w.start_ms, 86_400_000);
    }

    #[test]
    fn window_bounds_are_checked() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        assert!(resolve_window(Some(now), Some(now), now, 90).is_err());
        let long_ago = now - Duration::days(91);
        assert!(resolve_window(Some(long_ago), None, now, 90).is_err());
        let exactly = now - Duration::days(90);
        assert!(resolve_window(Some(exactly), None, now, 90).is_ok());
    }
}
