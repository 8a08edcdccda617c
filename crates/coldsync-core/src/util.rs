//! Small helpers shared by the store, the HTTP client and the CLI.

/// Longest excerpt of a server error body kept in error messages
const ERROR_EXCERPT_CHARS: usize = 180;

/// Trimmed text, or `None` for missing and blank values
pub fn trimmed_non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

pub fn has_http_scheme(url: &str) -> bool {
    ["http://", "https://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Leading slice of a response body, short enough for a log line
pub fn error_excerpt(body: &str) -> String {
    body.trim().chars().take(ERROR_EXCERPT_CHARS).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`.
pub fn duration_millis(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(trimmed_non_empty(None), None);
        assert_eq!(trimmed_non_empty(Some(" \t ".to_string())), None);
        assert_eq!(
            trimmed_non_empty(Some(" coldsync-token ".to_string())).as_deref(),
            Some("coldsync-token")
        );
    }

    #[test]
    fn only_http_schemes_count() {
        assert!(has_http_scheme("https://api.coldchain.test"));
        assert!(has_http_scheme("http://127.0.0.1:8080"));
        assert!(!has_http_scheme("ftp://api.coldchain.test"));
        assert!(!has_http_scheme("api.coldchain.test"));
    }

    #[test]
    fn error_excerpt_is_bounded() {
        let body = format!("  {}  ", "e".repeat(400));
        assert_eq!(error_excerpt(&body).chars().count(), ERROR_EXCERPT_CHARS);
        assert_eq!(error_excerpt(" gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_secs(2)), 2_000);
        assert_eq!(duration_millis(Duration::MAX), i64::MAX);
    }
}
