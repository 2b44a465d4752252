//! HTTP response logging
//!
//! Every response from the Kobo API is logged with its method, URL and status.
//! Non-success classes get a suffix and a louder level.

/// Class of an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }

    /// Suffix appended to the log line; empty for success
    pub fn suffix(&self) -> &'static str {
        match self {
            StatusClass::Informational => " (Informational)",
            StatusClass::Success => "",
            StatusClass::Redirect => " (Redirect)",
            StatusClass::ClientError => " (Client Error)",
            StatusClass::ServerError => " (Server Error)",
        }
    }
}

/// `"{RESOURCE} | {method} {url} -> {status} {reason}{suffix}"`
pub fn format_response_line(
    resource: &str,
    method: &str,
    url: &str,
    status: u16,
    reason: &str,
) -> String {
    let prefix = if resource.is_empty() {
        "Kobo API".to_string()
    } else {
        resource.to_uppercase()
    };
    format!(
        "{prefix} | {method} {url} -> {status} {reason}{}",
        StatusClass::of(status).suffix()
    )
}

/// Log a response at a level derived from its status class
pub fn log_response(resource: &str, method: &str, url: &str, status: u16, reason: &str) {
    let line = format_response_line(resource, method, url, status, reason);
    match StatusClass::of(status) {
        StatusClass::Success => tracing::debug!(resource, status, "{line}"),
        StatusClass::Informational | StatusClass::Redirect => {
            tracing::info!(resource, status, "{line}")
        }
        StatusClass::ClientError => tracing::warn!(resource, status, "{line}"),
        StatusClass::ServerError => tracing::error!(resource, status, "{line}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(101, StatusClass::Informational ; "informational")]
    #[test_case(200, StatusClass::Success ; "ok")]
    #[test_case(302, StatusClass::Redirect ; "found")]
    #[test_case(404, StatusClass::ClientError ; "not found")]
    #[test_case(502, StatusClass::ServerError ; "bad gateway")]
    fn test_status_class(status: u16, expected: StatusClass) {
        assert_eq!(StatusClass::of(status), expected);
    }

    #[test]
    fn test_format_response_line() {
        let line = format_response_line(
            "kobo_asset",
            "GET",
            "https://kf.example.org/api/v2/project-views/pv1/assets/",
            404,
            "Not Found",
        );
        assert_eq!(
            line,
            "KOBO_ASSET | GET https://kf.example.org/api/v2/project-views/pv1/assets/ -> 404 Not Found (Client Error)"
        );
    }

    #[test]
    fn test_format_without_resource() {
        let line = format_response_line("", "GET", "https://kf/x", 200, "OK");
        assert_eq!(line, "Kobo API | GET https://kf/x -> 200 OK");
    }
}
