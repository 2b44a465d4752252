//! KoboToolbox API payloads

use crate::domain::RawRecord;
use serde::{Deserialize, Serialize};

/// Envelope of every paginated list endpoint
///
/// ```json
/// {"count": 2, "next": "https://kf.example.org/api/v2/...&start=1", "previous": null, "results": [...]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope {
    #[serde(default)]
    pub count: Option<u64>,

    #[serde(default)]
    pub next: Option<String>,

    #[serde(default)]
    pub previous: Option<String>,

    #[serde(default)]
    pub results: Vec<RawRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_last_page() {
        let body = r#"{"count": 1, "next": null, "previous": null, "results": [{"uid": "a1"}]}"#;
        let envelope: PageEnvelope = serde_json::from_str(body).unwrap();

        assert_eq!(envelope.count, Some(1));
        assert!(envelope.next.is_none());
        assert_eq!(envelope.results[0]["uid"], "a1");
    }

    #[test]
    fn test_envelope_tolerates_missing_fields() {
        let envelope: PageEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.results.is_empty());
        assert!(envelope.count.is_none());
    }
}
