// crates/core/src/status.rs
//! Job status vocabulary and the small payload types shared by the poller,
//! the stream adapter and the notifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Phase of a server-side job, parsed from the raw `status` string.
///
/// Parsing is case-sensitive: anything outside the known vocabulary
/// (including a missing status) is [`JobPhase::Unknown`] and keeps polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Started,
    Finished,
    Failed,
    Stopped,
    Canceled,
    NotFound,
    Unknown,
}

impl JobPhase {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("queued") => Self::Queued,
            Some("started") => Self::Started,
            Some("finished") => Self::Finished,
            Some("failed") => Self::Failed,
            Some("stopped") => Self::Stopped,
            Some("canceled") => Self::Canceled,
            Some("not_found") => Self::NotFound,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.is_success() || self.is_failure()
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Finished)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Stopped | Self::Canceled | Self::NotFound
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Canceled => "canceled",
            Self::NotFound => "not_found",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known status payload for a job.
///
/// Only the fields the engine reads are kept; anything else the server
/// sends is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobStatusSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Value>,
}

impl JobStatusSnapshot {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Self::default()
        }
    }

    /// Lenient extraction from an arbitrary JSON body. A non-string
    /// `status` is treated as absent rather than rejected.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).filter(|v| !v.is_null()).cloned();
        Self {
            status: value
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_owned),
            started_at: field("started_at"),
            ended_at: field("ended_at"),
        }
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::parse(self.status.as_deref())
    }
}

/// Which data source observed a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    Poll,
    Stream,
}

impl fmt::Display for StatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Poll => "poll",
            Self::Stream => "stream",
        })
    }
}

/// Displayable pieces of a transport-level failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorParts {
    pub status_code: String,
    pub status_text: String,
    pub detail: String,
}

impl ErrorParts {
    /// Code used when the failure carried no HTTP status.
    pub const SYNTHETIC_CODE: &'static str = "ERR";

    /// Whether there is anything worth showing beyond the bare code.
    pub fn has_content(&self) -> bool {
        !self.detail.trim().is_empty() || !self.status_text.trim().is_empty()
    }

    /// Header line followed by the detail split into lines.
    pub fn render_lines(&self) -> Vec<String> {
        let header = format!("{} {}", self.status_code, self.status_text)
            .trim()
            .to_owned();
        std::iter::once(header)
            .chain(self.detail.lines().map(str::to_owned))
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl From<&TransportError> for ErrorParts {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Http {
                status,
                status_text,
                ..
            } => Self {
                status_code: status.to_string(),
                status_text: status_text.clone(),
                detail: err.detail(),
            },
            _ => Self {
                status_code: Self::SYNTHETIC_CODE.to_owned(),
                status_text: String::new(),
                detail: err.detail(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_phase_classification() {
        let finished = JobPhase::parse(Some("finished"));
        assert!(finished.is_terminal() && finished.is_success() && !finished.is_failure());
        for raw in ["failed", "stopped", "canceled", "not_found"] {
            let phase = JobPhase::parse(Some(raw));
            assert!(phase.is_terminal() && phase.is_failure(), "{raw}");
        }
        for raw in [Some("queued"), Some("started"), Some("deferred"), None] {
            assert!(!JobPhase::parse(raw).is_terminal(), "{raw:?}");
        }
    }

    #[test]
    fn test_phase_parsing_is_case_sensitive() {
        assert_eq!(JobPhase::parse(Some("Finished")), JobPhase::Unknown);
        assert_eq!(JobPhase::parse(Some("FAILED")), JobPhase::Unknown);
    }

    #[test]
    fn test_snapshot_from_value_ignores_extra_fields() {
        let snapshot = JobStatusSnapshot::from_value(&json!({
            "id": "abc",
            "status": "started",
            "started_at": "2026-10-17T09:00:00Z",
            "ended_at": null,
            "progress": {"done": 3},
        }));
        assert_eq!(
            snapshot,
            JobStatusSnapshot {
                status: Some("started".into()),
                started_at: Some(json!("2026-10-17T09:00:00Z")),
                ended_at: None,
            }
        );
        assert_eq!(snapshot.phase(), JobPhase::Started);
    }

    #[test]
    fn test_snapshot_from_non_object_is_absent() {
        let snapshot = JobStatusSnapshot::from_value(&json!(["finished"]));
        assert_eq!(snapshot.status, None);
        assert_eq!(
            JobStatusSnapshot::from_value(&json!({"status": 3})).phase(),
            JobPhase::Unknown
        );
    }

    #[test]
    fn test_error_parts_from_http_error() {
        let parts = ErrorParts::from(&TransportError::Http {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: r#"{"error": "redis down"}"#.into(),
        });
        assert_eq!(parts.status_code, "503");
        assert_eq!(parts.status_text, "Service Unavailable");
        assert_eq!(parts.detail, "redis down");
        assert_eq!(
            parts.render_lines(),
            vec!["503 Service Unavailable".to_string(), "redis down".to_string()]
        );
    }

    #[test]
    fn test_error_parts_from_network_error_uses_synthetic_code() {
        let parts = ErrorParts::from(&TransportError::Network("connection reset".into()));
        assert_eq!(parts.status_code, "ERR");
        assert_eq!(parts.status_text, "");
        assert_eq!(parts.detail, "connection reset");
        assert!(parts.has_content());
        assert!(!ErrorParts::from(&TransportError::Cancelled).has_content());
    }
}
