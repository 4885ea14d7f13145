// crates/core/src/jobs/types.rs
//! Types for the job monitor.

use serde::Serialize;

use crate::status::{ErrorParts, JobStatusSnapshot};

/// Observation state for the currently assigned job.
///
/// Everything here is reset whenever the job id changes, including a change
/// to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub job_id: Option<String>,
    pub status: Option<JobStatusSnapshot>,
    pub poll_error: Option<ErrorParts>,
    pub completion_dispatched: bool,
    pub failure_dispatched: bool,
    pub stream_stacktrace_shown: bool,
}

impl JobHandle {
    pub(crate) fn assigned(job_id: Option<String>) -> Self {
        Self {
            job_id,
            ..Self::default()
        }
    }
}

/// Which path put the current content into the stacktrace panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StacktraceOrigin {
    /// Delayed poll error.
    Backfill,
    /// Job-info diagnostics for a failed job.
    Diagnostics,
    /// Error pushed by the status stream.
    Stream,
}

/// Trim a raw job id; blank ids mean "nothing to observe".
pub fn normalize_job_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_job_id() {
        assert_eq!(normalize_job_id(None), None);
        assert_eq!(normalize_job_id(Some("")), None);
        assert_eq!(normalize_job_id(Some(" \t\n")), None);
        assert_eq!(
            normalize_job_id(Some("  7c1e-42 ")),
            Some("7c1e-42".to_string())
        );
    }

    #[test]
    fn test_assigned_handle_starts_clean() {
        let handle = JobHandle::assigned(Some("a".into()));
        assert_eq!(handle.job_id.as_deref(), Some("a"));
        assert!(handle.status.is_none());
        assert!(!handle.completion_dispatched);
        assert!(!handle.failure_dispatched);
        assert!(!handle.stream_stacktrace_shown);
    }

    #[test]
    fn test_job_handle_serialize() {
        let json = serde_json::to_string(&JobHandle::assigned(Some("a".into()))).unwrap();
        assert!(json.contains("\"jobId\":\"a\""));
        assert!(json.contains("\"completionDispatched\":false"));
    }
}
