// crates/core/src/jobs/notifier.rs
//! Exactly-once completion and failure notifications.
//!
//! Both the poller and the stream feed statuses in here, tagged with the
//! assignment generation they were observed under. The generation and the
//! dispatch flag are tested, and the flag set, in one critical section: a
//! status from a superseded assignment is dropped, and whichever source
//! reports first for the current one wins.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::monitor::Inner;
use super::types::StacktraceOrigin;
use crate::diagnostics::extract_stacktrace;
use crate::events::MonitorEvent;
use crate::status::{ErrorParts, JobPhase, JobStatusSnapshot, StatusSource};

impl Inner {
    pub(crate) fn observe_status(
        self: &Arc<Self>,
        generation: u64,
        snapshot: JobStatusSnapshot,
        source: StatusSource,
    ) {
        let phase = snapshot.phase();
        if phase.is_success() {
            self.dispatch_completion(generation, snapshot, source);
        } else if phase.is_failure() {
            self.dispatch_failure(generation, phase, source);
        }
    }

    fn dispatch_completion(&self, generation: u64, snapshot: JobStatusSnapshot, source: StatusSource) {
        let mut state = self.lock_state();
        if state.generation != generation {
            debug!(generation, %source, "dropping completion for superseded job");
            return;
        }
        if state.job.completion_dispatched {
            trace!(%source, "completion already dispatched");
            return;
        }
        state.job.completion_dispatched = true;
        let job_id = state.job.job_id.clone();
        info!(job_id = ?job_id, %source, "job completed");
        // Emitted under the lock so no reassignment can be published first.
        self.bus.emit(MonitorEvent::Completed {
            job_id,
            status: snapshot,
            source,
        });
    }

    fn dispatch_failure(self: &Arc<Self>, generation: u64, phase: JobPhase, source: StatusSource) {
        let status = phase.as_str().to_owned();
        let (job_id, token) = {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(generation, %source, "dropping failure for superseded job");
                return;
            }
            if state.job.failure_dispatched {
                trace!(%source, "failure already dispatched");
                return;
            }
            state.job.failure_dispatched = true;
            (state.job.job_id.clone(), state.cancel.clone())
        };

        let Some(job_id) = job_id else {
            warn!(%status, %source, "job failed with no job id to diagnose");
            let message = failure_message(&status);
            self.render_stacktrace(std::slice::from_ref(&message));
            self.bus.emit(MonitorEvent::Error {
                job_id: None,
                status,
                source,
                stack_trace_lines: None,
                error: None,
                message: Some(message),
            });
            return;
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner
                .report_failure(job_id, status, source, generation, token)
                .await;
        });
    }

    /// Fetch job info, surface its stacktrace and publish the `error` event.
    async fn report_failure(
        self: Arc<Self>,
        job_id: String,
        status: String,
        source: StatusSource,
        generation: u64,
        token: CancellationToken,
    ) {
        let (primary, fallback) = self.config.endpoints.info_urls(&job_id);
        let opts = self.fetch_options(&token);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(%job_id, "diagnostics fetch superseded");
                return;
            }
            result = self.transport.fetch_json_with_fallback(&primary, fallback.as_deref(), &opts) => result,
        };

        let (stack_trace_lines, error) = match result {
            Ok(response) => (extract_stacktrace(&response.body), None),
            Err(err) => {
                warn!(%job_id, error = %err, "job info fetch failed");
                (None, Some(ErrorParts::from(&err)))
            }
        };
        let message = stack_trace_lines
            .is_none()
            .then(|| failure_message(&status));
        let rendered = stack_trace_lines
            .clone()
            .or_else(|| error.as_ref().map(ErrorParts::render_lines))
            .into_iter()
            .flatten()
            .chain(message.clone())
            .collect::<Vec<_>>();

        let show = {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(%job_id, "dropping diagnostics for superseded job");
                return;
            }
            state.cancel_backfill();
            let show = state.stacktrace != Some(StacktraceOrigin::Stream);
            if show {
                state.stacktrace = Some(StacktraceOrigin::Diagnostics);
            }
            show
        };
        if show {
            self.render_stacktrace(&rendered);
        }

        info!(%job_id, %status, %source, "job failed");
        self.bus.emit(MonitorEvent::Error {
            job_id: Some(job_id),
            status,
            source,
            stack_trace_lines,
            error,
            message,
        });
    }
}

fn failure_message(status: &str) -> String {
    format!("Job {status}.")
}
