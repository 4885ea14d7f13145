// crates/core/src/jobs/poller.rs
//! Single-flight status polling.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace, warn};

use super::monitor::Inner;
use super::types::StacktraceOrigin;
use crate::error::TransportError;
use crate::status::{ErrorParts, JobStatusSnapshot, StatusSource};

/// Clears the in-flight flag on every exit path of a poll, unless the job
/// was reassigned meanwhile (the new assignment has its own flag).
struct InFlightGuard<'a> {
    inner: &'a Inner,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if state.generation == self.generation {
            state.poll.in_flight = false;
        }
    }
}

impl Inner {
    /// Poll now.
    pub(crate) fn spawn_poll(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.poll_once(generation).await });
    }

    /// Poll after the configured interval, replacing any pending timer.
    pub(crate) fn schedule_poll(self: &Arc<Self>, generation: u64) {
        let mut state = self.lock_state();
        if state.generation != generation || state.job.job_id.is_none() {
            return;
        }
        let delay = state.poll.interval;
        let token = state.cancel.clone();
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.spawn_poll(generation);
                    }
                }
            }
        });
        if let Some(previous) = state.poll.timer.replace(timer) {
            previous.abort();
        }
    }

    async fn poll_once(self: Arc<Self>, generation: u64) {
        let (job_id, token) = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            let Some(job_id) = state.job.job_id.clone() else {
                return;
            };
            if state.poll.in_flight {
                trace!(%job_id, "status poll already in flight");
                return;
            }
            state.poll.in_flight = true;
            (job_id, state.cancel.clone())
        };
        let guard = InFlightGuard {
            inner: self.as_ref(),
            generation,
        };

        let (primary, fallback) = self
            .config
            .endpoints
            .status_urls(&job_id, Utc::now().timestamp_millis());
        let opts = self.fetch_options(&token);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = self.transport.fetch_json_with_fallback(&primary, fallback.as_deref(), &opts) => result,
        };
        drop(guard);

        match result {
            Ok(response) => {
                self.apply_status(generation, JobStatusSnapshot::from_value(&response.body))
            }
            Err(err) => self.apply_poll_error(generation, &err),
        }
    }

    fn apply_status(self: &Arc<Self>, generation: u64, snapshot: JobStatusSnapshot) {
        let phase = snapshot.phase();
        let (job_id, clear_backfilled) = {
            let mut state = self.lock_state();
            if state.generation != generation {
                debug!(generation, "dropping status for superseded job");
                return;
            }
            state.job.status = Some(snapshot.clone());
            state.job.poll_error = None;
            state.cancel_backfill();
            let clear_backfilled = state.stacktrace == Some(StacktraceOrigin::Backfill);
            if clear_backfilled {
                state.stacktrace = None;
            }
            let job_id = state.job.job_id.clone();
            self.emit_busy(job_id.clone(), state.sync_affordances());
            (job_id, clear_backfilled)
        };

        debug!(job_id = ?job_id, status = %phase, "job status polled");
        // Sinks may reassign the job; everything below re-checks the generation.
        if clear_backfilled {
            self.clear_stacktrace();
        }

        if phase.is_terminal() {
            debug!(job_id = ?job_id, status = %phase, "job is terminal; polling stopped");
        } else {
            self.schedule_poll(generation);
        }
        self.observe_status(generation, snapshot, StatusSource::Poll);
    }

    fn apply_poll_error(self: &Arc<Self>, generation: u64, err: &TransportError) {
        let parts = ErrorParts::from(err);
        let (job_id, keep_polling) = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return;
            }
            state.job.poll_error = Some(parts.clone());
            if parts.has_content() {
                self.arm_backfill(&mut state, generation, parts.clone());
            }
            let known_terminal = state
                .job
                .status
                .as_ref()
                .is_some_and(|s| s.phase().is_terminal());
            (state.job.job_id.clone(), !known_terminal)
        };

        warn!(
            job_id = ?job_id,
            status_code = %parts.status_code,
            error = %err,
            "job status poll failed"
        );
        if keep_polling {
            self.schedule_poll(generation);
        }
    }
}
