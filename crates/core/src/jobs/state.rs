// crates/core/src/jobs/state.rs
//! Mutable state owned by one monitor instance.
//!
//! Lives behind a single mutex that is never held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{JobHandle, StacktraceOrigin};
use crate::stream::{ChannelHandle, Spinner, StatusChannel};
use crate::ui::{is_busy, AffordanceSync};

/// A spawned timer plus the sequence number that identifies it, so a timer
/// that fires after being replaced can tell it is stale.
pub(crate) struct ArmedTimer {
    pub(crate) seq: u64,
    pub(crate) task: JoinHandle<()>,
}

impl ArmedTimer {
    pub(crate) fn cancel(self) {
        self.task.abort();
    }
}

pub(crate) struct PollSchedule {
    pub(crate) interval: Duration,
    pub(crate) in_flight: bool,
    pub(crate) timer: Option<JoinHandle<()>>,
}

impl PollSchedule {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            in_flight: false,
            timer: None,
        }
    }

    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// An attached status stream.
pub(crate) struct StreamSession {
    pub(crate) seq: u64,
    pub(crate) channel: Arc<dyn StatusChannel>,
    pub(crate) channel_name: String,
    pub(crate) connection: Option<ChannelHandle>,
    pub(crate) pump: Option<JoinHandle<()>>,
    pub(crate) spinner: Spinner,
}

impl StreamSession {
    /// Stop forwarding messages and hand back the live handle, if any.
    pub(crate) fn take_connection(&mut self) -> Option<ChannelHandle> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.connection.take()
    }
}

pub(crate) struct MonitorState {
    pub(crate) job: JobHandle,
    /// Bumped on every job-id change; async results carry the generation
    /// they started under and are dropped when it no longer matches.
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) poll: PollSchedule,
    pub(crate) backfill: Option<ArmedTimer>,
    pub(crate) timer_seq: u64,
    pub(crate) stacktrace: Option<StacktraceOrigin>,
    pub(crate) stream: Option<StreamSession>,
    pub(crate) stream_seq: u64,
    pub(crate) affordances: AffordanceSync,
}

impl MonitorState {
    pub(crate) fn new(poll_interval: Duration) -> Self {
        Self {
            job: JobHandle::default(),
            generation: 0,
            cancel: CancellationToken::new(),
            poll: PollSchedule::new(poll_interval),
            backfill: None,
            timer_seq: 0,
            stacktrace: None,
            stream: None,
            stream_seq: 0,
            affordances: AffordanceSync::default(),
        }
    }

    pub(crate) fn next_timer_seq(&mut self) -> u64 {
        self.timer_seq += 1;
        self.timer_seq
    }

    pub(crate) fn cancel_backfill(&mut self) {
        if let Some(timer) = self.backfill.take() {
            timer.cancel();
        }
    }

    pub(crate) fn busy(&self) -> bool {
        is_busy(self.job.job_id.as_deref(), self.job.status.as_ref())
    }

    /// Re-evaluate the busy state. Returns the new value when it changed.
    pub(crate) fn sync_affordances(&mut self) -> Option<bool> {
        let busy = self.busy();
        self.affordances.apply(busy).then_some(busy)
    }

    /// Cancel everything tied to the current job and start over for
    /// `job_id`. Returns the new generation.
    pub(crate) fn reassign(&mut self, job_id: Option<String>) -> u64 {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.poll.cancel_timer();
        self.poll = PollSchedule::new(self.poll.interval);
        self.cancel_backfill();
        self.generation += 1;
        self.job = JobHandle::assigned(job_id);
        self.stacktrace = None;
        if let Some(stream) = self.stream.as_mut() {
            stream.spinner.reset();
        }
        self.generation
    }
}
