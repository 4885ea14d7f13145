// crates/core/src/jobs/monitor.rs
//! The job monitor: one instance per controller, observing one job id at a
//! time through a status poller and an optional status stream.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::state::MonitorState;
use super::types::{normalize_job_id, JobHandle};
use crate::config::MonitorConfig;
use crate::events::{EventBus, MonitorEvent};
use crate::transport::{FetchOptions, Transport};
use crate::ui::{CommandAffordance, UiSink};

/// Rendering targets the monitor writes into. All optional.
#[derive(Clone, Default)]
pub struct MonitorSinks {
    /// Spinner + one-line progress summary.
    pub status: Option<Arc<dyn UiSink>>,
    /// Error details: backfilled poll errors, job diagnostics, stream errors.
    pub stacktrace: Option<Arc<dyn UiSink>>,
    /// Raw stream lines.
    pub log: Option<Arc<dyn UiSink>>,
}

/// Tracks one asynchronous server-side job from assignment to a terminal
/// outcome and emits exactly one `completed` or `error` notification per
/// job id.
///
/// Cheap to clone; clones share the same state. Methods that start work
/// spawn onto the current tokio runtime.
#[derive(Clone)]
pub struct JobMonitor {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: MonitorConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) bus: EventBus,
    pub(crate) sinks: MonitorSinks,
    state: Mutex<MonitorState>,
}

/// Builder for [`JobMonitor`].
pub struct JobMonitorBuilder {
    config: MonitorConfig,
    transport: Arc<dyn Transport>,
    bus: Option<EventBus>,
    sinks: MonitorSinks,
}

impl JobMonitorBuilder {
    /// Publish onto an existing bus instead of a private one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sinks.status = Some(sink);
        self
    }

    pub fn stacktrace_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sinks.stacktrace = Some(sink);
        self
    }

    pub fn log_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sinks.log = Some(sink);
        self
    }

    pub fn build(self) -> JobMonitor {
        let state = MonitorState::new(self.config.poll_interval);
        JobMonitor {
            inner: Arc::new(Inner {
                config: self.config,
                transport: self.transport,
                bus: self.bus.unwrap_or_default(),
                sinks: self.sinks,
                state: Mutex::new(state),
            }),
        }
    }
}

impl JobMonitor {
    pub fn new(config: MonitorConfig, transport: Arc<dyn Transport>) -> Self {
        Self::builder(config, transport).build()
    }

    pub fn builder(config: MonitorConfig, transport: Arc<dyn Transport>) -> JobMonitorBuilder {
        JobMonitorBuilder {
            config,
            transport,
            bus: None,
            sinks: MonitorSinks::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.inner.bus.subscribe()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn job_id(&self) -> Option<String> {
        self.inner.lock_state().job.job_id.clone()
    }

    /// Copy of the current observation state.
    pub fn snapshot(&self) -> JobHandle {
        self.inner.lock_state().job.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock_state().busy()
    }

    /// Disable `target` while a job is running, restoring its own disabled
    /// state afterwards.
    pub fn register_affordance(&self, target: Arc<dyn CommandAffordance>) {
        self.inner.lock_state().affordances.register(target);
    }

    /// Assign the job to observe.
    ///
    /// Blank ids count as `None`. Re-assigning the current id re-polls once
    /// unless a poll is already outstanding; any other change cancels all
    /// work for the previous id and starts polling the new one.
    pub fn set_job_id(&self, job_id: Option<&str>) {
        let next = normalize_job_id(job_id);
        let mut state = self.inner.lock_state();

        if next.is_some() && next == state.job.job_id {
            if state.poll.in_flight {
                debug!(job_id = ?next, "status poll already in flight; refresh skipped");
                return;
            }
            let generation = state.generation;
            drop(state);
            debug!(job_id = ?next, "refreshing job status");
            self.inner.spawn_poll(generation);
            return;
        }

        let generation = state.reassign(next.clone());
        self.inner.emit_busy(next.clone(), state.sync_affordances());
        drop(state);

        info!(job_id = ?next, generation, "job assignment changed");
        self.inner.clear_stacktrace();
        if next.is_some() {
            self.inner.spawn_poll(generation);
        }
    }

    /// Re-poll the current job once.
    pub fn refresh(&self) {
        let current = self.job_id();
        if current.is_some() {
            self.set_job_id(current.as_deref());
        }
    }
}

impl Inner {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Mutex poisoned locking monitor state; recovering");
            poisoned.into_inner()
        })
    }

    pub(crate) fn fetch_options(&self, token: &CancellationToken) -> FetchOptions {
        FetchOptions {
            timeout: self.config.request_timeout,
            cancel: Some(token.clone()),
        }
    }

    /// Publish `busy-state-changed` when `changed` carries a new value.
    ///
    /// Callers hold the state lock, so busy events follow assignment order.
    pub(crate) fn emit_busy(&self, job_id: Option<String>, changed: Option<bool>) {
        if let Some(busy) = changed {
            self.bus
                .emit(MonitorEvent::BusyStateChanged { job_id, busy });
        }
    }

    pub(crate) fn render_stacktrace(&self, lines: &[String]) {
        if let Some(sink) = &self.sinks.stacktrace {
            sink.set_text(&lines.join("\n"));
            sink.set_visible(true);
        }
    }

    pub(crate) fn clear_stacktrace(&self) {
        if let Some(sink) = &self.sinks.stacktrace {
            sink.set_text("");
            sink.set_visible(false);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.cancel.cancel();
        state.poll.cancel_timer();
        state.cancel_backfill();
        if let Some(stream) = state.stream.as_mut() {
            stream.take_connection();
        }
    }
}
