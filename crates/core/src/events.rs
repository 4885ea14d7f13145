// crates/core/src/events.rs
//! Typed in-process event bus for monitor notifications.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::status::{ErrorParts, JobStatusSnapshot, StatusSource};

/// Notification emitted by a [`JobMonitor`](crate::jobs::JobMonitor).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MonitorEvent {
    /// The job reached `finished`. Emitted at most once per job id.
    #[serde(rename_all = "camelCase")]
    Completed {
        job_id: Option<String>,
        status: JobStatusSnapshot,
        source: StatusSource,
    },
    /// The job reached a failure status. Emitted at most once per job id.
    #[serde(rename_all = "camelCase")]
    Error {
        job_id: Option<String>,
        status: String,
        source: StatusSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack_trace_lines: Option<Vec<String>>,
        /// Transport error when the diagnostics fetch failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorParts>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BusyStateChanged { job_id: Option<String>, busy: bool },
    /// A stream trigger, forwarded verbatim.
    Trigger { event: String, payload: Value },
}

impl MonitorEvent {
    pub const COMPLETED: &'static str = "completed";
    pub const ERROR: &'static str = "error";
    pub const BUSY_STATE_CHANGED: &'static str = "busy-state-changed";
    pub const TRIGGER: &'static str = "trigger";

    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed { .. } => Self::COMPLETED,
            Self::Error { .. } => Self::ERROR,
            Self::BusyStateChanged { .. } => Self::BUSY_STATE_CHANGED,
            Self::Trigger { .. } => Self::TRIGGER,
        }
    }
}

/// Broadcast channel carrying [`MonitorEvent`]s to any number of subscribers.
///
/// Each subscriber buffers up to [`EventBus::CAPACITY`] events. One that
/// falls further behind gets `RecvError::Lagged` and loses the oldest
/// events, which may include the job's `completed` or `error`. After a lag,
/// read the outcome from the dispatch flags of
/// [`JobMonitor::snapshot`](crate::jobs::JobMonitor::snapshot).
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Per-subscriber buffer, shared with every forwarded stream trigger.
    pub const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to events with the given [`MonitorEvent::name`].
    pub fn subscribe_to(&self, name: &'static str) -> EventSubscription {
        EventSubscription {
            name,
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn emit(&self, event: MonitorEvent) {
        tracing::debug!(event = event.name(), "dispatching monitor event");
        // Ignore send errors (no subscribers is fine).
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver filtered to one event name.
pub struct EventSubscription {
    name: &'static str,
    rx: broadcast::Receiver<MonitorEvent>,
}

impl EventSubscription {
    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.name() == self.name => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, name = self.name, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
