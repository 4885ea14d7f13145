// crates/core/src/jobs/stream.rs
//! Status stream adapter: spinner + summary rendering, trigger routing and
//! stream-pushed errors.

use std::sync::{Arc, Weak};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::monitor::{Inner, JobMonitor};
use super::state::StreamSession;
use super::types::StacktraceOrigin;
use crate::error::ChannelError;
use crate::events::MonitorEvent;
use crate::status::{JobStatusSnapshot, StatusSource};
use crate::stream::{summarize, Spinner, StatusChannel, StreamMessage, TriggerEvent};
use crate::ui::escape_html;

impl JobMonitor {
    /// Attach a status channel, replacing any previous one.
    ///
    /// Shows the status sink with the first spinner frame. Call
    /// [`connect_stream`](Self::connect_stream) to start receiving.
    pub async fn attach_stream(&self, channel: Arc<dyn StatusChannel>, channel_name: impl Into<String>) {
        let channel_name = channel_name.into();
        self.detach_stream().await;

        let frame = {
            let mut state = self.inner.lock_state();
            state.stream_seq += 1;
            let session = StreamSession {
                seq: state.stream_seq,
                channel,
                channel_name,
                connection: None,
                pump: None,
                spinner: Spinner::new(self.inner.config.spinner_frames.clone()),
            };
            let frame = session.spinner.frame().to_owned();
            state.stream = Some(session);
            frame
        };
        if let Some(sink) = &self.inner.sinks.status {
            sink.set_text(&frame);
            sink.set_visible(true);
        }
    }

    /// Open the attached channel. A no-op when nothing is attached or the
    /// channel is already connected.
    pub async fn connect_stream(&self) -> Result<(), ChannelError> {
        let (channel, channel_name, seq) = {
            let state = self.inner.lock_state();
            let Some(session) = state.stream.as_ref() else {
                debug!("no status stream attached; connect ignored");
                return Ok(());
            };
            if session.connection.is_some() {
                trace!(channel = %session.channel_name, "status stream already connected");
                return Ok(());
            }
            (Arc::clone(&session.channel), session.channel_name.clone(), session.seq)
        };

        let connection = channel.connect(&channel_name).await?;
        let handle = connection.handle;
        let accepted = {
            let mut state = self.inner.lock_state();
            match state.stream.as_mut() {
                Some(session) if session.seq == seq && session.connection.is_none() => {
                    session.connection = Some(handle);
                    session.pump = Some(spawn_pump(
                        Arc::downgrade(&self.inner),
                        seq,
                        connection.messages,
                    ));
                    true
                }
                _ => false,
            }
        };

        if accepted {
            info!(channel = %channel_name, "status stream attached to job monitor");
        } else {
            debug!(channel = %channel_name, "status stream replaced while connecting");
            channel.disconnect(handle).await;
        }
        Ok(())
    }

    /// Close the live connection but keep the channel attached.
    pub async fn disconnect_stream(&self) {
        let target = {
            let mut state = self.inner.lock_state();
            state.stream.as_mut().and_then(|session| {
                session
                    .take_connection()
                    .map(|handle| (Arc::clone(&session.channel), handle))
            })
        };
        if let Some((channel, handle)) = target {
            channel.disconnect(handle).await;
            debug!("status stream disconnected");
        }
    }

    /// Drop the attached channel and hide the status and log sinks.
    pub async fn detach_stream(&self) {
        let session = self.inner.lock_state().stream.take();
        let Some(mut session) = session else {
            return;
        };
        if let Some(handle) = session.take_connection() {
            session.channel.disconnect(handle).await;
        }
        for sink in [&self.inner.sinks.status, &self.inner.sinks.log]
            .into_iter()
            .flatten()
        {
            sink.set_text("");
            sink.set_visible(false);
        }
        debug!(channel = %session.channel_name, "status stream detached");
    }

    pub fn is_stream_connected(&self) -> bool {
        self.inner
            .lock_state()
            .stream
            .as_ref()
            .is_some_and(|session| session.connection.is_some())
    }

    /// Current spinner frame index, when a stream is attached.
    pub fn spinner_index(&self) -> Option<usize> {
        self.inner
            .lock_state()
            .stream
            .as_ref()
            .map(|session| session.spinner.index())
    }

    /// Feed one progress line, as if received from the stream.
    pub fn on_append(&self, raw: &str) {
        self.inner.handle_append(raw);
    }

    /// Feed one trigger, as if received from the stream.
    pub fn on_trigger(&self, trigger: TriggerEvent) {
        self.inner.handle_trigger(trigger);
    }

    /// Show a stream-pushed error. Suppresses any pending poll-error backfill.
    pub fn surface_stream_error(&self, lines: Vec<String>) {
        self.inner.surface_stream_error(lines);
    }
}

fn spawn_pump(
    inner: Weak<Inner>,
    seq: u64,
    mut messages: mpsc::Receiver<StreamMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let Some(monitor) = inner.upgrade() else {
                return;
            };
            monitor.handle_stream_message(message);
        }
        if let Some(monitor) = inner.upgrade() {
            monitor.stream_closed(seq);
        }
    })
}

/// A routed trigger's payload may carry a status; a bare completion trigger
/// means the job finished.
fn snapshot_from_trigger(payload: &Value) -> JobStatusSnapshot {
    let snapshot = JobStatusSnapshot::from_value(payload);
    if snapshot.status.is_some() {
        snapshot
    } else {
        JobStatusSnapshot {
            status: Some("finished".to_owned()),
            ..snapshot
        }
    }
}

impl Inner {
    fn handle_stream_message(self: &Arc<Self>, message: StreamMessage) {
        match message {
            StreamMessage::Append(line) => self.handle_append(&line),
            StreamMessage::Trigger(trigger) => self.handle_trigger(trigger),
            StreamMessage::Exception(lines) => self.surface_stream_error(lines),
        }
    }

    fn stream_closed(&self, seq: u64) {
        let mut state = self.lock_state();
        if let Some(session) = state.stream.as_mut().filter(|s| s.seq == seq) {
            session.connection = None;
            session.pump = None;
            debug!(channel = %session.channel_name, "status stream ended");
        }
    }

    fn handle_append(&self, raw: &str) {
        debug!(line = raw.trim_end(), "status stream line");
        let summary = summarize(raw, self.config.summary_max_len);
        let frame = {
            let mut state = self.lock_state();
            let Some(session) = state.stream.as_mut() else {
                trace!("progress line without an attached stream");
                return;
            };
            session.spinner.advance().to_owned()
        };

        if let Some(sink) = &self.sinks.status {
            let line = format!("{frame} {summary}");
            sink.set_text(line.trim());
        }
        if let Some(sink) = &self.sinks.log {
            sink.append_html(&format!("{}<br>", escape_html(raw.trim_end())));
        }
    }

    fn handle_trigger(self: &Arc<Self>, trigger: TriggerEvent) {
        let routed = self.config.poll_completion_event.as_deref() == Some(trigger.event.as_str());
        if trigger.signals_completion() {
            if let Some(session) = self.lock_state().stream.as_mut() {
                session.spinner.reset();
            }
        }
        debug!(event = %trigger.event, routed, "stream trigger received");

        let snapshot = routed.then(|| snapshot_from_trigger(&trigger.payload));
        self.bus.emit(MonitorEvent::Trigger {
            event: trigger.event,
            payload: trigger.payload,
        });
        let Some(snapshot) = snapshot else {
            return;
        };

        let generation = {
            let mut state = self.lock_state();
            if state.job.job_id.is_some() {
                state.job.status = Some(snapshot.clone());
            }
            self.emit_busy(state.job.job_id.clone(), state.sync_affordances());
            state.generation
        };
        self.observe_status(generation, snapshot, StatusSource::Stream);
    }

    fn surface_stream_error(&self, lines: Vec<String>) {
        {
            let mut state = self.lock_state();
            state.cancel_backfill();
            state.stacktrace = Some(StacktraceOrigin::Stream);
            state.job.stream_stacktrace_shown = true;
        }
        info!(lines = lines.len(), "stream reported an error");
        self.render_stacktrace(&lines);
    }
}
