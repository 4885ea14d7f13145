// crates/core/src/stream/mod.rs
//! Push-based status channel contract and the pure pieces of the stream
//! adapter: spinner animation and one-line summaries.

pub mod ws;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ChannelError;

pub use ws::WsStatusChannel;

/// Trigger names containing any of these (case-insensitive) reset the spinner.
const COMPLETION_MARKERS: &[&str] = &["COMPLETE", "FINISH", "SUCCESS", "END_BROADCAST"];

/// Structured event delivered over the status stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl TriggerEvent {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Whether the event name looks like the end of a run.
    pub fn signals_completion(&self) -> bool {
        let name = self.event.to_ascii_uppercase();
        COMPLETION_MARKERS.iter().any(|marker| name.contains(marker))
    }
}

/// One message received from a status channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Raw progress text.
    Append(String),
    Trigger(TriggerEvent),
    /// An error the server surfaced directly on the stream.
    Exception(Vec<String>),
}

/// Identifies one live connection of a [`StatusChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u64);

/// A live connection: its handle and the messages it delivers. The receiver
/// closes when the connection ends.
#[derive(Debug)]
pub struct ChannelConnection {
    pub handle: ChannelHandle,
    pub messages: mpsc::Receiver<StreamMessage>,
}

/// A push channel delivering status lines and triggers for a job.
/// Reconnection policy belongs to the implementation.
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn connect(&self, channel: &str) -> Result<ChannelConnection, ChannelError>;

    async fn disconnect(&self, handle: ChannelHandle);
}

/// Cyclic spinner animation driven by received lines.
#[derive(Debug, Clone)]
pub struct Spinner {
    frames: Vec<String>,
    index: usize,
}

impl Spinner {
    pub fn new(frames: Vec<String>) -> Self {
        Self { frames, index: 0 }
    }

    /// Step to the next frame and return it.
    pub fn advance(&mut self) -> &str {
        if self.frames.is_empty() {
            return "";
        }
        self.index = (self.index + 1) % self.frames.len();
        &self.frames[self.index]
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn frame(&self) -> &str {
        self.frames.get(self.index).map_or("", String::as_str)
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// First line of `raw`, trimmed and cut to `max_len` characters (ellipsis
/// included) when longer.
pub fn summarize(raw: &str, max_len: usize) -> String {
    let first = raw.split(['\r', '\n']).next().unwrap_or_default().trim();
    if first.chars().count() <= max_len {
        return first.to_owned();
    }
    if max_len == 0 {
        return String::new();
    }
    let mut out: String = first.chars().take(max_len - 1).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}
