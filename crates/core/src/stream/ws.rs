// crates/core/src/stream/ws.rs
//! WebSocket implementation of [`StatusChannel`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelConnection, ChannelHandle, StatusChannel, StreamMessage, TriggerEvent};
use crate::diagnostics::normalize_trace_lines;
use crate::error::ChannelError;

/// Connects to `{url}/{channel}` (or substitutes `{channel}` when the URL
/// contains that placeholder) and turns text frames into [`StreamMessage`]s.
pub struct WsStatusChannel {
    url: String,
    buffer: usize,
    next_id: AtomicU64,
    live: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl WsStatusChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            buffer: 256,
            next_id: AtomicU64::new(1),
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn channel_url(&self, channel: &str) -> String {
        let channel = urlencoding::encode(channel);
        if self.url.contains("{channel}") {
            self.url.replace("{channel}", &channel)
        } else {
            format!("{}/{channel}", self.url.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl StatusChannel for WsStatusChannel {
    async fn connect(&self, channel: &str) -> Result<ChannelConnection, ChannelError> {
        let url = self.channel_url(channel);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                channel: channel.to_owned(),
                message: e.to_string(),
            })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        match self.live.lock() {
            Ok(mut live) => {
                live.insert(id, token.clone());
            }
            Err(e) => tracing::error!("Mutex poisoned writing live channels: {e}"),
        }

        info!(%url, handle = id, "status stream connected");

        let (tx, rx) = mpsc::channel(self.buffer);
        let live = Arc::clone(&self.live);
        let channel_name = channel.to_owned();
        tokio::spawn(async move {
            let (mut sink, mut stream) = ws_stream.split();
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if tx.send(parse_frame(text.as_str())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(channel = %channel_name, "status stream read failed: {e}");
                            break;
                        }
                    }
                }
            }
            if let Ok(mut live) = live.lock() {
                live.remove(&id);
            }
            debug!(channel = %channel_name, handle = id, "status stream closed");
        });

        Ok(ChannelConnection {
            handle: ChannelHandle(id),
            messages: rx,
        })
    }

    async fn disconnect(&self, handle: ChannelHandle) {
        let token = match self.live.lock() {
            Ok(mut live) => live.remove(&handle.0),
            Err(e) => {
                tracing::error!("Mutex poisoned reading live channels: {e}");
                None
            }
        };
        if let Some(token) = token {
            token.cancel();
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Trigger {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    Exception {
        #[serde(default)]
        stacktrace: Value,
    },
}

/// JSON frames tagged `trigger` / `exception` are structured; every other
/// frame is progress text.
pub(crate) fn parse_frame(text: &str) -> StreamMessage {
    match serde_json::from_str::<Frame>(text) {
        Ok(Frame::Trigger { event, payload }) => StreamMessage::Trigger(TriggerEvent { event, payload }),
        Ok(Frame::Exception { stacktrace }) => StreamMessage::Exception(normalize_trace_lines(&stacktrace)),
        Err(_) => StreamMessage::Append(text.to_owned()),
    }
}
