//! Shared fakes for the monitor integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use jobwatch_core::stream::{ChannelConnection, ChannelHandle, StatusChannel, StreamMessage};
use jobwatch_core::ui::{CommandAffordance, UiSink};
use jobwatch_core::{
    ChannelError, FetchOptions, JobEndpoints, JsonResponse, MonitorConfig, MonitorEvent, Transport,
    TransportError,
};

pub const PRIMARY: &str = "http://primary.test/api";

/// Monitor config pointing at the scripted primary base, no fallback.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        endpoints: JobEndpoints::new(PRIMARY),
        ..MonitorConfig::default()
    }
}

#[derive(Clone)]
pub enum Reply {
    Json(Value),
    Fail(TransportError),
    /// Never resolves; only cancellation ends the request.
    Hang,
    Delay(Duration, Value),
}

pub fn http_error(status: u16, status_text: &str, body: &str) -> Reply {
    Reply::Fail(TransportError::Http {
        status,
        status_text: status_text.to_owned(),
        body: body.to_owned(),
    })
}

/// Replies from per-route queues. The last reply of a queue repeats.
/// URLs matching no route get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, needle: &str, replies: Vec<Reply>) {
        self.routes
            .lock()
            .unwrap()
            .push((needle.to_owned(), replies.into()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut routes = self.routes.lock().unwrap();
        let (_, replies) = routes.iter_mut().find(|(needle, _)| url.contains(needle.as_str()))?;
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_json(&self, url: &str, _opts: &FetchOptions) -> Result<JsonResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_owned());
        let reply = self.next_reply(url).unwrap_or_else(|| http_error(404, "Not Found", ""));
        match reply {
            Reply::Json(body) => Ok(JsonResponse { status: 200, body }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
            Reply::Delay(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(JsonResponse { status: 200, body })
            }
        }
    }
}

#[derive(Default)]
struct SinkState {
    text: String,
    visible: bool,
    html: Vec<String>,
}

#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<SinkState>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn text(&self) -> String {
        self.state.lock().unwrap().text.clone()
    }

    pub fn visible(&self) -> bool {
        self.state.lock().unwrap().visible
    }

    pub fn html(&self) -> Vec<String> {
        self.state.lock().unwrap().html.clone()
    }
}

impl UiSink for RecordingSink {
    fn set_text(&self, text: &str) {
        self.state.lock().unwrap().text = text.to_owned();
    }

    fn set_visible(&self, visible: bool) {
        self.state.lock().unwrap().visible = visible;
    }

    fn append_html(&self, html: &str) {
        self.state.lock().unwrap().html.push(html.to_owned());
    }
}

#[derive(Default)]
pub struct Button(AtomicBool);

impl Button {
    pub fn new(disabled: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(disabled)))
    }
}

impl CommandAffordance for Button {
    fn is_disabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set_disabled(&self, disabled: bool) {
        self.0.store(disabled, Ordering::SeqCst);
    }
}

/// In-memory status channel. Messages pushed with [`FakeChannel::push`]
/// reach every live connection.
#[derive(Default)]
pub struct FakeChannel {
    live: Mutex<HashMap<u64, mpsc::Sender<StreamMessage>>>,
    next_id: AtomicU64,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub async fn push(&self, message: StreamMessage) {
        let senders: Vec<_> = self.live.lock().unwrap().values().cloned().collect();
        for tx in senders {
            let _ = tx.send(message.clone()).await;
        }
        settle().await;
    }
}

#[async_trait]
impl StatusChannel for FakeChannel {
    async fn connect(&self, _channel: &str) -> Result<ChannelConnection, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        self.live.lock().unwrap().insert(id, tx);
        Ok(ChannelConnection {
            handle: ChannelHandle(id),
            messages: rx,
        })
    }

    async fn disconnect(&self, handle: ChannelHandle) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().remove(&handle.0);
    }
}

/// Let spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for a monitor event")
        .expect("event bus closed")
}

/// Next event that is not a busy-state change.
pub async fn next_outcome(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
    loop {
        match next_event(rx).await {
            MonitorEvent::BusyStateChanged { .. } => continue,
            event => return event,
        }
    }
}

pub fn drain(rx: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn names(events: &[MonitorEvent]) -> Vec<&'static str> {
    events.iter().map(MonitorEvent::name).collect()
}
