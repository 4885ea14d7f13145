// crates/core/src/lib.rs
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod jobs;
pub mod status;
pub mod stream;
pub mod transport;
pub mod ui;

pub use config::{JobEndpoints, MonitorConfig};
pub use error::{ChannelError, ConfigError, TransportError};
pub use events::{EventBus, EventSubscription, MonitorEvent};
pub use jobs::{JobHandle, JobMonitor, JobMonitorBuilder, MonitorSinks};
pub use status::{ErrorParts, JobPhase, JobStatusSnapshot, StatusSource};
pub use stream::{ChannelConnection, ChannelHandle, StatusChannel, StreamMessage, TriggerEvent, WsStatusChannel};
pub use transport::{FetchOptions, HttpTransport, JsonResponse, Transport};
pub use ui::{CommandAffordance, UiSink};
