// crates/core/src/error.rs
use thiserror::Error;

/// Errors produced by a [`Transport`](crate::transport::Transport) while
/// fetching job status or job info.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP {status} {status_text}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether the secondary base path should be tried after this failure.
    ///
    /// The primary route counts as unresolved when the connection itself
    /// failed or the server has no such route (404).
    pub fn warrants_fallback(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status == 404,
            Self::Decode { .. } | Self::Cancelled => false,
        }
    }

    /// Best-effort human-readable detail for this error.
    ///
    /// HTTP bodies are inspected for the usual JSON error fields before
    /// falling back to the raw text.
    pub fn detail(&self) -> String {
        match self {
            Self::Http { body, .. } => detail_from_body(body),
            Self::Network(message) => message.clone(),
            Self::Decode { message, .. } => message.clone(),
            Self::Cancelled => String::new(),
        }
    }
}

const DETAIL_KEYS: &[&str] = &["error", "Error", "detail", "message", "StackTrace"];

fn detail_from_body(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return trimmed.to_owned();
    };
    match &value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => DETAIL_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|field| match field {
                serde_json::Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
                serde_json::Value::Array(items) if !items.is_empty() => Some(
                    items
                        .iter()
                        .map(|item| match item {
                            serde_json::Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                _ => None,
            })
            .unwrap_or_else(|| trimmed.to_owned()),
        _ => trimmed.to_owned(),
    }
}

/// Errors raised by a push-based status channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect status channel {channel}: {message}")]
    Connect { channel: String, message: String },
}

/// Errors raised while reading monitor configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}
