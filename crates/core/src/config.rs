// crates/core/src/config.rs
//! Monitor configuration: endpoints, timer intervals and display limits.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(800);
pub const DEFAULT_BACKFILL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_SUMMARY_MAX_LEN: usize = 160;
pub const DEFAULT_SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const DEFAULT_PRIMARY_BASE: &str = "http://localhost/rq-engine/api";
const DEFAULT_FALLBACK_BASE: &str = "http://localhost/weppcloud/rq/api";

/// Primary and fallback base paths for the job endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEndpoints {
    pub primary_base: String,
    pub fallback_base: Option<String>,
}

impl JobEndpoints {
    pub fn new(primary_base: impl Into<String>) -> Self {
        Self {
            primary_base: trim_base(primary_base.into()),
            fallback_base: None,
        }
    }

    pub fn with_fallback(mut self, fallback_base: impl Into<String>) -> Self {
        self.fallback_base = Some(trim_base(fallback_base.into()));
        self
    }

    /// `{base}/jobstatus/{id}?_={cache_bust}` for the primary and fallback bases.
    pub fn status_urls(&self, job_id: &str, cache_bust: i64) -> (String, Option<String>) {
        let path = format!("jobstatus/{}?_={cache_bust}", urlencoding::encode(job_id));
        self.join(&path)
    }

    /// `{base}/jobinfo/{id}` for the primary and fallback bases.
    pub fn info_urls(&self, job_id: &str) -> (String, Option<String>) {
        let path = format!("jobinfo/{}", urlencoding::encode(job_id));
        self.join(&path)
    }

    fn join(&self, path: &str) -> (String, Option<String>) {
        (
            format!("{}/{path}", self.primary_base),
            self.fallback_base
                .as_ref()
                .map(|base| format!("{base}/{path}")),
        )
    }
}

impl Default for JobEndpoints {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_BASE).with_fallback(DEFAULT_FALLBACK_BASE)
    }
}

fn trim_base(base: String) -> String {
    base.trim().trim_end_matches('/').to_owned()
}

/// Configuration for one [`JobMonitor`](crate::jobs::JobMonitor) instance.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub endpoints: JobEndpoints,
    /// Delay between status polls while the job is non-terminal.
    pub poll_interval: Duration,
    /// Grace period before a poll error is shown.
    pub backfill_delay: Duration,
    /// Per-request timeout handed to the transport.
    pub request_timeout: Option<Duration>,
    /// Maximum characters in the one-line progress summary.
    pub summary_max_len: usize,
    pub spinner_frames: Vec<String>,
    /// Stream trigger that is treated as a terminal status observation.
    pub poll_completion_event: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoints: JobEndpoints::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            backfill_delay: DEFAULT_BACKFILL_DELAY,
            request_timeout: Some(Duration::from_secs(30)),
            summary_max_len: DEFAULT_SUMMARY_MAX_LEN,
            spinner_frames: DEFAULT_SPINNER_FRAMES.iter().map(|f| f.to_string()).collect(),
            poll_completion_event: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults overlaid with `JOBWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by the same
    /// variable names [`MonitorConfig::from_env`] reads.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(base) = get("JOBWATCH_PRIMARY_BASE") {
            config.endpoints.primary_base = trim_base(base);
        }
        if let Some(base) = get("JOBWATCH_FALLBACK_BASE") {
            config.endpoints.fallback_base = match base.trim() {
                "none" | "off" => None,
                _ => Some(trim_base(base)),
            };
        }
        if let Some(raw) = get("JOBWATCH_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("JOBWATCH_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = get("JOBWATCH_BACKFILL_DELAY_MS") {
            config.backfill_delay = parse_millis("JOBWATCH_BACKFILL_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("JOBWATCH_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Some(parse_millis("JOBWATCH_REQUEST_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = get("JOBWATCH_SUMMARY_MAX_LEN") {
            config.summary_max_len =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                        var: "JOBWATCH_SUMMARY_MAX_LEN",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
        }
        if let Some(event) = get("JOBWATCH_COMPLETION_EVENT") {
            config.poll_completion_event = Some(event.trim().to_owned());
        }
        Ok(config)
    }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        ConfigError::InvalidEnv {
            var,
            value: raw.to_owned(),
            reason: e.to_string(),
        }
    })?;
    if millis == 0 {
        return Err(ConfigError::InvalidEnv {
            var,
            value: raw.to_owned(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(Duration::from_millis(millis))
}
