// crates/cli/src/main.rs
//! `jobwatch`: follow one queued server job until it completes or fails.
//!
//! Every monitor event is printed to stdout as one JSON line. Exit status is
//! 0 when the job finished, 1 when it failed, 130 on Ctrl-C.

mod console;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use jobwatch_core::jobs::normalize_job_id;
use jobwatch_core::{
    ChannelError, HttpTransport, JobEndpoints, JobHandle, JobMonitor, MonitorConfig, MonitorEvent,
    StatusChannel, WsStatusChannel,
};

use crate::console::Console;

#[derive(Debug, Parser)]
#[command(name = "jobwatch", version, about = "Follow a queued server job until it completes or fails")]
struct Cli {
    /// Job id to observe.
    job_id: String,

    /// Primary API base, e.g. https://host/rq-engine/api.
    #[arg(long)]
    base: Option<String>,

    /// Base tried when the primary route is unreachable or missing.
    #[arg(long, conflicts_with = "no_fallback")]
    fallback_base: Option<String>,

    /// Disable the fallback base.
    #[arg(long)]
    no_fallback: bool,

    /// Status stream WebSocket URL. `{channel}` is substituted when present.
    #[arg(long)]
    stream_url: Option<String>,

    #[arg(long, default_value = "status")]
    channel: String,

    /// Stream trigger that marks the job as done.
    #[arg(long)]
    completion_event: Option<String>,

    /// Poll interval in milliseconds.
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,

    /// No spinner or stacktrace output on stderr.
    #[arg(long, short)]
    quiet: bool,
}

fn build_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::from_env().context("invalid JOBWATCH_* environment")?;

    if let Some(base) = &cli.base {
        config.endpoints.primary_base = JobEndpoints::new(base.as_str()).primary_base;
    }
    if let Some(fallback) = &cli.fallback_base {
        config.endpoints = config.endpoints.with_fallback(fallback.as_str());
    }
    if cli.no_fallback {
        config.endpoints.fallback_base = None;
    }
    if let Some(ms) = cli.poll_ms {
        if ms == 0 {
            bail!("--poll-ms must be greater than zero");
        }
        config.poll_interval = Duration::from_millis(ms);
    }
    if let Some(event) = &cli.completion_event {
        config.poll_completion_event = Some(event.clone());
    }
    Ok(config)
}

/// Assign the job, then open the status stream, so frames replayed on
/// connect are routed against the assigned job. Returns whether a stream is
/// live.
async fn start_watch(
    monitor: &JobMonitor,
    job_id: &str,
    stream: Option<Arc<dyn StatusChannel>>,
    channel: &str,
) -> Result<bool, ChannelError> {
    monitor.set_job_id(Some(job_id));
    let Some(stream) = stream else {
        return Ok(false);
    };
    monitor.attach_stream(stream, channel).await;
    monitor.connect_stream().await?;
    Ok(true)
}

/// Whether the job already completed (`Some(true)`) or failed
/// (`Some(false)`), read from the dispatch flags.
fn dispatched_outcome(job: &JobHandle) -> Option<bool> {
    if job.completion_dispatched {
        Some(true)
    } else if job.failure_dispatched {
        Some(false)
    } else {
        None
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,jobwatch=info,jobwatch_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(job_id) = normalize_job_id(Some(cli.job_id.as_str())) else {
        bail!("job id must not be blank");
    };
    let config = build_config(&cli)?;
    info!(
        %job_id,
        primary = %config.endpoints.primary_base,
        fallback = ?config.endpoints.fallback_base,
        "watching job"
    );

    let console = Console::new(cli.quiet);
    let monitor = JobMonitor::builder(config, Arc::new(HttpTransport::new()))
        .status_sink(console.status_line())
        .stacktrace_sink(console.trace_panel())
        .build();
    let mut events = monitor.subscribe();

    let stream = cli
        .stream_url
        .as_deref()
        .map(|url| Arc::new(WsStatusChannel::new(url)) as Arc<dyn StatusChannel>);
    match start_watch(&monitor, &job_id, stream, &cli.channel).await {
        Ok(true) => {}
        Ok(false) => console.show_polling(&job_id),
        Err(e) => {
            warn!("status stream unavailable, polling only: {e}");
            console.show_polling(&job_id);
        }
    }

    let code = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!(%job_id, "interrupted");
                break ExitCode::from(130);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    println!("{}", serde_json::to_string(&event)?);
                    match event {
                        MonitorEvent::Completed { .. } => break ExitCode::SUCCESS,
                        MonitorEvent::Error { .. } => break ExitCode::FAILURE,
                        _ => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event output lagged");
                    match dispatched_outcome(&monitor.snapshot()) {
                        Some(true) => break ExitCode::SUCCESS,
                        Some(false) => break ExitCode::FAILURE,
                        None => {}
                    }
                }
                Err(RecvError::Closed) => break ExitCode::FAILURE,
            }
        }
    };

    monitor.detach_stream().await;
    console.finish();
    Ok(code)
}
