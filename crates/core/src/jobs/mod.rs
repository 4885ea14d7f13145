// crates/core/src/jobs/mod.rs
//! Job lifecycle monitoring.
//!
//! A [`JobMonitor`] observes one job id at a time. It polls the status
//! endpoint until the job is terminal, listens to an optional status stream,
//! delays poll-error display for a grace period and publishes exactly one
//! terminal notification per job id on its [`EventBus`](crate::events::EventBus).

mod backfill;
mod monitor;
mod notifier;
mod poller;
mod state;
mod stream;
pub mod types;

pub use monitor::{JobMonitor, JobMonitorBuilder, MonitorSinks};
pub use types::{normalize_job_id, JobHandle};
