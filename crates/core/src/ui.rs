// crates/core/src/ui.rs
//! Narrow rendering seams and the command-affordance synchronizer.
//!
//! [`CommandAffordance`] implementations are called while the monitor's
//! state lock is held, so they must not call back into the monitor.

use std::sync::Arc;

use crate::status::JobStatusSnapshot;

/// A piece of UI the monitor can write into: a status line, a stacktrace
/// panel, a log pane.
pub trait UiSink: Send + Sync {
    fn set_text(&self, text: &str);
    fn set_visible(&self, visible: bool);
    fn append_html(&self, html: &str);
}

/// A control that should be disabled while a job is running.
pub trait CommandAffordance: Send + Sync {
    fn is_disabled(&self) -> bool;
    fn set_disabled(&self, disabled: bool);
}

/// `true` while a job is assigned and not known to be terminal.
pub fn is_busy(job_id: Option<&str>, status: Option<&JobStatusSnapshot>) -> bool {
    job_id.is_some() && status.map_or(true, |s| !s.phase().is_terminal())
}

struct TrackedAffordance {
    target: Arc<dyn CommandAffordance>,
    /// Disabled state captured when the job became busy.
    prior: Option<bool>,
}

/// Disables registered affordances while busy and restores each one's
/// pre-job disabled state afterwards.
#[derive(Default)]
pub struct AffordanceSync {
    targets: Vec<TrackedAffordance>,
    busy: bool,
}

impl AffordanceSync {
    pub fn register(&mut self, target: Arc<dyn CommandAffordance>) {
        let mut tracked = TrackedAffordance {
            target,
            prior: None,
        };
        if self.busy {
            tracked.prior = Some(tracked.target.is_disabled());
            tracked.target.set_disabled(true);
        }
        self.targets.push(tracked);
    }

    /// Apply a busy state. Returns `true` when it differs from the last one.
    pub fn apply(&mut self, busy: bool) -> bool {
        if busy == self.busy {
            return false;
        }
        self.busy = busy;
        for tracked in &mut self.targets {
            if busy {
                tracked.prior = Some(tracked.target.is_disabled());
                tracked.target.set_disabled(true);
            } else if let Some(prior) = tracked.prior.take() {
                tracked.target.set_disabled(prior);
            }
        }
        true
    }
}

/// Escape text for [`UiSink::append_html`].
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
