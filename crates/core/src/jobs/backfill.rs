// crates/core/src/jobs/backfill.rs
//! Delayed display of poll errors.
//!
//! A poll error is only shown once it has stood for the grace period
//! without a successful poll, a stream-pushed error or job diagnostics
//! replacing it.

use std::sync::Arc;

use tracing::{debug, info};

use super::monitor::Inner;
use super::state::{ArmedTimer, MonitorState};
use super::types::StacktraceOrigin;
use crate::status::ErrorParts;

impl Inner {
    /// Arm (or re-arm) the backfill timer for `parts`.
    pub(crate) fn arm_backfill(
        self: &Arc<Self>,
        state: &mut MonitorState,
        generation: u64,
        parts: ErrorParts,
    ) {
        state.cancel_backfill();
        let seq = state.next_timer_seq();
        let delay = self.config.backfill_delay;
        let token = state.cancel.clone();
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_backfill(generation, seq, &parts);
                    }
                }
            }
        });
        state.backfill = Some(ArmedTimer { seq, task });
    }

    fn fire_backfill(&self, generation: u64, seq: u64, parts: &ErrorParts) {
        let lines = {
            let mut state = self.lock_state();
            if state.generation != generation
                || state.backfill.as_ref().map(|timer| timer.seq) != Some(seq)
            {
                return;
            }
            state.backfill = None;
            if let Some(origin) = state.stacktrace {
                debug!(?origin, "error already surfaced; backfill skipped");
                return;
            }
            state.stacktrace = Some(StacktraceOrigin::Backfill);
            parts.render_lines()
        };
        info!(status_code = %parts.status_code, "surfacing persistent poll error");
        self.render_stacktrace(&lines);
    }
}
