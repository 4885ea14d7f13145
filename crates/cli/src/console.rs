// crates/cli/src/console.rs
//! Terminal rendering for the monitor's UI sinks.
//!
//! The status line is an indicatif spinner on stderr. Error details are
//! printed above it. `quiet` silences both.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use jobwatch_core::UiSink;

pub struct Console {
    bar: ProgressBar,
    quiet: bool,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden());
        bar.set_style(line_style("  {msg}"));
        Self { bar, quiet }
    }

    /// Spinner for poll-only runs, where no stream drives the status line.
    pub fn show_polling(&self, job_id: &str) {
        self.bar.set_style(line_style("  {spinner} {msg}"));
        self.bar.set_message(format!("waiting for job {job_id}"));
        self.bar.enable_steady_tick(Duration::from_millis(100));
        show(&self.bar, self.quiet, true);
    }

    pub fn status_line(&self) -> Arc<dyn UiSink> {
        Arc::new(StatusLine {
            bar: self.bar.clone(),
            quiet: self.quiet,
        })
    }

    pub fn trace_panel(&self) -> Arc<dyn UiSink> {
        Arc::new(TracePanel::new(self.bar.clone(), self.quiet))
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn line_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn show(bar: &ProgressBar, quiet: bool, visible: bool) {
    if visible && !quiet {
        bar.set_draw_target(ProgressDrawTarget::stderr());
    } else {
        bar.set_draw_target(ProgressDrawTarget::hidden());
    }
}

struct StatusLine {
    bar: ProgressBar,
    quiet: bool,
}

impl UiSink for StatusLine {
    fn set_text(&self, text: &str) {
        self.bar.disable_steady_tick();
        self.bar.set_style(line_style("  {msg}"));
        self.bar.set_message(text.to_owned());
    }

    fn set_visible(&self, visible: bool) {
        show(&self.bar, self.quiet, visible);
    }

    fn append_html(&self, _html: &str) {}
}

#[derive(Default)]
struct PanelState {
    text: String,
    printed: Option<String>,
}

/// Prints the stacktrace panel once each time its content becomes visible.
struct TracePanel {
    bar: ProgressBar,
    quiet: bool,
    state: Mutex<PanelState>,
}

impl TracePanel {
    fn new(bar: ProgressBar, quiet: bool) -> Self {
        Self {
            bar,
            quiet,
            state: Mutex::new(PanelState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UiSink for TracePanel {
    fn set_text(&self, text: &str) {
        self.lock().text = text.to_owned();
    }

    fn set_visible(&self, visible: bool) {
        let mut state = self.lock();
        if !visible {
            state.printed = None;
            return;
        }
        if self.quiet
            || state.text.is_empty()
            || state.printed.as_deref() == Some(state.text.as_str())
        {
            return;
        }
        let text = state.text.clone();
        self.bar.suspend(|| {
            for line in text.lines() {
                eprintln!("  \u{2717} {line}");
            }
        });
        state.printed = Some(text);
    }

    fn append_html(&self, _html: &str) {}
}
