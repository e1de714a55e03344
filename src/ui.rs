//! Startup progress on stderr for the `sblive` binary.
//!
//! Each startup step gets a spinner on a terminal, or a plain `==>` line
//! otherwise. A step finishes with a check mark when dropped, or with a
//! warning mark when `warn` was called on it.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    fn parse(flag: &str) -> Self {
        match flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StartupUi {
    pretty: bool,
}

impl StartupUi {
    /// `quiet_terminal` turns `auto` into plain output, e.g. when stdout is piped.
    pub fn from_args(ui_flag: &str, is_tty: bool, quiet_terminal: bool) -> Self {
        let pretty = is_tty
            && match UiMode::parse(ui_flag) {
                UiMode::Pretty => true,
                UiMode::Auto => !quiet_terminal,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    pub fn step(&self, name: &str) -> Step {
        let spinner = if self.pretty {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            Some(spinner)
        } else {
            eprintln!("==> {}", name);
            None
        };
        Step {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
            warning: None,
        }
    }
}

pub struct Step {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    warning: Option<String>,
}

impl Step {
    /// Finish this step with a warning instead of a check mark.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warning = Some(message.into());
    }
}

impl Drop for Step {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.warning {
            Some(warning) => format!("! {} ({}): {}", self.name, elapsed, warning),
            None => format!("✔ {} ({})", self.name, elapsed),
        };
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
