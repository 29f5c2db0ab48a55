//! Progress indicators for catalogctl.

use catalogkit::{Error, Phase, PollObserver};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Start a spinner, or a hidden bar when output is quiet
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK);
    pb
}

pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    if !pb.is_hidden() {
        println!("{} {}", "✓".green(), msg);
    }
}

pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_and_clear();
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}

/// Feeds request polling progress into a spinner
pub struct PollSpinner {
    bar: ProgressBar,
    label: String,
}

impl PollSpinner {
    pub fn new(bar: ProgressBar, label: impl Into<String>) -> Self {
        Self {
            bar,
            label: label.into(),
        }
    }
}

impl PollObserver for PollSpinner {
    fn on_poll(&self, poll: u32, max_polls: u32, phase: &Phase) {
        self.bar.set_message(format!(
            "{} {} (poll {poll}/{max_polls})",
            self.label,
            phase.as_str()
        ));
    }

    fn on_poll_error(&self, consecutive: u32, error: &Error) {
        log::debug!("Poll failed ({consecutive} in a row): {error}");
        self.bar.set_message(format!(
            "{} retrying after error ({consecutive} in a row)",
            self.label
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_spinner_reports_phase() {
        let bar = ProgressBar::hidden();
        let observer = PollSpinner::new(bar.clone(), "Creating web");

        observer.on_poll(2, 30, &Phase::InProgress);
        assert_eq!(bar.message(), "Creating web IN_PROGRESS (poll 2/30)");

        observer.on_poll_error(1, &Error::Transport("connection reset".to_string()));
        assert!(bar.message().contains("retrying"));
    }

    #[test]
    fn test_quiet_spinner_is_hidden() {
        assert!(spinner("working", true).is_hidden());
    }
}
