use crate::error::ExportError;
use crate::pipeline::{Stage, StageObserver};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

/// Terminal spinner that follows the pipeline stages.
pub struct ProgressObserver {
    spinner: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]));
        }
        Self { spinner }
    }

    #[cfg(test)]
    fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
        }
    }

    /// Stderr writer for log lines that clears the spinner while a line is printed.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            spinner: self.spinner.clone(),
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StageObserver for ProgressObserver {
    fn stage_started(&self, stage: Stage) {
        self.spinner.set_message(format!("{}...", stage));
        self.spinner.enable_steady_tick(Duration::from_millis(80));
    }

    fn stage_finished(&self, stage: Stage) {
        self.spinner.println(format!("✓ {}", stage));
    }

    fn stage_failed(&self, stage: Stage, _error: &ExportError) {
        self.spinner.println(format!("✗ {}", stage));
        self.spinner.finish_and_clear();
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

/// Writes to stderr around a live spinner.
#[derive(Clone)]
pub struct LogWriter {
    spinner: ProgressBar,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spinner.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.spinner.suspend(|| io::stderr().flush())
    }
}
