//! Terminal progress for analysis runs.

use crate::pipeline::{PipelineObserver, Stage};
use crate::vector::{BatchObserver, BatchOutcome, BatchReport, FetchStats};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

fn batch_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Shows the current stage as a spinner and embedding batches as a bar.
pub struct StageProgress {
    bar: ProgressBar,
}

impl StageProgress {
    pub fn new() -> Self {
        Self {
            bar: create_spinner(Stage::Validating.description()),
        }
    }

    /// Progress that draws nothing, for JSON output or pipes.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for StageProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchObserver for StageProgress {
    fn on_batch(&self, report: &BatchReport) {
        if report.index == 0 {
            self.bar.set_style(batch_style());
            self.bar.set_length(report.total as u64);
        }
        self.bar.set_position((report.index + 1) as u64);
        if report.outcome == BatchOutcome::Failed {
            self.bar
                .set_message(format!("batch {} degraded", report.index + 1));
        }
    }
}

impl PipelineObserver for StageProgress {
    fn on_stage(&self, stage: Stage) {
        if stage != Stage::Embedding {
            self.bar.set_style(spinner_style());
        }
        self.bar.set_message(stage.description());
    }

    fn on_finished(&self, stats: &FetchStats) {
        if stats.failed > 0 || stats.skipped > 0 {
            self.bar.println(format!(
                "{} of {} comments embedded ({} empty, {} failed)",
                stats.embedded, stats.requested, stats.skipped, stats.failed
            ));
        }
    }
}
