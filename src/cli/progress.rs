//! `indicatif` progress bar for automatic generation

use crate::progress::{GenerationStats, ProcessingStage, ProgressReporter, ProgressUpdate};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Drives one progress bar across the stages of a generation run
pub(crate) struct BarProgressReporter {
    bar: ProgressBar,
}

impl BarProgressReporter {
    pub(crate) fn new(hidden: bool) -> Self {
        let bar = ProgressBar::new(1);
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for BarProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_message(update.stage.description());
        self.bar.set_length(update.total.max(1) as u64);
        self.bar.set_position(update.completed as u64);
        if update.stage == ProcessingStage::Completed {
            self.bar.finish_and_clear();
        }
    }

    fn report_completion(&self, stats: &GenerationStats) {
        log::info!(
            "Kept {} of {} candidate masks ({} points, {} batches) in {}ms",
            stats.kept,
            stats.candidates,
            stats.points,
            stats.batches,
            stats.total_ms
        );
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar.abandon_with_message(format!("{} failed", stage.description()));
        log::error!("Error during {}: {}", stage.description(), error);
    }
}
