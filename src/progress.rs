//! Progress reporting for automatic mask generation
//!
//! Separates progress reporting from the session logic so frontends can
//! render their own progress (the CLI drives an `indicatif` bar).

use instant::Instant;
use serde::Serialize;

/// Stages of one automatic generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Preprocessing and running the image encoder
    Encoding,
    /// Running decoder batches over the point list
    Decoding,
    /// Binarizing and filtering decoder outputs
    PostProcessing,
    /// Overlap suppression across all candidates
    Deduplication,
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Encoding => "Encoding image",
            ProcessingStage::Decoding => "Decoding point batches",
            ProcessingStage::PostProcessing => "Post-processing masks",
            ProcessingStage::Deduplication => "Removing duplicate masks",
            ProcessingStage::Completed => "Mask generation completed",
        }
    }
}

/// Progress update for one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Units of work done in this stage (batches while decoding)
    pub completed: usize,
    pub total: usize,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, completed: usize, total: usize, start_time: Instant) -> Self {
        Self {
            stage,
            completed,
            total,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    /// Completed share of the stage in `0.0..=1.0`; an empty stage counts as done
    #[must_use]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f32 / self.total as f32).min(1.0)
        }
    }
}

/// Summary of a finished generation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationStats {
    pub points: usize,
    pub batches: usize,
    /// Candidates surviving the IoU and area filters
    pub candidates: usize,
    /// Candidates surviving deduplication
    pub kept: usize,
    pub encode_ms: u64,
    pub decode_ms: u64,
    pub total_ms: u64,
}

/// Trait for reporting progress during mask generation
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report run completion with final statistics
    fn report_completion(&self, _stats: &GenerationStats) {}

    /// Report an error during processing
    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}
}

/// Progress reporter that writes to the `log` facade
#[derive(Debug)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}/{}] {} ({}ms elapsed)",
                update.completed,
                update.total,
                update.stage.description(),
                update.elapsed_ms
            );
        } else if update.completed == update.total {
            log::info!("{}", update.stage.description());
        }
    }

    fn report_completion(&self, stats: &GenerationStats) {
        log::info!(
            "Kept {} of {} candidate masks from {} points in {}ms",
            stats.kept,
            stats.candidates,
            stats.points,
            stats.total_ms
        );
        if self.verbose {
            log::info!("  encode {}ms, decode {}ms over {} batches", stats.encode_ms, stats.decode_ms, stats.batches);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("Error during {}: {}", stage.description(), error);
    }
}
