//! Automatic mask generation
//!
//! Every point becomes its own single-point prompt. Points are decoded in
//! fixed-size batches, each `(point, mask channel)` output is post-processed
//! on its own, and the surviving candidates are deduplicated as one set.

use super::build_stages;
use crate::{
    config::SessionConfig,
    decoder::MaskDecoder,
    dedup::deduplicate,
    encoder::{EncodedImage, ImageEncoder},
    error::Result,
    grid::generate_point_grid,
    models::ModelPair,
    postprocess::MaskPostProcessor,
    progress::{GenerationStats, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate},
    types::{ImageSize, Point, SegmentationResult},
};
use image::DynamicImage;
use instant::Instant;
use tracing::{debug, info, instrument, span, Level};

/// Batched single-point prompting with filtering and deduplication
pub struct AutomaticSession {
    encoder: ImageEncoder,
    decoder: MaskDecoder,
    config: SessionConfig,
    postprocessor: MaskPostProcessor,
    reporter: Box<dyn ProgressReporter>,
    last_stats: Option<GenerationStats>,
}

impl std::fmt::Debug for AutomaticSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomaticSession")
            .field("encoder", &self.encoder)
            .field("decoder", &self.decoder)
            .field("postprocessor", &self.postprocessor)
            .finish_non_exhaustive()
    }
}

/// Where the prompt points of one run come from
#[derive(Debug, Clone, Copy)]
enum PointSource<'a> {
    /// `points_per_side²` grid over the network canvas
    Grid(i32),
    /// Caller points in original-image pixels
    Explicit(&'a [Point]),
}

impl PointSource<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Self::Grid(points_per_side) => *points_per_side <= 0,
            Self::Explicit(points) => points.is_empty(),
        }
    }
}

/// One generation request: points in network space plus the original-image
/// point each result should report
struct PromptPoints {
    network: Vec<Point>,
    original: Vec<Point>,
}

impl PromptPoints {
    /// Resolve against the canvas layout the image was encoded with
    fn resolve(source: PointSource<'_>, encoded: &EncodedImage) -> Self {
        match source {
            PointSource::Grid(points_per_side) => {
                let network = generate_point_grid(encoded.network_size, points_per_side);
                Self {
                    original: network.iter().map(|&p| encoded.to_original_space(p)).collect(),
                    network,
                }
            }
            PointSource::Explicit(points) => Self {
                network: points.iter().map(|&p| encoded.to_network_space(p)).collect(),
                original: points.to_vec(),
            },
        }
    }
}

impl AutomaticSession {
    /// Build a session from loaded models
    ///
    /// # Errors
    /// - `InvalidConfig` for an invalid config or undeterminable input size
    /// - `MissingTensor` when either model does not satisfy the tensor contract
    pub fn new(models: ModelPair, config: SessionConfig) -> Result<Self> {
        let (encoder, decoder) = build_stages(models, &config)?;
        let postprocessor = MaskPostProcessor::new(
            config.mask_threshold,
            config.pred_iou_thresh,
            config.min_mask_region_area,
        );
        Ok(Self {
            encoder,
            decoder,
            config,
            postprocessor,
            reporter: Box::new(NoOpProgressReporter),
            last_stats: None,
        })
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn network_size(&self) -> ImageSize {
        self.encoder.network_size()
    }

    /// Statistics of the most recent successful run
    #[must_use]
    pub fn last_stats(&self) -> Option<&GenerationStats> {
        self.last_stats.as_ref()
    }

    /// Generate masks from a `points_per_side²` grid over the network canvas
    ///
    /// Returns an empty list without encoding when `points_per_side <= 0`.
    ///
    /// # Errors
    /// - Encoder or decoder engine failures
    pub fn generate(
        &mut self,
        image: &DynamicImage,
        points_per_side: i32,
    ) -> Result<Vec<SegmentationResult>> {
        self.run(image, PointSource::Grid(points_per_side))
    }

    /// Generate masks from explicit points given in original-image pixels
    ///
    /// # Errors
    /// - Encoder or decoder engine failures
    pub fn generate_from_points(
        &mut self,
        image: &DynamicImage,
        points: &[Point],
    ) -> Result<Vec<SegmentationResult>> {
        self.run(image, PointSource::Explicit(points))
    }

    #[instrument(skip_all)]
    fn run(&mut self, image: &DynamicImage, source: PointSource<'_>) -> Result<Vec<SegmentationResult>> {
        let start = Instant::now();
        let mut stats = GenerationStats::default();

        if source.is_empty() {
            debug!("No prompt points, skipping generation");
            self.report(ProcessingStage::Completed, 1, 1, start);
            self.reporter.report_completion(&stats);
            self.last_stats = Some(stats);
            return Ok(Vec::new());
        }

        self.report(ProcessingStage::Encoding, 0, 1, start);
        let encoded = self
            .encoder
            .encode(image)
            .inspect_err(|e| self.reporter.report_error(ProcessingStage::Encoding, &e.to_string()))?;
        stats.encode_ms = start.elapsed().as_millis() as u64;
        self.report(ProcessingStage::Encoding, 1, 1, start);

        let points = PromptPoints::resolve(source, &encoded);
        stats.points = points.network.len();
        debug!(points = stats.points, letterbox = encoded.letterbox.is_some(), "Resolved prompt points");
        let decode_start = Instant::now();
        let candidates = self.decode_all(&encoded, &points, start, &mut stats)?;
        stats.decode_ms = decode_start.elapsed().as_millis() as u64;
        stats.candidates = candidates.len();

        let results = {
            let _span = span!(Level::DEBUG, "deduplication", candidates = candidates.len()).entered();
            self.report(ProcessingStage::Deduplication, 0, 1, start);
            let kept = deduplicate(candidates, self.config.overlap_threshold);
            self.report(ProcessingStage::Deduplication, 1, 1, start);
            kept
        };
        stats.kept = results.len();
        stats.total_ms = start.elapsed().as_millis() as u64;

        info!(
            points = stats.points,
            candidates = stats.candidates,
            kept = stats.kept,
            total_ms = stats.total_ms,
            "Automatic generation finished"
        );
        self.report(ProcessingStage::Completed, 1, 1, start);
        self.reporter.report_completion(&stats);
        self.last_stats = Some(stats);
        Ok(results)
    }

    /// Decode all batches in point order and collect filtered candidates
    fn decode_all(
        &mut self,
        encoded: &EncodedImage,
        points: &PromptPoints,
        start: Instant,
        stats: &mut GenerationStats,
    ) -> Result<Vec<SegmentationResult>> {
        let batch_size = self.config.points_per_batch.max(1);
        let batch_count = points.network.len().div_ceil(batch_size);
        stats.batches = batch_count;

        let mut candidates = Vec::new();
        let mut checked = 0_usize;
        for (index, (network, original)) in points
            .network
            .chunks(batch_size)
            .zip(points.original.chunks(batch_size))
            .enumerate()
        {
            let output = self
                .decoder
                .decode_points(&encoded.embeddings, network)
                .inspect_err(|e| {
                    self.reporter.report_error(ProcessingStage::Decoding, &e.to_string());
                })?;
            self.report(ProcessingStage::Decoding, index + 1, batch_count, start);

            let items = output.batch_size().min(original.len());
            for (item, &point) in original.iter().enumerate().take(items) {
                for channel in 0..output.channels() {
                    checked += 1;
                    if let Some(result) = self.postprocessor.process(
                        output.mask(item, channel),
                        output.score(item, channel),
                        encoded.original_size,
                        point,
                    ) {
                        candidates.push(result);
                    }
                }
            }
            debug!(batch = index, items, kept_so_far = candidates.len(), "Post-processed batch");
        }

        self.report(ProcessingStage::PostProcessing, checked, checked, start);
        Ok(candidates)
    }

    fn report(&self, stage: ProcessingStage, completed: usize, total: usize, start: Instant) {
        self.reporter
            .report_progress(ProgressUpdate::new(stage, completed, total, start));
    }
}
