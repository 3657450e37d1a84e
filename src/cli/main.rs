//! Automatic mask generation CLI
//!
//! Encodes one image, generates masks from a point grid (or explicit points),
//! deduplicates them and writes mask PNGs, overlays and a JSON summary.

use super::{config::CliConfigBuilder, overlay::render_overlay, progress::BarProgressReporter};
use crate::{
    inference::{BackendFactory, DefaultBackendFactory},
    models::ModelPair,
    session::AutomaticSession,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{BoundingBox, Point, SegmentationResult},
    progress::GenerationStats,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Generate segmentation masks with a SAM2-style encoder/decoder pair
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "sam2-prompt")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image
    #[arg(value_name = "INPUT", required_unless_present = "show_providers")]
    pub input: Option<PathBuf>,

    /// Model directory containing model.json and the encoder/decoder files
    #[arg(short, long, value_name = "DIR", required_unless_present = "show_providers")]
    pub model: Option<PathBuf>,

    /// Output directory for masks, overlays and summary.json
    #[arg(short, long, value_name = "DIR", default_value = "masks")]
    pub output: PathBuf,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:cuda, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Grid density; the grid has points-per-side² prompts
    #[arg(short, long, default_value_t = 16, allow_hyphen_values = true)]
    pub points_per_side: i32,

    /// Explicit prompt point in image pixels (X,Y); repeatable, replaces the grid
    #[arg(long = "point", value_name = "X,Y")]
    pub points: Vec<String>,

    /// Points per decoder invocation
    #[arg(long, default_value_t = 8)]
    pub points_per_batch: usize,

    /// Decoder logit threshold for foreground
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub mask_threshold: f32,

    /// Drop candidates with a lower predicted IoU
    #[arg(long, default_value_t = 0.88)]
    pub pred_iou_thresh: f32,

    /// Drop candidates with fewer mask cells
    #[arg(long, default_value_t = 0)]
    pub min_area: usize,

    /// Box IoU above which a weaker candidate is a duplicate
    #[arg(long, default_value_t = 0.7)]
    pub overlap_threshold: f32,

    /// Only export masks with a predicted IoU above this
    #[arg(long, default_value_t = 0.80)]
    pub save_min_iou: f32,

    /// Only export masks with more cells than this
    #[arg(long, default_value_t = 100)]
    pub save_min_area: usize,

    /// Letterbox the image instead of stretching it to the network input
    #[arg(long)]
    pub letterbox: bool,

    /// Swap red and blue channels before encoding
    #[arg(long)]
    pub swap_rb: bool,

    /// Skip writing overlay images
    #[arg(long)]
    pub no_overlay: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show backend and execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

/// Per-mask entry of `summary.json`
#[derive(Debug, Serialize)]
struct MaskSummary {
    index: usize,
    predicted_iou: f32,
    area: usize,
    bounding_box: BoundingBox,
    point: Point,
    mask_file: Option<String>,
    overlay_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    image: PathBuf,
    model: String,
    width: u32,
    height: u32,
    stats: Option<GenerationStats>,
    masks: Vec<MaskSummary>,
}

/// CLI entry point
///
/// # Errors
/// - Invalid arguments, model loading, inference or output failures
pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose, cli.log_format.into()).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let (Some(input), Some(model_dir)) = (&cli.input, &cli.model) else {
        anyhow::bail!("Both INPUT and --model are required");
    };
    CliConfigBuilder::validate_cli(cli).context("Invalid CLI arguments")?;
    let (backend_type, config) = CliConfigBuilder::from_cli(cli)?;
    let points = cli
        .points
        .iter()
        .map(|p| CliConfigBuilder::parse_point(p))
        .collect::<Result<Vec<_>>>()?;

    let image = image::open(input)
        .with_context(|| format!("Failed to read image {}", input.display()))?;
    info!("Loaded {} ({}x{})", input.display(), image.width(), image.height());

    let models = {
        let _span = spans::model_loading(model_dir, &backend_type.to_string()).entered();
        ModelPair::load(model_dir, backend_type, &config)
            .with_context(|| format!("Failed to load models from {}", model_dir.display()))?
    };
    let model_name = models.manifest.name.clone();

    let mut session = AutomaticSession::new(models, config.clone())
        .context("Model does not match the expected encoder/decoder contract")?
        .with_progress_reporter(Box::new(BarProgressReporter::new(cli.quiet)));

    let results = {
        let _span = spans::image_generation(input, (image.width(), image.height())).entered();
        if points.is_empty() {
            session.generate(&image, config.points_per_side)?
        } else {
            session.generate_from_points(&image, &points)?
        }
    };
    info!("Generated {} masks after deduplication", results.len());

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory {}", cli.output.display()))?;

    let masks = {
        let _span = spans::mask_export(&cli.output, results.len()).entered();
        export_masks(cli, &image, &results)?
    };

    let summary = RunSummary {
        image: input.clone(),
        model: model_name,
        width: image.width(),
        height: image.height(),
        stats: session.last_stats().cloned(),
        masks,
    };
    let summary_path = cli.output.join("summary.json");
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    info!("Wrote {}", summary_path.display());
    Ok(())
}

/// Save mask PNGs and overlays for candidates passing the export filter
fn export_masks(
    cli: &Cli,
    image: &image::DynamicImage,
    results: &[SegmentationResult],
) -> Result<Vec<MaskSummary>> {
    let mut summaries = Vec::with_capacity(results.len());
    for (index, result) in results.iter().enumerate() {
        let exported = result.predicted_iou > cli.save_min_iou && result.area > cli.save_min_area;
        let mut mask_file = None;
        let mut overlay_file = None;

        if exported {
            info!(
                "Mask {index}: IoU={:.3}, Area={}, Box=({}, {}, {}x{})",
                result.predicted_iou,
                result.area,
                result.bounding_box.x,
                result.bounding_box.y,
                result.bounding_box.width,
                result.bounding_box.height
            );
            let name = format!("mask_{index}_iou{:.2}.png", result.predicted_iou);
            result.mask.save_png(cli.output.join(&name))?;
            mask_file = Some(name);

            if !cli.no_overlay {
                let name = format!("masked_image_{index}.png");
                save_overlay(&cli.output.join(&name), image, result)?;
                overlay_file = Some(name);
            }
        }

        summaries.push(MaskSummary {
            index,
            predicted_iou: result.predicted_iou,
            area: result.area,
            bounding_box: result.bounding_box,
            point: result.point,
            mask_file,
            overlay_file,
        });
    }

    if summaries.iter().all(|s| s.mask_file.is_none()) && !results.is_empty() {
        warn!(
            "No mask passed the export filter (IoU > {}, area > {})",
            cli.save_min_iou, cli.save_min_area
        );
    }
    Ok(summaries)
}

fn save_overlay(path: &Path, image: &image::DynamicImage, result: &SegmentationResult) -> Result<()> {
    let overlay = render_overlay(image, result)?;
    overlay
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("------------------------------------------");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nCompiled backends:");
    for backend in DefaultBackendFactory.available_backends() {
        println!("  - {backend}");
        for (name, available, description) in providers_for(backend) {
            let status = if available { "available" } else { "not available" };
            println!("      {name}: {status} - {description}");
        }
    }

    println!("\nUsage examples:");
    println!("  --execution-provider onnx:auto    # Best available ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
    println!("  --execution-provider tract:cpu    # Pure Rust Tract backend");
}

fn providers_for(backend: crate::inference::BackendType) -> Vec<(String, bool, String)> {
    match backend {
        #[cfg(feature = "onnx")]
        crate::inference::BackendType::Onnx => crate::backends::OnnxBackend::list_providers(),
        #[cfg(feature = "tract")]
        crate::inference::BackendType::Tract => crate::backends::TractBackend::list_providers(),
        #[allow(unreachable_patterns)]
        _ => Vec::new(),
    }
}
