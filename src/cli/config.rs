//! Conversion of CLI arguments into session configuration

use crate::cli::main_impl::Cli;
use crate::{
    config::{ExecutionProvider, ResizeMode, SessionConfig},
    inference::BackendType,
    types::Point,
};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated [`SessionConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the session configuration and backend selection from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<(BackendType, SessionConfig)> {
        let (backend_type, execution_provider) =
            Self::parse_provider_string(&cli.execution_provider)
                .context("Invalid execution provider format")?;

        let resize_mode = if cli.letterbox {
            ResizeMode::Letterbox
        } else {
            ResizeMode::Stretch
        };

        let config = SessionConfig::builder()
            .execution_provider(execution_provider)
            // Same thread count for intra and inter op parallelism
            .intra_threads(cli.threads)
            .inter_threads(cli.threads)
            .mask_threshold(cli.mask_threshold)
            .resize_mode(resize_mode)
            .swap_rb(cli.swap_rb)
            .points_per_side(cli.points_per_side)
            .points_per_batch(cli.points_per_batch)
            .pred_iou_thresh(cli.pred_iou_thresh)
            .min_mask_region_area(cli.min_area)
            .overlap_threshold(cli.overlap_threshold)
            .build()
            .context("Invalid configuration")?;

        Ok((backend_type, config))
    }

    /// Parse `backend[:provider]`, e.g. `onnx:cuda` or `tract`
    pub(crate) fn parse_provider_string(value: &str) -> Result<(BackendType, ExecutionProvider)> {
        let (backend, provider) = match value.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (value, None),
        };

        let backend_type: BackendType = backend.parse()?;
        let provider = match (backend_type, provider) {
            (_, None) => ExecutionProvider::Auto,
            (BackendType::Tract, Some(p)) if p.eq_ignore_ascii_case("cpu") => {
                ExecutionProvider::Cpu
            },
            (BackendType::Tract, Some(p)) => {
                anyhow::bail!("Tract only supports the cpu provider, got '{p}'")
            },
            (BackendType::Onnx, Some(p)) => p.parse()?,
        };
        Ok((backend_type, provider))
    }

    /// Parse an `X,Y` point in original-image pixels
    pub(crate) fn parse_point(value: &str) -> Result<Point> {
        let (x, y) = value
            .split_once(',')
            .with_context(|| format!("Point '{value}' must be formatted as X,Y"))?;
        let x: f32 = x
            .trim()
            .parse()
            .with_context(|| format!("Invalid x coordinate in '{value}'"))?;
        let y: f32 = y
            .trim()
            .parse()
            .with_context(|| format!("Invalid y coordinate in '{value}'"))?;
        if !x.is_finite() || !y.is_finite() {
            anyhow::bail!("Point '{value}' must have finite coordinates");
        }
        Ok(Point::new(x, y))
    }

    /// Check argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.points.is_empty() && cli.points_per_side <= 0 {
            anyhow::bail!("--points-per-side must be positive when no --point is given");
        }
        if !(0.0..=1.0).contains(&cli.save_min_iou) {
            anyhow::bail!("--save-min-iou must be between 0.0 and 1.0");
        }
        Ok(())
    }
}
