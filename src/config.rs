//! Configuration types for segmentation sessions

use serde::{Deserialize, Serialize};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = crate::error::SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(crate::error::SegmentError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Per-channel image normalization applied before encoding
///
/// Two presets exist for SAM-family encoders and the right one depends on how
/// the model was exported, so it must be chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPreset {
    /// Pixels scaled to 0..1, ImageNet mean/std in the same range
    UnitRange,
    /// Raw 0..255 pixels, ImageNet mean/std scaled by 255
    PixelRange,
    /// Caller-supplied statistics; `scale_to_unit` divides pixels by 255 first
    Custom {
        mean: [f32; 3],
        std: [f32; 3],
        scale_to_unit: bool,
    },
}

impl NormalizationPreset {
    /// Channel means in the preset's pixel range
    #[must_use]
    pub fn mean(&self) -> [f32; 3] {
        match self {
            Self::UnitRange => [0.485, 0.456, 0.406],
            Self::PixelRange => [123.675, 116.28, 103.53],
            Self::Custom { mean, .. } => *mean,
        }
    }

    /// Channel standard deviations in the preset's pixel range
    #[must_use]
    pub fn std(&self) -> [f32; 3] {
        match self {
            Self::UnitRange => [0.229, 0.224, 0.225],
            Self::PixelRange => [58.395, 57.12, 57.375],
            Self::Custom { std, .. } => *std,
        }
    }

    /// Whether 8-bit pixel values are divided by 255 before normalization
    #[must_use]
    pub fn scale_to_unit(&self) -> bool {
        match self {
            Self::UnitRange => true,
            Self::PixelRange => false,
            Self::Custom { scale_to_unit, .. } => *scale_to_unit,
        }
    }

    /// Normalize one 8-bit channel value
    #[must_use]
    pub fn normalize(&self, channel: usize, value: u8) -> f32 {
        let mean = self.mean();
        let std = self.std();
        let index = channel.min(2);
        let pixel = if self.scale_to_unit() {
            f32::from(value) / 255.0
        } else {
            f32::from(value)
        };
        (pixel - mean[index]) / std[index]
    }
}

/// How the image is fitted onto the square network input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Resize both axes independently to the network size
    #[default]
    Stretch,
    /// Preserve aspect ratio and center on a padded canvas
    Letterbox,
}

/// Which decoder mask channel becomes a label's mask in interactive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaskSelection {
    /// Always take channel 0
    #[default]
    First,
    /// Take the channel with the highest predicted IoU
    HighestScore,
}

/// Configuration shared by interactive and automatic sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Raw decoder values strictly above this become foreground
    pub mask_threshold: f32,

    /// Mask channel used for interactive labels
    pub mask_selection: MaskSelection,

    /// Image fitting strategy for the encoder input
    pub resize_mode: ResizeMode,

    /// Padding color used by `ResizeMode::Letterbox` (RGB)
    pub padding_color: [u8; 3],

    /// Swap the R and B channels of the decoded image before normalization
    pub swap_rb: bool,

    /// Grid density for automatic generation
    pub points_per_side: i32,

    /// Points sent to the decoder per invocation in automatic mode
    pub points_per_batch: usize,

    /// Candidates with a predicted IoU below this are dropped in automatic mode
    pub pred_iou_thresh: f32,

    /// Candidates with fewer foreground cells than this are dropped in automatic mode
    pub min_mask_region_area: usize,

    /// Box IoU above which a lower-ranked candidate is a duplicate
    pub overlap_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            inter_threads: 0,
            mask_threshold: 0.0,
            mask_selection: MaskSelection::default(),
            resize_mode: ResizeMode::default(),
            padding_color: [0, 0, 0],
            swap_rb: false,
            points_per_side: 32,
            points_per_batch: 8,
            pred_iou_thresh: 0.88,
            min_mask_region_area: 0,
            overlap_threshold: 0.7,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sam2_prompt::SessionConfig;
    ///
    /// let config = SessionConfig::builder()
    ///     .points_per_side(16)
    ///     .pred_iou_thresh(0.8)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.points_per_side, 16);
    /// ```
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - `mask_threshold`: finite
    /// - `points_per_batch`: at least 1
    /// - `pred_iou_thresh`, `overlap_threshold`: 0.0-1.0
    /// - Thread counts: 0-256 (0 = auto-detect)
    ///
    /// # Errors
    /// - Any parameter outside its valid range
    pub fn validate(&self) -> crate::Result<()> {
        const MAX_THREADS: usize = 256;

        if !self.mask_threshold.is_finite() {
            return Err(crate::error::SegmentError::config_value_error(
                "mask threshold",
                self.mask_threshold,
                "any finite value",
                Some(0.0),
            ));
        }

        if self.points_per_batch == 0 {
            return Err(crate::error::SegmentError::config_value_error(
                "points per batch",
                self.points_per_batch,
                "1 or more",
                Some(8),
            ));
        }

        if !(0.0..=1.0).contains(&self.pred_iou_thresh) {
            return Err(crate::error::SegmentError::config_value_error(
                "predicted IoU threshold",
                self.pred_iou_thresh,
                "0.0-1.0",
                Some(0.88),
            ));
        }

        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(crate::error::SegmentError::config_value_error(
                "overlap threshold",
                self.overlap_threshold,
                "0.0-1.0",
                Some(0.7),
            ));
        }

        if self.intra_threads > MAX_THREADS {
            return Err(crate::error::SegmentError::config_value_error(
                "intra-op threads",
                self.intra_threads,
                "0-256",
                None,
            ));
        }
        if self.inter_threads > MAX_THREADS {
            return Err(crate::error::SegmentError::config_value_error(
                "inter-op threads",
                self.inter_threads,
                "0-256",
                None,
            ));
        }

        Ok(())
    }
}

/// Builder for `SessionConfig`
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn mask_threshold(mut self, threshold: f32) -> Self {
        self.config.mask_threshold = threshold;
        self
    }

    #[must_use]
    pub fn mask_selection(mut self, selection: MaskSelection) -> Self {
        self.config.mask_selection = selection;
        self
    }

    #[must_use]
    pub fn resize_mode(mut self, mode: ResizeMode) -> Self {
        self.config.resize_mode = mode;
        self
    }

    #[must_use]
    pub fn padding_color(mut self, color: [u8; 3]) -> Self {
        self.config.padding_color = color;
        self
    }

    #[must_use]
    pub fn swap_rb(mut self, swap: bool) -> Self {
        self.config.swap_rb = swap;
        self
    }

    #[must_use]
    pub fn points_per_side(mut self, points: i32) -> Self {
        self.config.points_per_side = points;
        self
    }

    #[must_use]
    pub fn points_per_batch(mut self, points: usize) -> Self {
        self.config.points_per_batch = points;
        self
    }

    #[must_use]
    pub fn pred_iou_thresh(mut self, threshold: f32) -> Self {
        self.config.pred_iou_thresh = threshold;
        self
    }

    #[must_use]
    pub fn min_mask_region_area(mut self, area: usize) -> Self {
        self.config.min_mask_region_area = area;
        self
    }

    #[must_use]
    pub fn overlap_threshold(mut self, threshold: f32) -> Self {
        self.config.overlap_threshold = threshold;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any parameter rejected by [`SessionConfig::validate`]
    pub fn build(self) -> crate::Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.points_per_batch, 8);
        assert!((config.overlap_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.pred_iou_thresh - 0.88).abs() < f32::EPSILON);
        assert_eq!(config.mask_threshold, 0.0);
    }

    #[test]
    fn test_builder_rejects_out_of_range_values() {
        let err = SessionConfig::builder()
            .overlap_threshold(1.5)
            .build()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("overlap threshold"));
        assert!(message.contains("1.5"));

        assert!(SessionConfig::builder().points_per_batch(0).build().is_err());
        assert!(SessionConfig::builder()
            .pred_iou_thresh(-0.1)
            .build()
            .is_err());
        assert!(SessionConfig::builder()
            .mask_threshold(f32::NAN)
            .build()
            .is_err());
        assert!(SessionConfig::builder().intra_threads(1000).build().is_err());
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = SessionConfig::builder()
            .execution_provider(ExecutionProvider::Cpu)
            .mask_threshold(0.5)
            .mask_selection(MaskSelection::HighestScore)
            .resize_mode(ResizeMode::Letterbox)
            .padding_color([10, 20, 30])
            .swap_rb(true)
            .points_per_side(4)
            .points_per_batch(16)
            .min_mask_region_area(100)
            .build()
            .unwrap();

        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.mask_selection, MaskSelection::HighestScore);
        assert_eq!(config.resize_mode, ResizeMode::Letterbox);
        assert_eq!(config.padding_color, [10, 20, 30]);
        assert!(config.swap_rb);
        assert_eq!(config.points_per_side, 4);
        assert_eq!(config.points_per_batch, 16);
        assert_eq!(config.min_mask_region_area, 100);
    }

    #[test]
    fn test_normalization_presets_agree() {
        // Both presets describe the same statistics in different pixel ranges
        let unit = NormalizationPreset::UnitRange;
        let pixel = NormalizationPreset::PixelRange;
        for channel in 0..3 {
            for value in [0u8, 64, 128, 255] {
                let a = unit.normalize(channel, value);
                let b = pixel.normalize(channel, value);
                assert!((a - b).abs() < 1e-3, "channel {channel} value {value}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_custom_preset() {
        let preset = NormalizationPreset::Custom {
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
            scale_to_unit: true,
        };
        assert!((preset.normalize(0, 255) - 1.0).abs() < 1e-6);
        assert!((preset.normalize(1, 0) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preset_serde_names() {
        let json = serde_json::to_string(&NormalizationPreset::PixelRange).unwrap();
        assert_eq!(json, "\"pixel_range\"");
        let parsed: NormalizationPreset = serde_json::from_str("\"unit_range\"").unwrap();
        assert_eq!(parsed, NormalizationPreset::UnitRange);
    }

    #[test]
    fn test_execution_provider_parse_and_display() {
        assert_eq!("CUDA".parse::<ExecutionProvider>().unwrap(), ExecutionProvider::Cuda);
        assert_eq!(ExecutionProvider::CoreMl.to_string(), "coreml");
        assert!("tpu".parse::<ExecutionProvider>().is_err());
    }
}
