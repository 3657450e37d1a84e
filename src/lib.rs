#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # sam2-prompt
//!
//! Prompt-to-mask orchestration for two-stage segmentation networks in the
//! SAM2 family: a one-shot image encoder and a lightweight mask decoder that
//! is invoked once per prompt set.
//!
//! The crate handles everything between the two models and the caller:
//! coordinate mapping between image and network space, per-label prompt
//! accumulation with eager mask recomputation, batched point-grid generation,
//! mask binarization with bounding box and area extraction, and greedy
//! box-level deduplication.
//!
//! ## Features
//!
//! - **Interactive sessions**: any number of labels, each with positive and
//!   negative points and an optional box, recomputed on every change
//! - **Automatic sessions**: point grids or explicit points decoded in
//!   batches, filtered by predicted IoU and area, then deduplicated
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (pure Rust)
//! - **Strict tensor contract**: tensor names resolved once per model, with
//!   documented alternates and per-model overrides from `model.json`
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sam2_prompt::{BackendType, InteractiveSession, ModelPair, Point, SessionConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = SessionConfig::default();
//! let models = ModelPair::load("models/sam2-hiera-tiny", BackendType::Onnx, &config)?;
//! let mut session = InteractiveSession::new(models, config)?;
//!
//! session.set_image(&image::open("photo.jpg")?)?;
//! session.add_point(1, Point::new(420.0, 310.0), true)?;
//! let masks = session.set_box(1, Point::new(300.0, 200.0), Point::new(560.0, 430.0))?;
//! masks[&1].save_png("label_1.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Automatic generation
//!
//! ```rust,no_run
//! use sam2_prompt::{AutomaticSession, BackendType, ModelPair, SessionConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = SessionConfig::builder().pred_iou_thresh(0.85).build()?;
//! let models = ModelPair::load("models/sam2-hiera-tiny", BackendType::Onnx, &config)?;
//! let mut session = AutomaticSession::new(models, config)?;
//!
//! let image = image::open("photo.jpg")?;
//! for result in session.generate(&image, 16)? {
//!     println!("{:?} iou={:.2} area={}", result.bounding_box, result.predicted_iou, result.area);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract`: pure Rust backend
//! - `cli` (default): command-line interface and progress bar
//! - `tracing-json`: JSON log output for the CLI
//!
//! Custom engines can be plugged in by implementing [`InferenceEngine`] and
//! building a [`ModelPair`] with [`ModelPair::from_engines`].

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod coordinates;
pub mod decoder;
pub mod dedup;
pub mod encoder;
pub mod error;
pub mod grid;
pub mod inference;
pub mod models;
pub mod postprocess;
pub mod progress;
pub mod prompt;
pub mod session;
pub mod tensor_io;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{
    ExecutionProvider, MaskSelection, NormalizationPreset, ResizeMode, SessionConfig,
    SessionConfigBuilder,
};
pub use coordinates::{scale_to_original, to_network_space, to_original_space, CoordinateMapper};
pub use decoder::{DecoderOutput, MaskDecoder};
pub use dedup::deduplicate;
pub use encoder::{EncodedImage, ImageEncoder};
pub use error::{Result, SegmentError};
pub use grid::generate_point_grid;
pub use inference::{BackendFactory, BackendType, DefaultBackendFactory, InferenceEngine};
pub use models::{ModelManifest, ModelPair, MANIFEST_FILE};
pub use postprocess::{binarize, MaskPostProcessor};
pub use progress::{
    ConsoleProgressReporter, GenerationStats, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use prompt::{LabelPrompts, MergedPrompts, PromptLabel};
pub use session::{AutomaticSession, InteractiveSession};
pub use tensor_io::{
    roles, DecoderSignature, EmbeddingBundle, EncoderSignature, ModelMetadata, NamedTensors,
    TensorNameOverrides,
};
pub use types::{
    BinaryMask, BoundingBox, ImageSize, LabelId, MaskMap, MaskStatistics, Point,
    SegmentationResult,
};
pub use utils::{ImagePreprocessor, LetterboxTransform, PreprocessingOptions};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};
