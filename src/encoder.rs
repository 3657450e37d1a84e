//! Image encoder: preprocessing plus the one-shot encoder call

use crate::{
    config::{NormalizationPreset, ResizeMode},
    coordinates::CoordinateMapper,
    error::{Result, SegmentError},
    inference::InferenceEngine,
    tensor_io::{EmbeddingBundle, EncoderSignature, ModelMetadata, NamedTensors, TensorNameOverrides},
    types::{ImageSize, Point},
    utils::{ImagePreprocessor, LetterboxTransform, PreprocessingOptions},
};
use image::DynamicImage;
use instant::Instant;
use tracing::{debug, info, instrument};

/// Result of encoding one image
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub embeddings: EmbeddingBundle,
    pub original_size: ImageSize,
    pub network_size: ImageSize,
    /// Present when the image was letterboxed onto the network canvas
    pub letterbox: Option<LetterboxTransform>,
}

impl EncodedImage {
    /// Original-image point onto the canvas the image was encoded on
    #[must_use]
    pub fn to_network_space(&self, point: Point) -> Point {
        match &self.letterbox {
            Some(transform) => transform.to_network(point),
            None => self.mapper().to_network_space(point),
        }
    }

    /// Network-canvas point back to original-image pixels
    #[must_use]
    pub fn to_original_space(&self, point: Point) -> Point {
        match &self.letterbox {
            Some(transform) => transform.to_original(point),
            None => self.mapper().to_original_space(point),
        }
    }

    fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.original_size, self.network_size)
    }
}

/// Encoder engine with its resolved signature and preprocessing settings
pub struct ImageEncoder {
    engine: Box<dyn InferenceEngine>,
    signature: EncoderSignature,
    options: PreprocessingOptions,
}

impl std::fmt::Debug for ImageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEncoder")
            .field("engine", &self.engine.engine_name())
            .field("signature", &self.signature)
            .field("options", &self.options)
            .finish()
    }
}

impl ImageEncoder {
    /// Wrap an encoder engine, resolving its signature and network size once
    ///
    /// `input_size` overrides the size read from the engine's declared input
    /// shape; one of the two must be available.
    ///
    /// # Errors
    /// - `MissingTensor` when the encoder metadata does not satisfy the contract
    /// - `InvalidConfig` when the network input size cannot be determined
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        overrides: &TensorNameOverrides,
        input_size: Option<ImageSize>,
        normalization: NormalizationPreset,
    ) -> Result<Self> {
        let signature = EncoderSignature::resolve(engine.metadata(), overrides)?;
        let network_size = match input_size {
            Some(size) => size,
            None => network_size_from_metadata(engine.metadata(), &signature.image_input)?,
        };
        debug!(?signature, %network_size, "Resolved encoder signature");

        Ok(Self {
            engine,
            signature,
            options: PreprocessingOptions::new(network_size, normalization),
        })
    }

    /// Set resize mode, padding color and channel order
    #[must_use]
    pub fn with_layout(mut self, resize_mode: ResizeMode, padding_color: [u8; 3], swap_rb: bool) -> Self {
        self.options.resize_mode = resize_mode;
        self.options.padding_color = padding_color;
        self.options.swap_rb = swap_rb;
        self
    }

    #[must_use]
    pub fn signature(&self) -> &EncoderSignature {
        &self.signature
    }

    #[must_use]
    pub fn network_size(&self) -> ImageSize {
        self.options.target
    }

    #[must_use]
    pub fn resize_mode(&self) -> ResizeMode {
        self.options.resize_mode
    }

    /// Preprocess and encode one image
    ///
    /// # Errors
    /// - `Processing` for empty images
    /// - Engine failures, propagated unchanged
    /// - `MissingTensor` when the engine omits a resolved output
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn encode(&mut self, image: &DynamicImage) -> Result<EncodedImage> {
        let start = Instant::now();
        let prepared = ImagePreprocessor::preprocess_image(image, &self.options)?;
        let preprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

        let inputs = NamedTensors::new().with(
            self.signature.image_input.clone(),
            prepared.tensor.into_dyn(),
        );
        let infer_start = Instant::now();
        let outputs = self.engine.infer(inputs)?;
        let infer_ms = infer_start.elapsed().as_secs_f64() * 1000.0;

        let embeddings = EmbeddingBundle::from_outputs(outputs, &self.signature)?;
        info!(
            preprocess_ms,
            infer_ms,
            high_res_feats = embeddings.high_res_feats.len(),
            "Encoded image"
        );

        Ok(EncodedImage {
            embeddings,
            original_size: prepared.original_size,
            network_size: self.options.target,
            letterbox: prepared.letterbox,
        })
    }
}

/// Read `(H, W)` from a static `(1, 3, H, W)` input shape
fn network_size_from_metadata(metadata: &ModelMetadata, input: &str) -> Result<ImageSize> {
    let shape = metadata.input_shapes.get(input);
    match shape.map(Vec::as_slice) {
        Some(&[_, _, height, width]) if height > 0 && width > 0 => {
            Ok(ImageSize::new(positive_dim(width)?, positive_dim(height)?))
        },
        _ => Err(SegmentError::invalid_config(format!(
            "Encoder input '{input}' has no static spatial size ({shape:?}); set input_size in model.json"
        ))),
    }
}

fn positive_dim(dim: i64) -> Result<u32> {
    u32::try_from(dim)
        .map_err(|_| SegmentError::invalid_config(format!("Encoder input dimension {dim} out of range")))
}
