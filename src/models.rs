//! Model manifest and encoder/decoder model pair
//!
//! A model directory holds the two ONNX files and a `model.json` manifest:
//!
//! ```json
//! {
//!   "name": "sam2-hiera-tiny",
//!   "encoder": "encoder.onnx",
//!   "decoder": "decoder.onnx",
//!   "input_size": [1024, 1024],
//!   "normalization": "unit_range",
//!   "tensor_names": { "image_embed": "image_embeddings" }
//! }
//! ```
//!
//! `normalization` is required: the right preset depends on how the encoder
//! was exported and cannot be inferred from the graph.

use crate::{
    config::{NormalizationPreset, SessionConfig},
    error::{Result, SegmentError},
    inference::{BackendFactory, BackendType, DefaultBackendFactory, InferenceEngine},
    tensor_io::TensorNameOverrides,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest file name inside a model directory
pub const MANIFEST_FILE: &str = "model.json";

/// Contents of `model.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    /// Encoder file, relative to the model directory
    pub encoder: String,
    /// Decoder file, relative to the model directory
    pub decoder: String,
    /// Network input `[width, height]`; read from the encoder input shape when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<[u32; 2]>,
    pub normalization: NormalizationPreset,
    /// Role → tensor name overrides for non-standard exports
    #[serde(default, skip_serializing_if = "TensorNameOverrides::is_empty")]
    pub tensor_names: TensorNameOverrides,
}

impl ModelManifest {
    /// Parse and validate a manifest from JSON text
    ///
    /// # Errors
    /// - `InvalidConfig` for malformed JSON, missing fields or invalid values
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json).map_err(|e| {
            SegmentError::invalid_config(format!("Failed to parse {MANIFEST_FILE}: {e}"))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read `model.json` from a model directory
    ///
    /// # Errors
    /// - `Model` when the directory or manifest file does not exist
    /// - `InvalidConfig` for malformed or invalid manifests
    pub fn load<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        if !model_dir.is_dir() {
            return Err(SegmentError::model_error_with_context(
                "open",
                model_dir,
                "not a directory",
                &["pass the directory containing model.json"],
            ));
        }

        let manifest_path = model_dir.join(MANIFEST_FILE);
        let json = fs::read_to_string(&manifest_path).map_err(|e| {
            SegmentError::model_error_with_context(
                "read manifest for",
                model_dir,
                &e.to_string(),
                &["create a model.json next to the ONNX files"],
            )
        })?;
        Self::from_json(&json)
    }

    /// Check that required fields are present and values are usable
    ///
    /// # Errors
    /// - `InvalidConfig` describing the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SegmentError::invalid_config("Model name cannot be empty"));
        }
        if self.encoder.trim().is_empty() || self.decoder.trim().is_empty() {
            return Err(SegmentError::invalid_config(
                "Both encoder and decoder file names are required",
            ));
        }
        if let Some([width, height]) = self.input_size {
            if width == 0 || height == 0 || width % 4 != 0 || height % 4 != 0 {
                return Err(SegmentError::invalid_config(format!(
                    "input_size must be positive multiples of 4, got {width}x{height}"
                )));
            }
        }
        if let NormalizationPreset::Custom { std, .. } = self.normalization {
            if std.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
                return Err(SegmentError::invalid_config(format!(
                    "Normalization std must be positive, got {std:?}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn encoder_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.encoder)
    }

    #[must_use]
    pub fn decoder_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.decoder)
    }
}

/// Loaded encoder and decoder engines with their manifest
pub struct ModelPair {
    pub manifest: ModelManifest,
    pub encoder: Box<dyn InferenceEngine>,
    pub decoder: Box<dyn InferenceEngine>,
}

impl std::fmt::Debug for ModelPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPair")
            .field("manifest", &self.manifest)
            .field("encoder", &self.encoder.engine_name())
            .field("decoder", &self.decoder.engine_name())
            .finish()
    }
}

impl ModelPair {
    /// Pair caller-supplied engines with a manifest
    #[must_use]
    pub fn from_engines(
        manifest: ModelManifest,
        encoder: Box<dyn InferenceEngine>,
        decoder: Box<dyn InferenceEngine>,
    ) -> Self {
        Self {
            manifest,
            encoder,
            decoder,
        }
    }

    /// Load both models from a directory with the compiled-in engines
    ///
    /// # Errors
    /// - Manifest errors, see [`ModelManifest::load`]
    /// - Engine creation failures for either model
    pub fn load<P: AsRef<Path>>(
        model_dir: P,
        backend_type: BackendType,
        config: &SessionConfig,
    ) -> Result<Self> {
        Self::load_with_factory(model_dir, backend_type, config, &DefaultBackendFactory)
    }

    /// Load both models through a custom engine factory
    ///
    /// # Errors
    /// - Manifest errors, see [`ModelManifest::load`]
    /// - Engine creation failures for either model
    pub fn load_with_factory<P: AsRef<Path>>(
        model_dir: P,
        backend_type: BackendType,
        config: &SessionConfig,
        factory: &dyn BackendFactory,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let manifest = ModelManifest::load(model_dir)?;
        log::info!(
            "Loading model '{}' from {} with {backend_type} backend",
            manifest.name,
            model_dir.display()
        );

        let encoder =
            factory.create_engine(backend_type, &manifest.encoder_path(model_dir), config)?;
        let decoder =
            factory.create_engine(backend_type, &manifest.decoder_path(model_dir), config)?;

        Ok(Self {
            manifest,
            encoder,
            decoder,
        })
    }
}
