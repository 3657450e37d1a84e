//! Inference engine abstraction and factory

use crate::{
    config::SessionConfig,
    error::{Result, SegmentError},
    tensor_io::{ModelMetadata, NamedTensors},
};
use std::path::Path;

/// An opaque `infer(inputs) -> outputs` engine over named `f32` tensors
///
/// One engine wraps one model file. Calls are blocking; an error from
/// [`InferenceEngine::infer`] is fatal for the current operation and is never
/// retried by the sessions.
pub trait InferenceEngine {
    /// Input/output names the loaded model exposes
    fn metadata(&self) -> &ModelMetadata;

    /// Run the model on named inputs
    ///
    /// # Errors
    /// - Missing or mis-shaped input tensors
    /// - Failures inside the underlying runtime
    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors>;

    /// Short engine identifier used in logs and error messages
    fn engine_name(&self) -> &'static str {
        "custom"
    }
}

impl<T: InferenceEngine + ?Sized> InferenceEngine for Box<T> {
    fn metadata(&self) -> &ModelMetadata {
        (**self).metadata()
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        (**self).infer(inputs)
    }

    fn engine_name(&self) -> &'static str {
        (**self).engine_name()
    }
}

/// Backend type enumeration for runtime selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" | "ort" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            other => Err(SegmentError::invalid_config(format!(
                "Unknown backend '{other}'. Valid backends: onnx, tract"
            ))),
        }
    }
}

/// Factory trait for creating inference engines from model files
pub trait BackendFactory: Send + Sync {
    /// Create an engine of the specified type for one model file
    ///
    /// # Errors
    ///
    /// Returns `SegmentError` for:
    /// - Backend types not compiled into this build
    /// - Model loading errors
    fn create_engine(
        &self,
        backend_type: BackendType,
        model_path: &Path,
        config: &SessionConfig,
    ) -> Result<Box<dyn InferenceEngine>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the engines compiled into this build
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    #[allow(unused_variables)]
    fn create_engine(
        &self,
        backend_type: BackendType,
        model_path: &Path,
        config: &SessionConfig,
    ) -> Result<Box<dyn InferenceEngine>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::load(
                model_path, config,
            )?)),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::load(
                model_path, config,
            )?)),
            #[allow(unreachable_patterns)]
            other => Err(SegmentError::invalid_config(format!(
                "{other} backend not compiled in. Rebuild with the '{other}' feature."
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}
