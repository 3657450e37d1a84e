//! ONNX Runtime engine for SAM2 encoder and decoder models
//!
//! One [`OnnxBackend`] wraps one ONNX session. Inputs are passed by name so
//! the same engine type serves both halves of the model pair; the names come
//! from the resolved signatures in [`crate::tensor_io`].

use crate::config::{ExecutionProvider, SessionConfig};
use crate::error::{Result, SegmentError};
use crate::inference::InferenceEngine;
use crate::tensor_io::{ModelMetadata, NamedTensors};
use instant::Instant;
use log;
use ndarray::ArrayD;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

/// ONNX Runtime engine for one model file
#[derive(Debug)]
pub struct OnnxBackend {
    session: Session,
    metadata: ModelMetadata,
    model_name: String,
}

impl OnnxBackend {
    /// List ONNX Runtime execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("Platform: {os}/{arch}", os = std::env::consts::OS, arch = std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Load a model file into a new ONNX Runtime session
    ///
    /// # Errors
    /// - Model file missing or not a valid ONNX graph
    /// - Session builder failures (provider registration, threading)
    pub fn load(model_path: &Path, config: &SessionConfig) -> Result<Self> {
        let load_start = Instant::now();
        let model_name = model_path
            .file_name()
            .map_or_else(|| model_path.display().to_string(), |n| n.to_string_lossy().into_owned());

        if !model_path.exists() {
            return Err(SegmentError::model_error_with_context(
                "load",
                model_path,
                "file not found",
                &["check the model directory", "verify model.json file names"],
            ));
        }

        let mut builder = Session::builder()
            .map_err(|e| SegmentError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| SegmentError::model(format!("Failed to set optimization level: {e}")))?;

        let providers = Self::select_providers(config.execution_provider);
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                SegmentError::model(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let (intra_threads, inter_threads) = Self::thread_counts(config);
        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| SegmentError::model(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| SegmentError::model(format!("Failed to set inter threads: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                SegmentError::model_error_with_context("load", model_path, &e.to_string(), &[])
            })?;

        let metadata = ModelMetadata {
            input_names: session.inputs.iter().map(|i| i.name.clone()).collect(),
            output_names: session.outputs.iter().map(|o| o.name.clone()).collect(),
            input_shapes: session
                .inputs
                .iter()
                .filter_map(|i| {
                    i.input_type
                        .tensor_shape()
                        .map(|shape| (i.name.clone(), shape.iter().copied().collect::<Vec<i64>>()))
                })
                .collect::<HashMap<_, _>>(),
        };

        log::debug!(
            "Session for {model_name}: inputs {:?}, outputs {:?}, threads {intra_threads}/{inter_threads}",
            metadata.input_names,
            metadata.output_names
        );
        log::info!(
            "Loaded {model_name} in {:.0}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session,
            metadata,
            model_name,
        })
    }

    fn select_providers(provider: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        match provider {
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
                providers
            },
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Cuda if cuda_available => {
                log::info!("Using CUDA execution provider");
                vec![cuda.build()]
            },
            ExecutionProvider::CoreMl if coreml_available => {
                log::info!("Using CoreML execution provider");
                vec![coreml.build()]
            },
            requested => {
                log::warn!("{requested} execution provider requested but not available, falling back to CPU");
                Vec::new()
            },
        }
    }

    fn thread_counts(config: &SessionConfig) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            cores
        };
        let inter = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (cores / 4).max(1)
        };
        (intra, inter)
    }
}

impl InferenceEngine for OnnxBackend {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        let inference_start = Instant::now();

        let mut session_inputs: Vec<(Cow<'_, str>, ort::session::SessionInputValue<'_>)> =
            Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            log::trace!("  input {name}: {:?}", tensor.shape());
            let value = Tensor::from_array(tensor).map_err(|e| {
                SegmentError::inference_error_with_engine(
                    "onnx",
                    &self.model_name,
                    &format!("failed to convert input '{name}': {e}"),
                )
            })?;
            session_inputs.push((Cow::Owned(name), value.into()));
        }

        let outputs = self.session.run(session_inputs).map_err(|e| {
            SegmentError::inference_error_with_engine("onnx", &self.model_name, &e.to_string())
        })?;

        let mut result = NamedTensors::new();
        for name in &self.metadata.output_names {
            let Some(value) = outputs.get(name.as_str()) else {
                continue;
            };
            let array: ArrayD<f32> = value
                .try_extract_array::<f32>()
                .map_err(|e| {
                    SegmentError::inference_error_with_engine(
                        "onnx",
                        &self.model_name,
                        &format!("failed to extract output '{name}': {e}"),
                    )
                })?
                .to_owned()
                .into_dyn();
            result.insert(name.clone(), array);
        }

        log::debug!(
            "{} inference: {:.2}ms",
            self.model_name,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn engine_name(&self) -> &'static str {
        "onnx"
    }
}
