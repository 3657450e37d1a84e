//! Tract engine for SAM2 encoder and decoder models
//!
//! Pure Rust inference with no native runtime. Tract runs inputs
//! positionally, so named inputs are reordered to the graph's input order
//! before each call.

use crate::config::SessionConfig;
use crate::error::{Result, SegmentError};
use crate::inference::InferenceEngine;
use crate::tensor_io::{ModelMetadata, NamedTensors};
use instant::Instant;
use log;
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract engine for one model file
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    metadata: ModelMetadata,
    model_name: String,
}

impl TractBackend {
    /// List Tract execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
    }

    /// Load and optimize a model file
    ///
    /// Execution provider and thread settings do not apply to Tract.
    ///
    /// # Errors
    /// - Model file missing or not a valid ONNX graph
    /// - Graph optimization failures (unsupported operators, unresolved shapes)
    pub fn load(model_path: &Path, _config: &SessionConfig) -> Result<Self> {
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

        let inference_model = onnx().model_for_path(model_path).map_err(|e| {
            SegmentError::model_error_with_context("load", model_path, &e.to_string(), &[])
        })?;
        let metadata = Self::read_metadata(&inference_model)?;

        let model = inference_model
            .into_optimized()
            .map_err(|e| SegmentError::model(format!("Failed to optimize {model_name}: {e}")))?
            .into_runnable()
            .map_err(|e| {
                SegmentError::model(format!("Failed to create runnable model {model_name}: {e}"))
            })?;

        log::info!(
            "Tract backend loaded {model_name} in {:.0}ms",
            load_start.elapsed().as_secs_f64() * 1000.0
        );
        log::debug!(
            "  inputs {:?}, outputs {:?}",
            metadata.input_names,
            metadata.output_names
        );

        Ok(Self {
            model,
            metadata,
            model_name,
        })
    }

    fn read_metadata(model: &InferenceModel) -> Result<ModelMetadata> {
        let outlet_name = |outlet: &OutletId| model.node(outlet.node).name.clone();

        let input_outlets = model
            .input_outlets()
            .map_err(|e| SegmentError::model(format!("Failed to read model inputs: {e}")))?;
        let output_outlets = model
            .output_outlets()
            .map_err(|e| SegmentError::model(format!("Failed to read model outputs: {e}")))?;

        let mut input_shapes = HashMap::new();
        for outlet in input_outlets {
            if let Ok(fact) = model.outlet_fact(*outlet) {
                if let Some(shape) = fact.shape.concretize() {
                    let dims = shape
                        .iter()
                        .map(|d| d.to_i64().unwrap_or(-1))
                        .collect::<Vec<_>>();
                    input_shapes.insert(outlet_name(outlet), dims);
                }
            }
        }

        Ok(ModelMetadata {
            input_names: input_outlets.iter().map(outlet_name).collect(),
            output_names: output_outlets
                .iter()
                .map(|outlet| {
                    model
                        .outlet_label(*outlet)
                        .map_or_else(|| outlet_name(outlet), ToString::to_string)
                })
                .collect(),
            input_shapes,
        })
    }
}

impl InferenceEngine for TractBackend {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        let inference_start = Instant::now();
        let engine_error = |message: String| {
            SegmentError::inference_error_with_engine("tract", &self.model_name, &message)
        };

        let mut ordered: TVec<TValue> = tvec![];
        for name in &self.metadata.input_names {
            let tensor = inputs
                .get(name)
                .ok_or_else(|| engine_error(format!("input '{name}' not supplied")))?;
            let data: Vec<f32> = tensor.iter().copied().collect();
            let value = Tensor::from_shape(tensor.shape(), &data)
                .map_err(|e| engine_error(format!("failed to convert input '{name}': {e}")))?;
            ordered.push(value.into());
        }

        let outputs = self
            .model
            .run(ordered)
            .map_err(|e| engine_error(e.to_string()))?;

        let mut result = NamedTensors::new();
        for (name, value) in self.metadata.output_names.iter().zip(outputs) {
            let tensor = value.into_tensor();
            let shape = tensor.shape().to_vec();
            let data = tensor
                .as_slice::<f32>()
                .map_err(|e| engine_error(format!("failed to read output '{name}': {e}")))?
                .to_vec();
            let array = ArrayD::from_shape_vec(IxDyn(&shape), data)
                .map_err(|e| engine_error(format!("failed to reshape output '{name}': {e}")))?;
            result.insert(name.clone(), array);
        }

        log::debug!(
            "Tract {} inference: {:.2}ms",
            self.model_name,
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn engine_name(&self) -> &'static str {
        "tract"
    }
}
