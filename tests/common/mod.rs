//! Hand-written engines shared by the integration tests
//!
//! The encoder returns constant embeddings. The decoder paints a square of
//! positive logits around the first prompt point of every batch item, so mask
//! placement can be checked without a real network.

#![allow(dead_code)]

use ndarray::{ArrayD, IxDyn};
use sam2_prompt::{
    InferenceEngine, ModelManifest, ModelMetadata, ModelPair, NamedTensors, NormalizationPreset,
    Result, SegmentError, TensorNameOverrides,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const NET_SIZE: u32 = 32;
pub const MASK_SIZE: usize = 8;

/// Tensor names used by an exported model pair
#[derive(Debug, Clone)]
pub struct Naming {
    pub image_input: &'static str,
    pub image_embed: &'static str,
    pub high_res: Vec<&'static str>,
    pub masks: &'static str,
    pub scores: &'static str,
}

impl Naming {
    pub fn standard() -> Self {
        Self {
            image_input: "image",
            image_embed: "image_embed",
            high_res: vec!["high_res_feats_0", "high_res_feats_1"],
            masks: "masks",
            scores: "iou_predictions",
        }
    }

    pub fn alternate() -> Self {
        Self {
            image_input: "input_image",
            image_embed: "image_embeddings",
            high_res: vec!["hidden_states_0", "hidden_states_1"],
            masks: "low_res_masks",
            scores: "iou_scores",
        }
    }
}

fn metadata(inputs: Vec<String>, outputs: Vec<String>, shapes: HashMap<String, Vec<i64>>) -> ModelMetadata {
    ModelMetadata {
        input_names: inputs,
        output_names: outputs,
        input_shapes: shapes,
    }
}

pub struct ConstantEncoder {
    metadata: ModelMetadata,
    naming: Naming,
    pub calls: Arc<Mutex<usize>>,
    fail: bool,
}

impl ConstantEncoder {
    pub fn new(naming: Naming) -> Self {
        let mut shapes = HashMap::new();
        shapes.insert(
            naming.image_input.to_string(),
            vec![1, 3, i64::from(NET_SIZE), i64::from(NET_SIZE)],
        );
        let mut outputs = naming
            .high_res
            .iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>();
        outputs.push(naming.image_embed.to_string());
        Self {
            metadata: metadata(vec![naming.image_input.to_string()], outputs, shapes),
            naming,
            calls: Arc::new(Mutex::new(0)),
            fail: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl InferenceEngine for ConstantEncoder {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(SegmentError::inference("encoder failed"));
        }
        let image = inputs
            .get(self.naming.image_input)
            .ok_or_else(|| SegmentError::inference("image input missing"))?;
        assert_eq!(image.shape(), &[1, 3, NET_SIZE as usize, NET_SIZE as usize]);

        let mut outputs = NamedTensors::new().with(
            self.naming.image_embed,
            ArrayD::from_elem(IxDyn(&[1, 8, 2, 2]), 0.25),
        );
        for (index, name) in self.naming.high_res.iter().enumerate() {
            let side = 8 >> index;
            outputs.insert(*name, ArrayD::zeros(IxDyn(&[1, 4, side, side])));
        }
        Ok(outputs)
    }
}

pub type CallRecord = Arc<Mutex<Vec<DecodeCall>>>;

/// Record of one decoder call
#[derive(Debug, Clone)]
pub struct DecodeCall {
    pub coords: ArrayD<f32>,
    pub labels: ArrayD<f32>,
}

pub struct SquareDecoder {
    metadata: ModelMetadata,
    naming: Naming,
    half_extent: usize,
    channel_scores: Vec<f32>,
    pub calls: CallRecord,
}

impl SquareDecoder {
    pub fn new(naming: Naming, half_extent: usize, channel_scores: Vec<f32>) -> Self {
        let mut inputs = vec![naming.image_embed.to_string()];
        inputs.extend(naming.high_res.iter().map(|s| (*s).to_string()));
        inputs.extend(
            ["point_coords", "point_labels", "mask_input", "has_mask_input"]
                .iter()
                .map(|s| (*s).to_string()),
        );
        Self {
            metadata: metadata(
                inputs,
                vec![naming.masks.to_string(), naming.scores.to_string()],
                HashMap::new(),
            ),
            naming,
            half_extent,
            channel_scores,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl InferenceEngine for SquareDecoder {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        let coords = inputs
            .get("point_coords")
            .cloned()
            .ok_or_else(|| SegmentError::inference("point_coords missing"))?;
        let labels = inputs
            .get("point_labels")
            .cloned()
            .ok_or_else(|| SegmentError::inference("point_labels missing"))?;
        for name in &self.metadata.input_names {
            if inputs.get(name).is_none() {
                return Err(SegmentError::inference(format!("{name} missing")));
            }
        }

        let batch = coords.shape()[0];
        let channels = self.channel_scores.len();
        let scale = MASK_SIZE as f32 / NET_SIZE as f32;
        let mut masks = ArrayD::from_elem(IxDyn(&[batch, channels, MASK_SIZE, MASK_SIZE]), -4.0_f32);
        let mut scores = ArrayD::zeros(IxDyn(&[batch, channels]));

        for b in 0..batch {
            let cx = ((coords[[b, 0, 0]] * scale) as usize).min(MASK_SIZE - 1);
            let cy = ((coords[[b, 0, 1]] * scale) as usize).min(MASK_SIZE - 1);
            for (c, &score) in self.channel_scores.iter().enumerate() {
                scores[[b, c]] = score;
                let extent = self.half_extent + c;
                for y in cy.saturating_sub(extent)..=(cy + extent).min(MASK_SIZE - 1) {
                    for x in cx.saturating_sub(extent)..=(cx + extent).min(MASK_SIZE - 1) {
                        masks[[b, c, y, x]] = 4.0;
                    }
                }
            }
        }

        self.calls.lock().unwrap().push(DecodeCall { coords, labels });
        Ok(NamedTensors::new()
            .with(self.naming.masks, masks)
            .with(self.naming.scores, scores))
    }

    fn engine_name(&self) -> &'static str {
        "square"
    }
}

/// Route `log` output through the test harness; safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn manifest(input_size: Option<[u32; 2]>) -> ModelManifest {
    ModelManifest {
        name: "square-test".to_string(),
        encoder: "encoder.onnx".to_string(),
        decoder: "decoder.onnx".to_string(),
        input_size,
        normalization: NormalizationPreset::UnitRange,
        tensor_names: TensorNameOverrides::new(),
    }
}

/// Model pair with the standard names, returning the decoder call record
pub fn model_pair(
    half_extent: usize,
    channel_scores: Vec<f32>,
) -> (ModelPair, CallRecord) {
    let decoder = SquareDecoder::new(Naming::standard(), half_extent, channel_scores);
    let calls = Arc::clone(&decoder.calls);
    let pair = ModelPair::from_engines(
        manifest(None),
        Box::new(ConstantEncoder::new(Naming::standard())),
        Box::new(decoder),
    );
    (pair, calls)
}
