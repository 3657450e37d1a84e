//! Test utilities and mock engines for testing inference orchestration
//!
//! [`MockEngine`] implements [`InferenceEngine`] without model files. It
//! records every input set it receives so tests can assert on what the
//! sessions actually sent, and can be configured to fail.

use crate::{
    error::{Result, SegmentError},
    inference::InferenceEngine,
    tensor_io::{ModelMetadata, NamedTensors},
};
use ndarray::{ArrayD, IxDyn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared record of the inputs a mock engine was called with
pub type CallLog = Arc<Mutex<Vec<NamedTensors>>>;

type Responder = Box<dyn FnMut(&NamedTensors) -> Result<NamedTensors>>;

/// Mock engine with fixed or computed outputs
pub struct MockEngine {
    metadata: ModelMetadata,
    outputs: NamedTensors,
    responder: Option<Responder>,
    calls: CallLog,
    should_fail: bool,
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("metadata", &self.metadata)
            .field("should_fail", &self.should_fail)
            .finish_non_exhaustive()
    }
}

impl MockEngine {
    /// Create a mock with the given input and output names
    #[must_use]
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            metadata: ModelMetadata {
                input_names: inputs.iter().map(|s| (*s).to_string()).collect(),
                output_names: outputs.iter().map(|s| (*s).to_string()).collect(),
                input_shapes: HashMap::new(),
            },
            outputs: NamedTensors::new(),
            responder: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    /// Return this tensor for `name` on every call
    #[must_use]
    pub fn with_output(mut self, name: &str, tensor: ArrayD<f32>) -> Self {
        self.outputs.insert(name, tensor);
        self
    }

    /// Compute outputs from the inputs of each call
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&NamedTensors) -> Result<NamedTensors> + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Make every call fail with an inference error
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Handle on the call record, usable after the engine has been moved
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

impl InferenceEngine for MockEngine {
    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn infer(&mut self, inputs: NamedTensors) -> Result<NamedTensors> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(inputs.clone());
        }

        if self.should_fail {
            return Err(SegmentError::inference("Mock engine inference failed"));
        }

        match self.responder.as_mut() {
            Some(responder) => responder(&inputs),
            None => Ok(self.outputs.clone()),
        }
    }

    fn engine_name(&self) -> &'static str {
        "mock"
    }
}

/// Network input size used by the SAM2 mocks
pub const MOCK_NET_SIZE: u32 = 64;
/// Decoder output resolution used by the SAM2 mocks
pub const MOCK_MASK_SIZE: usize = 16;

/// Encoder mock with the standard SAM2 tensor names
#[must_use]
pub fn sam2_encoder_mock() -> MockEngine {
    MockEngine::new(
        &["image"],
        &["high_res_feats_0", "high_res_feats_1", "image_embed"],
    )
    .with_output("high_res_feats_0", ArrayD::zeros(IxDyn(&[1, 2, 16, 16])))
    .with_output("high_res_feats_1", ArrayD::zeros(IxDyn(&[1, 2, 8, 8])))
    .with_output("image_embed", ArrayD::from_elem(IxDyn(&[1, 4, 4, 4]), 0.5))
}

/// Decoder mock with the standard SAM2 tensor names
///
/// For every batch item it paints a square of logits `+1` centred on the
/// first prompt point (mapped from network space to mask space) with the
/// given half extent, repeated over `channels` mask channels. Channel `c`
/// scores `iou - 0.01 * c`.
#[must_use]
pub fn sam2_decoder_mock(channels: usize, half_extent: usize, iou: f32) -> MockEngine {
    MockEngine::new(
        &[
            "image_embed",
            "high_res_feats_0",
            "high_res_feats_1",
            "point_coords",
            "point_labels",
            "mask_input",
            "has_mask_input",
        ],
        &["masks", "iou_predictions"],
    )
    .with_responder(move |inputs| square_masks(inputs, channels, half_extent, iou))
}

fn square_masks(
    inputs: &NamedTensors,
    channels: usize,
    half_extent: usize,
    iou: f32,
) -> Result<NamedTensors> {
    let coords = inputs
        .get("point_coords")
        .ok_or_else(|| SegmentError::inference("point_coords not supplied"))?;
    let batch = coords.shape()[0];
    let scale = MOCK_MASK_SIZE as f32 / MOCK_NET_SIZE as f32;

    let mut masks = ArrayD::from_elem(
        IxDyn(&[batch, channels, MOCK_MASK_SIZE, MOCK_MASK_SIZE]),
        -1.0_f32,
    );
    let mut scores = ArrayD::zeros(IxDyn(&[batch, channels]));
    for b in 0..batch {
        let cx = (coords[[b, 0, 0]] * scale) as usize;
        let cy = (coords[[b, 0, 1]] * scale) as usize;
        for c in 0..channels {
            scores[[b, c]] = iou - 0.01 * c as f32;
            for y in cy.saturating_sub(half_extent)..=(cy + half_extent).min(MOCK_MASK_SIZE - 1) {
                for x in cx.saturating_sub(half_extent)..=(cx + half_extent).min(MOCK_MASK_SIZE - 1)
                {
                    masks[[b, c, y, x]] = 1.0;
                }
            }
        }
    }

    Ok(NamedTensors::new()
        .with("masks", masks)
        .with("iou_predictions", scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls() {
        let mut engine = MockEngine::new(&["a"], &["b"]).with_output("b", ArrayD::zeros(IxDyn(&[1])));
        let log = engine.call_log();
        engine.infer(NamedTensors::new()).unwrap();
        engine.infer(NamedTensors::new()).unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failing_mock() {
        let mut engine = MockEngine::new(&[], &[]).failing();
        let err = engine.infer(NamedTensors::new()).unwrap_err();
        assert!(matches!(err, SegmentError::Inference(_)));
        assert_eq!(engine.call_log().lock().unwrap().len(), 1);
    }

    #[test]
    fn test_decoder_mock_paints_square_per_batch_item() {
        let mut engine = sam2_decoder_mock(2, 1, 0.9);
        let mut coords = ArrayD::zeros(IxDyn(&[2, 1, 2]));
        coords[[0, 0, 0]] = 8.0;
        coords[[0, 0, 1]] = 8.0;
        coords[[1, 0, 0]] = 40.0;
        coords[[1, 0, 1]] = 20.0;
        let outputs = engine
            .infer(NamedTensors::new().with("point_coords", coords))
            .unwrap();

        let masks = outputs.get("masks").unwrap();
        assert_eq!(masks.shape(), &[2, 2, 16, 16]);
        assert_eq!(masks[[0, 0, 2, 2]], 1.0);
        assert_eq!(masks[[1, 1, 5, 10]], 1.0);
        assert_eq!(masks[[1, 0, 0, 0]], -1.0);

        let scores = outputs.get("iou_predictions").unwrap();
        assert!((scores[[0, 1]] - 0.89).abs() < 1e-6);
    }
}
