//! Mask decoder adapter
//!
//! Wraps one decoder engine and turns prompt coordinates into a single decode
//! call. Each call is prompt-only: the mask hint is all zeros and the
//! has-mask flag is 0.

use crate::{
    encoder::EncodedImage,
    error::{Result, SegmentError},
    inference::InferenceEngine,
    prompt::{MergedPrompts, PromptLabel},
    tensor_io::{DecoderSignature, EmbeddingBundle, EncoderSignature, NamedTensors, TensorNameOverrides},
    types::{ImageSize, Point},
};
use instant::Instant;
use ndarray::{Array, Array2, Array4, ArrayView2, Axis, Ix2, Ix4, IxDyn};
use tracing::{debug, instrument};

/// Spatial downscale between the network input and the mask hint
const MASK_INPUT_SCALE: u32 = 4;

/// Raw decoder output for one batch
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// Mask logits `(B, M, h, w)`
    pub masks: Array4<f32>,
    /// Predicted IoU `(B, M)`
    pub iou_scores: Array2<f32>,
}

impl DecoderOutput {
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.masks.len_of(Axis(0))
    }

    /// Usable mask channels per batch item
    ///
    /// Some exports return more score columns than mask channels or the
    /// reverse; only channels present in both are used.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.masks.len_of(Axis(1)).min(self.iou_scores.len_of(Axis(1)))
    }

    /// Decoder output resolution
    #[must_use]
    pub fn mask_size(&self) -> ImageSize {
        ImageSize::new(
            self.masks.len_of(Axis(3)) as u32,
            self.masks.len_of(Axis(2)) as u32,
        )
    }

    #[must_use]
    pub fn mask(&self, batch: usize, channel: usize) -> ArrayView2<'_, f32> {
        self.masks.index_axis(Axis(0), batch).index_axis_move(Axis(0), channel)
    }

    #[must_use]
    pub fn score(&self, batch: usize, channel: usize) -> f32 {
        self.iou_scores[[batch, channel]]
    }

    /// Channel with the highest predicted IoU; the first one wins ties
    #[must_use]
    pub fn best_channel(&self, batch: usize) -> usize {
        let mut best = 0;
        for channel in 1..self.channels() {
            if self.score(batch, channel) > self.score(batch, best) {
                best = channel;
            }
        }
        best
    }
}

/// One decoder engine plus its resolved signature
pub struct MaskDecoder {
    engine: Box<dyn InferenceEngine>,
    signature: DecoderSignature,
    network_size: ImageSize,
}

impl std::fmt::Debug for MaskDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskDecoder")
            .field("engine", &self.engine.engine_name())
            .field("signature", &self.signature)
            .field("network_size", &self.network_size)
            .finish()
    }
}

impl MaskDecoder {
    /// Wrap a decoder engine, resolving its tensor names once
    ///
    /// # Errors
    /// - `MissingTensor` when the decoder metadata does not satisfy the contract
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        encoder: &EncoderSignature,
        overrides: &TensorNameOverrides,
        network_size: ImageSize,
    ) -> Result<Self> {
        let signature = DecoderSignature::resolve(engine.metadata(), encoder, overrides)?;
        debug!(?signature, "Resolved decoder signature");
        Ok(Self {
            engine,
            signature,
            network_size,
        })
    }

    #[must_use]
    pub fn signature(&self) -> &DecoderSignature {
        &self.signature
    }

    #[must_use]
    pub fn network_size(&self) -> ImageSize {
        self.network_size
    }

    /// Decode one label's merged prompts given in original-image pixels
    ///
    /// Prompts are placed on the network canvas the same way the image was,
    /// so letterboxed images get their padding offset applied.
    ///
    /// # Errors
    /// - `Processing` for an empty prompt set; callers short-circuit before this
    /// - Engine failures, propagated unchanged
    pub fn decode_prompts(
        &mut self,
        image: &EncodedImage,
        prompts: &MergedPrompts,
    ) -> Result<DecoderOutput> {
        if prompts.is_empty() {
            return Err(SegmentError::processing("Cannot decode an empty prompt set"));
        }
        let coords = prompts
            .coords
            .iter()
            .map(|&p| image.to_network_space(p))
            .collect::<Vec<_>>();
        let labels = prompts.labels.iter().map(|l| l.value()).collect::<Vec<_>>();
        self.decode_batch(&image.embeddings, &[coords], &[labels])
    }

    /// Decode one positive point per batch item, points in network space
    ///
    /// # Errors
    /// - Engine failures, propagated unchanged
    pub fn decode_points(
        &mut self,
        embeddings: &EmbeddingBundle,
        points: &[Point],
    ) -> Result<DecoderOutput> {
        let coords = points.iter().map(|&p| vec![p]).collect::<Vec<_>>();
        let labels = vec![vec![PromptLabel::Positive.value()]; points.len()];
        self.decode_batch(embeddings, &coords, &labels)
    }

    /// Run one decode call over `B` prompt rows of equal length `N`
    ///
    /// # Errors
    /// - `Processing` when rows are empty or ragged
    /// - Engine failures, propagated unchanged
    /// - `MissingTensor` / `Processing` when outputs are absent or mis-shaped
    #[instrument(skip_all, fields(batch = coords.len()))]
    pub fn decode_batch(
        &mut self,
        embeddings: &EmbeddingBundle,
        coords: &[Vec<Point>],
        labels: &[Vec<f32>],
    ) -> Result<DecoderOutput> {
        let batch = coords.len();
        let n = coords.first().map_or(0, Vec::len);
        if batch == 0 || n == 0 {
            return Err(SegmentError::processing("Decode batch has no prompts"));
        }
        if labels.len() != batch
            || coords.iter().any(|row| row.len() != n)
            || labels.iter().any(|row| row.len() != n)
        {
            return Err(SegmentError::processing(
                "Decode batch rows must all have the same number of prompts",
            ));
        }
        if embeddings.high_res_feats.len() < self.signature.high_res_feats.len() {
            return Err(SegmentError::internal(
                "Embedding bundle has fewer high-res features than the decoder consumes",
            ));
        }

        let start = Instant::now();
        let inputs = self.build_inputs(embeddings, coords, labels, batch, n)?;
        let outputs = self.engine.infer(inputs)?;
        let output = self.read_outputs(outputs)?;

        debug!(
            batch,
            prompts = n,
            channels = output.channels(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Decoded masks"
        );
        Ok(output)
    }

    fn build_inputs(
        &self,
        embeddings: &EmbeddingBundle,
        coords: &[Vec<Point>],
        labels: &[Vec<f32>],
        batch: usize,
        n: usize,
    ) -> Result<NamedTensors> {
        let flat_coords = coords
            .iter()
            .flatten()
            .flat_map(|p| [p.x, p.y])
            .collect::<Vec<_>>();
        let point_coords = Array::from_shape_vec(IxDyn(&[batch, n, 2]), flat_coords)
            .map_err(|e| SegmentError::processing(format!("point_coords shape: {e}")))?;

        let flat_labels = labels.iter().flatten().copied().collect::<Vec<_>>();
        let point_labels = Array::from_shape_vec(IxDyn(&[batch, n]), flat_labels)
            .map_err(|e| SegmentError::processing(format!("point_labels shape: {e}")))?;

        let hint_h = (self.network_size.height / MASK_INPUT_SCALE) as usize;
        let hint_w = (self.network_size.width / MASK_INPUT_SCALE) as usize;
        let mask_input = Array::zeros(IxDyn(&[batch, 1, hint_h, hint_w]));
        let has_mask_input = Array::zeros(IxDyn(&[batch]));

        let mut inputs = NamedTensors::new()
            .with(self.signature.image_embed.clone(), embeddings.image_embed.clone());
        for (name, feats) in self
            .signature
            .high_res_feats
            .iter()
            .zip(&embeddings.high_res_feats)
        {
            inputs.insert(name.clone(), feats.clone());
        }
        inputs.insert(self.signature.point_coords.clone(), point_coords);
        inputs.insert(self.signature.point_labels.clone(), point_labels);
        inputs.insert(self.signature.mask_input.clone(), mask_input);
        inputs.insert(self.signature.has_mask_input.clone(), has_mask_input);
        Ok(inputs)
    }

    fn read_outputs(&self, mut outputs: NamedTensors) -> Result<DecoderOutput> {
        let available = outputs
            .names()
            .iter()
            .map(|n| (*n).to_string())
            .collect::<Vec<_>>();
        let masks = outputs
            .take(&self.signature.masks_output)
            .ok_or_else(|| {
                SegmentError::missing_tensor("decoder", &self.signature.masks_output, &available)
            })?;
        let scores = outputs
            .take(&self.signature.iou_output)
            .ok_or_else(|| {
                SegmentError::missing_tensor("decoder", &self.signature.iou_output, &available)
            })?;

        let masks = match masks.ndim() {
            // (M, h, w) from single-image exports without a batch axis
            3 => masks.insert_axis(Axis(0)),
            _ => masks,
        }
        .into_dimensionality::<Ix4>()
        .map_err(|e| SegmentError::processing(format!("Decoder masks must be 4-D: {e}")))?;

        let iou_scores = match scores.ndim() {
            1 => scores.insert_axis(Axis(0)),
            _ => scores,
        }
        .into_dimensionality::<Ix2>()
        .map_err(|e| SegmentError::processing(format!("Decoder scores must be 2-D: {e}")))?;

        if iou_scores.len_of(Axis(0)) != masks.len_of(Axis(0)) {
            return Err(SegmentError::processing(format!(
                "Decoder batch mismatch: masks {:?}, scores {:?}",
                masks.shape(),
                iou_scores.shape()
            )));
        }

        Ok(DecoderOutput { masks, iou_scores })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{
        sam2_decoder_mock, sam2_encoder_mock, MockEngine, MOCK_MASK_SIZE, MOCK_NET_SIZE,
    };
    use crate::prompt::LabelPrompts;
    use crate::tensor_io::EncoderSignature;
    use crate::utils::LetterboxTransform;
    use ndarray::ArrayD;

    fn encoder_signature() -> EncoderSignature {
        let encoder = sam2_encoder_mock();
        EncoderSignature::resolve(encoder.metadata(), &TensorNameOverrides::new()).unwrap()
    }

    fn bundle() -> EmbeddingBundle {
        EmbeddingBundle {
            image_embed: ArrayD::zeros(IxDyn(&[1, 4, 4, 4])),
            high_res_feats: vec![
                ArrayD::zeros(IxDyn(&[1, 2, 16, 16])),
                ArrayD::zeros(IxDyn(&[1, 2, 8, 8])),
            ],
        }
    }

    fn net() -> ImageSize {
        ImageSize::new(MOCK_NET_SIZE, MOCK_NET_SIZE)
    }

    /// A 200x100 image encoded onto the mock network canvas
    fn encoded(letterbox: Option<LetterboxTransform>) -> EncodedImage {
        EncodedImage {
            embeddings: bundle(),
            original_size: ImageSize::new(200, 100),
            network_size: net(),
            letterbox,
        }
    }

    #[test]
    fn test_decode_prompts_maps_to_network_space() {
        let engine = sam2_decoder_mock(3, 1, 0.9);
        let log = engine.call_log();
        let mut decoder = MaskDecoder::new(
            Box::new(engine),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap();

        let mut prompts = LabelPrompts::new();
        prompts.add_point(Point::new(100.0, 50.0), true);
        prompts.set_box(Point::new(0.0, 0.0), Point::new(200.0, 100.0));
        let output = decoder
            .decode_prompts(&encoded(None), &prompts.merge())
            .unwrap();

        assert_eq!(output.batch_size(), 1);
        assert_eq!(output.channels(), 3);
        assert_eq!(
            output.mask_size(),
            ImageSize::new(MOCK_MASK_SIZE as u32, MOCK_MASK_SIZE as u32)
        );

        let calls = log.lock().unwrap();
        let inputs = &calls[0];
        let coords = inputs.get("point_coords").unwrap();
        assert_eq!(coords.shape(), &[1, 3, 2]);
        assert!((coords[[0, 0, 0]] - 32.0).abs() < 1e-5);
        assert!((coords[[0, 0, 1]] - 32.0).abs() < 1e-5);
        assert!((coords[[0, 2, 0]] - 64.0).abs() < 1e-5);

        let labels = inputs.get("point_labels").unwrap();
        assert_eq!(labels.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);

        assert_eq!(inputs.get("mask_input").unwrap().shape(), &[1, 1, 16, 16]);
        assert!(inputs.get("mask_input").unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(inputs.get("has_mask_input").unwrap().shape(), &[1]);
        assert!(inputs.get("high_res_feats_1").is_some());
    }

    #[test]
    fn test_decode_prompts_follow_letterbox_layout() {
        let engine = sam2_decoder_mock(1, 0, 0.9);
        let log = engine.call_log();
        let mut decoder = MaskDecoder::new(
            Box::new(engine),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap();

        // 200x100 fitted into 64x64: scale 0.32, 64x32 placed 16 rows down
        let transform = LetterboxTransform::fit(ImageSize::new(200, 100), net());
        assert_eq!(transform.offset_y, 16);

        let mut prompts = LabelPrompts::new();
        prompts.add_point(Point::new(0.0, 0.0), true);
        prompts.add_point(Point::new(200.0, 100.0), false);
        decoder
            .decode_prompts(&encoded(Some(transform)), &prompts.merge())
            .unwrap();

        let calls = log.lock().unwrap();
        let coords = calls[0].get("point_coords").unwrap();
        assert!(coords[[0, 0, 0]].abs() < 1e-4);
        assert!((coords[[0, 0, 1]] - 16.0).abs() < 1e-4);
        assert!((coords[[0, 1, 0]] - 64.0).abs() < 1e-4);
        assert!((coords[[0, 1, 1]] - 48.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_points_batches_one_point_per_item() {
        let engine = sam2_decoder_mock(1, 0, 0.9);
        let log = engine.call_log();
        let mut decoder = MaskDecoder::new(
            Box::new(engine),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap();

        let points = vec![Point::new(8.0, 8.0), Point::new(40.0, 40.0), Point::new(60.0, 4.0)];
        let output = decoder.decode_points(&bundle(), &points).unwrap();
        assert_eq!(output.batch_size(), 3);

        let calls = log.lock().unwrap();
        assert_eq!(calls[0].get("point_coords").unwrap().shape(), &[3, 1, 2]);
        assert_eq!(calls[0].get("point_labels").unwrap().shape(), &[3, 1]);
        assert_eq!(calls[0].get("has_mask_input").unwrap().shape(), &[3]);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let engine = sam2_decoder_mock(1, 0, 0.9).failing();
        let log = engine.call_log();
        let mut decoder = MaskDecoder::new(
            Box::new(engine),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap();

        let err = decoder
            .decode_points(&bundle(), &[Point::new(1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, SegmentError::Inference(_)));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_decoder_input_rejected_at_construction() {
        let engine = MockEngine::new(&["image_embed", "point_coords"], &["masks", "iou_predictions"]);
        let err = MaskDecoder::new(
            Box::new(engine),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap_err();
        assert!(matches!(err, SegmentError::MissingTensor { .. }));
    }

    #[test]
    fn test_best_channel() {
        let output = DecoderOutput {
            masks: Array4::zeros((1, 3, 2, 2)),
            iou_scores: Array2::from_shape_vec((1, 3), vec![0.5, 0.9, 0.9]).unwrap(),
        };
        assert_eq!(output.best_channel(0), 1);
        assert!((output.score(0, 2) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_channels_limited_by_scores() {
        let output = DecoderOutput {
            masks: Array4::zeros((2, 4, 2, 2)),
            iou_scores: Array2::zeros((2, 3)),
        };
        assert_eq!(output.channels(), 3);
    }

    #[test]
    fn test_ragged_batch_rejected() {
        let mut decoder = MaskDecoder::new(
            Box::new(sam2_decoder_mock(1, 0, 0.9)),
            &encoder_signature(),
            &TensorNameOverrides::new(),
            net(),
        )
        .unwrap();
        let coords = vec![vec![Point::new(1.0, 1.0)], vec![Point::new(1.0, 1.0); 2]];
        let labels = vec![vec![1.0], vec![1.0, 1.0]];
        assert!(decoder.decode_batch(&bundle(), &coords, &labels).is_err());
        assert!(decoder.decode_points(&bundle(), &[]).is_err());
    }
}
