//! Named-tensor contract between the sessions and the inference engines
//!
//! Encoder and decoder signatures are resolved once against the model
//! metadata when a model is loaded. Every logical tensor has a short list of
//! accepted names; a missing required tensor fails the load instead of being
//! guessed at decode time.

use crate::error::{Result, SegmentError};
use ndarray::ArrayD;
use std::collections::HashMap;

/// Ordered collection of named `f32` tensors, the currency of [`crate::InferenceEngine`]
#[derive(Debug, Clone, Default)]
pub struct NamedTensors {
    entries: Vec<(String, ArrayD<f32>)>,
}

impl NamedTensors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tensor, replacing any existing tensor with the same name
    pub fn insert<S: Into<String>>(&mut self, name: S, tensor: ArrayD<f32>) {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = tensor;
        } else {
            self.entries.push((name, tensor));
        }
    }

    #[must_use]
    pub fn with<S: Into<String>>(mut self, name: S, tensor: ArrayD<f32>) -> Self {
        self.insert(name, tensor);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    /// Remove and return a tensor by name
    pub fn take(&mut self, name: &str) -> Option<ArrayD<f32>> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }
}

impl IntoIterator for NamedTensors {
    type Item = (String, ArrayD<f32>);
    type IntoIter = std::vec::IntoIter<(String, ArrayD<f32>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Input/output names and static input shapes reported by an engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelMetadata {
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    /// Declared input shapes; negative entries are dynamic dimensions
    pub input_shapes: HashMap<String, Vec<i64>>,
}

impl ModelMetadata {
    fn has_input(&self, name: &str) -> bool {
        self.input_names.iter().any(|n| n == name)
    }

    fn has_output(&self, name: &str) -> bool {
        self.output_names.iter().any(|n| n == name)
    }
}

/// Logical tensor roles of the two-stage model, used as keys for name overrides
pub mod roles {
    pub const IMAGE: &str = "image";
    pub const IMAGE_EMBED: &str = "image_embed";
    pub const HIGH_RES_FEATS_0: &str = "high_res_feats_0";
    pub const HIGH_RES_FEATS_1: &str = "high_res_feats_1";
    pub const POINT_COORDS: &str = "point_coords";
    pub const POINT_LABELS: &str = "point_labels";
    pub const MASK_INPUT: &str = "mask_input";
    pub const HAS_MASK_INPUT: &str = "has_mask_input";
    pub const MASKS: &str = "masks";
    pub const IOU_PREDICTIONS: &str = "iou_predictions";
}

const IMAGE_ALTERNATES: &[&str] = &["image", "input_image"];
const IMAGE_EMBED_ALTERNATES: &[&str] = &["image_embed", "image_embeddings"];
const HIGH_RES_ALTERNATES: [&[&str]; 2] = [
    &["high_res_feats_0", "hidden_states_0"],
    &["high_res_feats_1", "hidden_states_1"],
];
const HIGH_RES_ROLES: [&str; 2] = [roles::HIGH_RES_FEATS_0, roles::HIGH_RES_FEATS_1];
const MASKS_ALTERNATES: &[&str] = &["masks", "low_res_masks"];
const IOU_ALTERNATES: &[&str] = &["iou_predictions", "iou_scores", "scores"];

/// Explicit role → tensor name mapping, taking precedence over the built-in alternates
pub type TensorNameOverrides = HashMap<String, String>;

/// Where a tensor name is looked up
#[derive(Clone, Copy)]
enum Side {
    Input,
    Output,
}

fn lookup(
    metadata: &ModelMetadata,
    side: Side,
    role: &str,
    alternates: &[&str],
    overrides: &TensorNameOverrides,
) -> std::result::Result<Option<String>, String> {
    let present = |name: &str| match side {
        Side::Input => metadata.has_input(name),
        Side::Output => metadata.has_output(name),
    };

    if let Some(name) = overrides.get(role) {
        // An explicit override never falls back to the alternates
        return if present(name) {
            Ok(Some(name.clone()))
        } else {
            Err(name.clone())
        };
    }

    Ok(alternates
        .iter()
        .find(|candidate| present(candidate))
        .map(|name| (*name).to_string()))
}

fn require(
    model: &str,
    metadata: &ModelMetadata,
    side: Side,
    role: &str,
    alternates: &[&str],
    overrides: &TensorNameOverrides,
) -> Result<String> {
    let available = match side {
        Side::Input => &metadata.input_names,
        Side::Output => &metadata.output_names,
    };
    match lookup(metadata, side, role, alternates, overrides) {
        Ok(Some(name)) => Ok(name),
        Ok(None) => Err(SegmentError::missing_tensor(model, role, available)),
        Err(name) => Err(SegmentError::missing_tensor(model, &name, available)),
    }
}

fn optional(
    model: &str,
    metadata: &ModelMetadata,
    side: Side,
    role: &str,
    alternates: &[&str],
    overrides: &TensorNameOverrides,
) -> Result<Option<String>> {
    let available = match side {
        Side::Input => &metadata.input_names,
        Side::Output => &metadata.output_names,
    };
    lookup(metadata, side, role, alternates, overrides)
        .map_err(|name| SegmentError::missing_tensor(model, &name, available))
}

/// Resolved encoder tensor names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSignature {
    pub image_input: String,
    pub image_embed_output: String,
    /// High-resolution feature outputs in index order (0-2 entries)
    pub high_res_outputs: Vec<String>,
}

impl EncoderSignature {
    /// Resolve encoder names against engine metadata
    ///
    /// # Errors
    /// - `MissingTensor` when the image input or the embedding output is absent
    pub fn resolve(metadata: &ModelMetadata, overrides: &TensorNameOverrides) -> Result<Self> {
        let image_input = match lookup(metadata, Side::Input, roles::IMAGE, IMAGE_ALTERNATES, overrides)
        {
            Ok(Some(name)) => name,
            // A single-input encoder is unambiguous whatever its name
            Ok(None) if metadata.input_names.len() == 1 => metadata.input_names[0].clone(),
            Ok(None) => {
                return Err(SegmentError::missing_tensor(
                    "encoder",
                    roles::IMAGE,
                    &metadata.input_names,
                ))
            },
            Err(name) => {
                return Err(SegmentError::missing_tensor(
                    "encoder",
                    &name,
                    &metadata.input_names,
                ))
            },
        };

        let image_embed_output = require(
            "encoder",
            metadata,
            Side::Output,
            roles::IMAGE_EMBED,
            IMAGE_EMBED_ALTERNATES,
            overrides,
        )?;

        let mut high_res_outputs = Vec::new();
        for (role, alternates) in HIGH_RES_ROLES.iter().zip(HIGH_RES_ALTERNATES.iter()) {
            match optional("encoder", metadata, Side::Output, role, alternates, overrides)? {
                Some(name) => high_res_outputs.push(name),
                None => break,
            }
        }

        Ok(Self {
            image_input,
            image_embed_output,
            high_res_outputs,
        })
    }
}

/// Resolved decoder tensor names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSignature {
    pub image_embed: String,
    /// High-resolution feature inputs in index order (0-2 entries)
    pub high_res_feats: Vec<String>,
    pub point_coords: String,
    pub point_labels: String,
    pub mask_input: String,
    pub has_mask_input: String,
    pub masks_output: String,
    pub iou_output: String,
}

impl DecoderSignature {
    /// Resolve decoder names against engine metadata and the encoder it is paired with
    ///
    /// The two outputs fall back to positions 0 (masks) and 1 (scores) when no
    /// accepted name is present.
    ///
    /// # Errors
    /// - `MissingTensor` for any absent required input
    /// - `MissingTensor` when the decoder consumes a high-res feature the encoder does not produce
    /// - `MissingTensor` when outputs cannot be resolved by name or position
    pub fn resolve(
        metadata: &ModelMetadata,
        encoder: &EncoderSignature,
        overrides: &TensorNameOverrides,
    ) -> Result<Self> {
        let input = |role: &str, alternates: &[&str]| {
            require("decoder", metadata, Side::Input, role, alternates, overrides)
        };

        let image_embed = input(roles::IMAGE_EMBED, IMAGE_EMBED_ALTERNATES)?;
        let point_coords = input(roles::POINT_COORDS, &[roles::POINT_COORDS])?;
        let point_labels = input(roles::POINT_LABELS, &[roles::POINT_LABELS])?;
        let mask_input = input(roles::MASK_INPUT, &[roles::MASK_INPUT])?;
        let has_mask_input = input(roles::HAS_MASK_INPUT, &[roles::HAS_MASK_INPUT])?;

        let mut high_res_feats = Vec::new();
        for (index, (role, alternates)) in HIGH_RES_ROLES
            .iter()
            .zip(HIGH_RES_ALTERNATES.iter())
            .enumerate()
        {
            let Some(name) = optional("decoder", metadata, Side::Input, role, alternates, overrides)?
            else {
                break;
            };
            if index >= encoder.high_res_outputs.len() {
                return Err(SegmentError::missing_tensor(
                    "encoder",
                    role,
                    &encoder.high_res_outputs,
                ));
            }
            high_res_feats.push(name);
        }
        if high_res_feats.len() < encoder.high_res_outputs.len() {
            tracing::warn!(
                produced = encoder.high_res_outputs.len(),
                consumed = high_res_feats.len(),
                "Encoder produces high-res features the decoder does not consume"
            );
        }

        let masks_output = Self::output_by_name_or_position(
            metadata,
            roles::MASKS,
            MASKS_ALTERNATES,
            0,
            overrides,
        )?;
        let iou_output = Self::output_by_name_or_position(
            metadata,
            roles::IOU_PREDICTIONS,
            IOU_ALTERNATES,
            1,
            overrides,
        )?;

        Ok(Self {
            image_embed,
            high_res_feats,
            point_coords,
            point_labels,
            mask_input,
            has_mask_input,
            masks_output,
            iou_output,
        })
    }

    fn output_by_name_or_position(
        metadata: &ModelMetadata,
        role: &str,
        alternates: &[&str],
        position: usize,
        overrides: &TensorNameOverrides,
    ) -> Result<String> {
        if let Some(name) = optional("decoder", metadata, Side::Output, role, alternates, overrides)? {
            return Ok(name);
        }
        let name = metadata
            .output_names
            .get(position)
            .cloned()
            .ok_or_else(|| SegmentError::missing_tensor("decoder", role, &metadata.output_names))?;
        tracing::warn!(
            role = role,
            resolved = %name,
            position = position,
            "Decoder output resolved by position"
        );
        Ok(name)
    }
}

/// Encoder outputs for one image, reused by every decode call on that image
#[derive(Debug, Clone)]
pub struct EmbeddingBundle {
    pub image_embed: ArrayD<f32>,
    /// High-resolution feature maps in index order
    pub high_res_feats: Vec<ArrayD<f32>>,
}

impl EmbeddingBundle {
    /// Pick the bundle tensors out of raw encoder outputs
    ///
    /// # Errors
    /// - `MissingTensor` when the engine did not return a tensor named in the signature
    pub fn from_outputs(mut outputs: NamedTensors, signature: &EncoderSignature) -> Result<Self> {
        let available: Vec<String> = outputs.names().iter().map(|n| (*n).to_string()).collect();
        let mut take = |name: &str| {
            outputs
                .take(name)
                .ok_or_else(|| SegmentError::missing_tensor("encoder", name, &available))
        };

        let image_embed = take(&signature.image_embed_output)?;
        let high_res_feats = signature
            .high_res_outputs
            .iter()
            .map(|name| take(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            image_embed,
            high_res_feats,
        })
    }
}
