//! Interactive labelling session
//!
//! Holds one encoded image and any number of labels. Each mutation updates
//! the prompts of a single label and immediately recomputes that label's mask;
//! other labels are left untouched.

use super::build_stages;
use crate::{
    config::{MaskSelection, SessionConfig},
    decoder::{DecoderOutput, MaskDecoder},
    encoder::{EncodedImage, ImageEncoder},
    error::{Result, SegmentError},
    models::ModelPair,
    postprocess::binarize,
    prompt::LabelPrompts,
    types::{BinaryMask, ImageSize, LabelId, MaskMap, Point},
};
use image::DynamicImage;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Point-and-box prompting over a single image
pub struct InteractiveSession {
    encoder: ImageEncoder,
    decoder: MaskDecoder,
    config: SessionConfig,
    image: Option<EncodedImage>,
    labels: BTreeMap<LabelId, LabelPrompts>,
    masks: MaskMap,
}

impl std::fmt::Debug for InteractiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveSession")
            .field("encoder", &self.encoder)
            .field("decoder", &self.decoder)
            .field("image", &self.image.as_ref().map(|i| i.original_size))
            .field("labels", &self.labels.len())
            .finish_non_exhaustive()
    }
}

impl InteractiveSession {
    /// Build a session from loaded models
    ///
    /// # Errors
    /// - `InvalidConfig` for an invalid config or undeterminable input size
    /// - `MissingTensor` when either model does not satisfy the tensor contract
    pub fn new(models: ModelPair, config: SessionConfig) -> Result<Self> {
        let (encoder, decoder) = build_stages(models, &config)?;
        Ok(Self {
            encoder,
            decoder,
            config,
            image: None,
            labels: BTreeMap::new(),
            masks: MaskMap::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Size of the current image, if one is set
    #[must_use]
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image.as_ref().map(|image| image.original_size)
    }

    #[must_use]
    pub fn network_size(&self) -> ImageSize {
        self.encoder.network_size()
    }

    /// Replace the image, dropping all labels and masks
    ///
    /// State is cleared before encoding, so a failed encode leaves the session
    /// without an image rather than with stale embeddings.
    ///
    /// # Errors
    /// - `Processing` for empty images
    /// - Encoder engine failures
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn set_image(&mut self, image: &DynamicImage) -> Result<()> {
        self.reset();
        self.image = Some(self.encoder.encode(image)?);
        Ok(())
    }

    /// Add a positive or negative point to a label and recompute its mask
    ///
    /// # Errors
    /// - `ImageNotSet` before [`set_image`](Self::set_image)
    /// - Decoder engine failures
    pub fn add_point(&mut self, label: LabelId, point: Point, positive: bool) -> Result<&MaskMap> {
        self.ensure_image()?;
        self.labels.entry(label).or_default().add_point(point, positive);
        self.refresh_label(label)
    }

    /// Remove the first point of a label at exactly these coordinates
    ///
    /// Removing a point that does not exist changes nothing and does not
    /// invoke the decoder.
    ///
    /// # Errors
    /// - `ImageNotSet` before [`set_image`](Self::set_image)
    /// - Decoder engine failures
    pub fn remove_point(&mut self, label: LabelId, point: Point) -> Result<&MaskMap> {
        self.ensure_image()?;
        let removed = self
            .labels
            .get_mut(&label)
            .is_some_and(|prompts| prompts.remove_point(point));
        if !removed {
            debug!(label, x = point.x, y = point.y, "No matching point to remove");
            return Ok(&self.masks);
        }
        self.refresh_label(label)
    }

    /// Set the box of a label, replacing any previous box
    ///
    /// # Errors
    /// - `ImageNotSet` before [`set_image`](Self::set_image)
    /// - Decoder engine failures
    pub fn set_box(&mut self, label: LabelId, corner1: Point, corner2: Point) -> Result<&MaskMap> {
        self.ensure_image()?;
        self.labels.entry(label).or_default().set_box(corner1, corner2);
        self.refresh_label(label)
    }

    /// Remove the box of a label; a label without a box is left alone
    ///
    /// # Errors
    /// - `ImageNotSet` before [`set_image`](Self::set_image)
    /// - Decoder engine failures
    pub fn remove_box(&mut self, label: LabelId) -> Result<&MaskMap> {
        self.ensure_image()?;
        let removed = self
            .labels
            .get_mut(&label)
            .is_some_and(LabelPrompts::remove_box);
        if !removed {
            return Ok(&self.masks);
        }
        self.refresh_label(label)
    }

    /// Recompute the mask of one label from its current prompts
    ///
    /// A label with no prompts gets an all-background mask at original image
    /// size without calling the decoder.
    ///
    /// # Errors
    /// - `ImageNotSet` before [`set_image`](Self::set_image)
    /// - Decoder engine failures
    #[instrument(skip(self))]
    pub fn refresh_label(&mut self, label: LabelId) -> Result<&MaskMap> {
        let image = self.image.as_ref().ok_or(SegmentError::ImageNotSet)?;
        let merged = self
            .labels
            .get(&label)
            .map(LabelPrompts::merge)
            .unwrap_or_default();

        let mask = if merged.is_empty() {
            let size = image.original_size;
            BinaryMask::empty(size.width, size.height)
        } else {
            let output = self.decoder.decode_prompts(image, &merged)?;
            let channel = select_channel(&output, self.config.mask_selection)?;
            debug!(
                label,
                prompts = merged.len(),
                channel,
                score = output.score(0, channel),
                "Refreshed label"
            );
            binarize(output.mask(0, channel), self.config.mask_threshold)
        };

        self.masks.insert(label, mask);
        Ok(&self.masks)
    }

    /// Current mask of every label that has been touched since the last reset
    #[must_use]
    pub fn masks(&self) -> &MaskMap {
        &self.masks
    }

    #[must_use]
    pub fn mask(&self, label: LabelId) -> Option<&BinaryMask> {
        self.masks.get(&label)
    }

    #[must_use]
    pub fn prompts(&self, label: LabelId) -> Option<&LabelPrompts> {
        self.labels.get(&label)
    }

    /// Drop all labels and masks but keep the encoded image
    pub fn reset_points(&mut self) {
        self.labels.clear();
        self.masks.clear();
    }

    /// Drop labels, masks and the encoded image together
    pub fn reset(&mut self) {
        self.reset_points();
        self.image = None;
    }

    fn ensure_image(&self) -> Result<()> {
        if self.image.is_some() {
            Ok(())
        } else {
            Err(SegmentError::ImageNotSet)
        }
    }
}

fn select_channel(output: &DecoderOutput, selection: MaskSelection) -> Result<usize> {
    if output.batch_size() == 0 || output.channels() == 0 {
        return Err(SegmentError::processing(format!(
            "Decoder returned no masks (shape {:?})",
            output.masks.shape()
        )));
    }
    Ok(match selection {
        MaskSelection::First => 0,
        MaskSelection::HighestScore => output.best_channel(0),
    })
}
