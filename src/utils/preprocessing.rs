//! Image preprocessing for the encoder
//!
//! Converts a decoded image into the normalized `(1, 3, H, W)` tensor the
//! encoder consumes, either by stretching to the network size or by
//! letterboxing onto a padded canvas.

use crate::{
    config::{NormalizationPreset, ResizeMode},
    error::{Result, SegmentError},
    types::{ImageSize, Point},
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Network input size
    pub target: ImageSize,
    pub resize_mode: ResizeMode,
    /// Padding color for letterboxing (RGB)
    pub padding_color: [u8; 3],
    pub normalization: NormalizationPreset,
    /// Swap the red and blue channels, for callers holding BGR data
    pub swap_rb: bool,
    /// Whether to return the preprocessed image for debugging
    pub return_preprocessed_image: bool,
}

impl PreprocessingOptions {
    #[must_use]
    pub fn new(target: ImageSize, normalization: NormalizationPreset) -> Self {
        Self {
            target,
            resize_mode: ResizeMode::Stretch,
            padding_color: [0, 0, 0],
            normalization,
            swap_rb: false,
            return_preprocessed_image: false,
        }
    }
}

/// Placement of a letterboxed image on the network canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    /// Uniform scale from original to network pixels
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl LetterboxTransform {
    /// Fit `original` inside `target`, centred
    #[must_use]
    pub fn fit(original: ImageSize, target: ImageSize) -> Self {
        let scale = (target.width as f32 / original.width as f32)
            .min(target.height as f32 / original.height as f32);
        let (new_width, new_height) = Self::scaled_size(original, scale, target);
        Self {
            scale,
            offset_x: (target.width - new_width) / 2,
            offset_y: (target.height - new_height) / 2,
        }
    }

    fn scaled_size(original: ImageSize, scale: f32, target: ImageSize) -> (u32, u32) {
        let width = ((original.width as f32 * scale).round() as u32).clamp(1, target.width);
        let height = ((original.height as f32 * scale).round() as u32).clamp(1, target.height);
        (width, height)
    }

    /// Network-canvas point back to original-image pixels
    #[must_use]
    pub fn to_original(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.offset_x as f32) / self.scale,
            (point.y - self.offset_y as f32) / self.scale,
        )
    }

    /// Original-image point onto the network canvas
    #[must_use]
    pub fn to_network(&self, point: Point) -> Point {
        Point::new(
            point.x * self.scale + self.offset_x as f32,
            point.y * self.scale + self.offset_y as f32,
        )
    }
}

/// Encoder input for one image
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub tensor: Array4<f32>,
    pub original_size: ImageSize,
    /// Present only in letterbox mode
    pub letterbox: Option<LetterboxTransform>,
    pub image: Option<DynamicImage>,
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize, pad and normalize an image into an NCHW tensor
    ///
    /// # Errors
    /// - `Processing` for zero-sized input images or network sizes
    pub fn preprocess_image(
        image: &DynamicImage,
        options: &PreprocessingOptions,
    ) -> Result<PreprocessedImage> {
        let mut rgb_image = image.to_rgb8();
        let (orig_width, orig_height) = rgb_image.dimensions();
        let original_size = ImageSize::new(orig_width, orig_height);
        if original_size.is_empty() {
            return Err(SegmentError::processing(format!(
                "Cannot preprocess an empty image ({original_size})"
            )));
        }
        if options.target.is_empty() {
            return Err(SegmentError::processing(format!(
                "Invalid network input size {}",
                options.target
            )));
        }

        if options.swap_rb {
            for pixel in rgb_image.pixels_mut() {
                pixel.0.swap(0, 2);
            }
        }

        let target = options.target;
        let (canvas, letterbox) = match options.resize_mode {
            ResizeMode::Stretch => (
                image::imageops::resize(
                    &rgb_image,
                    target.width,
                    target.height,
                    image::imageops::FilterType::Triangle,
                ),
                None,
            ),
            ResizeMode::Letterbox => {
                let transform = LetterboxTransform::fit(original_size, target);
                let (new_width, new_height) =
                    LetterboxTransform::scaled_size(original_size, transform.scale, target);
                let resized = image::imageops::resize(
                    &rgb_image,
                    new_width,
                    new_height,
                    image::imageops::FilterType::Triangle,
                );

                let padding = options.padding_color;
                let mut canvas = ImageBuffer::from_pixel(
                    target.width,
                    target.height,
                    image::Rgb([padding[0], padding[1], padding[2]]),
                );
                image::imageops::replace(
                    &mut canvas,
                    &resized,
                    i64::from(transform.offset_x),
                    i64::from(transform.offset_y),
                );
                (canvas, Some(transform))
            },
        };

        let tensor = Self::canvas_to_tensor(&canvas, &options.normalization);
        let image = options
            .return_preprocessed_image
            .then(|| DynamicImage::ImageRgb8(canvas));

        Ok(PreprocessedImage {
            tensor,
            original_size,
            letterbox,
            image,
        })
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, normalization: &NormalizationPreset) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = normalization.normalize(channel, pixel[channel]);
            }
        }

        tensor
    }
}
