//! Core value types shared by sessions, post-processing and deduplication

use crate::error::{Result, SegmentError};
use image::{GrayImage, ImageBuffer, Luma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Identifier of one object being segmented in an interactive session
pub type LabelId = u32;

/// Latest mask per label, as returned by every interactive mutation
pub type MaskMap = BTreeMap<LabelId, BinaryMask>;

/// A 2D point; the coordinate space depends on context (original image or network input)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned integer rectangle `(x, y, width, height)` in original-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Area in pixels; negative extents count as zero
    #[must_use]
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// Intersection-over-union with another box, `0.0` when they do not overlap
    #[must_use]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        let intersection = i64::from((right - left).max(0)) * i64::from((bottom - top).max(0));
        if intersection == 0 {
            return 0.0;
        }

        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f32 / union as f32
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}x{})",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Binary segmentation mask stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMask {
    /// Foreground flags, `width * height` entries
    data: Vec<bool>,

    /// Mask dimensions (width, height)
    dimensions: (u32, u32),
}

impl BinaryMask {
    /// Create a mask from row-major foreground flags
    pub fn new(data: Vec<bool>, dimensions: (u32, u32)) -> Result<Self> {
        let expected = dimensions.0 as usize * dimensions.1 as usize;
        if data.len() != expected {
            return Err(SegmentError::processing(format!(
                "Mask data length {} doesn't match dimensions {}x{} (expected {} cells)",
                data.len(),
                dimensions.0,
                dimensions.1,
                expected
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// All-background mask
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: vec![false; width as usize * height as usize],
            dimensions: (width, height),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    #[must_use]
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.dimensions.0, self.dimensions.1)
    }

    /// Row-major foreground flags
    #[must_use]
    pub fn data(&self) -> &[bool] {
        &self.data
    }

    /// Foreground flag at `(x, y)`; out-of-range cells read as background
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return false;
        }
        let index = y as usize * self.dimensions.0 as usize + x as usize;
        self.data.get(index).copied().unwrap_or(false)
    }

    /// Count of foreground cells
    #[must_use]
    pub fn area(&self) -> usize {
        self.data.iter().filter(|&&set| set).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&set| set)
    }

    /// Grayscale raster, foreground 255 and background 0
    ///
    /// Read through a `v -> (v, v, v)` palette this is the indexed 8-bit mask format.
    #[must_use]
    pub fn to_gray_image(&self) -> GrayImage {
        let (width, height) = self.dimensions;
        ImageBuffer::from_fn(width, height, |x, y| {
            Luma([if self.get(x, y) { 255u8 } else { 0u8 }])
        })
    }

    /// Raw 8-bit rows padded with zeros up to `stride` bytes per row
    pub fn to_strided_bytes(&self, stride: usize) -> Result<Vec<u8>> {
        let width = self.dimensions.0 as usize;
        if stride < width {
            return Err(SegmentError::processing(format!(
                "Row stride {} is smaller than mask width {}",
                stride, width
            )));
        }

        let mut bytes = vec![0u8; stride * self.dimensions.1 as usize];
        if width == 0 {
            return Ok(bytes);
        }
        for (row, out) in self.data.chunks(width).zip(bytes.chunks_mut(stride)) {
            for (cell, byte) in row.iter().zip(out.iter_mut()) {
                *byte = if *cell { 255 } else { 0 };
            }
        }
        Ok(bytes)
    }

    /// Nearest-neighbour resize, used to bring a decoder-resolution mask to image size
    pub fn resize_nearest(&self, new_width: u32, new_height: u32) -> Result<BinaryMask> {
        let resized = image::imageops::resize(
            &self.to_gray_image(),
            new_width,
            new_height,
            image::imageops::FilterType::Nearest,
        );
        Ok(Self::from_gray_image(&resized))
    }

    /// Create a mask from a grayscale raster, treating values above 127 as foreground
    #[must_use]
    pub fn from_gray_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = image.as_raw().iter().map(|&v| v > 127).collect();
        Self {
            data,
            dimensions: (width, height),
        }
    }

    /// Get mask statistics
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.area();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }

    /// Save mask as an 8-bit grayscale PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_gray_image()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Statistics about a binary mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

/// One candidate mask produced by automatic generation
///
/// The mask stays at decoder output resolution; the bounding box and the
/// contributing point are in original-image pixels.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationResult {
    #[serde(skip)]
    pub mask: BinaryMask,
    pub predicted_iou: f32,
    pub bounding_box: BoundingBox,
    pub point: Point,
    pub area: usize,
}

impl SegmentationResult {
    /// Build a result, deriving the area from the mask
    #[must_use]
    pub fn new(
        mask: BinaryMask,
        predicted_iou: f32,
        bounding_box: BoundingBox,
        point: Point,
    ) -> Self {
        let area = mask.area();
        Self {
            mask,
            predicted_iou,
            bounding_box,
            point,
            area,
        }
    }
}
