//! Mask post-processing: binarization, area and bounding box extraction
//!
//! Boxes are rescaled to original-image pixels with plain per-axis ratios.
//! Letterbox padding applied at encode time is not undone here; see
//! [`crate::utils::LetterboxTransform`] for that.

use crate::{
    coordinates::scale_to_original,
    types::{BinaryMask, BoundingBox, ImageSize, Point, SegmentationResult},
};
use ndarray::ArrayView2;

/// Inclusive foreground extent in mask cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskBounds {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

/// Cells strictly above `threshold` are foreground
#[must_use]
pub fn binarize(logits: ArrayView2<'_, f32>, threshold: f32) -> BinaryMask {
    let (height, width) = logits.dim();
    let data = logits.iter().map(|&v| v > threshold).collect::<Vec<_>>();
    BinaryMask::new(data, (width as u32, height as u32))
        .unwrap_or_else(|_| BinaryMask::empty(width as u32, height as u32))
}

/// Tight box around foreground cells, `None` for an empty mask
#[must_use]
pub fn tight_bounds(mask: &BinaryMask) -> Option<MaskBounds> {
    let width = mask.width() as usize;
    if width == 0 {
        return None;
    }

    let mut bounds: Option<MaskBounds> = None;
    for (index, _) in mask.data().iter().enumerate().filter(|(_, &set)| set) {
        let x = (index % width) as u32;
        let y = (index / width) as u32;
        bounds = Some(match bounds {
            None => MaskBounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
            Some(b) => MaskBounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
        });
    }
    bounds
}

/// Scale mask-cell bounds to original-image pixels, inclusive of the max cell
#[must_use]
pub fn rescale_bounds(bounds: MaskBounds, mask_size: ImageSize, original: ImageSize) -> BoundingBox {
    let (sx, sy) = scale_to_original(original, mask_size);
    BoundingBox::new(
        (bounds.min_x as f32 * sx) as i32,
        (bounds.min_y as f32 * sy) as i32,
        ((bounds.max_x - bounds.min_x + 1) as f32 * sx) as i32,
        ((bounds.max_y - bounds.min_y + 1) as f32 * sy) as i32,
    )
}

/// Binarization and candidate filtering settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskPostProcessor {
    pub threshold: f32,
    /// Candidates with a predicted IoU below this are dropped
    pub pred_iou_thresh: f32,
    /// Candidates with fewer foreground cells are dropped
    pub min_area: usize,
}

impl Default for MaskPostProcessor {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            pred_iou_thresh: 0.0,
            min_area: 0,
        }
    }
}

impl MaskPostProcessor {
    #[must_use]
    pub fn new(threshold: f32, pred_iou_thresh: f32, min_area: usize) -> Self {
        Self {
            threshold,
            pred_iou_thresh,
            min_area,
        }
    }

    /// Turn one raw mask channel into a candidate
    ///
    /// Returns `None` when the score is not finite or below the IoU threshold,
    /// when the mask is empty, or when its area is below the minimum.
    #[must_use]
    pub fn process(
        &self,
        logits: ArrayView2<'_, f32>,
        predicted_iou: f32,
        original: ImageSize,
        point: Point,
    ) -> Option<SegmentationResult> {
        if !predicted_iou.is_finite() || predicted_iou < self.pred_iou_thresh {
            return None;
        }

        let mask = binarize(logits, self.threshold);
        let area = mask.area();
        if area < self.min_area {
            return None;
        }
        let bounds = tight_bounds(&mask)?;
        let bounding_box = rescale_bounds(bounds, mask.size(), original);

        Some(SegmentationResult::new(mask, predicted_iou, bounding_box, point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn logits(rows: &[&str]) -> Array2<f32> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let data = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| if c == '#' { 2.0 } else { -2.0 }))
            .collect();
        Array2::from_shape_vec((height, width), data).unwrap()
    }

    #[test]
    fn test_binarize_strictly_above_threshold() {
        let raw = Array2::from_shape_vec((1, 4), vec![-0.5, 0.0, 0.01, 3.0]).unwrap();
        let mask = binarize(raw.view(), 0.0);
        assert_eq!(mask.data(), &[false, false, true, true]);

        let mask = binarize(raw.view(), 1.0);
        assert_eq!(mask.data(), &[false, false, false, true]);
    }

    #[test]
    fn test_area_counts_true_cells() {
        let raw = logits(&["#..#", ".##.", "...."]);
        let mask = binarize(raw.view(), 0.0);
        assert_eq!(mask.area(), 4);
        assert_eq!(mask.dimensions(), (4, 3));
    }

    #[test]
    fn test_tight_bounds() {
        let raw = logits(&["....", ".#..", "..#.", "...."]);
        let bounds = tight_bounds(&binarize(raw.view(), 0.0)).unwrap();
        assert_eq!(
            bounds,
            MaskBounds {
                min_x: 1,
                min_y: 1,
                max_x: 2,
                max_y: 2
            }
        );

        let empty = logits(&["...", "..."]);
        assert!(tight_bounds(&binarize(empty.view(), 0.0)).is_none());
    }

    #[test]
    fn test_rescale_inclusive_of_max_cell() {
        let bounds = MaskBounds {
            min_x: 1,
            min_y: 2,
            max_x: 3,
            max_y: 2,
        };
        let bbox = rescale_bounds(bounds, ImageSize::new(4, 4), ImageSize::new(10, 6));
        // sx = 2.5, sy = 1.5
        assert_eq!(bbox, BoundingBox::new(2, 3, 7, 1));
    }

    #[test]
    fn test_process_filters() {
        let raw = logits(&["##..", "##..", "....", "...."]);
        let original = ImageSize::new(400, 400);
        let point = Point::new(10.0, 10.0);

        let processor = MaskPostProcessor::new(0.0, 0.88, 0);
        let result = processor.process(raw.view(), 0.9, original, point).unwrap();
        assert_eq!(result.area, 4);
        assert_eq!(result.bounding_box, BoundingBox::new(0, 0, 200, 200));
        assert_eq!(result.point, point);

        // score exactly at the threshold is kept
        assert!(processor.process(raw.view(), 0.88, original, point).is_some());
        assert!(processor.process(raw.view(), 0.87, original, point).is_none());

        let processor = MaskPostProcessor::new(0.0, 0.0, 5);
        assert!(processor.process(raw.view(), 0.9, original, point).is_none());

        let processor = MaskPostProcessor::default();
        assert!(processor.process(raw.view(), f32::NAN, original, point).is_none());
        assert!(processor.process(raw.view(), f32::INFINITY, original, point).is_none());

        let empty = logits(&["..", ".."]);
        assert!(MaskPostProcessor::default()
            .process(empty.view(), 1.0, original, point)
            .is_none());
    }
}
