//! Per-label prompt accumulation
//!
//! A label collects signed points and at most one box. [`LabelPrompts::merge`]
//! flattens them into the coordinate/label sequences the decoder expects:
//! points in insertion order, then the two box corners.

use crate::types::Point;
use serde::{Deserialize, Serialize};

/// Decoder label attached to each prompt coordinate
///
/// Box corners use their own tags so they can never be mistaken for point signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PromptLabel {
    Negative = 0,
    Positive = 1,
    BoxCorner1 = 2,
    BoxCorner2 = 3,
}

impl PromptLabel {
    /// Label for a point prompt with the given sign
    #[must_use]
    pub fn for_point(positive: bool) -> Self {
        if positive {
            Self::Positive
        } else {
            Self::Negative
        }
    }

    /// Numeric value fed into the `point_labels` tensor
    #[must_use]
    pub fn value(self) -> f32 {
        f32::from(self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPrompt {
    pub point: Point,
    pub positive: bool,
}

/// Two opposite box corners in original-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxPrompt {
    pub corner1: Point,
    pub corner2: Point,
}

/// Coordinates and labels ready for one decode call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPrompts {
    pub coords: Vec<Point>,
    pub labels: Vec<PromptLabel>,
}

impl MergedPrompts {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len()
    }
}

/// Prompts accumulated for one label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelPrompts {
    points: Vec<PointPrompt>,
    bbox: Option<BoxPrompt>,
}

impl LabelPrompts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, point: Point, positive: bool) {
        self.points.push(PointPrompt { point, positive });
    }

    /// Remove the first point with exactly these coordinates
    ///
    /// Returns whether a point was removed; a missing point is not an error.
    pub fn remove_point(&mut self, point: Point) -> bool {
        match self.points.iter().position(|p| p.point == point) {
            Some(index) => {
                self.points.remove(index);
                true
            },
            None => false,
        }
    }

    /// Set the box, replacing any previous one
    pub fn set_box(&mut self, corner1: Point, corner2: Point) {
        self.bbox = Some(BoxPrompt { corner1, corner2 });
    }

    /// Returns whether a box was present
    pub fn remove_box(&mut self) -> bool {
        self.bbox.take().is_some()
    }

    #[must_use]
    pub fn points(&self) -> &[PointPrompt] {
        &self.points
    }

    #[must_use]
    pub fn bbox(&self) -> Option<&BoxPrompt> {
        self.bbox.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.bbox.is_none()
    }

    /// Flatten into `[points…, box corners…]`
    #[must_use]
    pub fn merge(&self) -> MergedPrompts {
        let capacity = self.points.len() + if self.bbox.is_some() { 2 } else { 0 };
        let mut merged = MergedPrompts {
            coords: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        };

        for prompt in &self.points {
            merged.coords.push(prompt.point);
            merged.labels.push(PromptLabel::for_point(prompt.positive));
        }
        if let Some(bbox) = &self.bbox {
            merged.coords.push(bbox.corner1);
            merged.labels.push(PromptLabel::BoxCorner1);
            merged.coords.push(bbox.corner2);
            merged.labels.push(PromptLabel::BoxCorner2);
        }
        merged
    }
}
