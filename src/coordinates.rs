//! Conversions between original-image, network-input and mask-output space
//!
//! Mapping is a plain per-axis rescale with no clamping: out-of-range prompts
//! map to out-of-range coordinates.

use crate::types::{ImageSize, Point};

/// Per-axis mapping between an original image and the network input it was resized to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    original: ImageSize,
    network: ImageSize,
}

impl CoordinateMapper {
    #[must_use]
    pub fn new(original: ImageSize, network: ImageSize) -> Self {
        Self { original, network }
    }

    #[must_use]
    pub fn original_size(&self) -> ImageSize {
        self.original
    }

    #[must_use]
    pub fn network_size(&self) -> ImageSize {
        self.network
    }

    /// `x' = x / origW * netW`, `y' = y / origH * netH`
    #[must_use]
    pub fn to_network_space(&self, point: Point) -> Point {
        to_network_space(point, self.original, self.network)
    }

    /// Inverse of [`CoordinateMapper::to_network_space`]
    #[must_use]
    pub fn to_original_space(&self, point: Point) -> Point {
        to_original_space(point, self.original, self.network)
    }

    /// Ratios `(origW / outW, origH / outH)` for rescaling decoder output coordinates
    #[must_use]
    pub fn scale_to_original(&self, output: ImageSize) -> (f32, f32) {
        scale_to_original(self.original, output)
    }
}

#[must_use]
pub fn to_network_space(point: Point, original: ImageSize, network: ImageSize) -> Point {
    Point::new(
        point.x / original.width as f32 * network.width as f32,
        point.y / original.height as f32 * network.height as f32,
    )
}

#[must_use]
pub fn to_original_space(point: Point, original: ImageSize, network: ImageSize) -> Point {
    Point::new(
        point.x * (original.width as f32 / network.width as f32),
        point.y * (original.height as f32 / network.height as f32),
    )
}

#[must_use]
pub fn scale_to_original(original: ImageSize, output: ImageSize) -> (f32, f32) {
    (
        original.width as f32 / output.width as f32,
        original.height as f32 / output.height as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point, b: Point) {
        assert!((a.x - b.x).abs() < 1e-3, "{a:?} != {b:?}");
        assert!((a.y - b.y).abs() < 1e-3, "{a:?} != {b:?}");
    }

    #[test]
    fn test_to_network_space() {
        let mapper = CoordinateMapper::new(ImageSize::new(2048, 512), ImageSize::new(1024, 1024));
        let mapped = mapper.to_network_space(Point::new(1024.0, 256.0));
        assert_close(mapped, Point::new(512.0, 512.0));
    }

    #[test]
    fn test_round_trip_various_sizes() {
        let sizes = [
            (ImageSize::new(640, 480), ImageSize::new(1024, 1024)),
            (ImageSize::new(1, 1), ImageSize::new(1024, 1024)),
            (ImageSize::new(3000, 17), ImageSize::new(512, 256)),
            (ImageSize::new(1024, 1024), ImageSize::new(1024, 1024)),
        ];
        let points = [
            Point::new(0.0, 0.0),
            Point::new(12.5, 7.25),
            Point::new(639.0, 479.0),
        ];

        for (original, network) in sizes {
            let mapper = CoordinateMapper::new(original, network);
            for point in points {
                let back = mapper.to_original_space(mapper.to_network_space(point));
                assert_close(back, point);
            }
        }
    }

    #[test]
    fn test_no_clamping() {
        let mapper = CoordinateMapper::new(ImageSize::new(100, 100), ImageSize::new(200, 200));
        assert_close(
            mapper.to_network_space(Point::new(-10.0, 150.0)),
            Point::new(-20.0, 300.0),
        );
    }

    #[test]
    fn test_scale_to_original() {
        let mapper = CoordinateMapper::new(ImageSize::new(1920, 1080), ImageSize::new(1024, 1024));
        let (sx, sy) = mapper.scale_to_original(ImageSize::new(256, 256));
        assert!((sx - 7.5).abs() < 1e-6);
        assert!((sy - 4.21875).abs() < 1e-6);
    }
}
