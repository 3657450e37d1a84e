//! Evenly spaced point lattice for automatic mask generation

use crate::types::{ImageSize, Point};

/// Cell-centred `k × k` grid over `size`, row-major
///
/// Points are `((j + 0.5) * W / k, (i + 0.5) * H / k)`. Returns an empty grid
/// for `k <= 0`. The order is relied upon to trace results back to their
/// originating point.
#[must_use]
pub fn generate_point_grid(size: ImageSize, points_per_side: i32) -> Vec<Point> {
    if points_per_side <= 0 {
        return Vec::new();
    }

    let k = points_per_side as usize;
    let step_x = size.width as f32 / points_per_side as f32;
    let step_y = size.height as f32 / points_per_side as f32;

    let mut points = Vec::with_capacity(k * k);
    for i in 0..k {
        let y = (i as f32 + 0.5) * step_y;
        for j in 0..k {
            points.push(Point::new((j as f32 + 0.5) * step_x, y));
        }
    }
    points
}
