//! Mask overlay rendering for CLI output

use crate::{
    error::Result,
    types::{BoundingBox, SegmentationResult},
};
use image::{DynamicImage, Rgba, RgbaImage};

const MASK_COLOR: [u8; 3] = [0, 255, 0];
const MASK_ALPHA: u16 = 128;
const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Draw one candidate over a copy of the source image
///
/// The mask is scaled to the image with nearest-neighbour sampling and
/// blended half-transparent; the bounding box is stroked on top.
pub(crate) fn render_overlay(image: &DynamicImage, result: &SegmentationResult) -> Result<RgbaImage> {
    let mut canvas = image.to_rgba8();
    let (width, height) = canvas.dimensions();
    let mask = result.mask.resize_nearest(width, height)?;

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if mask.get(x, y) {
            blend(pixel, MASK_COLOR, MASK_ALPHA);
        }
    }

    let stroke = (width / 200).max(2);
    stroke_box(&mut canvas, &result.bounding_box, stroke);
    Ok(canvas)
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: u16) {
    for (channel, &value) in pixel.0.iter_mut().zip(color.iter()) {
        let mixed = (u16::from(value) * alpha + u16::from(*channel) * (255 - alpha)) / 255;
        *channel = mixed as u8;
    }
}

fn stroke_box(canvas: &mut RgbaImage, bbox: &BoundingBox, stroke: u32) {
    let stroke = stroke as i32;
    for t in 0..stroke.min(bbox.width).min(bbox.height).max(1) {
        for x in bbox.x..bbox.right() {
            put_clipped(canvas, x, bbox.y + t);
            put_clipped(canvas, x, bbox.bottom() - 1 - t);
        }
        for y in bbox.y..bbox.bottom() {
            put_clipped(canvas, bbox.x + t, y);
            put_clipped(canvas, bbox.right() - 1 - t, y);
        }
    }
}

fn put_clipped(canvas: &mut RgbaImage, x: i32, y: i32) {
    let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
        return;
    };
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, BOX_COLOR);
    }
}
