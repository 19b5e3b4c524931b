//! Exporting prediction blocks.
//!
//! Two forms are supported: a headerless `u8` wire layout for viewers that
//! fetch raw chunks, and per-z-slice PNG previews tinted with class colors.

use crate::classifier::annotation::Color;
use crate::core::block::Block;
use crate::core::error::{EngineError, EngineResult};
use crate::core::geometry::{Axis, Region};
use image::{ImageFormat, RgbImage};
use std::io::Cursor;

const WIRE_AXES: [Axis; 4] = [Axis::C, Axis::Z, Axis::Y, Axis::X];

fn to_byte(probability: f32) -> u8 {
    (probability.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// One byte per voxel per channel for `region`, x fastest, then y, z and c.
///
/// `region` must lie inside the predictions and span a single time point.
pub fn to_u8_wire(predictions: &Block, region: &Region) -> EngineResult<Vec<u8>> {
    if !predictions.region().contains(region) {
        return Err(EngineError::InvalidInput(format!(
            "region {} is outside predictions {}",
            region,
            predictions.region()
        )));
    }
    let values = predictions.cut(region)?.raw_axes(&WIRE_AXES)?;
    Ok(values.into_iter().map(to_byte).collect())
}

/// Render every z slice as a PNG.
///
/// Each channel is tinted with its class color scaled by alpha; the tints are
/// summed and saturated.
pub fn render_z_slice_pngs(predictions: &Block, colors: &[Color]) -> EngineResult<Vec<Vec<u8>>> {
    let region = predictions.region();
    if region.len(Axis::C) != colors.len() as i64 {
        return Err(EngineError::ShapeMismatch(format!(
            "{} colors for predictions with {} channels",
            colors.len(),
            region.len(Axis::C)
        )));
    }
    let values = predictions.raw_axes(&[Axis::Z, Axis::Y, Axis::X, Axis::C])?;
    let (height, width) = (region.len(Axis::Y) as usize, region.len(Axis::X) as usize);
    let channels = colors.len();
    let tints: Vec<[f32; 3]> = colors
        .iter()
        .map(|color| {
            let alpha = f32::from(color.a) / 255.0;
            [
                f32::from(color.r) * alpha,
                f32::from(color.g) * alpha,
                f32::from(color.b) * alpha,
            ]
        })
        .collect();

    let slice_len = height * width * channels;
    let mut slices = Vec::with_capacity(region.len(Axis::Z) as usize);
    for slice in values.chunks(slice_len.max(1)).take(region.len(Axis::Z) as usize) {
        let mut pixels = Vec::with_capacity(height * width * 3);
        for voxel in slice.chunks(channels.max(1)) {
            let mut rgb = [0.0f32; 3];
            for (probability, tint) in voxel.iter().zip(&tints) {
                let weight = probability.clamp(0.0, 1.0);
                for (out, component) in rgb.iter_mut().zip(tint) {
                    *out += weight * component;
                }
            }
            pixels.extend(rgb.iter().map(|v| v.round().min(255.0) as u8));
        }
        let image = RgbImage::from_raw(width as u32, height as u32, pixels)
            .ok_or_else(|| EngineError::Encoding("pixel buffer does not match image size".to_string()))?;
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| EngineError::Encoding(format!("failed to encode slice: {}", e)))?;
        slices.push(buffer.into_inner());
    }
    Ok(slices)
}
