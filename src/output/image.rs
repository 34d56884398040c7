use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use printqc_types::{
    Difference, DifferenceKind, InputError, PixelRect, RGB_CHANNELS, RgbFrame, Severity,
};

use crate::output::error::OutputError;

// Heatmap blend weights: sample, then colorized difference map.
const SAMPLE_WEIGHT: f32 = 0.55;
const HEAT_WEIGHT: f32 = 0.45;

const CRITICAL_COLOR: [u8; 3] = [220, 38, 38];
const IMPORTANT_COLOR: [u8; 3] = [245, 158, 11];
const MINOR_COLOR: [u8; 3] = [59, 130, 246];
const SPELLING_COLOR: [u8; 3] = [249, 115, 22];

pub fn encode_jpeg(frame: &RgbFrame, quality: u8) -> Result<Vec<u8>, OutputError> {
    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    encoder.encode(frame.data(), frame.width(), frame.height(), ColorType::Rgb8)?;
    Ok(encoded)
}

pub fn encode_png(frame: &RgbFrame) -> Result<Vec<u8>, OutputError> {
    let mut encoded = Vec::new();
    let encoder = PngEncoder::new(&mut encoded);
    encoder.write_image(frame.data(), frame.width(), frame.height(), ColorType::Rgb8)?;
    Ok(encoded)
}

/// JET colormap value for an 8-bit intensity.
fn jet(value: u8) -> [f32; 3] {
    let v = value as f32 / 255.0;
    let channel = |center: f32| (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0) * 255.0;
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// Colorized difference map blended over the sample.
pub fn heatmap(sample: &RgbFrame, difference_map: &[u8]) -> Result<RgbFrame, InputError> {
    if difference_map.len() != sample.pixel_count() {
        return Err(InputError::invalid_frame(format!(
            "difference map holds {} values for a {}x{} sample",
            difference_map.len(),
            sample.width(),
            sample.height()
        )));
    }
    let mut data = Vec::with_capacity(sample.data().len());
    for (px, &value) in sample.data().chunks_exact(RGB_CHANNELS).zip(difference_map) {
        let heat = jet(value);
        for channel in 0..RGB_CHANNELS {
            let blended = SAMPLE_WEIGHT * px[channel] as f32 + HEAT_WEIGHT * heat[channel];
            data.push(blended.round().clamp(0.0, 255.0) as u8);
        }
    }
    RgbFrame::from_owned(sample.width(), sample.height(), data)
}

fn outline_color(difference: &Difference) -> [u8; 3] {
    if difference.kind == DifferenceKind::Spelling {
        return SPELLING_COLOR;
    }
    match difference.severity {
        Severity::Critical => CRITICAL_COLOR,
        Severity::Important => IMPORTANT_COLOR,
        Severity::Minor | Severity::Info => MINOR_COLOR,
    }
}

/// Copy of the sample with every difference outlined in its severity color.
pub fn annotate(sample: &RgbFrame, differences: &[Difference]) -> Result<RgbFrame, InputError> {
    let (width, height) = (sample.width() as usize, sample.height() as usize);
    let mut buffer = sample.data().to_vec();
    let thickness = (width.min(height) / 300).max(2);
    for difference in differences {
        let rect = difference.bbox.to_pixels(width, height);
        draw_rectangle(&mut buffer, width, height, rect, thickness, outline_color(difference));
    }
    RgbFrame::from_owned(sample.width(), sample.height(), buffer)
}

fn draw_rectangle(
    buffer: &mut [u8],
    width: usize,
    height: usize,
    rect: PixelRect,
    thickness: usize,
    color: [u8; 3],
) {
    let rect = rect.clamp_to(width, height);
    if rect.is_empty() {
        return;
    }
    let (x0, y0) = (rect.x, rect.y);
    let (x1, y1) = (rect.right() - 1, rect.bottom() - 1);
    let thickness = thickness.min(rect.width.min(rect.height).div_ceil(2)).max(1);
    for offset in 0..thickness {
        let (top, bottom) = (y0 + offset, y1 - offset);
        for x in x0..=x1 {
            tint_pixel(buffer, width, top, x, color);
            tint_pixel(buffer, width, bottom, x, color);
        }
        let (left, right) = (x0 + offset, x1 - offset);
        for y in y0..=y1 {
            tint_pixel(buffer, width, y, left, color);
            tint_pixel(buffer, width, y, right, color);
        }
    }
}

fn tint_pixel(buffer: &mut [u8], width: usize, y: usize, x: usize, color: [u8; 3]) {
    let idx = (y * width + x) * RGB_CHANNELS;
    if idx + 2 >= buffer.len() {
        return;
    }
    buffer[idx..idx + 3].copy_from_slice(&color);
}
