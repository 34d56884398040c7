//! Feature maps computed once per image and sampled per candidate region.

use std::f32::consts::PI;

use palette::{FromColor, Lab, Srgb};
use printqc_comparator::pipeline::{ops, preprocess};
use printqc_types::{RGB_CHANNELS, RgbFrame};
use rayon::prelude::*;

#[rustfmt::skip]
pub const EDGE_HORIZONTAL: [f32; 9] = [
    -1.0, -1.0, -1.0,
     0.0,  0.0,  0.0,
     1.0,  1.0,  1.0,
];
#[rustfmt::skip]
pub const EDGE_VERTICAL: [f32; 9] = [
    -1.0, 0.0, 1.0,
    -1.0, 0.0, 1.0,
    -1.0, 0.0, 1.0,
];
#[rustfmt::skip]
pub const EDGE_DIAGONAL_45: [f32; 9] = [
     0.0,  1.0, 1.0,
    -1.0,  0.0, 1.0,
    -1.0, -1.0, 0.0,
];
#[rustfmt::skip]
pub const EDGE_DIAGONAL_135: [f32; 9] = [
    1.0,  1.0,  0.0,
    1.0,  0.0, -1.0,
    0.0, -1.0, -1.0,
];

// Text density: binarized edges closed along lines, then across them.
const TEXT_EDGE_THRESHOLD: u8 = 30;
const TEXT_LINE_CLOSE: (usize, usize) = (25, 3);
const TEXT_BLOCK_CLOSE: (usize, usize) = (3, 8);
const TEXT_DILATE: (usize, usize) = (5, 5);
const HIGH_FREQUENCY_BLUR: usize = 5;
// Flat color: local Lab deviation below this, over a square window.
const FLAT_WINDOW: usize = 15;
const FLAT_MAX_DEVIATION: f32 = 12.0;
const FLAT_CLEANUP: (usize, usize) = (7, 7);

/// Max absolute response of the four directional 3x3 kernels.
pub fn multi_edge_response(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    let plane = ops::to_f32(gray);
    let mut combined = vec![0.0f32; plane.len()];
    for kernel in [EDGE_HORIZONTAL, EDGE_VERTICAL, EDGE_DIAGONAL_45, EDGE_DIAGONAL_135] {
        let response = ops::filter2d(&plane, width, height, &kernel, 3, 3);
        for (out, value) in combined.iter_mut().zip(response) {
            *out = out.max(value.abs());
        }
    }
    combined
        .into_iter()
        .map(|value| value.clamp(0.0, 255.0) as u8)
        .collect()
}

/// Detail left over after a small Gaussian blur.
pub fn high_frequency(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    let blurred = ops::gaussian_blur_u8(gray, width, height, HIGH_FREQUENCY_BLUR);
    ops::absdiff(gray, &blurred)
}

/// Mask of probable text blocks.
pub fn text_density(edges: &[u8], width: usize, height: usize) -> Vec<u8> {
    let binary = ops::threshold_binary(edges, TEXT_EDGE_THRESHOLD);
    let lines = ops::close_rect(&binary, width, height, TEXT_LINE_CLOSE, 1);
    let blocks = ops::close_rect(&lines, width, height, TEXT_BLOCK_CLOSE, 1);
    ops::dilate_rect(&blocks, width, height, TEXT_DILATE, 1)
}

/// Lab planes on the 8-bit scale (L * 255 / 100, a + 128, b + 128).
fn lab_planes(frame: &RgbFrame) -> [Vec<f32>; 3] {
    let count = frame.pixel_count();
    let mut planes = [
        Vec::with_capacity(count),
        Vec::with_capacity(count),
        Vec::with_capacity(count),
    ];
    for px in frame.data().chunks_exact(RGB_CHANNELS) {
        let rgb: Srgb<f32> = Srgb::new(px[0], px[1], px[2]).into_format();
        let lab = Lab::from_color(rgb.into_linear());
        planes[0].push(lab.l * 255.0 / 100.0);
        planes[1].push(lab.a + 128.0);
        planes[2].push(lab.b + 128.0);
    }
    planes
}

/// Mask of solid color fills: low local Lab variance, cleaned by open+close.
pub fn flat_color_mask(frame: &RgbFrame) -> Vec<u8> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let mut variance = vec![0.0f32; width * height];
    for plane in lab_planes(frame) {
        let squared: Vec<f32> = plane.iter().map(|v| v * v).collect();
        let mean = ops::box_mean(&plane, width, height, FLAT_WINDOW);
        let mean_sq = ops::box_mean(&squared, width, height, FLAT_WINDOW);
        for ((total, m), m2) in variance.iter_mut().zip(&mean).zip(&mean_sq) {
            *total += (m2 - m * m).max(0.0);
        }
    }
    let mask: Vec<u8> = variance
        .iter()
        .map(|&v| if v.sqrt() < FLAT_MAX_DEVIATION { 255 } else { 0 })
        .collect();
    let opened = ops::open_rect(&mask, width, height, FLAT_CLEANUP, 1);
    ops::close_rect(&opened, width, height, FLAT_CLEANUP, 1)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaborSettings {
    pub ksize: usize,
    pub sigmas: Vec<f32>,
    pub lambdas: Vec<f32>,
    pub orientations: usize,
    pub gamma: f32,
    /// Longest side of the plane the bank is applied to; larger images are
    /// downscaled and the bank shrinks with them.
    pub working_side: usize,
}

impl Default for GaborSettings {
    fn default() -> Self {
        Self {
            ksize: 31,
            sigmas: vec![3.0, 5.0],
            lambdas: vec![8.0, 12.0],
            orientations: 8,
            gamma: 0.5,
            working_side: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaborKernel {
    pub size: usize,
    pub taps: Vec<f32>,
}

/// Real Gabor kernel with zero phase, normalized by its sum.
pub fn gabor_kernel(ksize: usize, sigma: f32, theta: f32, lambda: f32, gamma: f32) -> GaborKernel {
    let half = (ksize / 2) as isize;
    let size = (2 * half + 1) as usize;
    let sigma_x = sigma;
    let sigma_y = sigma / gamma;
    let ex = -0.5 / (sigma_x * sigma_x);
    let ey = -0.5 / (sigma_y * sigma_y);
    let scale = 2.0 * PI / lambda;
    let (s, c) = theta.sin_cos();
    let mut taps = vec![0.0f32; size * size];
    for y in -half..=half {
        for x in -half..=half {
            let (xf, yf) = (x as f32, y as f32);
            let xr = xf * c + yf * s;
            let yr = -xf * s + yf * c;
            let value = (ex * xr * xr + ey * yr * yr).exp() * (scale * xr).cos();
            let row = (half - y) as usize;
            let col = (half - x) as usize;
            taps[row * size + col] = value;
        }
    }
    let sum: f32 = taps.iter().sum::<f32>() + 1e-7;
    for tap in taps.iter_mut() {
        *tap /= sum;
    }
    GaborKernel { size, taps }
}

/// Filter bank over every (sigma, lambda, orientation) combination.
#[derive(Debug, Clone)]
pub struct GaborBank {
    settings: GaborSettings,
}

impl Default for GaborBank {
    fn default() -> Self {
        Self::new(GaborSettings::default())
    }
}

impl GaborBank {
    pub fn new(settings: GaborSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GaborSettings {
        &self.settings
    }

    /// Kernels scaled for a plane `1 / factor` the size of the original.
    pub fn kernels(&self, factor: f32) -> Vec<GaborKernel> {
        let settings = &self.settings;
        let factor = factor.max(1.0);
        let mut ksize = ((settings.ksize as f32 / factor).round() as usize).max(3);
        if ksize % 2 == 0 {
            ksize += 1;
        }
        let mut bank = Vec::with_capacity(settings.sigmas.len() * settings.lambdas.len() * settings.orientations);
        for &sigma in &settings.sigmas {
            for &lambda in &settings.lambdas {
                for i in 0..settings.orientations {
                    let theta = i as f32 * PI / settings.orientations as f32;
                    bank.push(gabor_kernel(ksize, sigma / factor, theta, lambda / factor, settings.gamma));
                }
            }
        }
        bank
    }

    /// Mean absolute response over the bank, stretched onto `0..=255`.
    pub fn texture_energy(&self, gray: &[u8], width: usize, height: usize) -> Vec<u8> {
        let longest = width.max(height);
        if longest == 0 {
            return Vec::new();
        }
        let factor = (longest as f32 / self.settings.working_side.max(1) as f32).max(1.0);
        let work_w = ((width as f32 / factor).round() as usize).max(1);
        let work_h = ((height as f32 / factor).round() as usize).max(1);
        let plane = ops::to_f32(gray);
        let plane = if factor > 1.0 {
            ops::resize_average(&plane, width, height, work_w, work_h)
        } else {
            plane
        };

        let kernels = self.kernels(factor);
        let total = kernels
            .par_iter()
            .map(|kernel| {
                ops::filter2d(&plane, work_w, work_h, &kernel.taps, kernel.size, kernel.size)
                    .into_iter()
                    .map(f32::abs)
                    .collect::<Vec<f32>>()
            })
            .reduce(
                || vec![0.0f32; work_w * work_h],
                |mut acc, response| {
                    for (a, r) in acc.iter_mut().zip(response) {
                        *a += r;
                    }
                    acc
                },
            );
        let count = kernels.len().max(1) as f32;
        let mean: Vec<f32> = total.into_iter().map(|value| value / count).collect();
        let energy = if factor > 1.0 {
            ops::resize_bilinear(&mean, work_w, work_h, width, height)
        } else {
            mean
        };
        ops::normalize_min_max(&energy)
    }
}

/// Per-image maps sampled by the element classifier.
#[derive(Debug, Clone)]
pub struct FeatureMaps {
    pub width: usize,
    pub height: usize,
    pub gray: Vec<u8>,
    pub edges: Vec<u8>,
    pub texture: Vec<u8>,
    pub text_density: Vec<u8>,
    pub high_frequency: Vec<u8>,
    pub flat: Vec<u8>,
}

impl FeatureMaps {
    pub fn compute(frame: &RgbFrame, bank: &GaborBank) -> Self {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let gray = preprocess::grayscale(frame);
        let edges = multi_edge_response(&gray, width, height);
        let texture = bank.texture_energy(&gray, width, height);
        let text_density = text_density(&edges, width, height);
        let high_frequency = high_frequency(&gray, width, height);
        let flat = flat_color_mask(frame);
        Self {
            width,
            height,
            gray,
            edges,
            texture,
            text_density,
            high_frequency,
            flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_split(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| if i % width < width / 2 { 0 } else { 255 })
            .collect()
    }

    #[test]
    fn edge_response_fires_on_boundaries_only() {
        let gray = vertical_split(20, 10);
        let edges = multi_edge_response(&gray, 20, 10);
        assert_eq!(edges[5 * 20 + 2], 0);
        assert_eq!(edges[5 * 20 + 10], 255);
        assert_eq!(edges[5 * 20 + 17], 0);
    }

    #[test]
    fn bank_covers_all_scales_and_orientations() {
        let bank = GaborBank::default();
        let kernels = bank.kernels(1.0);
        assert_eq!(kernels.len(), 32);
        assert!(kernels.iter().all(|k| k.size == 31 && k.taps.len() == 31 * 31));
        let shrunk = bank.kernels(4.0);
        assert_eq!(shrunk[0].size, 9);
    }

    #[test]
    fn flat_image_has_no_texture_or_detail() {
        let gray = vec![128u8; 64 * 48];
        let bank = GaborBank::default();
        assert!(bank.texture_energy(&gray, 64, 48).iter().all(|&v| v == 0));
        assert!(high_frequency(&gray, 64, 48).iter().all(|&v| v == 0));
    }

    #[test]
    fn texture_energy_keeps_full_resolution() {
        let gray: Vec<u8> = (0..300 * 200).map(|i| ((i % 300) / 4 % 2 * 255) as u8).collect();
        let energy = GaborBank::default().texture_energy(&gray, 300, 200);
        assert_eq!(energy.len(), 300 * 200);
        assert_eq!(energy.iter().copied().max(), Some(255));
    }

    #[test]
    fn flat_mask_marks_solid_fills() {
        let frame = RgbFrame::filled(40, 40, [20, 120, 220]);
        assert!(flat_color_mask(&frame).iter().all(|&v| v == 255));

        let data: Vec<u8> = (0..40 * 40)
            .flat_map(|i| if (i / 40 + i % 40) % 2 == 0 { [0, 0, 0] } else { [255, 255, 255] })
            .collect();
        let checker = RgbFrame::from_owned(40, 40, data).unwrap();
        assert!(flat_color_mask(&checker).iter().all(|&v| v == 0));
    }

    #[test]
    fn text_density_joins_characters_into_blocks() {
        let (width, height) = (120, 60);
        let mut gray = vec![255u8; width * height];
        for line in 0..3 {
            for glyph in 0..12 {
                let (x0, y0) = (10 + glyph * 8, 10 + line * 14);
                for y in y0..y0 + 8 {
                    for x in x0..x0 + 4 {
                        gray[y * width + x] = 0;
                    }
                }
            }
        }
        let edges = multi_edge_response(&gray, width, height);
        let density = text_density(&edges, width, height);
        // Gaps between glyphs and between lines are filled.
        assert_eq!(density[12 * width + 16], 255);
        assert_eq!(density[21 * width + 40], 255);
        assert_eq!(density[2 * width + 60], 0);
    }
}
