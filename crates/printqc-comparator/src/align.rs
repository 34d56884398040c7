//! Geometric normalization of the sample onto the master frame.
//!
//! The sample is scaled to fit inside the master, padded to the master's
//! size with the master's border color, and then shifted by the
//! translation that maximizes the enhanced correlation coefficient (ECC)
//! between the two luminance planes. Alignment failures are not errors:
//! the padded sample is used as-is.

use image::RgbImage;
use image::imageops::{self, FilterType};
use log::debug;
use printqc_types::{InputError, RGB_CHANNELS, RgbFrame};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::{ops, preprocess};

// Pre-smoothing aperture applied to both planes before alignment.
const SMOOTHING_KERNEL: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum AlignError {
    #[error("master has no intensity variation to align against")]
    FlatTemplate,
    #[error("sample gradients are degenerate")]
    SingularHessian,
    #[error("correlation diverged at iteration {iteration}")]
    Diverged { iteration: usize },
    #[error("no convergence after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("plane of {len} values does not match {width}x{height}")]
    PlaneSize {
        len: usize,
        width: usize,
        height: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentSettings {
    pub max_iterations: usize,
    /// Stop once the correlation coefficient changes by less than this.
    pub epsilon: f64,
    /// Alignment runs on a copy whose longest side is at most this.
    pub max_working_side: usize,
    /// Translations smaller than this (in pixels) are not applied.
    pub min_applied_shift: f32,
    /// Largest accepted shift as a fraction of the shorter side.
    pub max_shift_ratio: f32,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            epsilon: 1e-5,
            max_working_side: 512,
            min_applied_shift: 0.25,
            max_shift_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlignmentOutcome {
    /// Geometry already matched; no shift was needed.
    Unchanged,
    Translated { dx: f32, dy: f32 },
    /// Translation estimation failed; the resized sample is used.
    Fallback { reason: String },
}

#[derive(Debug, Clone)]
pub struct Alignment {
    pub frame: RgbFrame,
    pub resized: bool,
    pub outcome: AlignmentOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct Aligner {
    settings: AlignmentSettings,
}

impl Aligner {
    pub fn new(settings: AlignmentSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }

    /// Produces a copy of `sample` congruent to `master`.
    pub fn align(&self, master: &RgbFrame, sample: &RgbFrame) -> Result<Alignment, InputError> {
        if master.is_empty() || sample.is_empty() {
            return Err(InputError::invalid_frame("cannot align an empty image"));
        }
        let resized = (master.width(), master.height()) != (sample.width(), sample.height());
        let fitted = if resized {
            fit_to_frame(master, sample)?
        } else {
            sample.clone()
        };

        let (width, height) = (master.width() as usize, master.height() as usize);
        let template = preprocess::grayscale_f32(master);
        let input = preprocess::grayscale_f32(&fitted);
        let outcome = match self.estimate_translation(&template, &input, width, height) {
            Ok((dx, dy)) if dx.abs().max(dy.abs()) < self.settings.min_applied_shift => {
                AlignmentOutcome::Unchanged
            }
            Ok((dx, dy)) => AlignmentOutcome::Translated { dx, dy },
            Err(err) => {
                debug!("alignment fell back to resize only: {err}");
                AlignmentOutcome::Fallback {
                    reason: err.to_string(),
                }
            }
        };

        let frame = match outcome {
            AlignmentOutcome::Translated { dx, dy } => translate(&fitted, dx, dy)?,
            _ => fitted,
        };
        Ok(Alignment {
            frame,
            resized,
            outcome,
        })
    }

    /// Estimates `(dx, dy)` such that `input(x + dx, y + dy)` best matches
    /// `template(x, y)`.
    pub fn estimate_translation(
        &self,
        template: &[f32],
        input: &[f32],
        width: usize,
        height: usize,
    ) -> Result<(f32, f32), AlignError> {
        if let Some(plane) = [template, input].into_iter().find(|plane| plane.len() != width * height) {
            return Err(AlignError::PlaneSize {
                len: plane.len(),
                width,
                height,
            });
        }

        let longest = width.max(height);
        let scale = (longest as f32 / self.settings.max_working_side.max(1) as f32).max(1.0);
        let (work_w, work_h) = (
            ((width as f32 / scale).round() as usize).max(1),
            ((height as f32 / scale).round() as usize).max(1),
        );
        let shrink = |plane: &[f32]| {
            let plane = if scale > 1.0 {
                ops::resize_average(plane, width, height, work_w, work_h)
            } else {
                plane.to_vec()
            };
            ops::gaussian_blur(&plane, work_w, work_h, SMOOTHING_KERNEL)
        };
        let template = shrink(template);
        let input = shrink(input);
        let n = (work_w * work_h) as f64;

        let template_mean = template.iter().map(|&v| v as f64).sum::<f64>() / n;
        let tz: Vec<f64> = template.iter().map(|&v| v as f64 - template_mean).collect();
        let template_norm = tz.iter().map(|v| v * v).sum::<f64>().sqrt();
        if template_norm < 1e-6 {
            return Err(AlignError::FlatTemplate);
        }

        let (gx, gy) = ops::sobel(&input, work_w, work_h);
        // Sobel sums 8x the central difference.
        let gx: Vec<f32> = gx.iter().map(|v| v / 8.0).collect();
        let gy: Vec<f32> = gy.iter().map(|v| v / 8.0).collect();
        let max_shift = work_w.min(work_h) as f64 * self.settings.max_shift_ratio as f64;

        let (mut dx, mut dy) = (0.0f64, 0.0f64);
        let mut last_rho = f64::NEG_INFINITY;
        let mut warped = vec![0.0f64; tz.len()];
        let mut warped_gx = vec![0.0f64; tz.len()];
        let mut warped_gy = vec![0.0f64; tz.len()];
        for iteration in 0..self.settings.max_iterations {
            for y in 0..work_h {
                for x in 0..work_w {
                    let sx = x as f32 + dx as f32;
                    let sy = y as f32 + dy as f32;
                    let idx = y * work_w + x;
                    warped[idx] = ops::sample_bilinear(&input, work_w, work_h, sx, sy) as f64;
                    warped_gx[idx] = ops::sample_bilinear(&gx, work_w, work_h, sx, sy) as f64;
                    warped_gy[idx] = ops::sample_bilinear(&gy, work_w, work_h, sx, sy) as f64;
                }
            }
            let warped_mean = warped.iter().sum::<f64>() / n;

            let (mut hxx, mut hxy, mut hyy) = (0.0f64, 0.0f64, 0.0f64);
            let (mut gt_x, mut gt_y, mut gi_x, mut gi_y) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
            let (mut input_norm2, mut correlation) = (0.0f64, 0.0f64);
            for idx in 0..tz.len() {
                let (gxv, gyv) = (warped_gx[idx], warped_gy[idx]);
                let iz = warped[idx] - warped_mean;
                hxx += gxv * gxv;
                hxy += gxv * gyv;
                hyy += gyv * gyv;
                gt_x += gxv * tz[idx];
                gt_y += gyv * tz[idx];
                gi_x += gxv * iz;
                gi_y += gyv * iz;
                input_norm2 += iz * iz;
                correlation += iz * tz[idx];
            }

            let det = hxx * hyy - hxy * hxy;
            if !det.is_finite() || det.abs() < 1e-9 {
                return Err(AlignError::SingularHessian);
            }
            let rho = correlation / (input_norm2.sqrt() * template_norm);
            if !rho.is_finite() {
                return Err(AlignError::Diverged { iteration });
            }
            if (rho - last_rho).abs() < self.settings.epsilon {
                debug!("alignment converged after {iteration} iterations (rho={rho:.5})");
                return Ok(((dx * scale as f64) as f32, (dy * scale as f64) as f32));
            }
            last_rho = rho;

            let inv = |a: f64, b: f64| ((hyy * a - hxy * b) / det, (hxx * b - hxy * a) / det);
            let (hgi_x, hgi_y) = inv(gi_x, gi_y);
            let lambda_n = input_norm2 - (gi_x * hgi_x + gi_y * hgi_y);
            let lambda_d = correlation - (gt_x * hgi_x + gt_y * hgi_y);
            if lambda_d <= 0.0 {
                return Err(AlignError::Diverged { iteration });
            }
            let lambda = lambda_n / lambda_d;
            let (step_x, step_y) = inv(lambda * gt_x - gi_x, lambda * gt_y - gi_y);
            dx += step_x;
            dy += step_y;
            if !dx.is_finite() || !dy.is_finite() || dx.abs().max(dy.abs()) > max_shift {
                return Err(AlignError::Diverged { iteration });
            }
        }
        Err(AlignError::NotConverged {
            iterations: self.settings.max_iterations,
        })
    }
}

/// Scales `sample` to fit inside `master` (aspect preserved) and centers it
/// on a canvas of the master's size filled with the master's border color.
pub fn fit_to_frame(master: &RgbFrame, sample: &RgbFrame) -> Result<RgbFrame, InputError> {
    let (target_w, target_h) = (master.width() as usize, master.height() as usize);
    let (src_w, src_h) = (sample.width() as usize, sample.height() as usize);
    let scale = (target_w as f32 / src_w as f32).min(target_h as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).round() as usize).clamp(1, target_w);
    let new_h = ((src_h as f32 * scale).round() as usize).clamp(1, target_h);

    let scaled = if (new_w, new_h) == (src_w, src_h) {
        sample.clone()
    } else if scale < 1.0 {
        preprocess::resize_area(sample, new_w, new_h)?
    } else {
        resize_lanczos(sample, new_w, new_h)?
    };
    if (new_w, new_h) == (target_w, target_h) {
        return Ok(scaled);
    }

    let fill = preprocess::border_mean(master);
    let mut canvas = Vec::with_capacity(target_w * target_h * RGB_CHANNELS);
    for _ in 0..target_w * target_h {
        canvas.extend_from_slice(&fill);
    }
    let offset_x = (target_w - new_w) / 2;
    let offset_y = (target_h - new_h) / 2;
    let row_bytes = new_w * RGB_CHANNELS;
    for y in 0..new_h {
        let dst = ((offset_y + y) * target_w + offset_x) * RGB_CHANNELS;
        let src = y * row_bytes;
        canvas[dst..dst + row_bytes].copy_from_slice(&scaled.data()[src..src + row_bytes]);
    }
    RgbFrame::from_owned(target_w as u32, target_h as u32, canvas)
}

fn resize_lanczos(frame: &RgbFrame, width: usize, height: usize) -> Result<RgbFrame, InputError> {
    let image = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| InputError::invalid_frame("RGB buffer does not match its dimensions"))?;
    let resized = imageops::resize(&image, width as u32, height as u32, FilterType::Lanczos3);
    RgbFrame::from_owned(width as u32, height as u32, resized.into_raw())
}

/// Resamples `frame` so that output `(x, y)` reads input `(x + dx, y + dy)`,
/// replicating edge pixels.
pub fn translate(frame: &RgbFrame, dx: f32, dy: f32) -> Result<RgbFrame, InputError> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let planes = preprocess::channel_planes(frame);
    let shifted = planes.map(|plane| {
        let mut out = Vec::with_capacity(plane.len());
        for y in 0..height {
            for x in 0..width {
                out.push(ops::sample_bilinear(
                    &plane,
                    width,
                    height,
                    x as f32 + dx,
                    y as f32 + dy,
                ));
            }
        }
        out
    });
    preprocess::frame_from_planes(&shifted, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(width: usize, height: usize, shift_x: f32, shift_y: f32) -> RgbFrame {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let fx = x as f32 - shift_x;
                let fy = y as f32 - shift_y;
                let value = 128.0 + 60.0 * (fx / 9.0).sin() + 50.0 * (fy / 11.0).cos();
                let value = value.round().clamp(0.0, 255.0) as u8;
                data.extend_from_slice(&[value, value, value]);
            }
        }
        RgbFrame::from_owned(width as u32, height as u32, data).unwrap()
    }

    fn mean_abs_diff(a: &RgbFrame, b: &RgbFrame) -> f32 {
        let sum: u64 = a
            .data()
            .iter()
            .zip(b.data())
            .map(|(&x, &y)| x.abs_diff(y) as u64)
            .sum();
        sum as f32 / a.data().len() as f32
    }

    #[test]
    fn identical_frames_are_left_alone() {
        let frame = pattern(96, 80, 0.0, 0.0);
        let alignment = Aligner::default().align(&frame, &frame).unwrap();
        assert_eq!(alignment.outcome, AlignmentOutcome::Unchanged);
        assert!(!alignment.resized);
        assert_eq!(alignment.frame.data(), frame.data());
    }

    #[test]
    fn flat_master_falls_back() {
        let master = RgbFrame::filled(64, 64, [200, 200, 200]);
        let sample = pattern(64, 64, 0.0, 0.0);
        let alignment = Aligner::default().align(&master, &sample).unwrap();
        assert!(matches!(alignment.outcome, AlignmentOutcome::Fallback { .. }));
        assert_eq!(alignment.frame.data(), sample.data());
    }

    #[test]
    fn recovers_small_translation() {
        let master = pattern(120, 100, 0.0, 0.0);
        let sample = pattern(120, 100, 3.0, 2.0);
        let alignment = Aligner::default().align(&master, &sample).unwrap();
        match alignment.outcome {
            AlignmentOutcome::Translated { dx, dy } => {
                assert!((dx - 3.0).abs() < 0.5, "dx={dx}");
                assert!((dy - 2.0).abs() < 0.5, "dy={dy}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(mean_abs_diff(&master, &alignment.frame) < mean_abs_diff(&master, &sample));
    }

    #[test]
    fn smaller_sample_is_scaled_and_padded() {
        let master = RgbFrame::filled(100, 100, [10, 20, 30]);
        let sample = RgbFrame::filled(50, 25, [200, 200, 200]);
        let fitted = fit_to_frame(&master, &sample).unwrap();
        assert_eq!((fitted.width(), fitted.height()), (100, 100));
        assert_eq!(fitted.pixel(50, 50), [200, 200, 200]);
        assert_eq!(fitted.pixel(50, 5), [10, 20, 30]);
        assert_eq!(fitted.pixel(50, 95), [10, 20, 30]);
    }

    #[test]
    fn larger_sample_is_downscaled() {
        let master = RgbFrame::filled(40, 40, [0, 0, 0]);
        let sample = RgbFrame::filled(80, 80, [90, 90, 90]);
        let fitted = fit_to_frame(&master, &sample).unwrap();
        assert_eq!((fitted.width(), fitted.height()), (40, 40));
        assert_eq!(fitted.pixel(0, 0), [90, 90, 90]);
    }

    #[test]
    fn mismatched_planes_are_an_error() {
        let template = vec![0.0; 16 * 16];
        let input = vec![0.0; 16 * 15];
        let result = Aligner::default().estimate_translation(&template, &input, 16, 16);
        assert_eq!(
            result,
            Err(AlignError::PlaneSize {
                len: 240,
                width: 16,
                height: 16
            })
        );
    }

    #[test]
    fn translate_shifts_content() {
        let mut data = vec![0u8; 8 * 8 * 3];
        let idx = (4 * 8 + 4) * 3;
        data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        let frame = RgbFrame::from_owned(8, 8, data).unwrap();
        let shifted = translate(&frame, 1.0, 2.0).unwrap();
        assert_eq!(shifted.pixel(3, 2), [255, 255, 255]);
        assert_eq!(shifted.pixel(4, 4), [0, 0, 0]);
    }
}
