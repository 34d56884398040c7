use log::debug;
use printqc_types::{InputError, PixelRect, RgbFrame, Zone};

use crate::pipeline::components::external_components;
use crate::pipeline::{ops, preprocess};
use crate::structural::structural_similarity;

// Smallest side accepted for structural comparison.
const MIN_DIMENSION: usize = 8;
// Weights of the structural and absolute maps in the fused map.
const STRUCTURAL_WEIGHT: f32 = 0.6;
const ABSOLUTE_WEIGHT: f32 = 0.4;
const DILATE_ITERATIONS: usize = 2;
const ERODE_ITERATIONS: usize = 1;
// Floor for the region area; larger images use 8 pixels per 100k.
const MIN_REGION_AREA: usize = 80;
const MIN_REGION_AREA_PER_100K: usize = 8;

/// Sensitivity knobs of a comparison, both on a 0..=100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSettings {
    /// Higher tolerance raises the binarization threshold.
    pub tolerance: u8,
    /// Higher accuracy means less blur, a larger SSIM window and tighter morphology.
    pub accuracy: u8,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            tolerance: 50,
            accuracy: 50,
        }
    }
}

impl ExtractionSettings {
    pub fn new(tolerance: u32, accuracy: u32) -> Result<Self, InputError> {
        let check = |field: &'static str, value: u32| {
            if value > 100 {
                Err(InputError::OutOfRange { field, value })
            } else {
                Ok(value as u8)
            }
        };
        Ok(Self {
            tolerance: check("tolerance", tolerance)?,
            accuracy: check("accuracy", accuracy)?,
        })
    }

    fn accuracy_ratio(&self) -> f32 {
        self.accuracy as f32 / 100.0
    }

    pub fn blur_kernel(&self) -> usize {
        let ksize = 7usize.saturating_sub((self.accuracy_ratio() * 6.0) as usize).max(1);
        if ksize % 2 == 0 { ksize + 1 } else { ksize }
    }

    pub fn ssim_window(&self, width: usize, height: usize) -> usize {
        let mut window = (3 + (self.accuracy_ratio() * 8.0) as usize).clamp(3, 11);
        if window % 2 == 0 {
            window += 1;
        }
        window = window.min(width.min(height).saturating_sub(1));
        if window % 2 == 0 {
            window = window.saturating_sub(1);
        }
        window.max(3)
    }

    pub fn threshold(&self) -> u8 {
        let scaled = (self.tolerance as f32 / 100.0 * 70.0) as u32 + 15;
        scaled.max(8).min(255) as u8
    }

    pub fn morph_kernel(&self) -> usize {
        5usize.saturating_sub((self.accuracy_ratio() * 3.0) as usize).max(2)
    }
}

pub fn min_region_area(width: usize, height: usize) -> usize {
    let scaled = width * height * MIN_REGION_AREA_PER_100K / 100_000;
    scaled.max(MIN_REGION_AREA)
}

/// Output of the difference extractor.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub width: usize,
    pub height: usize,
    /// Candidate change regions before merging.
    pub regions: Vec<PixelRect>,
    /// Mean structural similarity, 1.0 for identical images.
    pub similarity: f32,
    /// Fused structural and absolute difference intensity.
    pub combined: Vec<u8>,
}

/// Finds regions where `sample` deviates from `master`. Both frames must
/// share dimensions; zones restrict the search when non-empty.
pub fn extract_differences(
    master: &RgbFrame,
    sample: &RgbFrame,
    zones: &[Zone],
    settings: &ExtractionSettings,
) -> Result<Extraction, InputError> {
    let (width, height) = (master.width() as usize, master.height() as usize);
    if (sample.width() as usize, sample.height() as usize) != (width, height) {
        return Err(InputError::invalid_frame(format!(
            "sample is {}x{} but master is {}x{}",
            sample.width(),
            sample.height(),
            width,
            height
        )));
    }
    if width.min(height) < MIN_DIMENSION {
        return Err(InputError::invalid_frame(format!(
            "images must be at least {MIN_DIMENSION}x{MIN_DIMENSION}, got {width}x{height}"
        )));
    }
    let zone_mask = preprocess::zone_mask(zones, width, height)?;

    let master_gray = preprocess::grayscale(master);
    let sample_gray = preprocess::grayscale(sample);
    let blur = settings.blur_kernel();
    let window = settings.ssim_window(width, height);
    let master_blur = ops::gaussian_blur_u8(&master_gray, width, height, blur);
    let sample_blur = ops::gaussian_blur_u8(&sample_gray, width, height, blur);

    let structural = structural_similarity(&master_blur, &sample_blur, width, height, window);
    let dissimilarity = structural.dissimilarity();
    // The absolute term uses the unblurred planes so thin strokes keep their weight.
    let absolute = ops::absdiff(&master_gray, &sample_gray);
    let combined: Vec<u8> = dissimilarity
        .iter()
        .zip(&absolute)
        .map(|(&s, &a)| ops::saturate_u8(STRUCTURAL_WEIGHT * s as f32 + ABSOLUTE_WEIGHT * a as f32))
        .collect();

    let mut mask = ops::threshold_binary(&combined, settings.threshold());
    if let Some(zone_mask) = &zone_mask {
        for (value, &zone) in mask.iter_mut().zip(zone_mask) {
            *value &= zone;
        }
    }
    let kernel = settings.morph_kernel();
    let mask = ops::dilate_rect(&mask, width, height, (kernel, kernel), DILATE_ITERATIONS);
    let mask = ops::erode_rect(&mask, width, height, (kernel, kernel), ERODE_ITERATIONS);

    let min_area = min_region_area(width, height);
    let regions: Vec<PixelRect> = external_components(&mask, width, height)
        .into_iter()
        .filter(|component| component.filled_area > min_area)
        .map(|component| component.rect)
        .collect();

    debug!(
        "extracted {} regions (blur={blur}, window={window}, threshold={}, ssim={:.4})",
        regions.len(),
        settings.threshold(),
        structural.score
    );

    Ok(Extraction {
        width,
        height,
        regions,
        similarity: structural.score,
        combined,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_drives_kernel_sizes() {
        let coarse = ExtractionSettings::new(50, 0).unwrap();
        assert_eq!(coarse.blur_kernel(), 7);
        assert_eq!(coarse.ssim_window(400, 400), 3);
        assert_eq!(coarse.morph_kernel(), 5);

        let fine = ExtractionSettings::new(50, 100).unwrap();
        assert_eq!(fine.blur_kernel(), 1);
        assert_eq!(fine.ssim_window(400, 400), 11);
        assert_eq!(fine.morph_kernel(), 2);

        let default = ExtractionSettings::default();
        assert_eq!(default.blur_kernel(), 5);
        assert_eq!(default.ssim_window(400, 400), 7);
    }

    #[test]
    fn window_shrinks_for_small_images() {
        let fine = ExtractionSettings::new(50, 100).unwrap();
        assert_eq!(fine.ssim_window(9, 40), 7);
        assert_eq!(fine.ssim_window(8, 8), 7);
    }

    #[test]
    fn threshold_grows_with_tolerance() {
        assert_eq!(ExtractionSettings::new(0, 50).unwrap().threshold(), 15);
        assert_eq!(ExtractionSettings::new(50, 50).unwrap().threshold(), 50);
        assert_eq!(ExtractionSettings::new(100, 50).unwrap().threshold(), 85);
    }

    #[test]
    fn out_of_range_settings_are_rejected() {
        assert!(matches!(
            ExtractionSettings::new(101, 50),
            Err(InputError::OutOfRange { field: "tolerance", .. })
        ));
    }

    #[test]
    fn min_area_has_floor() {
        assert_eq!(min_region_area(400, 400), 80);
        assert_eq!(min_region_area(4000, 3000), 960);
    }

    #[test]
    fn identical_frames_have_no_regions() {
        let frame = RgbFrame::filled(64, 48, [120, 130, 140]);
        let extraction =
            extract_differences(&frame, &frame, &[], &ExtractionSettings::default()).unwrap();
        assert!(extraction.regions.is_empty());
        assert_eq!(extraction.similarity, 1.0);
    }

    #[test]
    fn hairline_keeps_full_absolute_weight() {
        let (width, height) = (40usize, 40usize);
        let mut data = vec![200u8; width * height * 3];
        for y in 0..height {
            let offset = (y * width + 20) * 3;
            data[offset..offset + 3].copy_from_slice(&[100, 100, 100]);
        }
        let master = RgbFrame::filled(width as u32, height as u32, [200, 200, 200]);
        let sample = RgbFrame::from_owned(width as u32, height as u32, data).unwrap();

        let coarse = ExtractionSettings::new(50, 0).unwrap();
        let extraction = extract_differences(&master, &sample, &[], &coarse).unwrap();
        let hairline = extraction.combined[20 * width + 20];
        assert!(hairline >= 40, "hairline intensity {hairline}");
        assert_eq!(extraction.combined[20 * width + 2], 0);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let master = RgbFrame::filled(64, 48, [0, 0, 0]);
        let sample = RgbFrame::filled(48, 64, [0, 0, 0]);
        let err = extract_differences(&master, &sample, &[], &ExtractionSettings::default());
        assert!(matches!(err, Err(InputError::InvalidFrame { .. })));
    }
}
