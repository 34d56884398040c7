use printqc_types::{Difference, NormalizedBox, PixelRect, RgbFrame};
use rayon::prelude::*;

use crate::classify::DifferenceClassifier;
use crate::color;
use crate::pipeline::{ops, preprocess};

// Context added around a merged region before measuring it.
const MIN_PAD: usize = 8;
const PAD_RATIO: f32 = 0.15;
/// Longest side of the crops attached to a difference.
pub const CROP_THUMBNAIL_SIDE: usize = 250;

/// Region grown by 15% of its shorter side (at least 8 px), clamped.
pub fn padded_region(rect: PixelRect, width: usize, height: usize) -> PixelRect {
    let pad = ((rect.width.min(rect.height) as f32 * PAD_RATIO) as usize).max(MIN_PAD);
    rect.padded(pad, width, height)
}

/// Mean absolute gray difference as a percentage of full scale.
pub fn pixel_diff_percent(master: &RgbFrame, sample: &RgbFrame) -> f32 {
    if master.is_empty() || master.pixel_count() != sample.pixel_count() {
        return 0.0;
    }
    let diff = ops::absdiff(&preprocess::grayscale(master), &preprocess::grayscale(sample));
    ops::mean_u8(&diff) / 255.0 * 100.0
}

/// Crops, measures and classifies one merged region of aligned frames.
pub fn describe_region(
    master: &RgbFrame,
    sample: &RgbFrame,
    rect: PixelRect,
    classifier: &DifferenceClassifier,
) -> Difference {
    let (width, height) = (master.width() as usize, master.height() as usize);
    let region = padded_region(rect, width, height);
    let master_crop = master.crop(region);
    let sample_crop = sample.crop(region);

    let delta_e = color::delta_e(&master_crop, &sample_crop);
    let classification = classifier.classify(&master_crop, &sample_crop, delta_e);
    Difference {
        bbox: NormalizedBox::from_pixels(region, width, height),
        kind: classification.kind,
        severity: classification.severity,
        pixel_diff_percent: printqc_types::round_to(pixel_diff_percent(&master_crop, &sample_crop), 2),
        color_delta_e: printqc_types::round_to(delta_e, 2),
        description: classification.description,
        master_crop: preprocess::thumbnail(&master_crop, CROP_THUMBNAIL_SIDE).ok(),
        sample_crop: preprocess::thumbnail(&sample_crop, CROP_THUMBNAIL_SIDE).ok(),
    }
}

/// Describes regions in parallel, keeping input order.
pub fn describe_regions(
    master: &RgbFrame,
    sample: &RgbFrame,
    regions: &[PixelRect],
    classifier: &DifferenceClassifier,
) -> Vec<Difference> {
    regions
        .par_iter()
        .map(|&rect| describe_region(master, sample, rect, classifier))
        .collect()
}
