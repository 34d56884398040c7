use std::collections::BTreeMap;

use palette::{FromColor, Hsv, Srgb};
use printqc_comparator::pipeline::{ops, preprocess};
use printqc_types::{PixelRect, RGB_CHANNELS, RgbFrame, round_to};

use crate::filters::FeatureMaps;

/// Feature statistics of one candidate region.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionStats {
    pub edge_density: f32,
    pub texture_energy: f32,
    pub text_coverage: f32,
    pub flat_coverage: f32,
    /// Gray-level standard deviation, 0..=255.
    pub intensity_std: f32,
    pub aspect_ratio: f32,
    /// Hue standard deviation on the 0..180 half-degree scale.
    pub hue_std: f32,
    pub saturation_mean: f32,
    /// Region area over image area.
    pub area_ratio: f32,
}

fn mean_fraction(plane: &[u8], width: usize, rect: PixelRect) -> f32 {
    ops::mean_u8(&preprocess::crop_plane(plane, width, rect)) / 255.0
}

impl RegionStats {
    pub fn measure(maps: &FeatureMaps, frame: &RgbFrame, rect: PixelRect) -> Self {
        let width = maps.width;
        let total_area = (maps.width * maps.height).max(1);
        let gray: Vec<f32> = preprocess::crop_plane(&maps.gray, width, rect)
            .into_iter()
            .map(f32::from)
            .collect();
        let (_, intensity_std) = ops::mean_std(&gray);

        let crop = frame.crop(rect);
        let mut hues = Vec::with_capacity(crop.pixel_count());
        let mut saturations = Vec::with_capacity(crop.pixel_count());
        for px in crop.data().chunks_exact(RGB_CHANNELS) {
            let rgb: Srgb<f32> = Srgb::new(px[0], px[1], px[2]).into_format();
            let hsv = Hsv::from_color(rgb);
            hues.push(hsv.hue.into_positive_degrees() / 2.0);
            saturations.push(hsv.saturation);
        }
        let (_, hue_std) = ops::mean_std(&hues);
        let (saturation_mean, _) = ops::mean_std(&saturations);

        Self {
            edge_density: mean_fraction(&maps.edges, width, rect),
            texture_energy: mean_fraction(&maps.texture, width, rect),
            text_coverage: mean_fraction(&maps.text_density, width, rect),
            flat_coverage: mean_fraction(&maps.flat, width, rect),
            intensity_std,
            aspect_ratio: rect.width as f32 / rect.height.max(1) as f32,
            hue_std,
            saturation_mean,
            area_ratio: rect.area() as f32 / total_area as f32,
        }
    }

    /// Rounded values reported with each element.
    pub fn attributes(&self) -> BTreeMap<String, f32> {
        [
            ("edge_density", round_to(self.edge_density, 3)),
            ("texture_energy", round_to(self.texture_energy, 3)),
            ("text_coverage", round_to(self.text_coverage, 3)),
            ("flat_coverage", round_to(self.flat_coverage, 3)),
            ("intensity_std", round_to(self.intensity_std, 1)),
            ("aspect_ratio", round_to(self.aspect_ratio, 2)),
            ("hue_std", round_to(self.hue_std, 1)),
            ("saturation_mean", round_to(self.saturation_mean, 3)),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }
}
