use printqc_types::ElementKind;

use crate::features::RegionStats;

// Text: closed edge lines cover much of the region.
const TEXT_MIN_COVERAGE: f32 = 0.35;
const TEXT_MIN_EDGES: f32 = 0.05;
// Call-to-action: flat fill with some text and a button-like aspect.
const CTA_MIN_FLAT: f32 = 0.50;
const CTA_MIN_TEXT: f32 = 0.15;
const CTA_ASPECT: (f32, f32) = (1.5, 8.0);
const ICON_MAX_AREA: f32 = 0.02;
const ICON_ASPECT: (f32, f32) = (0.5, 2.0);
const ICON_MIN_EDGES: f32 = 0.10;
const LOGO_MAX_AREA: f32 = 0.08;
const LOGO_MIN_EDGES: f32 = 0.08;
const LOGO_MIN_TEXTURE: f32 = 0.05;
const IMAGE_MIN_TEXTURE: f32 = 0.10;
const IMAGE_MIN_HUE_STD: f32 = 15.0;
const IMAGE_MIN_INTENSITY_STD: f32 = 30.0;
const IMAGE_HUE_BONUS_CAP: f32 = 0.3;
const GRAPHIC_MIN_EDGES: f32 = 0.06;
const GRAPHIC_MIN_TEXTURE: f32 = 0.06;
const FALLBACK_CONFIDENCE: f32 = 0.3;

fn within(value: f32, (low, high): (f32, f32)) -> bool {
    value > low && value < high
}

/// Element type and confidence; the first matching rule wins.
pub fn classify_region(stats: &RegionStats) -> (ElementKind, f32) {
    let s = stats;

    if s.text_coverage > TEXT_MIN_COVERAGE && s.edge_density > TEXT_MIN_EDGES {
        return (ElementKind::Text, (0.5 + s.text_coverage * 0.5).min(1.0));
    }

    if s.flat_coverage > CTA_MIN_FLAT
        && s.text_coverage > CTA_MIN_TEXT
        && within(s.aspect_ratio, CTA_ASPECT)
    {
        let confidence = 0.4 + s.flat_coverage * 0.3 + s.text_coverage * 0.3;
        return (ElementKind::Cta, confidence.min(1.0));
    }

    if s.area_ratio < ICON_MAX_AREA
        && within(s.aspect_ratio, ICON_ASPECT)
        && s.edge_density > ICON_MIN_EDGES
    {
        return (ElementKind::Icon, (0.5 + s.edge_density * 0.4).min(1.0));
    }

    if s.area_ratio < LOGO_MAX_AREA
        && s.edge_density > LOGO_MIN_EDGES
        && s.texture_energy > LOGO_MIN_TEXTURE
    {
        let confidence = 0.4 + s.edge_density * 0.3 + s.texture_energy * 0.3;
        return (ElementKind::Logo, confidence.min(1.0));
    }

    if s.texture_energy > IMAGE_MIN_TEXTURE
        && s.hue_std > IMAGE_MIN_HUE_STD
        && s.intensity_std > IMAGE_MIN_INTENSITY_STD
    {
        let hue_bonus = (s.hue_std / 60.0).min(IMAGE_HUE_BONUS_CAP);
        let confidence = 0.4 + s.texture_energy * 0.3 + hue_bonus;
        return (ElementKind::Image, confidence.min(1.0));
    }

    if s.edge_density > GRAPHIC_MIN_EDGES || s.texture_energy > GRAPHIC_MIN_TEXTURE {
        let confidence = 0.3 + s.edge_density * 0.3 + s.texture_energy * 0.3;
        return (ElementKind::Graphic, confidence.min(1.0));
    }

    (ElementKind::Graphic, FALLBACK_CONFIDENCE)
}
