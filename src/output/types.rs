use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::warn;
use printqc_comparator::AlignmentOutcome;
use printqc_types::{Difference, PaletteEntry, RgbFrame, SpellingError};
use serde::Serialize;

use crate::output::image::encode_jpeg;
use crate::pipeline::ComparisonReport;

const CROP_JPEG_QUALITY: u8 = 80;

/// Base64 JPEG of a crop thumbnail. Encoding failures drop the crop.
pub fn encode_crop(crop: Option<&RgbFrame>) -> Option<String> {
    let crop = crop.filter(|frame| !frame.is_empty())?;
    match encode_jpeg(crop, CROP_JPEG_QUALITY) {
        Ok(bytes) => Some(STANDARD.encode(bytes)),
        Err(err) => {
            warn!("dropping crop thumbnail: {err}");
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DifferenceRecord<'a> {
    #[serde(flatten)]
    pub difference: &'a Difference,
    pub master_crop: Option<String>,
    pub sample_crop: Option<String>,
}

impl<'a> From<&'a Difference> for DifferenceRecord<'a> {
    fn from(difference: &'a Difference) -> Self {
        Self {
            difference,
            master_crop: encode_crop(difference.master_crop.as_ref()),
            sample_crop: encode_crop(difference.sample_crop.as_ref()),
        }
    }
}

/// Serialized form of a comparison, crops included.
#[derive(Debug, Serialize)]
pub struct ComparisonRecord<'a> {
    pub page: u32,
    pub similarity: f32,
    pub alignment: &'a AlignmentOutcome,
    pub total_differences: usize,
    pub differences: Vec<DifferenceRecord<'a>>,
    pub spelling_errors: &'a [SpellingError],
    pub spelling_fixed: &'a [SpellingError],
    pub master_palette: &'a [PaletteEntry],
    pub sample_palette: &'a [PaletteEntry],
}

impl<'a> From<&'a ComparisonReport> for ComparisonRecord<'a> {
    fn from(report: &'a ComparisonReport) -> Self {
        Self {
            page: report.page,
            similarity: report.similarity,
            alignment: &report.alignment,
            total_differences: report.differences.len(),
            differences: report.differences.iter().map(DifferenceRecord::from).collect(),
            spelling_errors: &report.spelling_errors,
            spelling_fixed: &report.spelling_fixed,
            master_palette: &report.master_palette,
            sample_palette: &report.sample_palette,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printqc_types::{DifferenceKind, NormalizedBox, Severity};

    #[test]
    fn record_carries_base64_crops() {
        let difference = Difference {
            bbox: NormalizedBox::new(0.1, 0.1, 0.2, 0.2),
            kind: DifferenceKind::Content,
            severity: Severity::Important,
            pixel_diff_percent: 12.5,
            color_delta_e: 3.0,
            description: "changed".into(),
            master_crop: Some(RgbFrame::filled(6, 4, [1, 2, 3])),
            sample_crop: None,
        };
        let json = serde_json::to_value(DifferenceRecord::from(&difference)).unwrap();
        assert_eq!(json["type"], "content");
        assert_eq!(json["pixel_diff_percent"], 12.5);
        let encoded = json["master_crop"].as_str().unwrap();
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert!(json["sample_crop"].is_null());
    }
}
