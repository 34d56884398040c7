use std::sync::Arc;

use log::warn;
use printqc_ocr::{LanguageSelection, OcrEngine, OcrRequest, PageSegmentation};
use printqc_types::{DifferenceKind, RgbFrame, Severity};

use crate::pipeline::{ops, preprocess};

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
// OCR is only attempted on crops at least this edge-dense.
const OCR_MIN_EDGE_DENSITY: f32 = 0.06;
// Color rule: edges nearly unchanged but a visible Delta-E.
const COLOR_MAX_EDGE_CHANGE: f32 = 0.06;
const COLOR_MIN_DELTA_E: f32 = 8.0;
const COLOR_IMPORTANT_DELTA_E: f32 = 15.0;
// Text-like crops whose edges moved.
const TYPOGRAPHY_MIN_EDGE_DENSITY: f32 = 0.10;
const TYPOGRAPHY_MIN_EDGE_CHANGE: f32 = 0.08;
const GRAPHIC_MIN_EDGE_CHANGE: f32 = 0.15;
// Mean absolute gray difference thresholds.
const CONTENT_MIN_DIFF: f32 = 25.0;
const CONTENT_IMPORTANT_DIFF: f32 = 50.0;
const DESCRIPTION_TEXT_CHARS: usize = 40;

/// Measurements of one padded region crop.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionFeatures {
    pub master_edge_density: f32,
    pub sample_edge_density: f32,
    /// Fraction of pixels where exactly one of the two edge maps fires.
    pub edge_change: f32,
    /// Mean absolute gray difference, 0..=255.
    pub mean_abs_diff: f32,
    pub delta_e: f32,
}

impl RegionFeatures {
    pub fn measure(master: &RgbFrame, sample: &RgbFrame, delta_e: f32) -> Option<Self> {
        if master.is_empty()
            || (master.width(), master.height()) != (sample.width(), sample.height())
        {
            return None;
        }
        let (width, height) = (master.width() as usize, master.height() as usize);
        let master_gray = preprocess::grayscale(master);
        let sample_gray = preprocess::grayscale(sample);
        let master_edges = ops::canny(&master_gray, width, height, CANNY_LOW, CANNY_HIGH);
        let sample_edges = ops::canny(&sample_gray, width, height, CANNY_LOW, CANNY_HIGH);
        Some(Self {
            master_edge_density: ops::mean_u8(&master_edges) / 255.0,
            sample_edge_density: ops::mean_u8(&sample_edges) / 255.0,
            edge_change: ops::mean_u8(&ops::absdiff(&master_edges, &sample_edges)) / 255.0,
            mean_abs_diff: ops::mean_u8(&ops::absdiff(&master_gray, &sample_gray)),
            delta_e,
        })
    }

    pub fn avg_edge_density(&self) -> f32 {
        (self.master_edge_density + self.sample_edge_density) / 2.0
    }
}

/// OCR readings of the two crops, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionTexts {
    pub master: String,
    pub sample: String,
}

impl RegionTexts {
    pub fn changed(&self) -> bool {
        self.master != self.sample && !(self.master.is_empty() && self.sample.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: DifferenceKind,
    pub severity: Severity,
    pub description: String,
}

impl Classification {
    fn new(kind: DifferenceKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
        }
    }

    pub fn degenerate() -> Self {
        Self::new(DifferenceKind::Content, Severity::Minor, "Difference detected")
    }
}

fn excerpt(text: &str) -> String {
    if text.is_empty() {
        "(empty)".to_string()
    } else {
        text.chars().take(DESCRIPTION_TEXT_CHARS).collect()
    }
}

/// Ordered decision rules; the first matching rule wins.
pub fn decide(features: &RegionFeatures, texts: Option<&RegionTexts>) -> Classification {
    let density = features.avg_edge_density();

    if let Some(texts) = texts.filter(|texts| density > OCR_MIN_EDGE_DENSITY && texts.changed()) {
        return Classification::new(
            DifferenceKind::Typography,
            Severity::Critical,
            format!(
                "Text changed: «{}» → «{}»",
                excerpt(&texts.master),
                excerpt(&texts.sample)
            ),
        );
    }

    if features.edge_change < COLOR_MAX_EDGE_CHANGE && features.delta_e > COLOR_MIN_DELTA_E {
        let severity = if features.delta_e > COLOR_IMPORTANT_DELTA_E {
            Severity::Important
        } else {
            Severity::Minor
        };
        return Classification::new(
            DifferenceKind::Color,
            severity,
            format!("Color shift (ΔE={:.1})", features.delta_e),
        );
    }

    if density > TYPOGRAPHY_MIN_EDGE_DENSITY && features.edge_change > TYPOGRAPHY_MIN_EDGE_CHANGE {
        return Classification::new(
            DifferenceKind::Typography,
            Severity::Critical,
            "Text or typography difference",
        );
    }

    if features.edge_change > GRAPHIC_MIN_EDGE_CHANGE {
        return Classification::new(
            DifferenceKind::Graphic,
            Severity::Important,
            "Graphic element difference",
        );
    }

    if features.mean_abs_diff > CONTENT_MIN_DIFF {
        let severity = if features.mean_abs_diff > CONTENT_IMPORTANT_DIFF {
            Severity::Important
        } else {
            Severity::Minor
        };
        return Classification::new(
            DifferenceKind::Content,
            severity,
            "Content difference detected",
        );
    }

    Classification::new(
        DifferenceKind::Layout,
        Severity::Minor,
        "Layout or position difference",
    )
}

/// Assigns a type and severity to merged difference regions.
#[derive(Clone)]
pub struct DifferenceClassifier {
    ocr: Option<Arc<dyn OcrEngine>>,
    language: String,
}

impl DifferenceClassifier {
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>, languages: &LanguageSelection) -> Self {
        Self {
            ocr,
            language: languages.ocr_tag(),
        }
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    pub fn classify(&self, master: &RgbFrame, sample: &RgbFrame, delta_e: f32) -> Classification {
        let Some(features) = RegionFeatures::measure(master, sample, delta_e) else {
            return Classification::degenerate();
        };
        let texts = if features.avg_edge_density() > OCR_MIN_EDGE_DENSITY {
            self.read_texts(master, sample)
        } else {
            None
        };
        decide(&features, texts.as_ref())
    }

    fn read_texts(&self, master: &RgbFrame, sample: &RgbFrame) -> Option<RegionTexts> {
        let engine = self.ocr.as_ref()?;
        let read = |frame: &RgbFrame| {
            let request =
                OcrRequest::new(frame, &self.language).with_segmentation(PageSegmentation::SingleBlock);
            engine
                .recognize(&request)
                .map(|response| response.text().trim().to_string())
        };
        match (read(master), read(sample)) {
            (Ok(master), Ok(sample)) => Some(RegionTexts { master, sample }),
            (Err(err), _) | (_, Err(err)) => {
                warn!("{} OCR failed on a difference region: {err}", engine.name());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use printqc_ocr::{OcrError, OcrResponse, OcrWord};

    use super::*;

    /// Replays one reading per `recognize` call, in order.
    struct ReplayOcr {
        readings: Mutex<VecDeque<Option<&'static str>>>,
    }

    impl ReplayOcr {
        fn new(readings: impl IntoIterator<Item = Option<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.into_iter().collect()),
            })
        }

        fn remaining(&self) -> usize {
            self.readings.lock().unwrap().len()
        }
    }

    impl OcrEngine for ReplayOcr {
        fn name(&self) -> &'static str {
            "replay"
        }

        fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
            assert_eq!(request.segmentation(), PageSegmentation::SingleBlock);
            match self.readings.lock().unwrap().pop_front().flatten() {
                Some(text) => Ok(OcrResponse::new(vec![
                    OcrWord::new(text, 0, 0, 10, 10).with_confidence(90.0),
                ])),
                None => Err(OcrError::backend("engine timed out")),
            }
        }
    }

    // Vertical stripes, four pixels wide, dense enough in edges to be read.
    fn stripes(width: u32, height: u32) -> RgbFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..height {
            for x in 0..width {
                let value = if (x / 4) % 2 == 0 { 20 } else { 235 };
                data.extend_from_slice(&[value, value, value]);
            }
        }
        RgbFrame::from_owned(width, height, data).unwrap()
    }

    fn features(density: f32, edge_change: f32, mean_abs_diff: f32, delta_e: f32) -> RegionFeatures {
        RegionFeatures {
            master_edge_density: density,
            sample_edge_density: density,
            edge_change,
            mean_abs_diff,
            delta_e,
        }
    }

    #[test]
    fn ocr_change_is_critical_typography() {
        let texts = RegionTexts {
            master: "Precio 10€".into(),
            sample: String::new(),
        };
        let result = decide(&features(0.2, 0.0, 0.0, 30.0), Some(&texts));
        assert_eq!(result.kind, DifferenceKind::Typography);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.description.contains("(empty)"));
    }

    #[test]
    fn unchanged_text_falls_through() {
        let texts = RegionTexts {
            master: "abc".into(),
            sample: "abc".into(),
        };
        let result = decide(&features(0.2, 0.01, 0.0, 12.0), Some(&texts));
        assert_eq!(result.kind, DifferenceKind::Color);
        assert_eq!(result.severity, Severity::Minor);
    }

    #[test]
    fn color_severity_depends_on_delta_e() {
        let result = decide(&features(0.0, 0.0, 40.0, 20.0), None);
        assert_eq!((result.kind, result.severity), (DifferenceKind::Color, Severity::Important));
        assert_eq!(result.description, "Color shift (ΔE=20.0)");
    }

    #[test]
    fn edge_rules_in_order() {
        let typography = decide(&features(0.12, 0.09, 0.0, 0.0), None);
        assert_eq!(typography.kind, DifferenceKind::Typography);
        let graphic = decide(&features(0.05, 0.2, 0.0, 0.0), None);
        assert_eq!(graphic.kind, DifferenceKind::Graphic);
        assert_eq!(graphic.severity, Severity::Important);
    }

    #[test]
    fn content_and_layout_fallbacks() {
        let content = decide(&features(0.0, 0.07, 60.0, 3.0), None);
        assert_eq!((content.kind, content.severity), (DifferenceKind::Content, Severity::Important));
        let minor = decide(&features(0.0, 0.07, 30.0, 3.0), None);
        assert_eq!(minor.severity, Severity::Minor);
        let layout = decide(&features(0.0, 0.07, 10.0, 3.0), None);
        assert_eq!((layout.kind, layout.severity), (DifferenceKind::Layout, Severity::Minor));
    }

    #[test]
    fn degenerate_crop_is_minor_content() {
        let classifier = DifferenceClassifier::new(None, &LanguageSelection::default());
        let empty = RgbFrame::filled(0, 0, [0, 0, 0]);
        let result = classifier.classify(&empty, &empty, 0.0);
        assert_eq!(result, Classification::degenerate());
    }

    #[test]
    fn engine_reading_different_text_is_typography() {
        let frame = stripes(48, 32);
        let ocr = ReplayOcr::new([Some("Total 10"), Some("Total 18")]);
        let classifier = DifferenceClassifier::new(Some(ocr.clone()), &LanguageSelection::default());

        let result = classifier.classify(&frame, &frame, 0.0);
        assert_eq!(result.kind, DifferenceKind::Typography);
        assert_eq!(result.severity, Severity::Critical);
        assert_eq!(result.description, "Text changed: «Total 10» → «Total 18»");
        assert_eq!(ocr.remaining(), 0);
    }

    #[test]
    fn failed_reading_skips_text_rule() {
        let frame = stripes(48, 32);
        let ocr = ReplayOcr::new([None, Some("Total 18")]);
        let classifier = DifferenceClassifier::new(Some(ocr.clone()), &LanguageSelection::default());

        let result = classifier.classify(&frame, &frame, 0.0);
        assert_eq!((result.kind, result.severity), (DifferenceKind::Layout, Severity::Minor));
        assert_eq!(ocr.remaining(), 0);
    }

    #[test]
    fn flat_crop_is_not_read() {
        let frame = RgbFrame::filled(48, 32, [200, 200, 200]);
        let ocr = ReplayOcr::new([Some("a"), Some("b")]);
        let classifier = DifferenceClassifier::new(Some(ocr.clone()), &LanguageSelection::default());

        let result = classifier.classify(&frame, &frame, 0.0);
        assert_eq!(result.kind, DifferenceKind::Layout);
        assert_eq!(ocr.remaining(), 2);
    }

    #[test]
    fn excerpt_truncates_characters() {
        let long: String = "ñ".repeat(60);
        assert_eq!(excerpt(&long).chars().count(), 40);
    }
}
