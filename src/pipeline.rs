use std::sync::Arc;

use log::{debug, info, warn};
use printqc_comparator::pipeline::preprocess;
use printqc_comparator::region::padded_region;
use printqc_comparator::{
    Aligner, AlignmentOutcome, CROP_THUMBNAIL_SIDE, DifferenceClassifier, ExtractionSettings,
    PaletteSettings, describe_regions, difference_merge_gap, dominant_palette,
    extract_differences, merge_boxes,
};
use printqc_elements::{DetectorSettings, ElementDetector};
use printqc_ocr::{LanguageSelection, OcrEngine};
use printqc_spelling::{DictionaryCache, SpellingDiffClassifier, SpellingReport, SpellingSettings};
use printqc_types::{
    DetectedElement, Difference, DifferenceKind, ElementInventory, InputError, PaletteEntry,
    RgbFrame, SpellingCategory, SpellingError, Zone, round_to, sort_by_severity,
};
use serde::Serialize;
use thiserror::Error;

const SPELLING_DESCRIPTION_SUGGESTIONS: usize = 3;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error(transparent)]
    Input(#[from] InputError),
}

/// Parameters of one master/sample comparison.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    /// Page number echoed in the report.
    pub page: u32,
    pub zones: Vec<Zone>,
    pub extraction: ExtractionSettings,
    pub languages: LanguageSelection,
    /// Spelling comparison runs when set.
    pub spelling: Option<SpellingSettings>,
}

impl Default for CompareRequest {
    fn default() -> Self {
        Self {
            page: 1,
            zones: Vec::new(),
            extraction: ExtractionSettings::default(),
            languages: LanguageSelection::parse("es"),
            spelling: None,
        }
    }
}

/// Images the renderers need besides the serialized report.
#[derive(Debug, Clone)]
pub struct ComparisonArtifacts {
    pub aligned_sample: RgbFrame,
    /// Fused difference intensity, one byte per pixel of the master.
    pub difference_map: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub page: u32,
    pub similarity: f32,
    pub alignment: AlignmentOutcome,
    pub differences: Vec<Difference>,
    pub spelling_errors: Vec<SpellingError>,
    pub spelling_fixed: Vec<SpellingError>,
    pub master_palette: Vec<PaletteEntry>,
    pub sample_palette: Vec<PaletteEntry>,
    #[serde(skip)]
    pub artifacts: ComparisonArtifacts,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrCapability {
    pub engine: Option<&'static str>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DictionaryCapability {
    pub engine: Option<&'static str>,
    /// Language codes whose dictionary can be opened.
    pub languages: Vec<&'static str>,
}

/// Which optional collaborators this inspector can use.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub ocr: OcrCapability,
    pub spelling: DictionaryCapability,
    pub element_detection: bool,
}

/// Runs comparison and element requests. OCR and dictionaries are optional
/// collaborators; features that need a missing one are skipped.
#[derive(Clone, Default)]
pub struct Inspector {
    aligner: Aligner,
    palette: PaletteSettings,
    ocr: Option<Arc<dyn OcrEngine>>,
    dictionaries: Option<Arc<DictionaryCache>>,
}

impl Inspector {
    pub fn new(
        ocr: Option<Arc<dyn OcrEngine>>,
        dictionaries: Option<Arc<DictionaryCache>>,
    ) -> Self {
        Self {
            ocr,
            dictionaries,
            ..Self::default()
        }
    }

    pub fn with_aligner(mut self, aligner: Aligner) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        let ocr = OcrCapability {
            engine: self.ocr.as_ref().map(|engine| engine.name()),
            available: self.ocr.as_ref().is_some_and(|engine| match engine.warm_up() {
                Ok(()) => true,
                Err(err) => {
                    warn!("OCR engine unavailable: {err}");
                    false
                }
            }),
        };
        let spelling = match self.dictionaries.as_ref() {
            Some(cache) => DictionaryCapability {
                engine: Some(cache.factory_name()),
                languages: LanguageSelection::supported_codes()
                    .filter(|code| {
                        LanguageSelection::new([*code])
                            .dictionary_codes()
                            .iter()
                            .any(|dictionary| cache.has(dictionary))
                    })
                    .collect(),
            },
            None => DictionaryCapability {
                engine: None,
                languages: Vec::new(),
            },
        };
        Capabilities {
            ocr,
            spelling,
            element_detection: true,
        }
    }

    pub fn compare(
        &self,
        master: &RgbFrame,
        sample: &RgbFrame,
        request: &CompareRequest,
    ) -> Result<ComparisonReport, InspectError> {
        let alignment = self.aligner.align(master, sample)?;
        debug!("alignment: {:?}", alignment.outcome);
        let aligned = alignment.frame;

        let extraction = extract_differences(master, &aligned, &request.zones, &request.extraction)?;
        let gap = difference_merge_gap(extraction.width, extraction.height);
        let regions = merge_boxes(&extraction.regions, gap);
        debug!(
            "{} candidate regions merged into {} (gap {gap})",
            extraction.regions.len(),
            regions.len()
        );

        let classifier = DifferenceClassifier::new(self.ocr.clone(), &request.languages);
        let mut differences = describe_regions(master, &aligned, &regions, &classifier);

        let spelling = match request.spelling.as_ref() {
            Some(settings) => self.check_spelling(master, &aligned, &request.languages, settings)?,
            None => SpellingReport::default(),
        };
        // Preexisting errors are already on the master, so they stay in
        // `spelling_errors` without counting as differences.
        differences.extend(
            spelling
                .errors
                .iter()
                .filter(|error| error.category == SpellingCategory::Introduced)
                .map(|error| spelling_difference(master, &aligned, error)),
        );
        sort_by_severity(&mut differences);

        let (master_palette, sample_palette) = rayon::join(
            || dominant_palette(master, &self.palette),
            || dominant_palette(&aligned, &self.palette),
        );

        let similarity = round_to(extraction.similarity, 4);
        info!(
            "page {}: similarity {:.4}, {} differences, {} spelling issues",
            request.page,
            similarity,
            differences.len(),
            spelling.len()
        );

        Ok(ComparisonReport {
            page: request.page,
            similarity,
            alignment: alignment.outcome,
            differences,
            spelling_errors: spelling.errors,
            spelling_fixed: spelling.fixed,
            master_palette,
            sample_palette,
            artifacts: ComparisonArtifacts {
                aligned_sample: aligned,
                difference_map: extraction.combined,
            },
        })
    }

    fn check_spelling(
        &self,
        master: &RgbFrame,
        sample: &RgbFrame,
        languages: &LanguageSelection,
        settings: &SpellingSettings,
    ) -> Result<SpellingReport, InputError> {
        let Some(ocr) = self.ocr.clone() else {
            warn!("spelling check skipped: no OCR engine configured");
            return Ok(SpellingReport::default());
        };
        let Some(dictionaries) = self.dictionaries.clone() else {
            warn!("spelling check skipped: no dictionaries configured");
            return Ok(SpellingReport::default());
        };
        SpellingDiffClassifier::new(ocr, dictionaries).classify(master, sample, languages, settings)
    }

    pub fn elements(&self, frame: &RgbFrame, settings: DetectorSettings) -> Vec<DetectedElement> {
        let elements = ElementDetector::new(settings).detect(frame);
        info!("detected {} elements", elements.len());
        elements
    }

    pub fn element_inventory(
        &self,
        master: &RgbFrame,
        sample: &RgbFrame,
        settings: DetectorSettings,
    ) -> ElementInventory {
        let inventory = ElementDetector::new(settings).detect_and_compare(master, sample);
        info!(
            "elements: {} on master, {} on sample, {} type changes",
            inventory.master_elements.len(),
            inventory.sample_elements.len(),
            inventory.changes.len()
        );
        inventory
    }
}

/// Report entry for a spelling error introduced by the sample.
fn spelling_difference(master: &RgbFrame, sample: &RgbFrame, error: &SpellingError) -> Difference {
    let (width, height) = (sample.width() as usize, sample.height() as usize);
    let region = padded_region(error.bbox.to_pixels(width, height), width, height);
    let thumbnail = |frame: &RgbFrame| preprocess::thumbnail(&frame.crop(region), CROP_THUMBNAIL_SIDE).ok();
    Difference {
        bbox: error.bbox,
        kind: DifferenceKind::Spelling,
        severity: error.severity,
        pixel_diff_percent: 0.0,
        color_delta_e: 0.0,
        description: spelling_description(error),
        master_crop: thumbnail(master),
        sample_crop: thumbnail(sample),
    }
}

fn spelling_description(error: &SpellingError) -> String {
    if error.suggestions.is_empty() {
        return format!("Spelling: «{}»", error.word);
    }
    let suggestions: Vec<&str> = error
        .suggestions
        .iter()
        .take(SPELLING_DESCRIPTION_SUGGESTIONS)
        .map(String::as_str)
        .collect();
    format!(
        "Spelling: «{}» · Suggestions: {}",
        error.word,
        suggestions.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use printqc_types::{NormalizedBox, Severity};

    fn error(suggestions: &[&str]) -> SpellingError {
        SpellingError {
            word: "recieve".into(),
            bbox: NormalizedBox::new(0.1, 0.2, 0.3, 0.1),
            confidence: 91.0,
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            category: SpellingCategory::Introduced,
            severity: Severity::Critical,
        }
    }

    #[test]
    fn description_lists_three_suggestions() {
        let text = spelling_description(&error(&["receive", "relieve", "deceive", "recipe"]));
        assert_eq!(text, "Spelling: «recieve» · Suggestions: receive, relieve, deceive");
        assert_eq!(spelling_description(&error(&[])), "Spelling: «recieve»");
    }

    #[test]
    fn spelling_difference_keeps_box_and_severity() {
        let frame = RgbFrame::filled(100, 80, [250, 250, 250]);
        let difference = spelling_difference(&frame, &frame, &error(&["receive"]));
        assert_eq!(difference.kind, DifferenceKind::Spelling);
        assert_eq!(difference.severity, Severity::Critical);
        assert_eq!(difference.bbox, NormalizedBox::new(0.1, 0.2, 0.3, 0.1));
        let crop = difference.sample_crop.expect("sample crop");
        assert!(crop.width() > 30 && crop.height() > 8);
    }

    #[test]
    fn capabilities_without_collaborators() {
        let capabilities = Inspector::default().capabilities();
        assert!(!capabilities.ocr.available);
        assert!(capabilities.ocr.engine.is_none());
        assert!(capabilities.spelling.languages.is_empty());
        assert!(capabilities.element_detection);
    }
}
