use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use printqc_ocr::{LanguageSelection, OcrEngine, OcrRequest, OcrWord, PageSegmentation};
use printqc_types::{
    InputError, NormalizedBox, PixelRect, RgbFrame, SpellingCategory, SpellingError,
};

use crate::cache::DictionaryCache;
use crate::dictionary::Dictionary;
use crate::token::screen_words;

/// Share of each edge excluded as print-guide margin before OCR.
pub const MARGIN_RATIO: f32 = 0.05;
const MAX_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS_PER_DICTIONARY: usize = 3;
// Strictness 0..=100 maps linearly onto this confidence floor range.
const MIN_CONFIDENCE_FLOOR: f32 = 20.0;
const MAX_CONFIDENCE_FLOOR: f32 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpellingSettings {
    pub strictness: u8,
}

impl Default for SpellingSettings {
    fn default() -> Self {
        Self { strictness: 50 }
    }
}

impl SpellingSettings {
    pub fn new(strictness: u32) -> Result<Self, InputError> {
        if strictness > 100 {
            return Err(InputError::OutOfRange {
                field: "spelling_strictness",
                value: strictness,
            });
        }
        Ok(Self {
            strictness: strictness as u8,
        })
    }

    /// OCR confidence below which words are ignored.
    pub fn confidence_floor(&self) -> f32 {
        MIN_CONFIDENCE_FLOOR
            + (MAX_CONFIDENCE_FLOOR - MIN_CONFIDENCE_FLOOR) * self.strictness as f32 / 100.0
    }
}

/// Unknown word found on one image, in full-image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SpellingFinding {
    pub word: String,
    pub bbox: NormalizedBox,
    pub confidence: f32,
    pub suggestions: Vec<String>,
}

impl SpellingFinding {
    fn into_error(self, category: SpellingCategory) -> SpellingError {
        SpellingError {
            word: self.word,
            bbox: self.bbox,
            confidence: self.confidence,
            suggestions: self.suggestions,
            category,
            severity: category.severity(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpellingReport {
    /// Errors visible on the sample: introduced or preexisting.
    pub errors: Vec<SpellingError>,
    /// Master errors that no longer appear on the sample.
    pub fixed: Vec<SpellingError>,
}

impl SpellingReport {
    pub fn introduced(&self) -> impl Iterator<Item = &SpellingError> {
        self.errors
            .iter()
            .filter(|error| error.category == SpellingCategory::Introduced)
    }

    pub fn len(&self) -> usize {
        self.errors.len() + self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.fixed.is_empty()
    }
}

/// Splits findings by where each word appears, compared case-insensitively.
pub fn reconcile(master: Vec<SpellingFinding>, sample: Vec<SpellingFinding>) -> SpellingReport {
    let master_words: HashSet<String> = master.iter().map(|f| f.word.to_lowercase()).collect();
    let sample_words: HashSet<String> = sample.iter().map(|f| f.word.to_lowercase()).collect();

    let errors = sample
        .into_iter()
        .map(|finding| {
            let category = if master_words.contains(&finding.word.to_lowercase()) {
                SpellingCategory::Preexisting
            } else {
                SpellingCategory::Introduced
            };
            finding.into_error(category)
        })
        .collect();
    let fixed = master
        .into_iter()
        .filter(|finding| !sample_words.contains(&finding.word.to_lowercase()))
        .map(|finding| finding.into_error(SpellingCategory::Fixed))
        .collect();
    SpellingReport { errors, fixed }
}

fn suggestions_for(word: &str, dictionaries: &[Arc<dyn Dictionary>]) -> Vec<String> {
    let mut suggestions: Vec<String> = Vec::new();
    for dictionary in dictionaries {
        for candidate in dictionary
            .candidates(word)
            .into_iter()
            .take(MAX_SUGGESTIONS_PER_DICTIONARY)
        {
            if !suggestions.contains(&candidate) {
                suggestions.push(candidate);
            }
        }
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Unknown words among OCR output, boxes still in OCR pixel space.
fn unknown_words<'w>(
    words: &'w [OcrWord],
    dictionaries: &[Arc<dyn Dictionary>],
    settings: &SpellingSettings,
) -> Vec<(&'w OcrWord, String, Vec<String>)> {
    screen_words(words, settings.confidence_floor())
        .into_iter()
        .filter(|token| !token.logographic)
        .filter(|token| {
            !dictionaries
                .iter()
                .any(|dictionary| dictionary.known(&token.lower) || dictionary.known(&token.word))
        })
        .map(|token| {
            let suggestions = suggestions_for(&token.lower, dictionaries);
            (&words[token.source], token.word, suggestions)
        })
        .collect()
}

fn margin_crop(width: usize, height: usize) -> PixelRect {
    let mx = (width as f32 * MARGIN_RATIO) as usize;
    let my = (height as f32 * MARGIN_RATIO) as usize;
    PixelRect::new(mx, my, width.saturating_sub(2 * mx), height.saturating_sub(2 * my))
}

/// Finds spelling errors introduced, kept or fixed between two images.
pub struct SpellingDiffClassifier {
    ocr: Arc<dyn OcrEngine>,
    dictionaries: Arc<DictionaryCache>,
}

impl SpellingDiffClassifier {
    pub fn new(ocr: Arc<dyn OcrEngine>, dictionaries: Arc<DictionaryCache>) -> Self {
        Self { ocr, dictionaries }
    }

    pub fn classify(
        &self,
        master: &RgbFrame,
        sample: &RgbFrame,
        languages: &LanguageSelection,
        settings: &SpellingSettings,
    ) -> Result<SpellingReport, InputError> {
        let dictionaries = self.dictionaries.resolve(languages);
        if dictionaries.is_empty() {
            warn!("no spelling dictionary available for [{languages}], skipping spelling");
            return Ok(SpellingReport::default());
        }
        let master_findings = self.check_image(master, languages, &dictionaries, settings)?;
        let sample_findings = self.check_image(sample, languages, &dictionaries, settings)?;
        let report = reconcile(master_findings, sample_findings);
        debug!(
            "spelling: {} on sample, {} fixed",
            report.errors.len(),
            report.fixed.len()
        );
        Ok(report)
    }

    /// Unknown words of one image with print margins excluded.
    pub fn check_image(
        &self,
        frame: &RgbFrame,
        languages: &LanguageSelection,
        dictionaries: &[Arc<dyn Dictionary>],
        settings: &SpellingSettings,
    ) -> Result<Vec<SpellingFinding>, InputError> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let area = margin_crop(width, height);
        if area.is_empty() {
            return Err(InputError::EmptyZone { index: 0 });
        }
        let cropped = frame.crop(area);
        let tag = languages.ocr_tag();
        let request = OcrRequest::new(&cropped, &tag).with_segmentation(PageSegmentation::SingleBlock);
        let response = match self.ocr.recognize(&request) {
            Ok(response) => response,
            Err(err) => {
                warn!("{} OCR failed during spelling check: {err}", self.ocr.name());
                return Ok(Vec::new());
            }
        };

        let findings = unknown_words(&response.words, dictionaries, settings)
            .into_iter()
            .map(|(source, word, suggestions)| {
                let rect = source
                    .rect()
                    .offset(area.x, area.y)
                    .clamp_to(width, height);
                SpellingFinding {
                    word,
                    bbox: NormalizedBox::from_pixels(rect, width, height),
                    confidence: source.confidence,
                    suggestions,
                }
            })
            .collect();
        Ok(findings)
    }
}
