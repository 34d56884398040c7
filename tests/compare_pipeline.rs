use std::collections::HashMap;
use std::sync::Arc;

use printqc::output::{ComparisonRecord, OutputManager};
use printqc::{CompareRequest, InspectError, Inspector};
use printqc_elements::DetectorSettings;
use printqc_ocr::{LanguageSelection, OcrEngine, OcrError, OcrRequest, OcrResponse, OcrWord};
use printqc_spelling::{
    Dictionary, DictionaryCache, DictionaryError, DictionaryFactory, SpellingSettings,
    WordListDictionary,
};
use printqc_types::{
    DifferenceKind, InputError, PixelRect, RgbFrame, Severity, SpellingCategory, Zone,
};

const BACKGROUND: [u8; 3] = [200, 200, 200];

fn paint(width: u32, height: u32, blocks: &[(PixelRect, [u8; 3])]) -> RgbFrame {
    let mut data = BACKGROUND.repeat((width * height) as usize);
    for (rect, color) in blocks {
        for y in rect.y..rect.bottom().min(height as usize) {
            for x in rect.x..rect.right().min(width as usize) {
                let offset = (y * width as usize + x) * 3;
                data[offset..offset + 3].copy_from_slice(color);
            }
        }
    }
    RgbFrame::from_owned(width, height, data).unwrap()
}

fn master_scene() -> RgbFrame {
    paint(
        400,
        400,
        &[
            (PixelRect::new(40, 40, 120, 60), [30, 60, 140]),
            (PixelRect::new(250, 60, 90, 90), [180, 40, 40]),
            (PixelRect::new(60, 280, 280, 50), [20, 20, 20]),
        ],
    )
}

#[test]
fn identical_images_report_nothing() {
    let master = master_scene();
    let report = Inspector::default()
        .compare(&master, &master, &CompareRequest::default())
        .unwrap();
    assert!(report.differences.is_empty(), "{:?}", report.differences);
    assert!((report.similarity - 1.0).abs() < 1e-3);
    assert!(report.spelling_errors.is_empty());
    assert_eq!(report.artifacts.difference_map.len(), 400 * 400);
}

#[test]
fn injected_block_is_one_color_difference() {
    let block = PixelRect::new(150, 190, 90, 20);
    let master = RgbFrame::filled(400, 400, BACKGROUND);
    let sample = paint(400, 400, &[(block, [119, 119, 119])]);

    let report = Inspector::default()
        .compare(&master, &sample, &CompareRequest::default())
        .unwrap();
    assert_eq!(report.differences.len(), 1, "{:?}", report.differences);
    let difference = &report.differences[0];
    assert_eq!(difference.kind, DifferenceKind::Color);
    assert!(matches!(difference.severity, Severity::Minor | Severity::Important));
    assert!(difference.bbox.to_pixels(400, 400).contains(&block));
    assert!(report.similarity < 1.0);
    assert!(report.master_palette.len() <= 6);
}

#[test]
fn differences_are_ordered_and_bounded() {
    let master = master_scene();
    let sample = paint(
        400,
        400,
        &[
            (PixelRect::new(40, 40, 120, 60), [30, 60, 140]),
            (PixelRect::new(250, 60, 90, 90), [40, 160, 40]),
            (PixelRect::new(60, 280, 140, 50), [20, 20, 20]),
            (PixelRect::new(330, 330, 50, 50), [0, 0, 0]),
        ],
    );
    let report = Inspector::default()
        .compare(&master, &sample, &CompareRequest::default())
        .unwrap();
    assert!(!report.differences.is_empty());
    for pair in report.differences.windows(2) {
        assert!(pair[0].severity.rank() <= pair[1].severity.rank());
    }
    for difference in &report.differences {
        let bbox = difference.bbox;
        assert!(bbox.x >= 0.0 && bbox.y >= 0.0);
        assert!(bbox.right() <= 1.0 + 1e-4 && bbox.bottom() <= 1.0 + 1e-4);
        assert!((0.0..=100.0).contains(&difference.pixel_diff_percent));
    }
}

#[test]
fn empty_zone_is_an_input_error() {
    let master = master_scene();
    let request = CompareRequest {
        zones: vec![Zone::new(0.5, 0.5, 0.0, 0.0)],
        ..CompareRequest::default()
    };
    let err = Inspector::default().compare(&master, &master, &request).unwrap_err();
    assert!(matches!(err, InspectError::Input(InputError::EmptyZone { index: 0 })));
}

struct ScriptedOcr {
    pages: HashMap<u8, Vec<OcrWord>>,
}

impl OcrEngine for ScriptedOcr {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let key = request.frame().pixel(0, 0)[0];
        Ok(OcrResponse::new(self.pages.get(&key).cloned().unwrap_or_default()))
    }
}

/// Reads a label chosen by the darkest ink in the crop.
struct InkOcr {
    labels: HashMap<u8, &'static str>,
}

impl OcrEngine for InkOcr {
    fn name(&self) -> &'static str {
        "ink"
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let darkest = request.frame().data().iter().copied().min().unwrap_or(255);
        let words = self
            .labels
            .get(&darkest)
            .map(|label| vec![OcrWord::new(*label, 0, 0, 40, 12).with_confidence(92.0)])
            .unwrap_or_default();
        Ok(OcrResponse::new(words))
    }
}

fn scene_with(extra: impl IntoIterator<Item = (PixelRect, [u8; 3])>) -> RgbFrame {
    let mut blocks = vec![
        (PixelRect::new(40, 40, 120, 60), [30, 60, 140]),
        (PixelRect::new(250, 60, 90, 90), [180, 40, 40]),
        (PixelRect::new(60, 280, 280, 50), [20, 20, 20]),
    ];
    blocks.extend(extra);
    paint(400, 400, &blocks)
}

#[test]
fn changed_text_region_is_critical_typography() {
    let master = scene_with((0..15).map(|k| (PixelRect::new(180 + 8 * k, 170, 4, 40), [20, 20, 20])));
    let sample = scene_with((0..5).map(|k| (PixelRect::new(180, 170 + 8 * k, 120, 4), [40, 40, 40])));
    let ocr = InkOcr {
        labels: HashMap::from([(20, "Lote 0423"), (40, "Lote 0428")]),
    };
    let inspector = Inspector::new(Some(Arc::new(ocr)), None);

    let report = inspector
        .compare(&master, &sample, &CompareRequest::default())
        .unwrap();

    let first = &report.differences[0];
    assert_eq!(first.kind, DifferenceKind::Typography, "{:?}", report.differences);
    assert_eq!(first.severity, Severity::Critical);
    assert!(first.description.starts_with("Text changed: «Lote 0423»"), "{}", first.description);
    assert!(first.bbox.to_pixels(400, 400).contains(&PixelRect::new(180, 170, 120, 40)));
}

struct EnglishWords;

impl DictionaryFactory for EnglishWords {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn open(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError> {
        let words = ["hello", "receive", "relieve", "the", "world"];
        Ok(Arc::new(WordListDictionary::from_words(code, words)))
    }

    fn has(&self, _: &str) -> bool {
        true
    }
}

fn word(text: &str, left: usize) -> OcrWord {
    OcrWord::new(text, left, 20, 60, 20).with_confidence(95.0)
}

fn spelling_inspector() -> Inspector {
    let pages = HashMap::from([
        (250, vec![word("Hello", 10), word("teh", 90)]),
        (240, vec![word("Hello", 10), word("teh", 90), word("recieve", 170)]),
    ]);
    Inspector::new(
        Some(Arc::new(ScriptedOcr { pages })),
        Some(Arc::new(DictionaryCache::new(Arc::new(EnglishWords)))),
    )
}

fn spelling_request() -> CompareRequest {
    CompareRequest {
        languages: LanguageSelection::parse("en"),
        spelling: Some(SpellingSettings::default()),
        ..CompareRequest::default()
    }
}

#[test]
fn introduced_spelling_errors_become_differences() {
    let master = RgbFrame::filled(400, 200, [250, 250, 250]);
    let sample = RgbFrame::filled(400, 200, [240, 240, 240]);

    let report = spelling_inspector()
        .compare(&master, &sample, &spelling_request())
        .unwrap();

    assert_eq!(report.spelling_errors.len(), 2, "{:?}", report.spelling_errors);
    let introduced = report
        .spelling_errors
        .iter()
        .find(|error| error.word == "recieve")
        .unwrap();
    assert_eq!(introduced.category, SpellingCategory::Introduced);
    assert_eq!(introduced.severity, Severity::Critical);
    let preexisting = report.spelling_errors.iter().find(|error| error.word == "teh").unwrap();
    assert_eq!(preexisting.category, SpellingCategory::Preexisting);
    assert!(report.spelling_fixed.is_empty());

    let spelling: Vec<_> = report
        .differences
        .iter()
        .filter(|difference| difference.kind == DifferenceKind::Spelling)
        .collect();
    assert_eq!(spelling.len(), 1);
    assert_eq!(report.differences[0].severity, Severity::Critical);
    assert!(report.differences[0].description.contains("recieve"));
    assert!(report.differences[0].description.contains("receive"));
}

#[test]
fn preexisting_misspelling_is_not_a_difference() {
    let page = RgbFrame::filled(400, 200, [250, 250, 250]);
    let report = spelling_inspector()
        .compare(&page, &page, &spelling_request())
        .unwrap();

    assert!(report.differences.is_empty(), "{:?}", report.differences);
    assert_eq!(report.spelling_errors.len(), 1);
    assert_eq!(report.spelling_errors[0].word, "teh");
    assert_eq!(report.spelling_errors[0].category, SpellingCategory::Preexisting);
}

#[test]
fn spelling_without_collaborators_is_skipped() {
    let master = RgbFrame::filled(400, 200, [250, 250, 250]);
    let report = Inspector::default()
        .compare(&master, &master, &spelling_request())
        .unwrap();
    assert!(report.spelling_errors.is_empty());
    assert!(report.differences.is_empty());
}

#[test]
fn capabilities_reflect_collaborators() {
    let capabilities = spelling_inspector().capabilities();
    assert_eq!(capabilities.ocr.engine, Some("scripted"));
    assert!(capabilities.ocr.available);
    assert_eq!(capabilities.spelling.engine, Some("fixture"));
    assert!(capabilities.spelling.languages.contains(&"en"));
    assert!(!capabilities.spelling.languages.contains(&"zh"));
}

#[test]
fn element_inventory_counts_new_elements() {
    let master = RgbFrame::filled(300, 300, [255, 255, 255]);
    let sample = paint(300, 300, &[(PixelRect::new(100, 100, 60, 60), [10, 10, 10])]);
    let inventory =
        Inspector::default().element_inventory(&master, &sample, DetectorSettings::default());
    assert!(inventory.master_elements.is_empty());
    assert!(!inventory.sample_elements.is_empty());
    assert!(inventory.changes.iter().all(|change| change.delta > 0));
}

#[tokio::test]
async fn output_manager_writes_report_and_images() {
    let block = PixelRect::new(150, 190, 90, 20);
    let master = RgbFrame::filled(400, 400, BACKGROUND);
    let sample = paint(400, 400, &[(block, [119, 119, 119])]);
    let report = Inspector::default()
        .compare(&master, &sample, &CompareRequest::default())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let files = OutputManager::new(dir.path(), true)
        .write_comparison(&report)
        .await
        .unwrap();
    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&files.report).unwrap()).unwrap();
    assert_eq!(json["page"], 1);
    assert_eq!(json["total_differences"], 1);
    assert_eq!(json["differences"][0]["type"], "color");
    assert!(json["differences"][0]["sample_crop"].is_string());
    assert!(files.heatmap.unwrap().exists());
    assert!(files.annotated.unwrap().exists());

    let record = serde_json::to_value(ComparisonRecord::from(&report)).unwrap();
    assert_eq!(record["alignment"]["status"], "fallback");
}
