use std::collections::BTreeMap;

use log::debug;
use printqc_comparator::merge::{ELEMENT_MERGE_GAP, merge_groups};
use printqc_comparator::pipeline::{external_components, ops};
use printqc_types::{
    DetectedElement, ElementChange, ElementCount, ElementInventory, ElementKind, NormalizedBox,
    PixelRect, RgbFrame, round_to,
};

use crate::classify::classify_region;
use crate::features::RegionStats;
use crate::filters::{FeatureMaps, GaborBank};

// Candidate mask: equal parts edge and high-frequency response.
const EDGE_WEIGHT: f32 = 0.5;
const HIGH_FREQUENCY_WEIGHT: f32 = 0.5;
const CANDIDATE_THRESHOLD: u8 = 20;
const CANDIDATE_KERNEL: (usize, usize) = (7, 7);
const CLOSE_ITERATIONS: usize = 2;
const DILATE_ITERATIONS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    /// Groups whose largest component covers no more than this share of
    /// the image are dropped.
    pub min_area_ratio: f32,
    pub merge_gap: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.002,
            merge_gap: ELEMENT_MERGE_GAP,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementDetector {
    settings: DetectorSettings,
    bank: GaborBank,
}

impl ElementDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            bank: GaborBank::default(),
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Classified elements, largest first.
    pub fn detect(&self, frame: &RgbFrame) -> Vec<DetectedElement> {
        if frame.is_empty() {
            return Vec::new();
        }
        let maps = FeatureMaps::compute(frame, &self.bank);
        let regions = self.candidate_regions(&maps);
        let total_area = (maps.width * maps.height) as f32;

        let mut elements: Vec<DetectedElement> = regions
            .into_iter()
            .map(|rect| {
                let stats = RegionStats::measure(&maps, frame, rect);
                let (kind, confidence) = classify_region(&stats);
                DetectedElement {
                    kind,
                    confidence: round_to(confidence, 3),
                    bbox: NormalizedBox::from_pixels(rect, maps.width, maps.height),
                    area_percent: round_to(rect.area() as f32 / total_area * 100.0, 2),
                    attributes: stats.attributes(),
                }
            })
            .collect();
        elements.sort_by(|a, b| b.area_percent.total_cmp(&a.area_percent));
        debug!("detected {} elements", elements.len());
        elements
    }

    /// Merged candidate boxes. Every component takes part in merging, then
    /// groups are kept when their largest component clears the area floor,
    /// so raising `min_area_ratio` can only remove groups.
    pub fn candidate_regions(&self, maps: &FeatureMaps) -> Vec<PixelRect> {
        let (width, height) = (maps.width, maps.height);
        let combined: Vec<u8> = maps
            .edges
            .iter()
            .zip(&maps.high_frequency)
            .map(|(&e, &h)| ops::saturate_u8(EDGE_WEIGHT * e as f32 + HIGH_FREQUENCY_WEIGHT * h as f32))
            .collect();
        let binary = ops::threshold_binary(&combined, CANDIDATE_THRESHOLD);
        let closed = ops::close_rect(&binary, width, height, CANDIDATE_KERNEL, CLOSE_ITERATIONS);
        let mask = ops::dilate_rect(&closed, width, height, CANDIDATE_KERNEL, DILATE_ITERATIONS);

        let components = external_components(&mask, width, height);
        let min_area = (width * height) as f64 * self.settings.min_area_ratio.max(0.0) as f64;
        let boxes: Vec<PixelRect> = components.iter().map(|c| c.rect).collect();
        merge_groups(&boxes, self.settings.merge_gap)
            .into_iter()
            .filter(|(_, members)| {
                members
                    .iter()
                    .map(|&index| components[index].filled_area)
                    .max()
                    .is_some_and(|largest| largest as f64 > min_area.floor())
            })
            .map(|(rect, _)| rect)
            .collect()
    }

    /// Detects both images and tallies element types.
    pub fn detect_and_compare(&self, master: &RgbFrame, sample: &RgbFrame) -> ElementInventory {
        let (master_elements, sample_elements) =
            rayon::join(|| self.detect(master), || self.detect(sample));
        inventory_diff(master_elements, sample_elements)
    }
}

/// Per-type counts of both element lists and the types whose count changed.
pub fn inventory_diff(
    master_elements: Vec<DetectedElement>,
    sample_elements: Vec<DetectedElement>,
) -> ElementInventory {
    let mut summary: BTreeMap<ElementKind, ElementCount> = ElementKind::ALL
        .iter()
        .map(|&kind| (kind, ElementCount::default()))
        .collect();
    for element in &master_elements {
        summary.entry(element.kind).or_default().master += 1;
    }
    for element in &sample_elements {
        summary.entry(element.kind).or_default().sample += 1;
    }
    let changes = ElementKind::ALL
        .iter()
        .filter_map(|kind| {
            let count = summary.get(kind).copied().unwrap_or_default();
            (count.master != count.sample).then(|| ElementChange {
                element_type: *kind,
                master_count: count.master,
                sample_count: count.sample,
                delta: count.sample as i64 - count.master as i64,
            })
        })
        .collect();
    ElementInventory {
        master_elements,
        sample_elements,
        summary,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 3] = [255, 255, 255];

    struct Canvas {
        width: usize,
        height: usize,
        data: Vec<u8>,
    }

    impl Canvas {
        fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                data: WHITE.repeat(width * height),
            }
        }

        fn fill(&mut self, rect: PixelRect, color: [u8; 3]) -> &mut Self {
            for y in rect.y..rect.bottom().min(self.height) {
                for x in rect.x..rect.right().min(self.width) {
                    let offset = (y * self.width + x) * 3;
                    self.data[offset..offset + 3].copy_from_slice(&color);
                }
            }
            self
        }

        fn text_block(&mut self, x0: usize, y0: usize, lines: usize, glyphs: usize) -> &mut Self {
            for line in 0..lines {
                for glyph in 0..glyphs {
                    let rect = PixelRect::new(x0 + glyph * 7, y0 + line * 14, 4, 8);
                    self.fill(rect, [20, 20, 20]);
                }
            }
            self
        }

        fn frame(&self) -> RgbFrame {
            RgbFrame::from_owned(self.width as u32, self.height as u32, self.data.clone()).unwrap()
        }
    }

    fn scene() -> RgbFrame {
        let mut canvas = Canvas::new(400, 400);
        canvas
            .text_block(40, 40, 6, 30)
            .fill(PixelRect::new(60, 260, 40, 40), [200, 30, 30])
            .fill(PixelRect::new(250, 250, 100, 120), [30, 90, 200])
            .fill(PixelRect::new(320, 40, 12, 12), [0, 0, 0]);
        canvas.frame()
    }

    #[test]
    fn blank_image_has_at_most_one_weak_element() {
        let detector = ElementDetector::default();
        let elements = detector.detect(&RgbFrame::filled(200, 200, WHITE));
        assert!(elements.len() <= 1);
        assert!(elements.iter().all(|e| e.confidence <= 0.5));
    }

    #[test]
    fn text_lines_are_detected_as_text() {
        let detector = ElementDetector::default();
        let elements = detector.detect(&scene());
        assert!(!elements.is_empty());
        assert!(elements.iter().any(|e| e.kind == ElementKind::Text), "{elements:?}");
        for pair in elements.windows(2) {
            assert!(pair[0].area_percent >= pair[1].area_percent);
        }
        for element in &elements {
            assert!(element.bbox.right() <= 1.0 + 1e-4);
            assert!(element.bbox.bottom() <= 1.0 + 1e-4);
            assert!((0.0..=1.0).contains(&element.confidence));
            assert_eq!(element.attributes.len(), 8);
        }
    }

    #[test]
    fn raising_min_area_never_adds_elements() {
        let frame = scene();
        let mut previous = usize::MAX;
        for ratio in [0.0, 0.0005, 0.002, 0.01, 0.05, 0.2] {
            let detector = ElementDetector::new(DetectorSettings {
                min_area_ratio: ratio,
                ..DetectorSettings::default()
            });
            let count = detector.detect(&frame).len();
            assert!(count <= previous, "ratio {ratio}: {count} > {previous}");
            previous = count;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn comparison_reports_added_elements() {
        let master = RgbFrame::filled(300, 300, WHITE);
        let mut canvas = Canvas::new(300, 300);
        canvas.fill(PixelRect::new(100, 100, 60, 60), [10, 10, 10]);
        let sample = canvas.frame();

        let inventory = ElementDetector::default().detect_and_compare(&master, &sample);
        assert!(inventory.master_elements.is_empty());
        assert!(!inventory.sample_elements.is_empty());
        assert_eq!(inventory.summary.len(), ElementKind::ALL.len());
        let sample_total: usize = inventory.summary.values().map(|c| c.sample).sum();
        assert_eq!(sample_total, inventory.sample_elements.len());
        let delta_total: i64 = inventory.changes.iter().map(|c| c.delta).sum();
        assert_eq!(delta_total, inventory.sample_elements.len() as i64);
        assert!(inventory.changes.iter().all(|c| c.delta > 0));
    }

    #[test]
    fn inventory_serializes_types_in_lowercase() {
        let inventory = inventory_diff(Vec::new(), Vec::new());
        let json = serde_json::to_value(&inventory).unwrap();
        assert_eq!(json["summary"]["cta"]["master"], 0);
        assert!(json["changes"].as_array().unwrap().is_empty());
    }
}
