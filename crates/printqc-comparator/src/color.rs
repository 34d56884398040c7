//! Colorimetric comparison and dominant palette extraction.

use log::debug;
use palette::{FromColor, Lab, Srgb};
use printqc_types::{PaletteEntry, RGB_CHANNELS, RgbFrame, round_to};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ColorError {
    #[error("cannot measure color of an empty crop")]
    EmptyCrop,
    #[error("color conversion produced a non-finite value")]
    NonFinite,
    #[error("need at least {clusters} pixels to build a palette, got {pixels}")]
    NotEnoughPixels { pixels: usize, clusters: usize },
}

fn to_lab(px: &[u8]) -> Lab {
    let rgb: Srgb<f32> = Srgb::new(px[0], px[1], px[2]).into_format();
    Lab::from_color(rgb.into_linear())
}

/// Mean CIE L*a*b* color of a frame.
pub fn mean_lab(frame: &RgbFrame) -> Result<[f32; 3], ColorError> {
    if frame.is_empty() {
        return Err(ColorError::EmptyCrop);
    }
    let mut sums = [0.0f64; 3];
    for px in frame.data().chunks_exact(RGB_CHANNELS) {
        let lab = to_lab(px);
        sums[0] += lab.l as f64;
        sums[1] += lab.a as f64;
        sums[2] += lab.b as f64;
    }
    let count = frame.pixel_count() as f64;
    let mean = sums.map(|sum| (sum / count) as f32);
    if mean.iter().all(|value| value.is_finite()) {
        Ok(mean)
    } else {
        Err(ColorError::NonFinite)
    }
}

/// Euclidean distance between the mean Lab colors of two crops (CIE76).
pub fn try_delta_e(master: &RgbFrame, sample: &RgbFrame) -> Result<f32, ColorError> {
    let a = mean_lab(master)?;
    let b = mean_lab(sample)?;
    let distance = a
        .iter()
        .zip(&b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();
    if distance.is_finite() {
        Ok(distance)
    } else {
        Err(ColorError::NonFinite)
    }
}

/// [`try_delta_e`] with failures reported as 0.0.
pub fn delta_e(master: &RgbFrame, sample: &RgbFrame) -> f32 {
    try_delta_e(master, sample).unwrap_or_else(|err| {
        debug!("delta-e unavailable: {err}");
        0.0
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteSettings {
    pub colors: usize,
    pub max_samples: usize,
    pub attempts: usize,
    pub max_iterations: usize,
    /// Stop once no center moves farther than this (RGB units).
    pub epsilon: f32,
    pub seed: u64,
}

impl Default for PaletteSettings {
    fn default() -> Self {
        Self {
            colors: 6,
            max_samples: 10_000,
            attempts: 3,
            max_iterations: 20,
            epsilon: 1.0,
            seed: 0x5eed,
        }
    }
}

type Point = [f32; 3];

fn distance2(a: &Point, b: &Point) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(point: &Point, centers: &[Point]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (index, center) in centers.iter().enumerate() {
        let d = distance2(point, center);
        if d < best.1 {
            best = (index, d);
        }
    }
    best
}

// k-means++ seeding: each new center is drawn with probability
// proportional to its squared distance from the closest chosen center.
fn seed_centers(points: &[Point], k: usize, rng: &mut StdRng) -> Vec<Point> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);
    let mut closest: Vec<f32> = points.iter().map(|p| distance2(p, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = closest.iter().map(|&d| d as f64).sum();
        let next = if total <= 0.0 {
            rng.gen_range(0..points.len())
        } else {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = points.len() - 1;
            for (index, &d) in closest.iter().enumerate() {
                target -= d as f64;
                if target <= 0.0 {
                    chosen = index;
                    break;
                }
            }
            chosen
        };
        let center = points[next];
        for (d, p) in closest.iter_mut().zip(points) {
            *d = d.min(distance2(p, &center));
        }
        centers.push(center);
    }
    centers
}

struct Clustering {
    centers: Vec<Point>,
    labels: Vec<usize>,
    compactness: f64,
}

fn run_kmeans(points: &[Point], settings: &PaletteSettings, rng: &mut StdRng) -> Clustering {
    let k = settings.colors;
    let mut centers = seed_centers(points, k, rng);
    let mut labels = vec![0usize; points.len()];
    for _ in 0..settings.max_iterations {
        for (label, point) in labels.iter_mut().zip(points) {
            *label = nearest(point, &centers).0;
        }
        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (&label, point) in labels.iter().zip(points) {
            for c in 0..3 {
                sums[label][c] += point[c] as f64;
            }
            counts[label] += 1;
        }
        let mut shift = 0.0f32;
        for (index, center) in centers.iter_mut().enumerate() {
            if counts[index] == 0 {
                continue;
            }
            let n = counts[index] as f64;
            let updated = sums[index].map(|sum| (sum / n) as f32);
            shift = shift.max(distance2(center, &updated).sqrt());
            *center = updated;
        }
        if shift <= settings.epsilon {
            break;
        }
    }
    let mut compactness = 0.0f64;
    for (label, point) in labels.iter_mut().zip(points) {
        let (index, d) = nearest(point, &centers);
        *label = index;
        compactness += d as f64;
    }
    Clustering {
        centers,
        labels,
        compactness,
    }
}

/// Dominant colors by k-means over sampled pixels, largest share first.
pub fn try_dominant_palette(
    frame: &RgbFrame,
    settings: &PaletteSettings,
) -> Result<Vec<PaletteEntry>, ColorError> {
    let clusters = settings.colors.max(1);
    let pixels = frame.pixel_count();
    if pixels < clusters {
        return Err(ColorError::NotEnoughPixels { pixels, clusters });
    }
    let mut rng = StdRng::seed_from_u64(settings.seed);
    let point_at = |i: usize| -> Point {
        let px = &frame.data()[i * RGB_CHANNELS..(i + 1) * RGB_CHANNELS];
        [px[0] as f32, px[1] as f32, px[2] as f32]
    };
    let points: Vec<Point> = if pixels > settings.max_samples {
        index::sample(&mut rng, pixels, settings.max_samples)
            .into_iter()
            .map(point_at)
            .collect()
    } else {
        (0..pixels).map(point_at).collect()
    };

    let settings = PaletteSettings {
        colors: clusters,
        ..*settings
    };
    let mut best: Option<Clustering> = None;
    for _ in 0..settings.attempts.max(1) {
        let clustering = run_kmeans(&points, &settings, &mut rng);
        if best
            .as_ref()
            .is_none_or(|current| clustering.compactness < current.compactness)
        {
            best = Some(clustering);
        }
    }
    let Some(best) = best else {
        return Ok(Vec::new());
    };

    let mut counts = vec![0usize; clusters];
    for &label in &best.labels {
        counts[label] += 1;
    }
    let total = points.len() as f32;
    let mut entries: Vec<(usize, PaletteEntry)> = best
        .centers
        .iter()
        .zip(&counts)
        .filter(|(_, count)| **count > 0)
        .map(|(center, &count)| {
            let [r, g, b] = center.map(|c| c.round().clamp(0.0, 255.0) as u8);
            (
                count,
                PaletteEntry {
                    hex: format!("#{r:02x}{g:02x}{b:02x}"),
                    share_percent: round_to(count as f32 / total * 100.0, 1),
                },
            )
        })
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(entries.into_iter().map(|(_, entry)| entry).collect())
}

/// [`try_dominant_palette`] with failures reported as an empty palette.
pub fn dominant_palette(frame: &RgbFrame, settings: &PaletteSettings) -> Vec<PaletteEntry> {
    try_dominant_palette(frame, settings).unwrap_or_else(|err| {
        debug!("palette unavailable: {err}");
        Vec::new()
    })
}
