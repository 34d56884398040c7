//! Windowed structural similarity (SSIM) over 8-bit luminance planes.
//!
//! Local statistics use a uniform square window with symmetric borders and
//! the unbiased (sample) covariance.

const K1: f32 = 0.01;
const K2: f32 = 0.03;
const DATA_RANGE: f32 = 255.0;

/// Per-pixel SSIM map plus its border-cropped mean.
#[derive(Debug, Clone)]
pub struct StructuralMap {
    pub width: usize,
    pub height: usize,
    pub window: usize,
    pub values: Vec<f32>,
    pub score: f32,
}

impl StructuralMap {
    /// `(1 - ssim) * 255`, saturated to 8 bits.
    pub fn dissimilarity(&self) -> Vec<u8> {
        self.values
            .iter()
            .map(|&value| ((1.0 - value) * 255.0).clamp(0.0, 255.0) as u8)
            .collect()
    }
}

// Mirror including the edge sample: cba|abc|cba.
fn reflect_symmetric(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let mut index = index.rem_euclid(period);
    if index >= len as isize {
        index = period - 1 - index;
    }
    index as usize
}

fn uniform_filter(pixels: &[f32], width: usize, height: usize, window: usize) -> Vec<f32> {
    let radius = (window / 2) as isize;
    let norm = 1.0 / window as f32;
    let mut rows = vec![0.0f32; pixels.len()];
    for y in 0..height {
        let row = &pixels[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = 0.0f32;
            for k in -radius..=radius {
                sum += row[reflect_symmetric(x as isize + k, width)];
            }
            rows[y * width + x] = sum * norm;
        }
    }
    let mut output = vec![0.0f32; pixels.len()];
    for y in 0..height {
        for k in -radius..=radius {
            let sy = reflect_symmetric(y as isize + k, height);
            let src = &rows[sy * width..(sy + 1) * width];
            let dst = &mut output[y * width..(y + 1) * width];
            for (out, &value) in dst.iter_mut().zip(src) {
                *out += value * norm;
            }
        }
    }
    output
}

/// Computes the SSIM map of two equally sized planes with an odd `window`.
pub fn structural_similarity(
    a: &[u8],
    b: &[u8],
    width: usize,
    height: usize,
    window: usize,
) -> StructuralMap {
    assert_eq!(a.len(), width * height);
    assert_eq!(b.len(), width * height);
    let window = window.max(1) | 1;
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);
    let samples = (window * window) as f32;
    let cov_norm = if samples > 1.0 {
        samples / (samples - 1.0)
    } else {
        1.0
    };

    let fa: Vec<f32> = a.iter().map(|&v| v as f32).collect();
    let fb: Vec<f32> = b.iter().map(|&v| v as f32).collect();
    let aa: Vec<f32> = fa.iter().map(|v| v * v).collect();
    let bb: Vec<f32> = fb.iter().map(|v| v * v).collect();
    let ab: Vec<f32> = fa.iter().zip(&fb).map(|(x, y)| x * y).collect();

    let ux = uniform_filter(&fa, width, height, window);
    let uy = uniform_filter(&fb, width, height, window);
    let uxx = uniform_filter(&aa, width, height, window);
    let uyy = uniform_filter(&bb, width, height, window);
    let uxy = uniform_filter(&ab, width, height, window);

    let values: Vec<f32> = (0..width * height)
        .map(|i| {
            let vx = cov_norm * (uxx[i] - ux[i] * ux[i]);
            let vy = cov_norm * (uyy[i] - uy[i] * uy[i]);
            let vxy = cov_norm * (uxy[i] - ux[i] * uy[i]);
            let numerator = (2.0 * ux[i] * uy[i] + c1) * (2.0 * vxy + c2);
            let denominator = (ux[i] * ux[i] + uy[i] * uy[i] + c1) * (vx + vy + c2);
            numerator / denominator
        })
        .collect();

    let pad = (window - 1) / 2;
    let score = cropped_mean(&values, width, height, pad);
    StructuralMap {
        width,
        height,
        window,
        values,
        score,
    }
}

fn cropped_mean(values: &[f32], width: usize, height: usize, pad: usize) -> f32 {
    let (x0, y0) = (pad.min(width), pad.min(height));
    let (x1, y1) = (width.saturating_sub(pad), height.saturating_sub(pad));
    if x1 <= x0 || y1 <= y0 {
        return 1.0;
    }
    let mut sum = 0.0f64;
    for y in y0..y1 {
        for &value in &values[y * width + x0..y * width + x1] {
            sum += value as f64;
        }
    }
    (sum / ((x1 - x0) * (y1 - y0)) as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| ((i % width) * 7 + (i / width) * 3) as u8)
            .collect()
    }

    #[test]
    fn identical_planes_score_one() {
        let plane = gradient(32, 24);
        let map = structural_similarity(&plane, &plane, 32, 24, 7);
        assert_eq!(map.score, 1.0);
        assert!(map.dissimilarity().iter().all(|&v| v == 0));
    }

    #[test]
    fn local_change_lowers_score_locally() {
        let a = gradient(40, 40);
        let mut b = a.clone();
        for y in 10..16 {
            for x in 10..16 {
                b[y * 40 + x] = 255 - b[y * 40 + x];
            }
        }
        let map = structural_similarity(&a, &b, 40, 40, 7);
        assert!(map.score < 1.0);
        let dissimilarity = map.dissimilarity();
        assert!(dissimilarity[13 * 40 + 13] > 50);
        assert_eq!(dissimilarity[35 * 40 + 35], 0);
    }

    #[test]
    fn symmetric_reflection_repeats_edge() {
        assert_eq!(reflect_symmetric(-1, 4), 0);
        assert_eq!(reflect_symmetric(-2, 4), 1);
        assert_eq!(reflect_symmetric(4, 4), 3);
        assert_eq!(reflect_symmetric(5, 4), 2);
    }
}
