//! Raster primitives shared by the comparator and element detector.
//!
//! Planes are row-major slices with explicit `width`/`height`. Filters use
//! mirrored borders that do not repeat the edge sample (`dcb|abcd|cba`);
//! morphology ignores samples outside the plane.

use std::collections::VecDeque;

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

// Binomial kernels used for small Gaussian apertures when no sigma is given.
const GAUSSIAN_1: [f32; 1] = [1.0];
const GAUSSIAN_3: [f32; 3] = [0.25, 0.5, 0.25];
const GAUSSIAN_5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];
const GAUSSIAN_7: [f32; 7] = [
    0.031_25, 0.109_375, 0.218_75, 0.281_25, 0.218_75, 0.109_375, 0.031_25,
];

/// Mirrors `index` into `0..len` without repeating the edge sample.
pub fn reflect101(index: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut index = index;
    while index < 0 || index > last {
        if index < 0 {
            index = -index;
        }
        if index > last {
            index = 2 * last - index;
        }
    }
    index as usize
}

pub fn to_f32(pixels: &[u8]) -> Vec<f32> {
    pixels.iter().map(|&value| value as f32).collect()
}

/// Rounds and saturates to the 8-bit range.
pub fn to_u8(values: &[f32]) -> Vec<u8> {
    values.iter().map(|&value| saturate_u8(value)).collect()
}

pub fn saturate_u8(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

pub fn resize_average(
    pixels: &[f32],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return vec![0.0; new_width * new_height];
    }
    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;
    let mut output = vec![0.0f32; new_width * new_height];
    for ny in 0..new_height {
        let src_y0 = (ny as f32 * scale_y).floor() as usize;
        let src_y1 = (((ny + 1) as f32 * scale_y).ceil() as usize).clamp(src_y0 + 1, height);
        for nx in 0..new_width {
            let src_x0 = (nx as f32 * scale_x).floor() as usize;
            let src_x1 = (((nx + 1) as f32 * scale_x).ceil() as usize).clamp(src_x0 + 1, width);
            let mut sum = 0.0f32;
            let mut count = 0usize;
            for sy in src_y0.min(height - 1)..src_y1 {
                for sx in src_x0.min(width - 1)..src_x1 {
                    sum += pixels[sy * width + sx];
                    count += 1;
                }
            }
            output[ny * new_width + nx] = if count == 0 { 0.0 } else { sum / count as f32 };
        }
    }
    output
}

/// Bilinear resize with pixel-center alignment.
pub fn resize_bilinear(
    pixels: &[f32],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    if width == 0 || height == 0 || new_width == 0 || new_height == 0 {
        return vec![0.0; new_width * new_height];
    }
    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;
    let mut output = Vec::with_capacity(new_width * new_height);
    for ny in 0..new_height {
        let sy = ((ny as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (height - 1) as f32);
        for nx in 0..new_width {
            let sx = ((nx as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (width - 1) as f32);
            output.push(sample_bilinear(pixels, width, height, sx, sy));
        }
    }
    output
}

/// Samples at fractional coordinates, replicating edge pixels outside the plane.
pub fn sample_bilinear(pixels: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let top = pixels[y0 * width + x0] * (1.0 - fx) + pixels[y0 * width + x1] * fx;
    let bottom = pixels[y1 * width + x0] * (1.0 - fx) + pixels[y1 * width + x1] * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Normalized 1-D Gaussian taps. Odd apertures up to 7 use fixed binomial
/// weights; larger ones derive sigma from the aperture.
pub fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    match ksize {
        0 | 1 => GAUSSIAN_1.to_vec(),
        3 => GAUSSIAN_3.to_vec(),
        5 => GAUSSIAN_5.to_vec(),
        7 => GAUSSIAN_7.to_vec(),
        _ => {
            let sigma = 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8;
            gaussian_kernel_sigma(ksize, sigma)
        }
    }
}

pub fn gaussian_kernel_sigma(ksize: usize, sigma: f32) -> Vec<f32> {
    let center = (ksize as f32 - 1.0) * 0.5;
    let scale = -0.5 / (sigma * sigma);
    let mut taps: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - center;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    if sum > 0.0 {
        taps.iter_mut().for_each(|tap| *tap /= sum);
    }
    taps
}

/// Correlates the plane with `kernel_x` along rows, then `kernel_y` along
/// columns. Both kernels are centered.
pub fn separable_filter(
    pixels: &[f32],
    width: usize,
    height: usize,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let cx = (kernel_x.len() / 2) as isize;
    let cy = (kernel_y.len() / 2) as isize;

    let mut rows = vec![0.0f32; pixels.len()];
    for y in 0..height {
        let row = &pixels[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &weight) in kernel_x.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - cx, width);
                sum += row[sx] * weight;
            }
            rows[y * width + x] = sum;
        }
    }

    let mut output = vec![0.0f32; pixels.len()];
    for y in 0..height {
        for (k, &weight) in kernel_y.iter().enumerate() {
            let sy = reflect101(y as isize + k as isize - cy, height);
            let src = &rows[sy * width..(sy + 1) * width];
            let dst = &mut output[y * width..(y + 1) * width];
            for (out, &value) in dst.iter_mut().zip(src) {
                *out += value * weight;
            }
        }
    }
    output
}

pub fn gaussian_blur(pixels: &[f32], width: usize, height: usize, ksize: usize) -> Vec<f32> {
    let kernel = gaussian_kernel(ksize);
    separable_filter(pixels, width, height, &kernel, &kernel)
}

pub fn gaussian_blur_u8(pixels: &[u8], width: usize, height: usize, ksize: usize) -> Vec<u8> {
    to_u8(&gaussian_blur(&to_f32(pixels), width, height, ksize))
}

/// Normalized box filter with a square `ksize` window.
pub fn box_mean(pixels: &[f32], width: usize, height: usize, ksize: usize) -> Vec<f32> {
    let ksize = ksize.max(1);
    let kernel = vec![1.0 / ksize as f32; ksize];
    separable_filter(pixels, width, height, &kernel, &kernel)
}

/// Dense 2-D correlation with a centered `kernel_width` x `kernel_height` kernel.
pub fn filter2d(
    pixels: &[f32],
    width: usize,
    height: usize,
    kernel: &[f32],
    kernel_width: usize,
    kernel_height: usize,
) -> Vec<f32> {
    assert_eq!(pixels.len(), width * height);
    assert_eq!(kernel.len(), kernel_width * kernel_height);
    let cx = (kernel_width / 2) as isize;
    let cy = (kernel_height / 2) as isize;
    let mut output = vec![0.0f32; pixels.len()];
    for y in 0..height {
        for ky in 0..kernel_height {
            let sy = reflect101(y as isize + ky as isize - cy, height);
            let src = &pixels[sy * width..(sy + 1) * width];
            let taps = &kernel[ky * kernel_width..(ky + 1) * kernel_width];
            for x in 0..width {
                let mut sum = 0.0f32;
                for (kx, &weight) in taps.iter().enumerate() {
                    if weight == 0.0 {
                        continue;
                    }
                    sum += src[reflect101(x as isize + kx as isize - cx, width)] * weight;
                }
                output[y * width + x] += sum;
            }
        }
    }
    output
}

/// Horizontal and vertical 3x3 Sobel derivatives.
pub fn sobel(pixels: &[f32], width: usize, height: usize) -> (Vec<f32>, Vec<f32>) {
    let derivative = [-1.0f32, 0.0, 1.0];
    let smooth = [1.0f32, 2.0, 1.0];
    let gx = separable_filter(pixels, width, height, &derivative, &smooth);
    let gy = separable_filter(pixels, width, height, &smooth, &derivative);
    (gx, gy)
}

pub fn absdiff(a: &[u8], b: &[u8]) -> Vec<u8> {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(&x, &y)| x.abs_diff(y)).collect()
}

/// Canny edge map (0 or 255) with an L1 gradient norm and hysteresis
/// between `low` and `high`. Edges are one pixel wide.
pub fn canny(gray: &[u8], width: usize, height: usize, low: f32, high: f32) -> Vec<u8> {
    assert_eq!(gray.len(), width * height);
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let (gx, gy) = sobel(&to_f32(gray), width, height);
    let magnitude: Vec<f32> = gx.iter().zip(&gy).map(|(x, y)| x.abs() + y.abs()).collect();
    let at = |x: usize, y: usize, dx: isize, dy: isize| -> f32 {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
            0.0
        } else {
            magnitude[ny as usize * width + nx as usize]
        }
    };

    // 0 = suppressed, 1 = weak candidate, 2 = edge
    let mut state = vec![0u8; gray.len()];
    let mut queue = VecDeque::new();
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }
            let ax = gx[idx].abs();
            let ay = gy[idx].abs();
            let is_peak = if ay < ax * TAN_22_5 {
                m > at(x, y, -1, 0) && m >= at(x, y, 1, 0)
            } else if ay > ax * TAN_67_5 {
                m > at(x, y, 0, -1) && m >= at(x, y, 0, 1)
            } else {
                let s: isize = if (gx[idx] < 0.0) != (gy[idx] < 0.0) { -1 } else { 1 };
                m > at(x, y, -s, -1) && m > at(x, y, s, 1)
            };
            if !is_peak {
                continue;
            }
            if m > high {
                state[idx] = 2;
                queue.push_back(idx);
            } else {
                state[idx] = 1;
            }
        }
    }

    while let Some(idx) = queue.pop_front() {
        let x = idx % width;
        let y = idx / width;
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let nidx = ny * width + nx;
                if state[nidx] == 1 {
                    state[nidx] = 2;
                    queue.push_back(nidx);
                }
            }
        }
    }

    state
        .into_iter()
        .map(|value| if value == 2 { 255 } else { 0 })
        .collect()
}

#[derive(Clone, Copy)]
enum Morph {
    Dilate,
    Erode,
}

fn morph_pass(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel_width: usize,
    kernel_height: usize,
    op: Morph,
) -> Vec<u8> {
    let reduce = |acc: u8, value: u8| match op {
        Morph::Dilate => acc.max(value),
        Morph::Erode => acc.min(value),
    };
    let identity = match op {
        Morph::Dilate => u8::MIN,
        Morph::Erode => u8::MAX,
    };
    let ax = kernel_width / 2;
    let ay = kernel_height / 2;

    let mut rows = vec![identity; mask.len()];
    for y in 0..height {
        for x in 0..width {
            let start = x.saturating_sub(ax);
            let end = (x + kernel_width - ax).min(width);
            let mut acc = identity;
            for sx in start..end {
                acc = reduce(acc, mask[y * width + sx]);
            }
            rows[y * width + x] = acc;
        }
    }

    let mut output = vec![identity; mask.len()];
    for y in 0..height {
        let start = y.saturating_sub(ay);
        let end = (y + kernel_height - ay).min(height);
        for x in 0..width {
            let mut acc = identity;
            for sy in start..end {
                acc = reduce(acc, rows[sy * width + x]);
            }
            output[y * width + x] = acc;
        }
    }
    output
}

fn morph(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel: (usize, usize),
    iterations: usize,
    op: Morph,
) -> Vec<u8> {
    assert_eq!(mask.len(), width * height);
    let (kernel_width, kernel_height) = (kernel.0.max(1), kernel.1.max(1));
    let mut current = mask.to_vec();
    for _ in 0..iterations {
        current = morph_pass(&current, width, height, kernel_width, kernel_height, op);
    }
    current
}

/// Grayscale dilation with a `(width, height)` rectangle anchored at its center.
pub fn dilate_rect(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel: (usize, usize),
    iterations: usize,
) -> Vec<u8> {
    morph(mask, width, height, kernel, iterations, Morph::Dilate)
}

pub fn erode_rect(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel: (usize, usize),
    iterations: usize,
) -> Vec<u8> {
    morph(mask, width, height, kernel, iterations, Morph::Erode)
}

/// Dilation followed by erosion, each repeated `iterations` times.
pub fn close_rect(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel: (usize, usize),
    iterations: usize,
) -> Vec<u8> {
    let dilated = dilate_rect(mask, width, height, kernel, iterations);
    erode_rect(&dilated, width, height, kernel, iterations)
}

pub fn open_rect(
    mask: &[u8],
    width: usize,
    height: usize,
    kernel: (usize, usize),
    iterations: usize,
) -> Vec<u8> {
    let eroded = erode_rect(mask, width, height, kernel, iterations);
    dilate_rect(&eroded, width, height, kernel, iterations)
}

/// Marks samples strictly above `threshold` with 255.
pub fn threshold_binary(values: &[u8], threshold: u8) -> Vec<u8> {
    values
        .iter()
        .map(|&value| if value > threshold { 255 } else { 0 })
        .collect()
}

/// Stretches values linearly onto `0..=255`, truncating. A constant plane
/// maps to zero.
pub fn normalize_min_max(values: &[f32]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if values.is_empty() || !range.is_finite() || range <= f32::EPSILON {
        return vec![0; values.len()];
    }
    let scale = 255.0 / range;
    values
        .iter()
        .map(|&value| ((value - min) * scale).clamp(0.0, 255.0) as u8)
        .collect()
}

pub fn mean_u8(values: &[u8]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&value| value as f64).sum::<f64>() as f32 / values.len() as f32
}

/// Population mean and standard deviation.
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}
