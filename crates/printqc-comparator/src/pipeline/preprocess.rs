use printqc_types::{InputError, PixelRect, RGB_CHANNELS, RgbFrame, Zone};

use super::ops;

/// Luminance plane with BT.601 weights in 14-bit fixed point.
pub fn grayscale(frame: &RgbFrame) -> Vec<u8> {
    frame
        .data()
        .chunks_exact(RGB_CHANNELS)
        .map(|px| {
            let y = px[0] as u32 * 4899 + px[1] as u32 * 9617 + px[2] as u32 * 1868 + 8192;
            (y >> 14) as u8
        })
        .collect()
}

pub fn grayscale_f32(frame: &RgbFrame) -> Vec<f32> {
    grayscale(frame).into_iter().map(|v| v as f32).collect()
}

/// Splits a frame into three `f32` channel planes.
pub fn channel_planes(frame: &RgbFrame) -> [Vec<f32>; 3] {
    let mut planes = [
        Vec::with_capacity(frame.pixel_count()),
        Vec::with_capacity(frame.pixel_count()),
        Vec::with_capacity(frame.pixel_count()),
    ];
    for px in frame.data().chunks_exact(RGB_CHANNELS) {
        for (plane, &value) in planes.iter_mut().zip(px) {
            plane.push(value as f32);
        }
    }
    planes
}

/// Interleaves three channel planes back into a frame, rounding and saturating.
pub fn frame_from_planes(
    planes: &[Vec<f32>; 3],
    width: usize,
    height: usize,
) -> Result<RgbFrame, InputError> {
    let mut data = Vec::with_capacity(width * height * RGB_CHANNELS);
    for idx in 0..width * height {
        for plane in planes {
            data.push(ops::saturate_u8(plane[idx]));
        }
    }
    RgbFrame::from_owned(width as u32, height as u32, data)
}

/// Area-averaged resize of every channel.
pub fn resize_area(frame: &RgbFrame, width: usize, height: usize) -> Result<RgbFrame, InputError> {
    let (src_w, src_h) = (frame.width() as usize, frame.height() as usize);
    let planes = channel_planes(frame)
        .map(|plane| ops::resize_average(&plane, src_w, src_h, width, height));
    frame_from_planes(&planes, width, height)
}

/// Downscales so the longest side is at most `max_side`; smaller frames
/// are returned unchanged.
pub fn thumbnail(frame: &RgbFrame, max_side: usize) -> Result<RgbFrame, InputError> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    let longest = width.max(height);
    if longest <= max_side || frame.is_empty() {
        return Ok(frame.clone());
    }
    let scale = max_side as f32 / longest as f32;
    let new_width = ((width as f32 * scale).round() as usize).max(1);
    let new_height = ((height as f32 * scale).round() as usize).max(1);
    resize_area(frame, new_width, new_height)
}

/// Union of all zones as a 0/255 mask, or `None` when no zones are given.
pub fn zone_mask(zones: &[Zone], width: usize, height: usize) -> Result<Option<Vec<u8>>, InputError> {
    if zones.is_empty() {
        return Ok(None);
    }
    let mut mask = vec![0u8; width * height];
    for (index, zone) in zones.iter().enumerate() {
        let rect = zone.to_pixels(width, height);
        if rect.is_empty() {
            return Err(InputError::EmptyZone { index });
        }
        for y in rect.y..rect.bottom() {
            mask[y * width + rect.x..y * width + rect.right()].fill(255);
        }
    }
    Ok(Some(mask))
}

/// Copies the pixels of `rect` out of a single-channel plane.
pub fn crop_plane<T: Copy>(plane: &[T], width: usize, rect: PixelRect) -> Vec<T> {
    let mut out = Vec::with_capacity(rect.area());
    for y in rect.y..rect.bottom() {
        out.extend_from_slice(&plane[y * width + rect.x..y * width + rect.right()]);
    }
    out
}

/// Mean color of the one-pixel border of a frame.
pub fn border_mean(frame: &RgbFrame) -> [u8; 3] {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return [0, 0, 0];
    }
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    let mut add = |x: u32, y: u32| {
        let px = frame.pixel(x, y);
        for (sum, value) in sums.iter_mut().zip(px) {
            *sum += value as u64;
        }
        count += 1;
    };
    for x in 0..width {
        add(x, 0);
        if height > 1 {
            add(x, height - 1);
        }
    }
    for y in 1..height.saturating_sub(1) {
        add(0, y);
        if width > 1 {
            add(width - 1, y);
        }
    }
    sums.map(|sum| ((sum as f64 / count as f64).round()) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printqc_types::NormalizedBox;

    #[test]
    fn grayscale_matches_bt601_weights() {
        let frame = RgbFrame::from_owned(3, 1, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]).unwrap();
        assert_eq!(grayscale(&frame), vec![76, 150, 29]);
    }

    #[test]
    fn zone_mask_unions_zones() {
        let zones = [
            NormalizedBox::new(0.0, 0.0, 0.5, 0.5),
            NormalizedBox::new(0.5, 0.5, 0.5, 0.5),
        ];
        let mask = zone_mask(&zones, 4, 4).unwrap().unwrap();
        assert_eq!(mask.iter().filter(|&&v| v == 255).count(), 8);
        assert_eq!(mask[0], 255);
        assert_eq!(mask[3], 0);
        assert_eq!(mask[15], 255);
    }

    #[test]
    fn empty_zone_is_rejected() {
        let zones = [NormalizedBox::new(0.5, 0.5, 0.01, 0.3)];
        let err = zone_mask(&zones, 20, 20).unwrap_err();
        assert!(matches!(err, InputError::EmptyZone { index: 0 }));
    }

    #[test]
    fn no_zones_means_whole_image() {
        assert!(zone_mask(&[], 10, 10).unwrap().is_none());
    }

    #[test]
    fn border_mean_ignores_interior() {
        let mut data = vec![10u8; 5 * 5 * 3];
        let center = (2 * 5 + 2) * 3;
        data[center..center + 3].copy_from_slice(&[250, 250, 250]);
        let frame = RgbFrame::from_owned(5, 5, data).unwrap();
        assert_eq!(border_mean(&frame), [10, 10, 10]);
    }

    #[test]
    fn thumbnail_limits_longest_side() {
        let frame = RgbFrame::filled(500, 100, [1, 2, 3]);
        let thumb = thumbnail(&frame, 250).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (250, 50));
        assert_eq!(thumb.pixel(10, 10), [1, 2, 3]);
    }
}
