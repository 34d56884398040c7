use std::path::Path;

use printqc_types::{InputError, RgbFrame};

/// Decodes an encoded raster (PNG, JPEG) into an RGB frame. `label` names
/// the image in error messages.
pub fn decode_image(label: &str, bytes: &[u8]) -> Result<RgbFrame, InputError> {
    if bytes.is_empty() {
        return Err(InputError::decode(label, "no image data"));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| InputError::decode(label, err.to_string()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(InputError::decode(label, "image has no pixels"));
    }
    RgbFrame::from_owned(width, height, rgb.into_raw())
}

pub async fn read_image(label: &str, path: &Path) -> Result<RgbFrame, InputError> {
    let bytes = tokio::fs::read(path).await?;
    decode_image(label, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ColorType, ImageEncoder};

    #[test]
    fn decodes_png_bytes() {
        let pixels = [10u8, 20, 30, 40, 50, 60];
        let mut encoded = Vec::new();
        PngEncoder::new(&mut encoded)
            .write_image(&pixels, 2, 1, ColorType::Rgb8)
            .unwrap();
        let frame = decode_image("master", &encoded).unwrap();
        assert_eq!((frame.width(), frame.height()), (2, 1));
        assert_eq!(frame.pixel(1, 0), [40, 50, 60]);
    }

    #[test]
    fn garbage_is_an_input_error() {
        let err = decode_image("sample", b"not an image").unwrap_err();
        match err {
            InputError::Decode { label, .. } => assert_eq!(label, "sample"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(
            decode_image("sample", &[]),
            Err(InputError::Decode { .. })
        ));
    }
}
