use printqc_types::PixelRect;

/// A single recognized word in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: usize,
    pub top: usize,
    pub width: usize,
    pub height: usize,
    /// Recognition confidence in `0..=100`.
    pub confidence: f32,
}

impl OcrWord {
    pub fn new(text: impl Into<String>, left: usize, top: usize, width: usize, height: usize) -> Self {
        Self {
            text: text.into(),
            left,
            top,
            width,
            height,
            confidence: 0.0,
        }
    }

    /// Stores an engine confidence. Negative values mean "no confidence"
    /// and are recorded as zero.
    pub fn with_confidence(mut self, value: f32) -> Self {
        self.confidence = if value.is_finite() && value > 0.0 {
            value.min(100.0)
        } else {
            0.0
        };
        self
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::new(self.left, self.top, self.width, self.height)
    }
}

/// Collection of OCR results in reading order.
#[derive(Debug, Clone, Default)]
pub struct OcrResponse {
    pub words: Vec<OcrWord>,
}

impl OcrResponse {
    pub fn new(words: Vec<OcrWord>) -> Self {
        Self { words }
    }

    pub fn empty() -> Self {
        Self { words: Vec::new() }
    }

    /// All non-blank words joined with single spaces.
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_confidence_becomes_zero() {
        let word = OcrWord::new("hola", 0, 0, 10, 10).with_confidence(-1.0);
        assert_eq!(word.confidence, 0.0);
        let word = OcrWord::new("hola", 0, 0, 10, 10).with_confidence(91.5);
        assert_eq!(word.confidence, 91.5);
    }

    #[test]
    fn text_skips_blank_words() {
        let response = OcrResponse::new(vec![
            OcrWord::new("Oferta", 0, 0, 10, 10),
            OcrWord::new("  ", 12, 0, 4, 10),
            OcrWord::new("válida", 20, 0, 10, 10),
        ]);
        assert_eq!(response.text(), "Oferta válida");
    }
}
