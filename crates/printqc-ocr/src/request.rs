use printqc_types::RgbFrame;

/// Page layout hint forwarded to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSegmentation {
    /// Let the engine analyse the layout.
    #[default]
    Auto,
    /// Treat the image as one uniform block of text.
    SingleBlock,
}

/// OCR invocation metadata.
#[derive(Debug)]
pub struct OcrRequest<'a> {
    frame: &'a RgbFrame,
    language: &'a str,
    segmentation: PageSegmentation,
}

impl<'a> OcrRequest<'a> {
    pub fn new(frame: &'a RgbFrame, language: &'a str) -> Self {
        Self {
            frame,
            language,
            segmentation: PageSegmentation::Auto,
        }
    }

    pub fn with_segmentation(mut self, segmentation: PageSegmentation) -> Self {
        self.segmentation = segmentation;
        self
    }

    pub fn frame(&self) -> &'a RgbFrame {
        self.frame
    }

    /// Engine language tag, e.g. `spa+eng`.
    pub fn language(&self) -> &'a str {
        self.language
    }

    pub fn segmentation(&self) -> PageSegmentation {
        self.segmentation
    }
}
