mod backends;
mod engine;
mod error;
mod language;
mod request;
mod response;

#[cfg(feature = "engine-tesseract")]
pub use backends::tesseract::TesseractCliEngine;
pub use engine::{NoopOcrEngine, OcrEngine};
pub use error::OcrError;
pub use language::{FALLBACK_OCR_TAG, LanguageSelection, MAX_LANGUAGES};
pub use request::{OcrRequest, PageSegmentation};
pub use response::{OcrResponse, OcrWord};
