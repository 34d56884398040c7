use std::sync::Arc;

use log::{info, warn};
use printqc_ocr::{NoopOcrEngine, OcrEngine, OcrError};
use printqc_spelling::{DictionaryCache, WordListDirectory};

use crate::cli::OcrBackend;
use crate::pipeline::Inspector;
use crate::settings::EffectiveSettings;

/// Builds the OCR collaborator. `auto` degrades to no engine when tesseract
/// cannot be launched; an explicit `tesseract` request fails instead.
pub fn ocr_engine(settings: &EffectiveSettings) -> Result<Option<Arc<dyn OcrEngine>>, OcrError> {
    match settings.ocr_backend {
        OcrBackend::Noop => Ok(Some(Arc::new(NoopOcrEngine))),
        OcrBackend::Tesseract => tesseract(settings).map(Some),
        OcrBackend::Auto => match tesseract(settings) {
            Ok(engine) => Ok(Some(engine)),
            Err(err) => {
                warn!("OCR disabled: {err}");
                Ok(None)
            }
        },
    }
}

#[cfg(feature = "ocr-tesseract")]
fn tesseract(settings: &EffectiveSettings) -> Result<Arc<dyn OcrEngine>, OcrError> {
    let engine = printqc_ocr::TesseractCliEngine::new(&settings.tesseract_binary);
    engine.warm_up()?;
    info!("using tesseract at {}", settings.tesseract_binary.display());
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "ocr-tesseract"))]
fn tesseract(_: &EffectiveSettings) -> Result<Arc<dyn OcrEngine>, OcrError> {
    Err(OcrError::unavailable(
        "tesseract",
        "built without the \"ocr-tesseract\" feature",
    ))
}

pub fn dictionary_cache(settings: &EffectiveSettings) -> Option<Arc<DictionaryCache>> {
    let Some(dir) = settings.dictionary_dir.as_ref() else {
        info!("no dictionary directory configured; spelling checks are disabled");
        return None;
    };
    if !dir.is_dir() {
        warn!("dictionary directory {} does not exist", dir.display());
    }
    Some(Arc::new(DictionaryCache::new(Arc::new(WordListDirectory::new(
        dir.clone(),
    )))))
}

pub fn build_inspector(settings: &EffectiveSettings) -> Result<Inspector, OcrError> {
    Ok(Inspector::new(ocr_engine(settings)?, dictionary_cache(settings)))
}
