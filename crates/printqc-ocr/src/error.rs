use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine {engine} is not available: {reason}")]
    Unavailable { engine: &'static str, reason: String },
    #[error("cannot run OCR on an empty image")]
    EmptyImage,
    #[error("backend error: {message}")]
    Backend { message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OcrError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn unavailable(engine: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            engine,
            reason: reason.into(),
        }
    }
}
