use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("no dictionary for language '{code}' at {path}")]
    NotFound { code: String, path: PathBuf },
    #[error("failed to read dictionary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dictionary {path} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Word lookup for a single language.
pub trait Dictionary: Send + Sync {
    fn code(&self) -> &str;

    /// Whether `word` is a known spelling. Callers pass lowercase words
    /// but may also ask for the exact OCR form.
    fn known(&self, word: &str) -> bool;

    /// Likely corrections, best first.
    fn candidates(&self, word: &str) -> Vec<String>;
}

/// Builds dictionaries by language code. Construction may be slow; callers
/// keep the results in a [`crate::DictionaryCache`].
pub trait DictionaryFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError>;

    /// Cheap probe used by capability reports.
    fn has(&self, code: &str) -> bool;
}
