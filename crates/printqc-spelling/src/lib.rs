//! Spelling comparison between OCR readings of a master and a sample.

mod cache;
mod diff;
mod dictionary;
mod token;
mod wordlist;

pub use cache::{DictionaryCache, FALLBACK_DICTIONARY};
pub use diff::{
    MARGIN_RATIO, SpellingDiffClassifier, SpellingFinding, SpellingReport, SpellingSettings,
    reconcile,
};
pub use dictionary::{Dictionary, DictionaryError, DictionaryFactory};
pub use token::{IGNORED_WORDS, Token, clean_word, is_logographic, screen_words};
pub use wordlist::{WordListDictionary, WordListDirectory};
