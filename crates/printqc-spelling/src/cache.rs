use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use printqc_ocr::LanguageSelection;

use crate::dictionary::{Dictionary, DictionaryError, DictionaryFactory};

/// Dictionary used when no selected language has one.
pub const FALLBACK_DICTIONARY: &str = "es";

/// Read-through cache of dictionaries keyed by language code. Entries are
/// built at most once, under the lock, and live as long as the cache.
pub struct DictionaryCache {
    factory: Arc<dyn DictionaryFactory>,
    entries: Mutex<HashMap<String, Arc<dyn Dictionary>>>,
}

impl DictionaryCache {
    pub fn new(factory: Arc<dyn DictionaryFactory>) -> Self {
        Self {
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory_name(&self) -> &'static str {
        self.factory.name()
    }

    pub fn get(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError> {
        let mut guard = self.lock_entries();
        if let Some(dictionary) = guard.get(code) {
            return Ok(Arc::clone(dictionary));
        }

        let dictionary = self.factory.open(code)?;
        debug!("cached '{code}' dictionary from {}", self.factory.name());
        guard.insert(code.to_string(), Arc::clone(&dictionary));
        Ok(dictionary)
    }

    /// Dictionaries for the selected languages, falling back to
    /// [`FALLBACK_DICTIONARY`] when none of them has one. Codes that fail to
    /// load are skipped.
    pub fn resolve(&self, languages: &LanguageSelection) -> Vec<Arc<dyn Dictionary>> {
        let mut codes = languages.dictionary_codes();
        if codes.is_empty() {
            codes.push(FALLBACK_DICTIONARY);
        }
        codes
            .into_iter()
            .filter_map(|code| match self.get(code) {
                Ok(dictionary) => Some(dictionary),
                Err(err) => {
                    warn!("spelling dictionary '{code}' unavailable: {err}");
                    None
                }
            })
            .collect()
    }

    /// Whether a dictionary for `code` is cached or could be built.
    pub fn has(&self, code: &str) -> bool {
        let cached = self.lock_entries().contains_key(code);
        cached || self.factory.has(code)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Entries are inserted only after a successful open, so a load that
    // panicked under the lock leaves the map consistent.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Dictionary>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::wordlist::WordListDictionary;

    #[derive(Default)]
    struct CountingFactory {
        opened: AtomicUsize,
    }

    impl DictionaryFactory for CountingFactory {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError> {
            if code == "missing" {
                return Err(DictionaryError::NotFound {
                    code: code.to_string(),
                    path: format!("{code}.txt").into(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(WordListDictionary::from_words(code, ["hola"])))
        }

        fn has(&self, code: &str) -> bool {
            code != "missing"
        }
    }

    #[test]
    fn concurrent_misses_build_once() {
        let factory = Arc::new(CountingFactory::default());
        let cache = Arc::new(DictionaryCache::new(factory.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get("es").unwrap().code().to_string())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "es");
        }
        assert_eq!(factory.opened.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = DictionaryCache::new(Arc::new(CountingFactory::default()));
        assert!(cache.get("missing").is_err());
        assert!(cache.is_empty());
        assert!(!cache.has("missing"));
    }

    #[derive(Default)]
    struct PanicOnceFactory {
        attempts: AtomicUsize,
    }

    impl DictionaryFactory for PanicOnceFactory {
        fn name(&self) -> &'static str {
            "panic-once"
        }

        fn open(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("word list for '{code}' is corrupt");
            }
            Ok(Arc::new(WordListDictionary::from_words(code, ["hello"])))
        }

        fn has(&self, _code: &str) -> bool {
            true
        }
    }

    #[test]
    fn panicked_load_does_not_break_later_requests() {
        let cache = Arc::new(DictionaryCache::new(Arc::new(PanicOnceFactory::default())));
        let first = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get("en").is_ok()).join()
        };
        assert!(first.is_err());
        assert!(cache.is_empty());
        assert!(cache.has("en"));

        let resolved = cache.resolve(&LanguageSelection::parse("en"));
        let codes: Vec<&str> = resolved.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["en"]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn logographic_selection_falls_back() {
        let cache = DictionaryCache::new(Arc::new(CountingFactory::default()));
        let resolved = cache.resolve(&LanguageSelection::parse("zh,ja"));
        let codes: Vec<&str> = resolved.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec![FALLBACK_DICTIONARY]);

        let resolved = cache.resolve(&LanguageSelection::parse("en,zh,fr"));
        let codes: Vec<&str> = resolved.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["en", "fr"]);
    }
}
