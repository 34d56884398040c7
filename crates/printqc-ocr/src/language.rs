use std::fmt;

use log::warn;

/// Upper bound on languages mixed into one OCR pass.
pub const MAX_LANGUAGES: usize = 3;

/// OCR tag used when no selected language is recognized.
pub const FALLBACK_OCR_TAG: &str = "eng";

struct LanguageEntry {
    code: &'static str,
    ocr_tag: &'static str,
    // Logographic scripts have no word-list dictionary.
    dictionary: Option<&'static str>,
}

const LANGUAGES: &[LanguageEntry] = &[
    LanguageEntry { code: "pt", ocr_tag: "por", dictionary: Some("pt") },
    LanguageEntry { code: "en", ocr_tag: "eng", dictionary: Some("en") },
    LanguageEntry { code: "es", ocr_tag: "spa", dictionary: Some("es") },
    LanguageEntry { code: "fr", ocr_tag: "fra", dictionary: Some("fr") },
    LanguageEntry { code: "de", ocr_tag: "deu", dictionary: Some("de") },
    LanguageEntry { code: "zh", ocr_tag: "chi_sim", dictionary: None },
    LanguageEntry { code: "ja", ocr_tag: "jpn", dictionary: None },
    LanguageEntry { code: "it", ocr_tag: "ita", dictionary: Some("it") },
    LanguageEntry { code: "ru", ocr_tag: "rus", dictionary: Some("ru") },
    LanguageEntry { code: "ko", ocr_tag: "kor", dictionary: None },
];

fn lookup(code: &str) -> Option<&'static LanguageEntry> {
    LANGUAGES.iter().find(|entry| entry.code == code)
}

/// Ordered list of at most [`MAX_LANGUAGES`] recognized language codes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageSelection {
    codes: Vec<&'static str>,
}

impl LanguageSelection {
    /// Keeps the first [`MAX_LANGUAGES`] requested entries, then drops the
    /// ones that are not supported. Unsupported entries still consume a slot.
    pub fn new<I, S>(requested: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut codes = Vec::new();
        let requested = requested
            .into_iter()
            .map(|code| code.as_ref().trim().to_ascii_lowercase())
            .filter(|code| !code.is_empty())
            .take(MAX_LANGUAGES);
        for code in requested {
            match lookup(&code) {
                Some(entry) if !codes.contains(&entry.code) => codes.push(entry.code),
                Some(_) => {}
                None => warn!("ignoring unsupported language code '{code}'"),
            }
        }
        Self { codes }
    }

    /// Parses a list such as `es,en` or `es+en`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split([',', '+', ' ']))
    }

    pub fn codes(&self) -> &[&'static str] {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Engine language tag, codes joined with `+`.
    pub fn ocr_tag(&self) -> String {
        if self.codes.is_empty() {
            return FALLBACK_OCR_TAG.to_string();
        }
        self.codes
            .iter()
            .filter_map(|code| lookup(code))
            .map(|entry| entry.ocr_tag)
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Dictionary codes for the languages that have one.
    pub fn dictionary_codes(&self) -> Vec<&'static str> {
        self.codes
            .iter()
            .filter_map(|code| lookup(code))
            .filter_map(|entry| entry.dictionary)
            .collect()
    }

    pub fn supported_codes() -> impl Iterator<Item = &'static str> {
        LANGUAGES.iter().map(|entry| entry.code)
    }
}

impl fmt::Display for LanguageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codes.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_ocr_tags_in_order() {
        let selection = LanguageSelection::parse("es, en");
        assert_eq!(selection.codes(), ["es", "en"]);
        assert_eq!(selection.ocr_tag(), "spa+eng");
    }

    #[test]
    fn caps_selection_before_filtering() {
        let selection = LanguageSelection::parse("xx,fr,de,it");
        assert_eq!(selection.codes(), ["fr", "de"]);
    }

    #[test]
    fn empty_selection_falls_back_to_english_tag() {
        let selection = LanguageSelection::parse("");
        assert!(selection.is_empty());
        assert_eq!(selection.ocr_tag(), FALLBACK_OCR_TAG);
    }

    #[test]
    fn logographic_languages_have_no_dictionary() {
        let selection = LanguageSelection::parse("zh+ja+en");
        assert_eq!(selection.ocr_tag(), "chi_sim+jpn+eng");
        assert_eq!(selection.dictionary_codes(), ["en"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let selection = LanguageSelection::new(["ES", "es"]);
        assert_eq!(selection.codes(), ["es"]);
        assert_eq!(selection.to_string(), "es");
    }
}
