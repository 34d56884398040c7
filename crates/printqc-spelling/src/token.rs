use std::collections::HashSet;

use printqc_ocr::OcrWord;

/// Short words, units and numerals that are never reported.
pub const IGNORED_WORDS: &[&str] = &[
    "mg", "ml", "kg", "oz", "gr", "lb", "no", "si", "el", "la", "en", "de", "un", "es", "al",
    "lo", "su", "por", "con", "del", "los", "las", "una", "nos", "les", "se", "me", "te", "le",
    "ii", "iii", "iv", "vi", "vii", "viii", "ix", "xi", "xii", "etc", "vs", "rx", "ph", "usp",
    "nf", "tab", "cap", "sol", "amp", "vit", "max", "min", "lbs",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Strips leading and trailing punctuation.
pub fn clean_word(raw: &str) -> &str {
    raw.trim().trim_matches(|c: char| !is_word_char(c))
}

fn is_logographic_char(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        | '\u{3040}'..='\u{309F}' // hiragana
        | '\u{30A0}'..='\u{30FF}' // katakana
        | '\u{AC00}'..='\u{D7AF}' // hangul syllables
    )
}

fn is_supported_letter(c: char) -> bool {
    let extended = matches!(c,
        '\u{00C0}'..='\u{024F}' // latin-1 supplement and extended-a/b
        | '\u{1E00}'..='\u{1EFF}'
        | '\u{0400}'..='\u{04FF}' // cyrillic
    );
    c.is_ascii_alphabetic() || (extended && c.is_alphabetic()) || is_logographic_char(c)
}

/// Words written only in CJK or Hangul are read but never spell-checked.
pub fn is_logographic(word: &str) -> bool {
    !word.is_empty() && word.chars().all(is_logographic_char)
}

/// An OCR word that survived screening.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub word: String,
    pub lower: String,
    pub logographic: bool,
    /// Index of the source word in the OCR response.
    pub source: usize,
}

/// Cleans and filters OCR words in reading order. The first occurrence of a
/// word (case-insensitive) claims it even if a later filter drops it.
pub fn screen_words(words: &[OcrWord], confidence_floor: f32) -> Vec<Token> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut tokens = Vec::new();
    for (index, ocr_word) in words.iter().enumerate() {
        let word = clean_word(&ocr_word.text);
        if word.is_empty() || !word.chars().all(is_supported_letter) {
            continue;
        }
        let lower = word.to_lowercase();
        if !seen.insert(lower.clone()) {
            continue;
        }
        if IGNORED_WORDS.contains(&lower.as_str()) || ocr_word.confidence < confidence_floor {
            continue;
        }
        tokens.push(Token {
            word: word.to_string(),
            logographic: is_logographic(word),
            lower,
            source: index,
        });
    }
    tokens
}
