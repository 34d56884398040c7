use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::dictionary::{Dictionary, DictionaryError, DictionaryFactory};

// Corrections farther than this edit distance are not suggested.
const MAX_EDIT_DISTANCE: usize = 2;
const MAX_CANDIDATES: usize = 10;
const DEFAULT_FREQUENCY: u64 = 1;

/// Dictionary backed by a plain word list: one word per line, optionally
/// followed by whitespace and a frequency count. `#` starts a comment line.
#[derive(Debug, Clone)]
pub struct WordListDictionary {
    code: String,
    words: HashMap<String, u64>,
}

impl WordListDictionary {
    pub fn from_words<I, S>(code: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|word| (word.as_ref().trim().to_lowercase(), DEFAULT_FREQUENCY))
            .filter(|(word, _)| !word.is_empty())
            .collect();
        Self {
            code: code.into(),
            words,
        }
    }

    pub fn parse(code: impl Into<String>, text: &str, path: &Path) -> Result<Self, DictionaryError> {
        let mut words: HashMap<String, u64> = HashMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let frequency = match fields.next() {
                Some(raw) => raw.parse::<u64>().map_err(|err| DictionaryError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: format!("invalid frequency '{raw}': {err}"),
                })?,
                None => DEFAULT_FREQUENCY,
            };
            let entry = words.entry(word.to_lowercase()).or_insert(0);
            *entry = (*entry).max(frequency);
        }
        Ok(Self {
            code: code.into(),
            words,
        })
    }

    pub fn load(code: impl Into<String>, path: &Path) -> Result<Self, DictionaryError> {
        let code = code.into();
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                DictionaryError::NotFound {
                    code: code.clone(),
                    path: path.to_path_buf(),
                }
            } else {
                DictionaryError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let dictionary = Self::parse(code, &text, path)?;
        debug!(
            "loaded {} words for '{}' from {}",
            dictionary.len(),
            dictionary.code,
            path.display()
        );
        Ok(dictionary)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Dictionary for WordListDictionary {
    fn code(&self) -> &str {
        &self.code
    }

    fn known(&self, word: &str) -> bool {
        self.words.contains_key(word) || self.words.contains_key(&word.to_lowercase())
    }

    fn candidates(&self, word: &str) -> Vec<String> {
        let target: Vec<char> = word.to_lowercase().chars().collect();
        let mut scored: Vec<(usize, u64, &str)> = self
            .words
            .iter()
            .filter_map(|(entry, &frequency)| {
                let chars: Vec<char> = entry.chars().collect();
                if chars.len().abs_diff(target.len()) > MAX_EDIT_DISTANCE {
                    return None;
                }
                let distance = edit_distance(&target, &chars);
                (distance > 0 && distance <= MAX_EDIT_DISTANCE)
                    .then_some((distance, frequency, entry.as_str()))
            })
            .collect();
        scored.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.cmp(b.2)));
        scored
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|(_, _, entry)| entry.to_string())
            .collect()
    }
}

/// Optimal string alignment distance: insertions, deletions, substitutions
/// and transpositions of adjacent characters all cost one.
fn edit_distance(a: &[char], b: &[char]) -> usize {
    let width = b.len() + 1;
    let mut table = vec![0usize; (a.len() + 1) * width];
    for i in 0..=a.len() {
        table[i * width] = i;
    }
    for (j, cell) in table.iter_mut().enumerate().take(width) {
        *cell = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (table[(i - 1) * width + j] + 1)
                .min(table[i * width + j - 1] + 1)
                .min(table[(i - 1) * width + j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(table[(i - 2) * width + j - 2] + 1);
            }
            table[i * width + j] = best;
        }
    }
    table[a.len() * width + b.len()]
}

/// Opens `<root>/<code>.txt` word lists.
#[derive(Debug, Clone)]
pub struct WordListDirectory {
    root: PathBuf,
}

impl WordListDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, code: &str) -> PathBuf {
        self.root.join(format!("{code}.txt"))
    }
}

impl DictionaryFactory for WordListDirectory {
    fn name(&self) -> &'static str {
        "word-list"
    }

    fn open(&self, code: &str) -> Result<Arc<dyn Dictionary>, DictionaryError> {
        let dictionary = WordListDictionary::load(code, &self.path_for(code))?;
        Ok(Arc::new(dictionary))
    }

    fn has(&self, code: &str) -> bool {
        self.path_for(code).is_file()
    }
}
