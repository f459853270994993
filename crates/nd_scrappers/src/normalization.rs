//! Language and length validation of raw articles.

use nd_core::config::NormalizationConfig;
use nd_core::{NormalizedArticle, RawArticle};

pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: RawArticle) -> NormalizedArticle;
}

const UNKNOWN_LANGUAGE: &str = "unknown";

const SPANISH_STOPWORDS: &[&str] = &[
    "de", "la", "que", "el", "en", "los", "del", "se", "las", "por", "un", "para", "con", "una",
    "su", "al", "lo", "como", "más", "pero", "sus", "le", "ya", "o", "este", "es", "son", "también",
    "fue", "ha", "entre", "cuando", "muy", "sin", "sobre", "ese", "hasta", "desde", "nos", "esta",
];

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "of", "and", "to", "in", "is", "that", "for", "it", "with", "as", "was", "on", "are",
    "be", "by", "this", "have", "from", "or", "an", "they", "which", "you", "were", "their", "has",
    "but", "not", "its", "can", "will", "would", "about", "more", "been", "what", "there", "also",
    "into",
];

/// Guesses `"es"`, `"en"` or `"unknown"` from stopword frequency.
///
/// A language wins when its stopwords make up at least 5% of the tokens and
/// strictly outnumber the other language's.
pub fn detect_language(text: &str) -> &'static str {
    let mut total = 0usize;
    let mut es = 0usize;
    let mut en = 0usize;
    for token in text.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        total += 1;
        if SPANISH_STOPWORDS.contains(&token.as_str()) {
            es += 1;
        }
        if ENGLISH_STOPWORDS.contains(&token.as_str()) {
            en += 1;
        }
    }
    let (lang, best, other) = if es > en { ("es", es, en) } else { ("en", en, es) };
    if best == other || best * 20 < total {
        UNKNOWN_LANGUAGE
    } else {
        lang
    }
}

/// Default normalizer: valid when longer than `min_words` and written in one
/// of the accepted languages.
#[derive(Debug, Clone)]
pub struct StopwordNormalizer {
    min_words: usize,
    languages: Vec<String>,
}

impl StopwordNormalizer {
    pub fn new(config: &NormalizationConfig) -> Self {
        Self {
            min_words: config.min_words,
            languages: config.languages.clone(),
        }
    }
}

impl Default for StopwordNormalizer {
    fn default() -> Self {
        Self::new(&NormalizationConfig::default())
    }
}

impl Normalizer for StopwordNormalizer {
    fn normalize(&self, raw: RawArticle) -> NormalizedArticle {
        let word_count = raw.content.split_whitespace().count();
        let language = detect_language(&raw.content).to_string();
        let is_valid = word_count > self.min_words && self.languages.iter().any(|l| *l == language);
        NormalizedArticle {
            raw,
            language,
            word_count,
            is_valid,
        }
    }
}
