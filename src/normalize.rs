//! Text normalization for comparing local tags with catalog metadata.
//!
//! `standardize` folds width variants, whitespace and case, then converts
//! Chinese to Simplified and Japanese to hiragana so that the same title
//! written in different scripts compares equal. `clean_title` strips the
//! decorations (brackets, featuring markers) that differ between sources.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Space-like characters that `\s` alone does not cover consistently:
/// no-break space, the U+2000 block, line/paragraph separators and the
/// ideographic space.
pub static EXTRA_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{00A0}\u{2000}-\u{200F}\u{2028}-\u{202F}\u{3000}]").unwrap());

/// Regex to collapse any whitespace run into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Title decorations removed by `clean_title`: bracketed segments,
/// featuring/versus markers and stray full-width parentheses.
pub static TITLE_DECORATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\(.*?\)|\[.*?\]|feat\.?|vs\.?|with|[\u{FF08}\u{FF09}]").unwrap()
});

static KANA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{3040}-\u{30FF}\u{31F0}-\u{31FF}]").unwrap());
static HANGUL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{AC00}-\u{D7AF}]").unwrap());
static HAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{4E00}-\u{9FA5}]").unwrap());

/// Default number of standardized strings kept per normalizer.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

// ============================================================================
// SCRIPT DETECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Japanese,
    Korean,
    Chinese,
    Other,
}

/// Detect the dominant script of `text`.
///
/// Precedence is fixed: any kana makes the text Japanese (kanji-only text is
/// indistinguishable from Chinese), then hangul, then CJK ideographs.
pub fn detect_script(text: &str) -> Script {
    if KANA.is_match(text) {
        Script::Japanese
    } else if HANGUL.is_match(text) {
        Script::Korean
    } else if HAN.is_match(text) {
        Script::Chinese
    } else {
        Script::Other
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Map full-width ASCII variants (U+FF01..U+FF5E) and the ideographic space
/// to their half-width equivalents.
pub fn fold_full_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Collapse every whitespace class to one ASCII space and trim.
pub fn unify_whitespace(s: &str) -> String {
    let spaced = EXTRA_SPACE.replace_all(s, " ");
    MULTI_SPACE.replace_all(&spaced, " ").trim().to_string()
}

/// Remove bracketed segments and featuring markers from a title.
/// e.g., "Song (Live) feat. X" → "Song X"
pub fn clean_title(title: &str) -> String {
    let stripped = TITLE_DECORATION.replace_all(title, "");
    MULTI_SPACE.replace_all(&stripped, " ").trim().to_string()
}

// ============================================================================
// SCRIPT CONVERSION
// ============================================================================

/// Converts CJK text into a single comparable form.
pub trait ScriptConverter {
    /// Prepare dictionaries ahead of the first conversion.
    fn init(&mut self);

    /// Traditional → Simplified Chinese
    fn to_simplified(&self, text: &str) -> String;

    /// Kana/kanji → hiragana reading
    fn to_hiragana(&self, text: &str) -> String;
}

/// Dictionary-backed converter: `zhconv` for Chinese, `kakasi` for Japanese
/// readings.
#[derive(Debug, Default)]
pub struct DictionaryConverter {
    ready: bool,
}

impl DictionaryConverter {
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

impl ScriptConverter for DictionaryConverter {
    fn init(&mut self) {
        if self.ready {
            return;
        }
        // Both crates build their tables on first use; pay that cost here.
        let _ = self.to_simplified("國");
        let _ = self.to_hiragana("日本");
        self.ready = true;
    }

    fn to_simplified(&self, text: &str) -> String {
        zhconv::zhconv(text, zhconv::Variant::ZhHans)
    }

    fn to_hiragana(&self, text: &str) -> String {
        kakasi::convert(text).hiragana
    }
}

// ============================================================================
// STANDARDIZE CACHE
// ============================================================================

/// Bounded map from raw input to standardized output.
///
/// Not an LRU: when full, the oldest fifth of the entries (by insertion
/// order) is dropped in one batch before the new entry goes in.
#[derive(Debug)]
pub struct StandardizeCache {
    entries: FxHashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl StandardizeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, value: String) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.entries.len() >= self.capacity {
            let evict = self.capacity.div_ceil(5);
            for old in self.order.drain(..evict.min(self.order.len())) {
                self.entries.remove(&old);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StandardizeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Owns the script converter and the standardize cache.
///
/// Call [`Normalizer::init`] once before a matching pass; conversion still
/// works without it but the first CJK string pays for dictionary loading.
pub struct Normalizer {
    converter: Box<dyn ScriptConverter>,
    cache: StandardizeCache,
}

impl Normalizer {
    pub fn new(converter: Box<dyn ScriptConverter>) -> Self {
        Self::with_capacity(converter, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(converter: Box<dyn ScriptConverter>, capacity: usize) -> Self {
        Self {
            converter,
            cache: StandardizeCache::new(capacity),
        }
    }

    pub fn init(&mut self) {
        self.converter.init();
    }

    /// Canonical comparison form of `text`.
    pub fn standardize(&mut self, text: &str) -> String {
        if let Some(hit) = self.cache.get(text) {
            return hit.to_string();
        }
        let folded = unify_whitespace(&fold_full_width(text)).to_lowercase();
        let processed = match detect_script(&folded) {
            Script::Chinese => self.converter.to_simplified(&folded),
            Script::Japanese => self.converter.to_hiragana(&folded),
            Script::Korean | Script::Other => folded,
        };
        self.cache.insert(text.to_string(), processed.clone());
        processed
    }

    /// `clean_title(standardize(text))`
    pub fn clean(&mut self, text: &str) -> String {
        clean_title(&self.standardize(text))
    }

    pub fn cache(&self) -> &StandardizeCache {
        &self.cache
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Box::new(DictionaryConverter::default()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
