//! Scoring functions for catalog matching.
//!
//! This module contains:
//! - Title similarity (Sørensen–Dice over character bigrams)
//! - Artist token matching across separator conventions
//! - Combined title/artist scoring of two `AudioInfo` records

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::models::AudioInfo;
use crate::normalize::Normalizer;

// ============================================================================
// Regex Patterns
// ============================================================================

/// Separators between credited artists: ideographic comma, slash, full-width
/// and half-width ampersand, comma, semicolon.
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[、/＆&,;]+").unwrap());

/// Joiner used when a list of artists is rendered the way catalog filenames
/// spell them ("A,B - Title").
pub const ARTIST_DISPLAY_JOINER: &str = ",";

// ============================================================================
// Title Similarity
// ============================================================================

/// Bigram Dice coefficient in [0, 1]: 1.0 for identical strings, 0.0 when no
/// bigram is shared.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    strsim::sorensen_dice(a, b)
}

/// Similarity of two titles. Unless `cleaned` is set, both sides are
/// standardized and cleaned first.
pub fn title_similarity(
    normalizer: &mut Normalizer,
    title: &str,
    target: &str,
    cleaned: bool,
) -> f64 {
    if cleaned {
        return text_similarity(title, target);
    }
    let title = normalizer.clean(title);
    let target = normalizer.clean(target);
    text_similarity(&title, &target)
}

// ============================================================================
// Artist Matching
// ============================================================================

/// Artist credit as either one joined string or an ordered list.
#[derive(Debug, Clone, Copy)]
pub enum ArtistInput<'a> {
    Joined(&'a str),
    List(&'a [String]),
}

/// Standardized artist tokens of an input. Joined strings are split on
/// [`ARTIST_SEPARATOR`]; blank tokens are dropped.
pub fn artist_tokens(normalizer: &mut Normalizer, input: ArtistInput<'_>) -> Vec<String> {
    match input {
        ArtistInput::Joined(joined) => {
            let standardized = normalizer.standardize(joined);
            ARTIST_SEPARATOR
                .split(&standardized)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect()
        }
        ArtistInput::List(list) => list
            .iter()
            .map(|artist| normalizer.standardize(artist))
            .filter(|token| !token.is_empty())
            .collect(),
    }
}

/// Multiset intersection of local artist tokens with target tokens, in local
/// order.
pub fn match_artists(
    normalizer: &mut Normalizer,
    artists: ArtistInput<'_>,
    target: ArtistInput<'_>,
) -> Vec<String> {
    let local = artist_tokens(normalizer, artists);
    let mut remaining: FxHashMap<String, usize> = FxHashMap::default();
    for token in artist_tokens(normalizer, target) {
        *remaining.entry(token).or_insert(0) += 1;
    }

    local
        .into_iter()
        .filter(|token| match remaining.get_mut(token) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        })
        .collect()
}

/// Join the artist list with `;`, appending the primary artist when the list
/// does not already credit it.
pub fn combine_artists(artists: &[String], primary: &str) -> String {
    let joined = artists.join(";");
    if artists.iter().any(|a| a == primary) {
        joined
    } else {
        format!("{};{}", joined, primary)
    }
}

/// Human-readable credit: the artist list, or the primary artist when the
/// list is empty.
pub fn display_artists(artists: &[String], primary: &str) -> String {
    if artists.is_empty() {
        primary.to_string()
    } else {
        artists.join(ARTIST_DISPLAY_JOINER)
    }
}

// ============================================================================
// Combined Scoring
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AudioScore {
    pub title_score: f64,
    pub shared_artists: Vec<String>,
}

/// Score `audio` against `target` on title similarity and shared artists.
pub fn match_audio(
    normalizer: &mut Normalizer,
    audio: &AudioInfo,
    target: &AudioInfo,
    cleaned: bool,
) -> AudioScore {
    let title_score = title_similarity(normalizer, &audio.title, &target.title, cleaned);
    let local = combine_artists(&audio.artists, &audio.primary_artist);
    let remote = combine_artists(&target.artists, &target.primary_artist);
    let shared_artists = match_artists(
        normalizer,
        ArtistInput::Joined(&local),
        ArtistInput::Joined(&remote),
    );
    AudioScore {
        title_score,
        shared_artists,
    }
}
