//! Core data models for catalog matching.
//!
//! This module contains the records persisted in a directory's correlation
//! store, the catalog page entries they point at, and the per-pass
//! statistics reported after matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Durations
// ============================================================================

/// Sentinel for a duration that could not be read.
pub const UNKNOWN_DURATION: i64 = -1;

/// Raw durations below this are taken to be seconds rather than milliseconds.
pub const SECONDS_THRESHOLD: f64 = 3000.0;

/// Convert a raw duration into milliseconds.
///
/// Tag readers and catalogs disagree on units, so values under
/// [`SECONDS_THRESHOLD`] are scaled by 1000 and everything else is kept.
/// Zero, negative and non-finite values map to [`UNKNOWN_DURATION`].
pub fn normalize_duration_ms(raw: f64) -> i64 {
    if !raw.is_finite() || raw <= 0.0 {
        return UNKNOWN_DURATION;
    }
    if raw < SECONDS_THRESHOLD {
        (raw * 1000.0).round() as i64
    } else {
        raw.round() as i64
    }
}

// ============================================================================
// Audio Models
// ============================================================================

/// Descriptive metadata of one recording, either read from a local file's
/// tags or derived from a catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioInfo {
    pub title: String,
    pub primary_artist: String,
    /// All credited artists in credited order
    pub artists: Vec<String>,
    pub album: String,
    /// Milliseconds, or [`UNKNOWN_DURATION`]
    pub duration: i64,
    /// Bits per second, or -1
    pub bitrate: i64,
}

impl Default for AudioInfo {
    fn default() -> Self {
        Self {
            title: String::new(),
            primary_artist: String::new(),
            artists: Vec::new(),
            album: String::new(),
            duration: UNKNOWN_DURATION,
            bitrate: -1,
        }
    }
}

impl AudioInfo {
    pub fn has_known_duration(&self) -> bool {
        self.duration >= 0
    }
}

/// A local audio file waiting to be resolved against the catalog.
#[derive(Clone, Debug)]
pub struct LocalAudio {
    pub file_name: String,
    pub audio: AudioInfo,
}

/// File that reconciliation could not resolve from the store, with the
/// content hash computed along the way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFile {
    pub file_name: String,
    pub content_hash: String,
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Catalog record as it appears in a catalog page document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalogEntry {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    primary_artist: String,
    #[serde(default)]
    artists: Vec<String>,
    #[serde(default)]
    duration: f64,
}

/// One entry of a catalog page.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    pub id: u64,
    pub title: String,
    pub primary_artist: String,
    pub artists: Vec<String>,
    /// Milliseconds, or [`UNKNOWN_DURATION`]
    pub duration: i64,
    /// The full external record, stored verbatim alongside a match
    pub detail: Value,
}

impl CatalogEntry {
    /// Build an entry from a raw catalog record, keeping the record itself as
    /// the entry's detail. A missing primary artist falls back to the first
    /// credited artist.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawCatalogEntry = serde_json::from_value(value.clone())?;
        let primary_artist = if raw.primary_artist.is_empty() {
            raw.artists.first().cloned().unwrap_or_default()
        } else {
            raw.primary_artist
        };
        Ok(Self {
            id: raw.id,
            title: raw.title,
            primary_artist,
            artists: raw.artists,
            duration: normalize_duration_ms(raw.duration),
            detail: value,
        })
    }

    pub fn audio_info(&self) -> AudioInfo {
        AudioInfo {
            title: self.title.clone(),
            primary_artist: self.primary_artist.clone(),
            artists: self.artists.clone(),
            album: self
                .detail
                .get("album")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            duration: self.duration,
            bitrate: -1,
        }
    }
}

// ============================================================================
// Correlation Models
// ============================================================================

/// One confirmed correlation between a local file and a catalog entry.
///
/// `audio_info` is the local file's metadata at match time, not the
/// catalog's. `content_hash` is the durable identity used to follow the file
/// across renames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub file_name: String,
    #[serde(default)]
    pub content_hash: String,
    pub catalog_id: u64,
    #[serde(default)]
    pub audio_info: AudioInfo,
    #[serde(default)]
    pub catalog_detail: Value,
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-pass matching statistics.
#[derive(Default, Debug, Clone, Serialize)]
pub struct MatchingStats {
    // Reconciliation against the store
    pub listed_files: usize,
    pub manual_matches: usize,
    pub cache_recovered: usize,
    pub ambiguous_hashes: usize,

    // Candidate matching
    pub catalog_entries: usize,
    pub unknown_duration: usize,
    pub window_matches: usize,
    pub fallback_matches: usize,
    pub unmatched: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl MatchingStats {
    pub fn new_matches(&self) -> usize {
        self.window_matches + self.fallback_matches
    }

    /// Share of listed files that ended up correlated, as a percentage
    pub fn match_rate(&self) -> f64 {
        if self.listed_files == 0 {
            0.0
        } else {
            let resolved = self.manual_matches + self.cache_recovered + self.new_matches();
            100.0 * resolved as f64 / self.listed_files as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Outcome of one directory pass.
#[derive(Debug, Clone, Default)]
pub struct MatchReport {
    pub manual: usize,
    pub cached: usize,
    pub matched: usize,
    pub unmatched_files: Vec<String>,
    pub stats: MatchingStats,
}

impl MatchReport {
    pub fn unmatched(&self) -> usize {
        self.unmatched_files.len()
    }

    pub fn total(&self) -> usize {
        self.manual + self.cached + self.matched + self.unmatched()
    }
}
