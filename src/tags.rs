//! Reading title/artist/duration metadata from local audio files, and
//! writing matched catalog metadata back into them.

use std::path::Path;

use anyhow::Context;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey, Tag, TagExt};
use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::models::{normalize_duration_ms, AudioInfo};

/// Separator used when several artists go into one text frame.
pub const ARTIST_TAG_SEPARATOR: &str = "; ";

/// Source of per-file audio metadata.
pub trait TagReader {
    fn read(&self, path: &Path) -> anyhow::Result<AudioInfo>;
}

/// Reads tags and stream properties with `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> anyhow::Result<AudioInfo> {
        let tagged = lofty::read_from_path(path)
            .with_context(|| format!("failed to read tags of {}", path.display()))?;

        let properties = tagged.properties();
        let mut info = AudioInfo {
            duration: normalize_duration_ms(properties.duration().as_secs_f64()),
            bitrate: properties
                .audio_bitrate()
                .map(|kbps| i64::from(kbps) * 1000)
                .unwrap_or(-1),
            ..Default::default()
        };

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            info.title = tag.title().map(|v| v.trim().to_string()).unwrap_or_default();
            info.primary_artist = tag.artist().map(|v| v.trim().to_string()).unwrap_or_default();
            info.album = tag.album().map(|v| v.trim().to_string()).unwrap_or_default();
            info.artists = tag
                .items()
                .filter(|item| matches!(item.key(), ItemKey::TrackArtist))
                .filter_map(|item| item.value().text())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(info)
    }
}

/// Read a file's metadata, falling back to blank fields and an unknown
/// duration when the tags cannot be read.
pub fn read_audio_info(reader: &dyn TagReader, path: &Path) -> AudioInfo {
    match reader.read(path) {
        Ok(info) => info,
        Err(err) => {
            warn!("{}: unreadable tags, using blank metadata: {:#}", path.display(), err);
            AudioInfo::default()
        }
    }
}

// ============================================================================
// Tag Writing
// ============================================================================

/// Fields of a catalog record that can be written into a file's tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogTags {
    pub title: Option<String>,
    /// Credited artists, or the primary artist alone when no list is given
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub date: Option<String>,
}

impl CatalogTags {
    /// Pick the taggable fields out of a stored catalog record. Blank text
    /// and zero numbers are left out; `None` when the record is not an
    /// object.
    pub fn from_detail(detail: &Value) -> Option<Self> {
        let record = detail.as_object()?;
        let text = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let number = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_u64)
                .filter(|&n| n > 0)
                .and_then(|n| u32::try_from(n).ok())
        };

        let mut artists: Vec<String> = record
            .get("artists")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if artists.is_empty() {
            artists.extend(text("primaryArtist"));
        }

        Some(Self {
            title: text("title"),
            artists,
            album: text("album"),
            track_number: number("trackNumber"),
            disc_number: number("discNumber"),
            date: text("date"),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the fields this record carries; anything else in `tag` is
    /// kept.
    pub fn apply(&self, tag: &mut Tag) {
        if let Some(title) = &self.title {
            tag.set_title(title.clone());
        }
        if !self.artists.is_empty() {
            tag.set_artist(self.artists.join(ARTIST_TAG_SEPARATOR));
        }
        if let Some(album) = &self.album {
            tag.set_album(album.clone());
        }
        if let Some(track) = self.track_number {
            tag.set_track(track);
        }
        if let Some(disc) = self.disc_number {
            tag.set_disk(disc);
        }
        if let Some(date) = &self.date {
            tag.insert_text(ItemKey::RecordingDate, date.clone());
        }
    }
}

/// Destination of catalog metadata for one file.
pub trait TagWriter {
    fn write(&self, path: &Path, tags: &CatalogTags) -> anyhow::Result<()>;
}

/// Writes into the file's primary tag with `lofty`, creating it when the
/// file has none.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagWriter;

impl TagWriter for LoftyTagWriter {
    fn write(&self, path: &Path, tags: &CatalogTags) -> anyhow::Result<()> {
        let mut tagged = lofty::read_from_path(path)
            .with_context(|| format!("failed to read tags of {}", path.display()))?;

        if tagged.primary_tag().is_none() {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged
            .primary_tag_mut()
            .with_context(|| format!("no writable tag in {}", path.display()))?;
        tags.apply(tag);
        tag.save_to_path(path, WriteOptions::default())
            .with_context(|| format!("failed to write tags of {}", path.display()))?;
        Ok(())
    }
}

/// Outcome of writing catalog metadata over one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetagReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}
