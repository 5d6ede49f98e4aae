//! Moving or copying matched files, with their correlations, from one
//! directory into another.
//!
//! Every tracked file travels together with its siblings that share its base
//! name (`song.mp3` brings `song.lrc` and `song.cover.jpg`). Correlations are
//! upserted into the same collection of the target store; a move also drops
//! them from the source store.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::library::{is_audio_file, list_files};
use crate::safety::validate_merge_dirs;
use crate::store::{Collection, Store};

/// What may follow a base name for a file to count as its sibling.
static SIBLING_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\.[0-9a-zA-Z]+)+$").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Copy instead of move
    pub copy: bool,
    /// Replace files that already exist in the target
    pub overwrite: bool,
    /// Leave non-audio siblings behind
    pub music_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Merge the tracked files of `source` into `target`.
///
/// Per-file failures are logged and counted; both stores are saved at the
/// end.
pub fn merge_dirs(target: &Path, source: &Path, options: MergeOptions) -> Result<MergeReport> {
    validate_merge_dirs(target, source)?;

    let mut target_store = Store::open(target);
    let mut source_store = Store::open(source);
    let mut target_names: FxHashSet<String> = list_files(target)
        .with_context(|| format!("failed to list {}", target.display()))?
        .into_iter()
        .collect();
    let source_listing =
        list_files(source).with_context(|| format!("failed to list {}", source.display()))?;
    let mut source_present: FxHashSet<String> = source_listing.iter().cloned().collect();

    let mut report = MergeReport::default();
    let mut transferred: FxHashSet<String> = FxHashSet::default();
    for collection in [Collection::Automatic, Collection::Manual] {
        let entries = source_store.entries(collection).to_vec();
        let mut moved = FxHashSet::default();

        for entry in entries {
            // A file already brought over as an earlier entry's sibling only
            // needs its record carried.
            if !transferred.contains(&entry.file_name) {
                if !source_present.contains(&entry.file_name) {
                    warn!("{}: not present in {}, skipping", entry.file_name, source.display());
                    report.skipped += 1;
                    continue;
                }
                for file in siblings(&source_listing, base_name(&entry.file_name)) {
                    if transferred.contains(file) || !source_present.contains(file) {
                        continue;
                    }
                    if options.music_only && !is_audio_file(file) {
                        continue;
                    }
                    if !options.overwrite && target_names.contains(file) {
                        info!("{}: already in {}, skipping", file, target.display());
                        report.skipped += 1;
                        continue;
                    }

                    let (from, to) = (source.join(file), target.join(file));
                    let result = if options.copy {
                        fs::copy(&from, &to).map(|_| ()).map_err(anyhow::Error::from)
                    } else {
                        move_file(&from, &to)
                    };
                    if let Err(err) = result {
                        warn!("{}: transfer failed: {:#}", file, err);
                        report.failed += 1;
                        continue;
                    }

                    info!("{}: {}", file, if options.copy { "copied" } else { "moved" });
                    report.transferred += 1;
                    transferred.insert(file.to_string());
                    target_names.insert(file.to_string());
                    if !options.copy {
                        source_present.remove(file);
                    }
                }
            }

            if transferred.contains(&entry.file_name) {
                if !options.copy {
                    moved.insert(entry.file_name.clone());
                }
                target_store.upsert(collection, entry);
            }
        }

        source_store.remove(collection, &moved);
    }

    target_store
        .save()
        .with_context(|| format!("failed to save the store of {}", target.display()))?;
    source_store
        .save()
        .with_context(|| format!("failed to save the store of {}", source.display()))?;
    Ok(report)
}

/// Rename `from` to `to`, falling back to copy and delete when a plain rename
/// fails (e.g. across filesystems).
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) => {
            fs::copy(from, to).with_context(|| {
                format!(
                    "copy {} -> {} after rename error: {}",
                    from.display(),
                    to.display(),
                    err
                )
            })?;
            fs::remove_file(from)
                .with_context(|| format!("remove {} after copy", from.display()))?;
            Ok(())
        }
    }
}

/// Filename without its last extension.
fn base_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

/// Entries of the sorted `listing` that are `base` itself or `base` plus one
/// or more extensions.
fn siblings<'l>(listing: &'l [String], base: &str) -> Vec<&'l str> {
    let start = listing.partition_point(|name| name.as_str() < base);
    listing[start..]
        .iter()
        .take_while(|name| name.starts_with(base))
        .map(String::as_str)
        .filter(|name| {
            let rest = name[base.len()..].trim();
            rest.is_empty() || SIBLING_SUFFIX.is_match(rest)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AudioInfo, MatchInfo};
    use serde_json::Value;
    use tempfile::TempDir;

    fn info(name: &str, id: u64) -> MatchInfo {
        MatchInfo {
            file_name: name.to_string(),
            content_hash: format!("hash-{id}"),
            catalog_id: id,
            audio_info: AudioInfo::default(),
            catalog_detail: Value::Null,
        }
    }

    /// Source dir with a tracked song, its lyrics, and an untracked file.
    fn setup() -> (TempDir, TempDir) {
        let target = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        for name in ["Song.mp3", "Song.lrc", "Song.cover.jpg", "Songbook.mp3", "manual.flac"] {
            fs::write(source.path().join(name), name.as_bytes()).unwrap();
        }
        let mut store = Store::new(source.path());
        store.add_matched(vec![info("Song.mp3", 1), info("gone.mp3", 2)]);
        store.upsert(Collection::Manual, info("manual.flac", 3));
        store.save().unwrap();
        (target, source)
    }

    #[test]
    fn test_siblings() {
        let mut listing: Vec<String> = ["A.lrc", "A.mp3", "A.x.y", "AB.mp3", "A .mp3", "A-1.mp3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        listing.sort();
        let found = siblings(&listing, "A");
        assert_eq!(found, vec!["A .mp3", "A.lrc", "A.mp3", "A.x.y"]);
    }

    #[test]
    fn test_move_brings_siblings_and_correlations() {
        let (target, source) = setup();
        let report = merge_dirs(target.path(), source.path(), MergeOptions::default()).unwrap();

        assert_eq!(report.transferred, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        for name in ["Song.mp3", "Song.lrc", "Song.cover.jpg", "manual.flac"] {
            assert!(target.path().join(name).exists(), "{name} should have moved");
            assert!(!source.path().join(name).exists());
        }
        assert!(source.path().join("Songbook.mp3").exists());

        let target_store = Store::open(target.path());
        assert_eq!(target_store.files().len(), 1);
        assert_eq!(target_store.files()[0].catalog_id, 1);
        assert_eq!(target_store.manual_matches()[0].catalog_id, 3);

        let source_store = Store::open(source.path());
        assert_eq!(source_store.files().len(), 1);
        assert_eq!(source_store.files()[0].file_name, "gone.mp3");
        assert!(source_store.manual_matches().is_empty());
    }

    #[test]
    fn test_copy_music_only() {
        let (target, source) = setup();
        let options = MergeOptions {
            copy: true,
            music_only: true,
            ..Default::default()
        };
        let report = merge_dirs(target.path(), source.path(), options).unwrap();

        assert_eq!(report.transferred, 2);
        assert!(target.path().join("Song.mp3").exists());
        assert!(!target.path().join("Song.lrc").exists());
        assert!(source.path().join("Song.mp3").exists());
        assert_eq!(Store::open(source.path()).files().len(), 2);
        assert_eq!(Store::open(target.path()).files().len(), 1);
    }

    #[test]
    fn test_existing_files_need_overwrite() {
        let (target, source) = setup();
        fs::write(target.path().join("Song.mp3"), b"older").unwrap();
        let copy = MergeOptions {
            copy: true,
            ..Default::default()
        };

        let report = merge_dirs(target.path(), source.path(), copy).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(fs::read(target.path().join("Song.mp3")).unwrap(), b"older");
        assert!(Store::open(target.path()).files().is_empty());

        let overwrite = MergeOptions {
            overwrite: true,
            ..copy
        };
        merge_dirs(target.path(), source.path(), overwrite).unwrap();
        assert_eq!(fs::read(target.path().join("Song.mp3")).unwrap(), b"Song.mp3");
        assert_eq!(Store::open(target.path()).files()[0].catalog_id, 1);
    }

    #[test]
    fn test_tracked_siblings_keep_their_own_entries() {
        let target = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        for name in ["Song.flac", "Song.mp3", "Song.lrc"] {
            fs::write(source.path().join(name), name.as_bytes()).unwrap();
        }
        let mut store = Store::new(source.path());
        store.add_matched(vec![info("Song.flac", 1), info("Song.mp3", 2)]);
        store.save().unwrap();

        let report = merge_dirs(target.path(), source.path(), MergeOptions::default()).unwrap();
        assert_eq!(
            report,
            MergeReport {
                transferred: 3,
                skipped: 0,
                failed: 0
            }
        );

        let target_store = Store::open(target.path());
        let mut carried: Vec<(&str, u64)> = target_store
            .files()
            .iter()
            .map(|m| (m.file_name.as_str(), m.catalog_id))
            .collect();
        carried.sort();
        assert_eq!(carried, vec![("Song.flac", 1), ("Song.mp3", 2)]);
        assert!(Store::open(source.path()).files().is_empty());
    }

    #[test]
    fn test_sibling_tracked_as_manual_is_carried() {
        let target = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        for name in ["Song.flac", "Song.mp3"] {
            fs::write(source.path().join(name), name.as_bytes()).unwrap();
        }
        let mut store = Store::new(source.path());
        store.add_matched(vec![info("Song.flac", 1)]);
        store.upsert(Collection::Manual, info("Song.mp3", 2));
        store.save().unwrap();

        let copy = MergeOptions {
            copy: true,
            ..Default::default()
        };
        let report = merge_dirs(target.path(), source.path(), copy).unwrap();
        assert_eq!(report.transferred, 2);
        assert_eq!(report.skipped, 0);

        let target_store = Store::open(target.path());
        assert_eq!(target_store.files()[0].file_name, "Song.flac");
        assert_eq!(target_store.manual_matches()[0].catalog_id, 2);
        assert_eq!(Store::open(source.path()).manual_matches().len(), 1);
    }

    #[test]
    fn test_move_file() {
        let tmp = TempDir::new().unwrap();
        let (from, to) = (tmp.path().join("a.mp3"), tmp.path().join("b.mp3"));
        fs::write(&from, b"bytes").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"bytes");

        let err = move_file(&from, &tmp.path().join("c.mp3")).unwrap_err();
        assert!(format!("{:#}", err).contains("a.mp3"));
        assert!(to.exists());
    }

    #[test]
    fn test_merge_into_itself_is_refused() {
        let (_target, source) = setup();
        assert!(merge_dirs(source.path(), source.path(), MergeOptions::default()).is_err());
        assert!(source.path().join("Song.mp3").exists());
    }
}
