//! One matching pass over a directory, plus the store maintenance commands.
//!
//! A pass loads the directory's store, reconciles it with the current audio
//! listing, reads tags of the files still unresolved, matches them against
//! the supplied catalog page and saves the result once at the end.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::library::list_audio_files;
use crate::matcher::{CandidateMatcher, DashSeparated, FileNameRule, MatchOutcome, MatchPhase};
use crate::models::{CatalogEntry, LocalAudio, MatchInfo, MatchReport, MatchingStats, PendingFile};
use crate::normalize::Normalizer;
use crate::progress::{create_progress_bar, log_file_progress};
use crate::store::Store;
use crate::tags::{read_audio_info, LoftyTagReader, RetagReport, TagReader, TagWriter};

/// Collaborators shared by every pass of one run.
pub struct MatchSession {
    normalizer: Normalizer,
    reader: Box<dyn TagReader>,
    rule: Box<dyn FileNameRule>,
}

impl MatchSession {
    pub fn new(
        normalizer: Normalizer,
        reader: Box<dyn TagReader>,
        rule: Box<dyn FileNameRule>,
    ) -> Self {
        Self {
            normalizer,
            reader,
            rule,
        }
    }

    /// Dictionary-backed normalizer (initialized here), lofty tags and
    /// `"A - B"` filenames.
    pub fn with_defaults() -> Self {
        let mut normalizer = Normalizer::default();
        normalizer.init();
        Self::new(normalizer, Box::new(LoftyTagReader), Box::new(DashSeparated))
    }

    /// Match every audio file of `dir` against `catalog` and persist the
    /// correlations.
    pub fn run(&mut self, dir: &Path, catalog: &[CatalogEntry]) -> Result<MatchReport> {
        let start = Instant::now();
        let mut store = Store::open(dir);

        let listing = list_audio_files(dir)
            .with_context(|| format!("failed to list audio files in {}", dir.display()))?;
        let pending = store
            .reconcile(&listing)
            .with_context(|| format!("failed to reconcile {}", dir.display()))?;

        let mut stats = MatchingStats {
            listed_files: listing.len(),
            manual_matches: store.manual_matches().len(),
            cache_recovered: store.files().len(),
            ambiguous_hashes: count_ambiguous(&pending),
            catalog_entries: catalog.len(),
            ..Default::default()
        };
        info!(
            "{}: {} audio files, {} manual, {} cached, {} to match",
            dir.display(),
            listing.len(),
            stats.manual_matches,
            stats.cache_recovered,
            pending.len()
        );

        let locals = self.read_pending(dir, &pending);
        stats.unknown_duration = locals.iter().filter(|l| !l.audio.has_known_duration()).count();

        let matcher = CandidateMatcher::new(self.rule.as_ref());
        let outcomes = matcher.match_files(&mut self.normalizer, &locals, catalog);

        let details: FxHashMap<u64, &Value> = catalog.iter().map(|e| (e.id, &e.detail)).collect();
        let mut matched = Vec::new();
        let mut unmatched_files = Vec::new();
        for ((pending, local), outcome) in pending.into_iter().zip(locals).zip(outcomes) {
            match outcome {
                MatchOutcome::Matched {
                    catalog_id, phase, ..
                } => {
                    match phase {
                        MatchPhase::Window => stats.window_matches += 1,
                        MatchPhase::Fallback => stats.fallback_matches += 1,
                    }
                    matched.push(MatchInfo {
                        file_name: pending.file_name,
                        content_hash: pending.content_hash,
                        catalog_id,
                        audio_info: local.audio,
                        catalog_detail: details
                            .get(&catalog_id)
                            .map(|v| (*v).clone())
                            .unwrap_or_default(),
                    });
                }
                MatchOutcome::Unmatched { file_name } => unmatched_files.push(file_name),
            }
        }

        let report_matched = matched.len();
        store.add_matched(matched);
        store
            .save()
            .with_context(|| format!("failed to save the store of {}", dir.display()))?;

        stats.unmatched = unmatched_files.len();
        stats.elapsed_seconds = start.elapsed().as_secs_f64();
        stats.log_phase("match");

        Ok(MatchReport {
            manual: stats.manual_matches,
            cached: stats.cache_recovered,
            matched: report_matched,
            unmatched_files,
            stats,
        })
    }

    fn read_pending(&self, dir: &Path, pending: &[PendingFile]) -> Vec<LocalAudio> {
        let total = pending.len() as u64;
        let pb = create_progress_bar(total, "Reading tags");
        let locals = pending
            .iter()
            .enumerate()
            .map(|(n, p)| {
                pb.set_message(p.file_name.clone());
                log_file_progress("tags", n as u64 + 1, total, &p.file_name);
                let audio = read_audio_info(self.reader.as_ref(), &dir.join(&p.file_name));
                pb.inc(1);
                LocalAudio {
                    file_name: p.file_name.clone(),
                    audio,
                }
            })
            .collect();
        pb.finish_and_clear();
        locals
    }

    /// Pin `song` to catalog entry `catalog_id`, overriding automatic matching
    /// for that filename.
    pub fn manual_match_file(
        &self,
        song: &Path,
        catalog_id: u64,
        catalog: &[CatalogEntry],
    ) -> Result<MatchInfo> {
        let Some(entry) = catalog.iter().find(|e| e.id == catalog_id) else {
            bail!("catalog id {} is not on the supplied catalog page", catalog_id);
        };
        if !song.is_file() {
            bail!("{} is not a file", song.display());
        }
        let file_name = song
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("unusable file name: {}", song.display()))?;
        let dir = match song.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut store = Store::open(dir);
        let info = store
            .manual_match(file_name, catalog_id, entry.detail.clone(), self.reader.as_ref())
            .with_context(|| format!("failed to match {} manually", song.display()))?;
        store
            .save()
            .with_context(|| format!("failed to save the store of {}", dir.display()))?;
        Ok(info)
    }

    /// Re-read tags and hashes of everything tracked in `dir`. Returns `None`
    /// when the directory has no correlations.
    pub fn update_all_info(&self, dir: &Path) -> Result<Option<usize>> {
        let mut store = Store::open(dir);
        if store.is_empty() {
            warn!("{}: no match data in this directory", dir.display());
            return Ok(None);
        }
        let refreshed = store.refresh_all(self.reader.as_ref());
        store
            .save()
            .with_context(|| format!("failed to save the store of {}", dir.display()))?;
        Ok(Some(refreshed))
    }
}

/// Forget the automatic matches of `dir`, trashbin included. Returns `false`
/// when there was nothing stored.
pub fn clear_cache(dir: &Path) -> Result<bool> {
    clear_with(dir, Store::clear_automatic)
}

/// Forget the manual matches of `dir`. Returns `false` when there was nothing
/// stored.
pub fn clear_manual(dir: &Path) -> Result<bool> {
    clear_with(dir, Store::clear_manual)
}

fn clear_with(dir: &Path, clear: fn(&mut Store)) -> Result<bool> {
    let mut store = Store::open(dir);
    if store.is_empty() {
        warn!("{}: no match data in this directory", dir.display());
        return Ok(false);
    }
    clear(&mut store);
    store
        .save()
        .with_context(|| format!("failed to save the store of {}", dir.display()))?;
    Ok(true)
}

/// Write the catalog metadata stored for `dir` into the tags of its files.
/// Returns `None` when the directory has no correlations.
///
/// Rewriting tags changes file contents, so the stored hashes go stale until
/// the next `update_all_info`.
pub fn update_file_meta(dir: &Path, writer: &dyn TagWriter) -> Option<RetagReport> {
    let store = Store::open(dir);
    if store.files().is_empty() && store.manual_matches().is_empty() {
        warn!("{}: no match data in this directory", dir.display());
        return None;
    }
    let report = store.write_catalog_tags(writer);
    info!(
        "{}: {} files retagged, {} skipped, {} failed",
        store.dir().display(),
        report.updated,
        report.skipped,
        report.failed
    );
    Some(report)
}

/// Number of pending files whose hash another pending file shares.
fn count_ambiguous(pending: &[PendingFile]) -> usize {
    let mut seen = FxHashSet::default();
    let mut repeated = FxHashSet::default();
    for p in pending {
        if !seen.insert(p.content_hash.as_str()) {
            repeated.insert(p.content_hash.as_str());
        }
    }
    pending
        .iter()
        .filter(|p| repeated.contains(p.content_hash.as_str()))
        .count()
}
