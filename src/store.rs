//! Per-directory correlation store.
//!
//! Two JSON documents live next to the audio files:
//! - `.matched.json`: `{ files, manualMatch }`, the automatic and manual
//!   correlations
//! - `.matched-trashbin.json`: `{ files }`, correlations displaced from
//!   `files` and kept so a renamed or re-added file can be recovered by its
//!   content hash
//!
//! Both are read once, mutated in memory over a pass and fully rewritten by
//! [`Store::save`].

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::StoreError,
    hash::content_hash,
    models::{MatchInfo, PendingFile},
    progress::{create_progress_bar, log_file_progress},
    tags::{read_audio_info, CatalogTags, RetagReport, TagReader, TagWriter},
};

pub const STORE_FILE: &str = ".matched.json";
pub const TRASHBIN_FILE: &str = ".matched-trashbin.json";

/// Which collection of the primary document an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Automatic,
    Manual,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    pub files: Vec<MatchInfo>,
    pub manual_match: Vec<MatchInfo>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct TrashbinDocument {
    pub files: Vec<MatchInfo>,
}

/// How one listed file was settled during [`Store::reconcile`].
#[derive(Debug)]
enum Resolution {
    Manual,
    ByName(usize),
    Unresolved,
}

/// Main structure holding one directory's correlations.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    data: StoreDocument,
    trashbin: TrashbinDocument,
}

impl Store {
    /// Empty store for `dir`; nothing is read from disk.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            data: StoreDocument::default(),
            trashbin: TrashbinDocument::default(),
        }
    }

    /// Store for `dir` with both documents loaded.
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        let mut store = Self::new(dir);
        store.load();
        store
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    pub fn trashbin_path(&self) -> PathBuf {
        self.dir.join(TRASHBIN_FILE)
    }

    pub fn files(&self) -> &[MatchInfo] {
        &self.data.files
    }

    pub fn manual_matches(&self) -> &[MatchInfo] {
        &self.data.manual_match
    }

    pub fn trashbin(&self) -> &[MatchInfo] {
        &self.trashbin.files
    }

    pub fn document(&self) -> &StoreDocument {
        &self.data
    }

    pub fn entries(&self, collection: Collection) -> &[MatchInfo] {
        match collection {
            Collection::Automatic => &self.data.files,
            Collection::Manual => &self.data.manual_match,
        }
    }

    fn entries_mut(&mut self, collection: Collection) -> &mut Vec<MatchInfo> {
        match collection {
            Collection::Automatic => &mut self.data.files,
            Collection::Manual => &mut self.data.manual_match,
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Read both documents. Missing or corrupt content leaves the affected
    /// collections empty; entries without a file name are dropped.
    pub fn load(&mut self) {
        let primary = read_document(&self.store_path());
        self.data = StoreDocument {
            files: parse_entries(primary.as_ref(), "files", &self.store_path()),
            manual_match: parse_entries(primary.as_ref(), "manualMatch", &self.store_path()),
        };

        let trashbin = read_document(&self.trashbin_path());
        self.trashbin = TrashbinDocument {
            files: parse_entries(trashbin.as_ref(), "files", &self.trashbin_path()),
        };

        debug!(
            "loaded store for {}: {} files, {} manual, {} in trashbin",
            self.dir.display(),
            self.data.files.len(),
            self.data.manual_match.len(),
            self.trashbin.files.len()
        );
    }

    /// Overwrite both documents with the in-memory state.
    pub fn save(&self) -> Result<(), StoreError> {
        write_atomic(&self.store_path(), &serde_json::to_vec(&self.data)?)?;
        write_atomic(&self.trashbin_path(), &serde_json::to_vec(&self.trashbin)?)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Carry existing correlations over to the current listing of the
    /// directory and return the files that still need matching.
    ///
    /// Files with a manual override are settled. Names already in `files`
    /// keep their entry. Everything else is hashed; a hash shared by two
    /// listed files is ambiguous and always goes back to matching, any other
    /// hash found in `files` or the trashbin is recovered under the new name.
    /// Entries of `files` that nothing claimed are displaced into the
    /// trashbin.
    ///
    /// A hashing failure aborts before the store is modified.
    pub fn reconcile(&mut self, file_names: &[String]) -> Result<Vec<PendingFile>, StoreError> {
        let manual: FxHashSet<&str> = self
            .data
            .manual_match
            .iter()
            .map(|m| m.file_name.as_str())
            .collect();
        let mut by_name: FxHashMap<&str, usize> = FxHashMap::default();
        for (idx, entry) in self.data.files.iter().enumerate() {
            by_name.entry(entry.file_name.as_str()).or_insert(idx);
        }

        let resolutions: Vec<Resolution> = file_names
            .iter()
            .map(|name| {
                if manual.contains(name.as_str()) {
                    Resolution::Manual
                } else if let Some(&idx) = by_name.get(name.as_str()) {
                    Resolution::ByName(idx)
                } else {
                    Resolution::Unresolved
                }
            })
            .collect();

        // Hash everything still unresolved, one file at a time.
        let total = resolutions
            .iter()
            .filter(|r| matches!(r, Resolution::Unresolved))
            .count() as u64;
        let pb = create_progress_bar(total, "Hashing");
        let mut hashes: Vec<Option<String>> = vec![None; file_names.len()];
        let mut done = 0;
        for (idx, name) in file_names.iter().enumerate() {
            if !matches!(resolutions[idx], Resolution::Unresolved) {
                continue;
            }
            done += 1;
            pb.set_message(name.clone());
            log_file_progress("hash", done, total, name);
            let hash = match content_hash(&self.dir.join(name)) {
                Ok(hash) => hash,
                Err(err) => {
                    pb.abandon();
                    return Err(err);
                }
            };
            hashes[idx] = Some(hash);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let mut hash_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for hash in hashes.iter().flatten() {
            *hash_counts.entry(hash.as_str()).or_insert(0) += 1;
        }

        // From here on the store is rewritten.
        let mut stale: Vec<Option<MatchInfo>> =
            std::mem::take(&mut self.data.files).into_iter().map(Some).collect();
        let mut trash: Vec<Option<MatchInfo>> =
            std::mem::take(&mut self.trashbin.files).into_iter().map(Some).collect();

        let mut recovered: Vec<Option<MatchInfo>> = vec![None; file_names.len()];
        for (idx, resolution) in resolutions.iter().enumerate() {
            if let Resolution::ByName(slot) = resolution {
                recovered[idx] = stale[*slot].take();
            }
        }

        let stale_by_hash = index_by_hash(&stale);
        let trash_by_hash = index_by_hash(&trash);

        let mut pending = Vec::new();
        let mut ambiguous = 0;
        for (idx, name) in file_names.iter().enumerate() {
            let Some(hash) = &hashes[idx] else {
                continue;
            };
            if hash_counts.get(hash.as_str()).copied().unwrap_or(0) > 1 {
                warn!("{name}: content shared with another file, matching it afresh");
                ambiguous += 1;
            } else if let Some(entry) = take_by_hash(&mut stale, &stale_by_hash, hash)
                .or_else(|| take_by_hash(&mut trash, &trash_by_hash, hash))
            {
                if entry.file_name != *name {
                    info!("{}: recovered from {} [id {}]", name, entry.file_name, entry.catalog_id);
                }
                recovered[idx] = Some(MatchInfo {
                    file_name: name.clone(),
                    ..entry
                });
                continue;
            }
            pending.push(PendingFile {
                file_name: name.clone(),
                content_hash: hash.clone(),
            });
        }
        if ambiguous > 0 {
            debug!("{ambiguous} files share content hashes");
        }

        let fresh: Vec<MatchInfo> = recovered.into_iter().flatten().collect();
        let claimed: FxHashSet<&str> = fresh.iter().map(|m| m.content_hash.as_str()).collect();
        let displaced: Vec<MatchInfo> = stale
            .into_iter()
            .flatten()
            .filter(|m| !claimed.contains(m.content_hash.as_str()))
            .collect();
        let displaced_hashes: FxHashSet<&str> =
            displaced.iter().map(|m| m.content_hash.as_str()).collect();

        let mut trashbin: Vec<MatchInfo> = trash
            .into_iter()
            .flatten()
            .filter(|m| {
                !claimed.contains(m.content_hash.as_str())
                    && !displaced_hashes.contains(m.content_hash.as_str())
            })
            .collect();
        trashbin.extend(displaced);

        self.trashbin.files = trashbin;
        self.data.files = fresh;
        Ok(pending)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert or replace `entry` in `collection`, keyed by file name.
    pub fn upsert(&mut self, collection: Collection, entry: MatchInfo) {
        let entries = self.entries_mut(collection);
        match entries.iter_mut().find(|e| e.file_name == entry.file_name) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
    }

    /// Drop every entry of `collection` whose file name is in `names`.
    pub fn remove(&mut self, collection: Collection, names: &FxHashSet<String>) {
        self.entries_mut(collection)
            .retain(|e| !names.contains(&e.file_name));
    }

    /// Add automatic matches, replacing earlier entries with the same name.
    pub fn add_matched(&mut self, entries: Vec<MatchInfo>) {
        let names: FxHashSet<String> = entries.iter().map(|e| e.file_name.clone()).collect();
        self.remove(Collection::Automatic, &names);
        self.data.files.extend(entries);
    }

    /// Record an explicit correlation for `file_name`. Tags and hash are read
    /// fresh from the file; an unreadable hash is an error.
    pub fn manual_match(
        &mut self,
        file_name: &str,
        catalog_id: u64,
        catalog_detail: Value,
        reader: &dyn TagReader,
    ) -> Result<MatchInfo, StoreError> {
        let path = self.dir.join(file_name);
        let audio_info = read_audio_info(reader, &path);
        let content_hash = content_hash(&path)?;
        let entry = MatchInfo {
            file_name: file_name.to_string(),
            content_hash,
            catalog_id,
            audio_info,
            catalog_detail,
        };
        self.upsert(Collection::Manual, entry.clone());
        info!("{}: manually matched [id {}]", file_name, catalog_id);
        Ok(entry)
    }

    /// Re-read tags and hash of every tracked file. Failures are logged and
    /// leave that entry untouched. Returns the number of refreshed entries.
    pub fn refresh_all(&mut self, reader: &dyn TagReader) -> usize {
        let dir = self.dir.clone();
        let total = (self.data.files.len() + self.data.manual_match.len()) as u64;
        let pb = create_progress_bar(total, "Updating");
        let mut refreshed = 0;
        let mut done = 0;

        for entry in self
            .data
            .files
            .iter_mut()
            .chain(self.data.manual_match.iter_mut())
        {
            done += 1;
            pb.set_message(entry.file_name.clone());
            log_file_progress("update", done, total, &entry.file_name);
            let path = dir.join(&entry.file_name);
            let result = reader
                .read(&path)
                .and_then(|audio| Ok((audio, content_hash(&path)?)));
            match result {
                Ok((audio, hash)) => {
                    entry.audio_info = audio;
                    entry.content_hash = hash;
                    refreshed += 1;
                }
                Err(err) => warn!("{}: failed to refresh audio info: {:#}", entry.file_name, err),
            }
            pb.inc(1);
        }
        pb.finish_and_clear();
        refreshed
    }

    /// Every tracked entry once per file name, manual matches taking the
    /// place of automatic ones for the same file.
    pub fn tracked(&self) -> Vec<&MatchInfo> {
        let mut tracked: Vec<&MatchInfo> = Vec::new();
        let mut index: FxHashMap<&str, usize> = FxHashMap::default();
        for entry in self.data.files.iter().chain(&self.data.manual_match) {
            match index.get(entry.file_name.as_str()) {
                Some(&i) => tracked[i] = entry,
                None => {
                    index.insert(entry.file_name.as_str(), tracked.len());
                    tracked.push(entry);
                }
            }
        }
        tracked
    }

    /// Write the stored catalog metadata of every tracked file into its
    /// tags. Entries without usable metadata or without a file are skipped;
    /// write failures are logged and counted.
    pub fn write_catalog_tags(&self, writer: &dyn TagWriter) -> RetagReport {
        let tracked = self.tracked();
        let total = tracked.len() as u64;
        let pb = create_progress_bar(total, "Tagging");
        let mut report = RetagReport::default();

        for (n, entry) in tracked.into_iter().enumerate() {
            pb.set_message(entry.file_name.clone());
            log_file_progress("retag", n as u64 + 1, total, &entry.file_name);
            pb.inc(1);

            let tags = match CatalogTags::from_detail(&entry.catalog_detail) {
                Some(tags) if !tags.is_empty() => tags,
                _ => {
                    debug!("{}: no catalog metadata to write", entry.file_name);
                    report.skipped += 1;
                    continue;
                }
            };
            let path = self.dir.join(&entry.file_name);
            if !path.is_file() {
                warn!("{}: not present in {}, skipping", entry.file_name, self.dir.display());
                report.skipped += 1;
                continue;
            }
            match writer.write(&path, &tags) {
                Ok(()) => {
                    info!("{}: tags written from [id {}]", entry.file_name, entry.catalog_id);
                    report.updated += 1;
                }
                Err(err) => {
                    warn!("{}: failed to write tags: {:#}", entry.file_name, err);
                    report.failed += 1;
                }
            }
        }
        pb.finish_and_clear();
        report
    }

    /// Forget all automatic matches, including the trashbin.
    pub fn clear_automatic(&mut self) {
        self.data.files.clear();
        self.trashbin.files.clear();
    }

    pub fn clear_manual(&mut self) {
        self.data.manual_match.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.files.is_empty()
            && self.trashbin.files.is_empty()
            && self.data.manual_match.is_empty()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn read_document(path: &Path) -> Option<Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!("failed to read {}, starting empty: {}", path.display(), err);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("corrupt {}, starting empty: {}", path.display(), err);
            None
        }
    }
}

fn parse_entries(document: Option<&Value>, key: &str, source: &Path) -> Vec<MatchInfo> {
    let Some(items) = document.and_then(|d| d.get(key)).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<MatchInfo>(item.clone()) {
            Ok(entry) if !entry.file_name.is_empty() => Some(entry),
            Ok(_) => None,
            Err(err) => {
                warn!("dropping malformed entry in {} ({}): {}", source.display(), key, err);
                None
            }
        })
        .collect()
}

/// Write through a sibling temp file and rename it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Last entry wins for repeated hashes.
fn index_by_hash(entries: &[Option<MatchInfo>]) -> FxHashMap<String, usize> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| e.as_ref().map(|e| (e.content_hash.clone(), idx)))
        .collect()
}

fn take_by_hash(
    entries: &mut [Option<MatchInfo>],
    index: &FxHashMap<String, usize>,
    hash: &str,
) -> Option<MatchInfo> {
    index.get(hash).and_then(|&idx| entries[idx].take())
}
