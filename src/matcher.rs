//! Candidate matching of local audio files against one catalog page.
//!
//! Files are swept in ascending duration order while three monotonic
//! pointers bound the ±[`DURATION_WINDOW_MS`] window over the catalog sorted
//! the same way. Inside the window candidates are tried nearest-first and
//! the FIRST acceptable one wins (greedy, not a global assignment).
//! Files left over get one more try against a title index of the page.
//!
//! Acceptance rules, in order:
//! - exact cleaned title and primary artist
//! - filename similarity (names that do not split as "A - B")
//! - filename interpretation ("A - B" read both ways)
//! - scored title/artist similarity, relaxed when durations agree

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::models::{AudioInfo, CatalogEntry, LocalAudio};
use crate::normalize::Normalizer;
use crate::progress::{create_progress_bar, log_file_progress};
use crate::scoring::{display_artists, match_audio, text_similarity};

// ============================================================================
// Thresholds
// ============================================================================

/// Half-width of the duration window.
pub const DURATION_WINDOW_MS: i64 = 3000;

/// Minimum similarity between a bare filename and "title - artists".
pub const FILE_NAME_SIMILARITY: f64 = 0.9;

/// Durations closer than this count as the same recording length.
pub const SAME_DURATION_MS: u64 = 2;

/// Title score accepted when durations agree.
pub const LOOSE_TITLE_SCORE: f64 = 0.5;

/// Title score accepted when at least one artist is shared.
pub const STRICT_TITLE_SCORE: f64 = 0.7;

// ============================================================================
// Filename Rules
// ============================================================================

static DASH_SEPARATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^-]+?)\s*-\s*([^-]+)\.[^.]{3,4}$").unwrap());

static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^.]{3,4}$").unwrap());

/// How a filename encodes title and artist.
pub trait FileNameRule {
    /// Split a filename into its two halves, or `None` when it does not
    /// follow the convention. Which half is the title is left open.
    fn split(&self, file_name: &str) -> Option<(String, String)>;

    /// Filename without its extension.
    fn stem(&self, file_name: &str) -> String;
}

/// `"<A> - <B>.<ext>"` with a 3–4 character extension and exactly one dash.
#[derive(Debug, Default, Clone, Copy)]
pub struct DashSeparated;

impl FileNameRule for DashSeparated {
    fn split(&self, file_name: &str) -> Option<(String, String)> {
        let caps = DASH_SEPARATED.captures(file_name)?;
        Some((caps[1].trim().to_string(), caps[2].trim().to_string()))
    }

    fn stem(&self, file_name: &str) -> String {
        FILE_EXTENSION.replace(file_name, "").into_owned()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Found by the duration-window sweep
    Window,
    /// Found through the title index
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    ExactTitleArtist,
    FileNameSimilarity,
    FileNamePattern,
    Scored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        file_name: String,
        catalog_id: u64,
        /// Catalog metadata of the accepted candidate
        target: AudioInfo,
        phase: MatchPhase,
        reason: AcceptReason,
    },
    Unmatched {
        file_name: String,
    },
}

impl MatchOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            MatchOutcome::Matched { file_name, .. } | MatchOutcome::Unmatched { file_name } => {
                file_name
            }
        }
    }

    pub fn catalog_id(&self) -> Option<u64> {
        match self {
            MatchOutcome::Matched { catalog_id, .. } => Some(*catalog_id),
            MatchOutcome::Unmatched { .. } => None,
        }
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Catalog entry with its comparison form precomputed.
struct Candidate<'c> {
    entry: &'c CatalogEntry,
    /// Catalog metadata with the title already cleaned
    cleaned: AudioInfo,
}

/// Local file with its cleaned title precomputed.
struct Subject<'a> {
    file_name: &'a str,
    audio: &'a AudioInfo,
    clean_title: String,
}

pub struct CandidateMatcher<'r> {
    rule: &'r dyn FileNameRule,
}

impl<'r> CandidateMatcher<'r> {
    pub fn new(rule: &'r dyn FileNameRule) -> Self {
        Self { rule }
    }

    /// Resolve each file to at most one catalog entry. Outcomes come back in
    /// the order of `files`.
    pub fn match_files(
        &self,
        normalizer: &mut Normalizer,
        files: &[LocalAudio],
        catalog: &[CatalogEntry],
    ) -> Vec<MatchOutcome> {
        let subjects: Vec<Subject> = files
            .iter()
            .map(|f| Subject {
                file_name: &f.file_name,
                audio: &f.audio,
                clean_title: normalizer.clean(&f.audio.title),
            })
            .collect();

        let mut candidates: Vec<Candidate> = catalog
            .iter()
            .map(|entry| {
                let mut cleaned = entry.audio_info();
                cleaned.title = normalizer.clean(&entry.title);
                Candidate { entry, cleaned }
            })
            .collect();
        candidates.sort_by_key(|c| c.entry.duration);
        // Unknown durations sort first and stay out of the window.
        let window_start = candidates.partition_point(|c| c.entry.duration < 0);
        let windowed = &candidates[window_start..];

        let mut resolved: Vec<Option<(usize, MatchPhase, AcceptReason)>> = vec![None; files.len()];
        let mut order: Vec<usize> = (0..files.len()).collect();
        order.sort_by_key(|&i| files[i].audio.duration);
        let timed_from = order.partition_point(|&i| !files[i].audio.has_known_duration());

        for &i in &order[..timed_from] {
            warn!("{}: unknown duration, skipping window search", files[i].file_name);
        }

        // ---- Duration-window sweep ----
        let timed = &order[timed_from..];
        let pb = create_progress_bar(timed.len() as u64, "Matching");
        let dur = |k: usize| windowed[k].entry.duration;
        let (mut lo, mut mid, mut hi) = (0, 0, 0);

        for (n, &fi) in timed.iter().enumerate() {
            let subject = &subjects[fi];
            pb.set_message(subject.file_name.to_string());
            log_file_progress("match", n as u64 + 1, timed.len() as u64, subject.file_name);

            let d = subject.audio.duration;
            while hi < windowed.len() && dur(hi) <= d + DURATION_WINDOW_MS {
                hi += 1;
            }
            while mid < hi && dur(mid) < d {
                mid += 1;
            }
            while lo < mid && dur(lo) < d - DURATION_WINDOW_MS {
                lo += 1;
            }
            if lo == hi {
                debug!("{}: no catalog entry within the duration window", subject.file_name);
            }

            let (mut l, mut r) = (mid, mid);
            loop {
                let k = if l <= lo && hi <= r {
                    break;
                } else if l <= lo {
                    r += 1;
                    r - 1
                } else if hi <= r {
                    l -= 1;
                    l
                } else if dur(r) - d < d - dur(l - 1) {
                    r += 1;
                    r - 1
                } else {
                    l -= 1;
                    l
                };

                if let Some(reason) = self.accept(normalizer, subject, &windowed[k]) {
                    resolved[fi] = Some((window_start + k, MatchPhase::Window, reason));
                    break;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        // ---- Title-index fallback ----
        let mut by_title: FxHashMap<&str, usize> = FxHashMap::default();
        for (idx, candidate) in candidates.iter().enumerate() {
            by_title.insert(candidate.cleaned.title.as_str(), idx);
        }
        for &fi in &order {
            if resolved[fi].is_some() {
                continue;
            }
            let subject = &subjects[fi];
            let Some(&idx) = by_title.get(subject.clean_title.as_str()) else {
                continue;
            };
            if let Some(reason) = self.accept(normalizer, subject, &candidates[idx]) {
                resolved[fi] = Some((idx, MatchPhase::Fallback, reason));
            }
        }

        files
            .iter()
            .zip(resolved)
            .map(|(file, hit)| match hit {
                Some((idx, phase, reason)) => {
                    let entry = candidates[idx].entry;
                    info!(
                        "{}: matched [id {}] {} ({:?}, {:?})",
                        file.file_name,
                        entry.id,
                        entry.title,
                        phase,
                        reason
                    );
                    MatchOutcome::Matched {
                        file_name: file.file_name.clone(),
                        catalog_id: entry.id,
                        target: entry.audio_info(),
                        phase,
                        reason,
                    }
                }
                None => {
                    info!("{}: no acceptable catalog entry", file.file_name);
                    MatchOutcome::Unmatched {
                        file_name: file.file_name.clone(),
                    }
                }
            })
            .collect()
    }

    /// First rule `target` passes for `subject`, if any.
    fn accept(
        &self,
        normalizer: &mut Normalizer,
        subject: &Subject,
        target: &Candidate,
    ) -> Option<AcceptReason> {
        let audio = subject.audio;
        let cleaned = &target.cleaned;

        if subject.clean_title == cleaned.title && audio.primary_artist == cleaned.primary_artist {
            return Some(AcceptReason::ExactTitleArtist);
        }

        let mut readings = vec![AudioInfo {
            title: subject.clean_title.clone(),
            primary_artist: audio.primary_artist.clone(),
            artists: audio.artists.clone(),
            ..Default::default()
        }];

        match self.rule.split(subject.file_name) {
            Some((first, second)) => {
                let clean_first = normalizer.clean(&first);
                let clean_second = normalizer.clean(&second);
                if (cleaned.title == clean_first && cleaned.primary_artist == second)
                    || (cleaned.title == clean_second && cleaned.primary_artist == first)
                {
                    return Some(AcceptReason::FileNamePattern);
                }
                readings.push(reading(clean_first, second));
                readings.push(reading(clean_second, first));
            }
            None => {
                let artists = display_artists(&cleaned.artists, &cleaned.primary_artist);
                let title = &target.entry.title;
                let stem = normalizer.standardize(&self.rule.stem(subject.file_name));
                let forward = normalizer.standardize(&format!("{} - {}", title, artists));
                let backward = normalizer.standardize(&format!("{} - {}", artists, title));
                let score = text_similarity(&stem, &forward).max(text_similarity(&stem, &backward));
                if score >= FILE_NAME_SIMILARITY {
                    return Some(AcceptReason::FileNameSimilarity);
                }
            }
        }

        let same_duration = audio.duration.abs_diff(cleaned.duration) < SAME_DURATION_MS;
        for info in &readings {
            let score = match_audio(normalizer, info, cleaned, true);
            if same_duration && score.title_score >= LOOSE_TITLE_SCORE {
                return Some(AcceptReason::Scored);
            }
            if score.title_score >= STRICT_TITLE_SCORE && !score.shared_artists.is_empty() {
                return Some(AcceptReason::Scored);
            }
        }
        None
    }
}

/// One filename interpretation: a cleaned title credited to one artist.
fn reading(title: String, artist: String) -> AudioInfo {
    AudioInfo {
        title,
        primary_artist: artist,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::tests::identity_normalizer;
    use serde_json::json;

    fn local(file_name: &str, title: &str, artist: &str, duration: i64) -> LocalAudio {
        LocalAudio {
            file_name: file_name.to_string(),
            audio: AudioInfo {
                title: title.to_string(),
                primary_artist: artist.to_string(),
                duration,
                ..Default::default()
            },
        }
    }

    fn entry(id: u64, title: &str, artist: &str, duration: i64) -> CatalogEntry {
        CatalogEntry::from_value(json!({
            "id": id,
            "title": title,
            "primaryArtist": artist,
            "artists": [artist],
            "duration": duration
        }))
        .unwrap()
    }

    fn run(files: &[LocalAudio], catalog: &[CatalogEntry]) -> Vec<MatchOutcome> {
        let rule = DashSeparated;
        let mut normalizer = identity_normalizer();
        CandidateMatcher::new(&rule).match_files(&mut normalizer, files, catalog)
    }

    fn ids(outcomes: &[MatchOutcome]) -> Vec<Option<u64>> {
        outcomes.iter().map(MatchOutcome::catalog_id).collect()
    }

    #[test]
    fn test_dash_separated_split() {
        let rule = DashSeparated;
        assert_eq!(
            rule.split("Title - Artist.mp3"),
            Some(("Title".to_string(), "Artist".to_string()))
        );
        assert_eq!(
            rule.split("Title-Artist.flac"),
            Some(("Title".to_string(), "Artist".to_string()))
        );
        assert_eq!(rule.split("Part-1 - Band.mp3"), None);
        assert_eq!(rule.split("No separator.mp3"), None);
        assert_eq!(rule.split("Title - Artist.mpeg4"), None);
    }

    #[test]
    fn test_dash_separated_stem() {
        let rule = DashSeparated;
        assert_eq!(rule.stem("Song.flac"), "Song");
        assert_eq!(rule.stem("Song.mp3"), "Song");
        assert_eq!(rule.stem("Song.x"), "Song.x");
    }

    #[test]
    fn test_filename_pattern_within_window() {
        let files = [local("A - B.mp3", "", "", 180_000)];
        let catalog = [entry(1, "A", "B", 181_500)];
        let outcomes = run(&files, &catalog);
        assert_eq!(
            outcomes[0],
            MatchOutcome::Matched {
                file_name: "A - B.mp3".to_string(),
                catalog_id: 1,
                target: catalog[0].audio_info(),
                phase: MatchPhase::Window,
                reason: AcceptReason::FileNamePattern,
            }
        );
    }

    #[test]
    fn test_filename_pattern_reversed() {
        let files = [local("B - A.mp3", "", "", 180_000)];
        let catalog = [entry(1, "A", "B", 180_000)];
        assert_eq!(ids(&run(&files, &catalog)), vec![Some(1)]);
    }

    #[test]
    fn test_exact_title_and_artist() {
        let files = [local("01.mp3", "Song (Live)", "Singer", 200_000)];
        let catalog = [entry(5, "song", "Singer", 202_000)];
        match &run(&files, &catalog)[0] {
            MatchOutcome::Matched { catalog_id, reason, .. } => {
                assert_eq!(*catalog_id, 5);
                assert_eq!(*reason, AcceptReason::ExactTitleArtist);
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_filename_similarity_without_pattern() {
        let files = [local("Part-1 - Band.mp3", "", "", 150_000)];
        let catalog = [entry(9, "Part-1", "Band", 150_500)];
        match &run(&files, &catalog)[0] {
            MatchOutcome::Matched { reason, .. } => {
                assert_eq!(*reason, AcceptReason::FileNameSimilarity)
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_scored_match_needs_shared_artist() {
        let files = [local("track01.mp3", "Hello (Live)", "Adele", 240_000)];
        let catalog = [entry(3, "Hello", "ADELE", 241_000)];
        match &run(&files, &catalog)[0] {
            MatchOutcome::Matched { reason, .. } => assert_eq!(*reason, AcceptReason::Scored),
            other => panic!("expected a match, got {:?}", other),
        }

        let strangers = [local("track01.mp3", "Hello (Live)", "Someone", 240_000)];
        assert_eq!(ids(&run(&strangers, &catalog)), vec![None]);
    }

    #[test]
    fn test_equal_duration_relaxes_title() {
        let catalog = [entry(4, "Hello", "Adele", 240_000)];
        let same_length = [local("track01.mp3", "Helo", "", 240_001)];
        assert_eq!(ids(&run(&same_length, &catalog)), vec![Some(4)]);

        let other_length = [local("track01.mp3", "Helo", "", 241_000)];
        assert_eq!(ids(&run(&other_length, &catalog)), vec![None]);
    }

    #[test]
    fn test_window_bounds() {
        let catalog = [entry(1, "Song", "Singer", 183_000)];
        let edge = [local("x.mp3", "Song", "Singer", 180_000)];
        let outcomes = run(&edge, &catalog);
        assert!(matches!(outcomes[0], MatchOutcome::Matched { phase: MatchPhase::Window, .. }));
    }

    #[test]
    fn test_nearest_candidate_wins() {
        let files = [local("x.mp3", "Song", "Singer", 180_000)];
        let catalog = [
            entry(1, "Song", "Singer", 178_500),
            entry(2, "Song", "Singer", 181_000),
        ];
        assert_eq!(ids(&run(&files, &catalog)), vec![Some(2)]);
    }

    #[test]
    fn test_equal_distance_prefers_lower() {
        let files = [local("x.mp3", "Song", "Singer", 180_000)];
        let catalog = [
            entry(2, "Song", "Singer", 181_000),
            entry(1, "Song", "Singer", 179_000),
        ];
        assert_eq!(ids(&run(&files, &catalog)), vec![Some(1)]);
    }

    #[test]
    fn test_first_acceptable_beats_better_candidate() {
        // The nearer candidate passes only through the duration rule, yet it
        // is taken over the exact title match further away.
        let files = [local("x.mp3", "Helo", "Singer", 180_000)];
        let catalog = [
            entry(1, "Hello", "Nobody", 180_001),
            entry(2, "Helo", "Singer", 182_000),
        ];
        assert_eq!(ids(&run(&files, &catalog)), vec![Some(1)]);
    }

    #[test]
    fn test_fallback_outside_window() {
        let files = [local("x.mp3", "Song", "Singer", 100_000)];
        let catalog = [entry(7, "Song", "Singer", 200_000)];
        let outcomes = run(&files, &catalog);
        assert!(matches!(
            outcomes[0],
            MatchOutcome::Matched { catalog_id: 7, phase: MatchPhase::Fallback, .. }
        ));
    }

    #[test]
    fn test_unknown_duration_uses_fallback() {
        let files = [local("x.mp3", "Song", "Singer", -1)];
        let catalog = [entry(7, "Song", "Singer", 200_000), entry(8, "Other", "Singer", -1)];
        let outcomes = run(&files, &catalog);
        assert!(matches!(
            outcomes[0],
            MatchOutcome::Matched { catalog_id: 7, phase: MatchPhase::Fallback, .. }
        ));
    }

    #[test]
    fn test_fallback_later_entry_wins() {
        let files = [local("x.mp3", "Song", "Singer", -1)];
        let catalog = [entry(1, "Song", "Singer", 100_000), entry(2, "Song", "Singer", 300_000)];
        assert_eq!(ids(&run(&files, &catalog)), vec![Some(2)]);
    }

    #[test]
    fn test_candidate_serves_several_files() {
        let files = [
            local("b.mp3", "Song", "Singer", 181_000),
            local("a.mp3", "Song", "Singer", 179_000),
            local("c.mp3", "Else", "Nobody", 50_000),
        ];
        let catalog = [entry(1, "Song", "Singer", 180_000)];
        let outcomes = run(&files, &catalog);
        let names: Vec<&str> = outcomes.iter().map(MatchOutcome::file_name).collect();
        assert_eq!(names, vec!["b.mp3", "a.mp3", "c.mp3"]);
        assert_eq!(ids(&outcomes), vec![Some(1), Some(1), None]);
    }

    #[test]
    fn test_filename_readings_feed_scoring() {
        let files = [local("Helo - Adele.mp3", "", "", 240_000)];

        let catalog = [entry(3, "Hello", "Adele", 241_000)];
        match &run(&files, &catalog)[0] {
            MatchOutcome::Matched { reason, phase, .. } => {
                assert_eq!(*reason, AcceptReason::Scored);
                assert_eq!(*phase, MatchPhase::Window);
            }
            other => panic!("expected a match, got {:?}", other),
        }

        let other_artist = [entry(3, "Hello", "Nobody", 241_000)];
        assert!(matches!(run(&files, &other_artist)[0], MatchOutcome::Unmatched { .. }));
    }

    #[test]
    fn test_huge_catalog_duration_in_fallback() {
        let files = [local("x.mp3", "Song", "", -1)];
        let record = CatalogEntry::from_value(json!({
            "id": 1,
            "title": "Song",
            "primaryArtist": "Other",
            "duration": 1e300
        }))
        .unwrap();
        assert_eq!(record.duration, i64::MAX);
        assert_eq!(ids(&run(&files, &[record])), vec![None]);
    }

    #[test]
    fn test_empty_catalog() {
        let files = [local("A - B.mp3", "A", "B", 180_000)];
        assert_eq!(ids(&run(&files, &[])), vec![None]);
    }
}
