//! Listing the audio files of one directory.

use std::path::Path;

use log::warn;
use walkdir::WalkDir;

use crate::error::StoreError;

/// Extensions treated as audio, compared case-insensitively.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "ogg", "aac", "ape", "wma", "opus",
];

pub fn is_audio_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Names of all regular files directly inside `dir`, sorted.
pub fn list_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    let dir_str = dir.to_string_lossy();
    let mut names = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"))
                    .into())
            }
            Err(err) => {
                warn!("error while listing {dir_str}, skipping an entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => warn!("skipping non UTF-8 file name in {dir_str}: {:?}", entry.file_name()),
        }
    }

    names.sort();
    Ok(names)
}

/// Names of the audio files directly inside `dir`, sorted.
pub fn list_audio_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    Ok(list_files(dir)?.into_iter().filter(|n| is_audio_file(n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file("song.mp3"));
        assert!(is_audio_file("SONG.FLAC"));
        assert!(!is_audio_file("song.lrc"));
        assert!(!is_audio_file("mp3"));
        assert!(!is_audio_file(".matched.json"));
    }

    #[test]
    fn test_list_audio_files_is_flat_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::write(root.join("b.mp3"), b"b").unwrap();
        std::fs::write(root.join("a.flac"), b"a").unwrap();
        std::fs::write(root.join("a.lrc"), b"lyrics").unwrap();
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("c.mp3"), b"c").unwrap();

        assert_eq!(list_audio_files(root).unwrap(), vec!["a.flac", "b.mp3"]);
        assert_eq!(list_files(root).unwrap(), vec!["a.flac", "a.lrc", "b.mp3"]);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(list_files(&tmp.path().join("nope")).is_err());
    }
}
