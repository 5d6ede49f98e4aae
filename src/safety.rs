//! Safety utilities to prevent accidental damage to match data.
//!
//! These checks run before anything is moved or overwritten: merging a
//! directory into itself would shuffle files onto themselves, and a stats
//! report written over a store document would wipe its correlations.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::store::{STORE_FILE, TRASHBIN_FILE};

/// Validates that `source` can be merged into `target`.
///
/// Checks:
/// - Both paths must be existing directories
/// - They must not resolve to the same directory
pub fn validate_merge_dirs(target: &Path, source: &Path) -> Result<()> {
    for dir in [target, source] {
        if !dir.is_dir() {
            bail!("Safety check failed: '{}' is not a directory", dir.display());
        }
    }

    let target_real = target
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", target.display()))?;
    let source_real = source
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", source.display()))?;
    if target_real == source_real {
        bail!(
            "Safety check failed: target '{}' and source '{}' are the same directory",
            target.display(),
            source.display()
        );
    }

    Ok(())
}

/// Validates that a report file may be written to `output`.
///
/// Checks:
/// - Output filename must end in `.json`
/// - Output must not be one of the store documents
pub fn validate_report_path(output: &Path) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.ends_with(".json") {
        bail!(
            "Safety check failed: report file '{}' must have a .json extension",
            output.display()
        );
    }

    for protected in [STORE_FILE, TRASHBIN_FILE] {
        if output_name == protected {
            bail!(
                "Safety check failed: report file '{}' would overwrite the store document '{}'",
                output.display(),
                protected
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_distinct_dirs_are_valid() {
        let target = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        assert!(validate_merge_dirs(target.path(), source.path()).is_ok());
    }

    #[test]
    fn test_same_dir_is_refused() {
        let dir = TempDir::new().unwrap();
        let dotted = dir.path().join(".");
        let result = validate_merge_dirs(dir.path(), &dotted);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("are the same directory"));
    }

    #[test]
    fn test_missing_dir_is_refused() {
        let dir = TempDir::new().unwrap();
        let result = validate_merge_dirs(dir.path(), &dir.path().join("missing"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("is not a directory"));
    }

    #[test]
    fn test_valid_report_path() {
        let output = PathBuf::from("/tmp/match-stats.json");
        assert!(validate_report_path(&output).is_ok());
    }

    #[test]
    fn test_report_needs_json_extension() {
        let output = PathBuf::from("/tmp/match-stats.txt");
        let result = validate_report_path(&output);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("must have a .json extension"));
    }

    #[test]
    fn test_report_over_store_blocked() {
        let output = PathBuf::from("/music/.matched.json");
        assert!(validate_report_path(&output).is_err());
        let output = PathBuf::from("/music/.matched-trashbin.json");
        assert!(validate_report_path(&output).is_err());
    }
}
