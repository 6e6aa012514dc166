use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use log::debug;
use walkdir::WalkDir;

use crate::error::{StorageError, StorageResult};
use crate::path_utils::relative_key;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile `patterns` into matchers over `/`-separated relative keys
///
/// A pattern without `**` may match at any depth, so it is anchored as `**/pattern`.
fn compile(patterns: &[String]) -> StorageResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            let anchored = if pattern.contains("**") {
                pattern.clone()
            } else {
                format!("**/{pattern}")
            };
            Pattern::new(&anchored).map_err(|e| StorageError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.msg.to_string(),
            })
        })
        .collect()
}

/// Expand `patterns` against `root` and collect the matching regular files
///
/// A pattern containing `**` is matched exactly as written under `root`.
/// Any other pattern is matched in every directory of the tree, so `*.txt`
/// also finds `a/b/c.txt`. Directories are never entries and symlinked
/// directories are never descended; a symlink counts only when it resolves
/// to a regular file.
///
/// # Arguments
/// * `root` - Tree root
/// * `patterns` - Glob patterns relative to `root`
/// * `exclude` - Predicate on the relative key; `true` drops the file
///
/// # Returns
/// Relative key (`/`-separated) -> absolute path, deduplicated across patterns
pub fn scan_tree<F>(
    root: &Path,
    patterns: &[String],
    exclude: F,
) -> StorageResult<BTreeMap<String, PathBuf>>
where
    F: Fn(&str) -> bool,
{
    if !root.exists() {
        return Err(StorageError::NotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(StorageError::NotADirectory(root.to_path_buf()));
    }

    let matchers = compile(patterns)?;
    if matchers.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry during scan: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        let regular = file_type.is_file()
            || (file_type.is_symlink()
                && fs::metadata(entry.path()).is_ok_and(|meta| meta.is_file()));
        if !regular {
            continue;
        }

        let Some(key) = relative_key(root, entry.path()) else {
            continue;
        };
        if exclude(&key) || !matchers.iter().any(|m| m.matches_with(&key, MATCH_OPTIONS)) {
            continue;
        }
        files.insert(key, entry.into_path());
    }

    Ok(files)
}
