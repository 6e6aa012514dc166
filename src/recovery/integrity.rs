use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;

use crate::config::VolumeConfig;
use crate::diff::diff;
use crate::fingerprint::{FingerprintMap, HashAlgorithm, fingerprint_file, scan_tree};
use crate::path_utils::normalize_relative;

/// Result of comparing the memory tree against the persistent tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityResult {
    /// Files present in both trees with equal digests
    pub verified_count: usize,
    pub mismatched_files: Vec<String>,
    pub missing_in_ram: Vec<String>,
    /// Extra files in the memory tree; tolerated
    pub missing_on_disk: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub disk_hashes: FingerprintMap,
    #[serde(skip)]
    pub ram_hashes: FingerprintMap,
}

impl IntegrityResult {
    pub fn is_valid(&self) -> bool {
        self.mismatched_files.is_empty() && self.missing_in_ram.is_empty() && self.errors.is_empty()
    }

    pub fn needs_recovery(&self) -> bool {
        !self.is_valid()
    }

    /// Number of files found in the persistent tree
    pub fn total_files(&self) -> usize {
        self.disk_hashes.len()
    }
}

/// Compare both trees using the volume's patterns and the default digest
pub fn verify_integrity(config: &VolumeConfig) -> IntegrityResult {
    verify_integrity_with(config, &config.patterns, HashAlgorithm::Auto)
}

/// Compare both trees with explicit patterns and digest algorithm
///
/// Never fails: missing roots, scan errors and unreadable files are all
/// reported in `errors`, which makes the result invalid.
pub fn verify_integrity_with(
    config: &VolumeConfig,
    patterns: &[String],
    algorithm: HashAlgorithm,
) -> IntegrityResult {
    let mut result = IntegrityResult::default();

    if !config.disk_path.is_dir() {
        result.errors.push(format!(
            "Disk path does not exist: {}",
            config.disk_path.display()
        ));
        return result;
    }
    let Some(ram_path) = config.ram_path().filter(|p| p.is_dir()) else {
        result.errors.push(format!(
            "RAM path does not exist: {}",
            config
                .ram_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string())
        ));
        return result;
    };
    let algorithm = match algorithm.resolve() {
        Ok(algorithm) => algorithm,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    };

    result.disk_hashes = match hash_tree(config, &config.disk_path, patterns, algorithm, &mut result.errors) {
        Some(map) => map,
        None => return result,
    };
    result.ram_hashes = match hash_tree(config, ram_path, patterns, algorithm, &mut result.errors) {
        Some(map) => map,
        None => return result,
    };

    let compared = diff(&result.disk_hashes, &result.ram_hashes);
    result.verified_count = compared.unchanged.len();
    result.missing_in_ram = compared.added;
    result.missing_on_disk = compared.removed;
    result.mismatched_files = compared.modified;

    if result.is_valid() {
        debug!("Integrity verified for {} ({} files)", config.name, result.verified_count);
    } else {
        warn!(
            "Integrity check for {} failed: {} mismatched, {} missing in RAM, {} errors",
            config.name,
            result.mismatched_files.len(),
            result.missing_in_ram.len(),
            result.errors.len()
        );
    }
    result
}

fn hash_tree(
    config: &VolumeConfig,
    root: &Path,
    patterns: &[String],
    algorithm: HashAlgorithm,
    errors: &mut Vec<String>,
) -> Option<FingerprintMap> {
    let files: BTreeMap<String, PathBuf> =
        match scan_tree(root, patterns, |key| config.is_reserved(key)) {
            Ok(files) => files,
            Err(e) => {
                errors.push(format!("Failed to hash {}: {}", root.display(), e));
                return None;
            }
        };

    let mut map = FingerprintMap::new();
    for (key, path) in files {
        match fingerprint_file(&path, algorithm) {
            Ok(digest) => {
                map.insert(key, digest);
            }
            Err(e) => errors.push(format!("{key}: {e}")),
        }
    }
    Some(map)
}

/// Per-file verification detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVerification {
    pub path: String,
    pub exists_on_disk: bool,
    pub exists_in_ram: bool,
    pub disk_digest: Option<String>,
    pub ram_digest: Option<String>,
    pub matches: bool,
    pub error: Option<String>,
}

/// Compare a single file across both tiers
pub fn verify_single_file(config: &VolumeConfig, relative_path: &str) -> FileVerification {
    let mut result = FileVerification {
        path: relative_path.to_string(),
        exists_on_disk: false,
        exists_in_ram: false,
        disk_digest: None,
        ram_digest: None,
        matches: false,
        error: None,
    };

    let key = match normalize_relative(relative_path) {
        Ok(key) => key,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };
    result.path = key.clone();

    let disk_file = config.disk_path.join(&key);
    let ram_file = config.ram_path().map(|root| root.join(&key));
    result.exists_on_disk = disk_file.exists();
    result.exists_in_ram = ram_file.as_deref().is_some_and(Path::exists);

    if result.exists_on_disk {
        match fingerprint_file(&disk_file, HashAlgorithm::Auto) {
            Ok(digest) => result.disk_digest = Some(digest),
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        }
    }
    if let Some(ram_file) = ram_file.filter(|_| result.exists_in_ram) {
        match fingerprint_file(&ram_file, HashAlgorithm::Auto) {
            Ok(digest) => result.ram_digest = Some(digest),
            Err(e) => {
                result.error = Some(e.to_string());
                return result;
            }
        }
    }

    result.matches = matches!(
        (&result.disk_digest, &result.ram_digest),
        (Some(disk), Some(ram)) if disk == ram
    );
    result
}
