// ============================================================================
// File: packages/ramsync/src/fingerprint/mod.rs
// ----------------------------------------------------------------------------
// Content fingerprinting for sync decisions.
//
// Provides:
// - Streaming per-file digests (64 KiB chunks, bounded memory)
// - Selectable algorithms with a fast non-cryptographic default
// - Pattern-filtered directory fingerprint maps
// ============================================================================

mod scan;


use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::error::{StorageError, StorageResult};

pub use scan::scan_tree;

/// Read buffer size used while hashing
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Relative path (forward slashes) -> hex digest
///
/// Always rebuilt wholesale from a scan; never patched in place.
pub type FingerprintMap = BTreeMap<String, String>;

/// Digest algorithm used for fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Fastest available: xxh64 when compiled in, md5 otherwise
    #[default]
    Auto,
    /// 64-bit xxHash (requires the `fast-hash` feature)
    #[serde(alias = "xxhash")]
    Xxh64,
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Resolve `Auto` to a concrete algorithm available in this build
    pub fn resolve(self) -> StorageResult<HashAlgorithm> {
        match self {
            HashAlgorithm::Auto => Ok(if cfg!(feature = "fast-hash") {
                HashAlgorithm::Xxh64
            } else {
                HashAlgorithm::Md5
            }),
            HashAlgorithm::Xxh64 if !cfg!(feature = "fast-hash") => Err(
                StorageError::UnsupportedAlgorithm("xxh64 (built without fast-hash)".into()),
            ),
            other => Ok(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Auto => "auto",
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(HashAlgorithm::Auto),
            "xxh64" | "xxhash" => Ok(HashAlgorithm::Xxh64),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(StorageError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

enum StreamHasher {
    #[cfg(feature = "fast-hash")]
    Xxh64(xxhash_rust::xxh64::Xxh64),
    Md5(md5::Context),
    Sha256(sha2::Sha256),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> StorageResult<Self> {
        match algorithm.resolve()? {
            #[cfg(feature = "fast-hash")]
            HashAlgorithm::Xxh64 => Ok(StreamHasher::Xxh64(xxhash_rust::xxh64::Xxh64::new(0))),
            HashAlgorithm::Md5 => Ok(StreamHasher::Md5(md5::Context::new())),
            HashAlgorithm::Sha256 => Ok(StreamHasher::Sha256(sha2::Sha256::new())),
            other => Err(StorageError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            #[cfg(feature = "fast-hash")]
            StreamHasher::Xxh64(state) => state.update(data),
            StreamHasher::Md5(context) => context.consume(data),
            StreamHasher::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            #[cfg(feature = "fast-hash")]
            StreamHasher::Xxh64(state) => format!("{:016x}", state.digest()),
            StreamHasher::Md5(context) => format!("{:x}", context.compute()),
            StreamHasher::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Compute the digest of one file
///
/// Reads the file in `BUFFER_SIZE` chunks, so memory use does not depend on
/// file size.
///
/// # Arguments
/// * `path` - File to fingerprint (symlinks are followed)
/// * `algorithm` - Digest algorithm
///
/// # Returns
/// Lowercase hex digest, `StorageError::NotFound` for a missing path,
/// `StorageError::NotAFile` for directories and other non-regular files
pub fn fingerprint_file(path: &Path, algorithm: HashAlgorithm) -> StorageResult<String> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(path.to_path_buf()),
        _ => StorageError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(path.to_path_buf()));
    }

    let mut hasher = StreamHasher::new(algorithm)?;
    let mut file = File::open(path)?;
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(StorageError::Io(e)),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish())
}

/// Fingerprint every file under `root` that matches one of `patterns`
///
/// Files that cannot be read are left out of the map instead of failing the
/// whole scan.
///
/// # Arguments
/// * `root` - Tree root; keys are relative to it
/// * `patterns` - Glob patterns (see [`scan_tree`] for matching rules)
/// * `algorithm` - Digest algorithm
pub fn fingerprint_directory(
    root: &Path,
    patterns: &[String],
    algorithm: HashAlgorithm,
) -> StorageResult<FingerprintMap> {
    let algorithm = algorithm.resolve()?;
    let files = scan_tree(root, patterns, |_| false)?;
    Ok(fingerprint_files(&files, algorithm))
}

/// Fingerprint an already-scanned file set
///
/// Unreadable files are skipped and logged at debug level.
pub fn fingerprint_files(
    files: &BTreeMap<String, PathBuf>,
    algorithm: HashAlgorithm,
) -> FingerprintMap {
    let mut result = FingerprintMap::new();
    for (key, path) in files {
        match fingerprint_file(path, algorithm) {
            Ok(digest) => {
                result.insert(key.clone(), digest);
            }
            Err(e) => debug!("Skipping unreadable file {}: {}", path.display(), e),
        }
    }
    result
}
