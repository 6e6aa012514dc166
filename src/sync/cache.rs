// ============================================================================
// File: packages/ramsync/src/sync/cache.rs
// ----------------------------------------------------------------------------
// Persisted fingerprint cache for the persistent tree.
//
// The cache lives on the persistent tier so it survives memory-tier loss.
// It memoizes digests; it never decides on its own that a file is unchanged.
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::fingerprint::{FingerprintMap, HashAlgorithm};

const CACHE_VERSION: u32 = 1;

/// Files touched within this window of the scan may have changed mid-hash
const RACY_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    algorithm: HashAlgorithm,
    scanned_at: DateTime<Utc>,
    fingerprints: FingerprintMap,
}

/// Fingerprint cache document stored next to the persistent tree
#[derive(Debug)]
pub struct FingerprintCache {
    path: PathBuf,
    document: Option<CacheDocument>,
}

impl FingerprintCache {
    /// Load the cache from `path`
    ///
    /// A missing file yields an empty cache; an unreadable or malformed one
    /// is logged and also yields an empty cache.
    pub fn load(path: PathBuf) -> Self {
        let document = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<CacheDocument>(&raw) {
                Ok(doc) if doc.version == CACHE_VERSION => {
                    debug!("Loaded hash cache with {} entries", doc.fingerprints.len());
                    Some(doc)
                }
                Ok(doc) => {
                    warn!("Ignoring hash cache with unknown version {}", doc.version);
                    None
                }
                Err(e) => {
                    warn!("Failed to parse hash cache {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to load hash cache {}: {}", path.display(), e);
                None
            }
        };

        Self { path, document }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached fingerprints, if a cache is loaded
    pub fn fingerprints(&self) -> Option<&FingerprintMap> {
        self.document.as_ref().map(|doc| &doc.fingerprints)
    }

    /// Return the cached map when it provably describes `files`
    ///
    /// Valid only if the algorithm matches, the cached keys equal the scanned
    /// keys, and every file was last modified before the cached scan started
    /// (minus `RACY_MARGIN`). Anything else means "re-hash".
    pub fn reusable_for(
        &self,
        files: &BTreeMap<String, PathBuf>,
        algorithm: HashAlgorithm,
    ) -> Option<&FingerprintMap> {
        let doc = self.document.as_ref()?;
        if doc.algorithm != algorithm || doc.fingerprints.is_empty() {
            return None;
        }
        if doc.fingerprints.len() != files.len() || !doc.fingerprints.keys().eq(files.keys()) {
            return None;
        }

        let margin = chrono::Duration::from_std(RACY_MARGIN).ok()?;
        let horizon = doc.scanned_at - margin;
        for path in files.values() {
            let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
            if DateTime::<Utc>::from(modified) >= horizon {
                return None;
            }
        }
        Some(&doc.fingerprints)
    }

    /// Replace the cache and write it atomically
    ///
    /// # Arguments
    /// * `fingerprints` - Fresh source-side map
    /// * `algorithm` - Algorithm that produced the digests
    /// * `scanned_at` - When the scan that produced the map started
    pub fn store(
        &mut self,
        fingerprints: FingerprintMap,
        algorithm: HashAlgorithm,
        scanned_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let document = CacheDocument {
            version: CACHE_VERSION,
            algorithm,
            scanned_at,
            fingerprints,
        };

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.flush()?;
        }
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;

        debug!("Saved hash cache with {} entries", document.fingerprints.len());
        self.document = Some(document);
        Ok(())
    }

    /// Drop the cache before the engine itself rewrites the persistent tree
    pub fn invalidate(&mut self) {
        self.document = None;
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Invalidated hash cache {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove hash cache {}: {}", self.path.display(), e),
        }
    }
}
