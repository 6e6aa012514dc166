// ============================================================================
// File: packages/ramsync/src/sync/engine.rs
// ----------------------------------------------------------------------------
// Bidirectional reconciliation between the persistent and memory trees.
//
// disk_to_ram honours the volume's strategy (full / incremental / pattern).
// ram_to_disk is always a fingerprint diff with memory as the source.
// Per-file failures are counted and reported; they never abort a run.
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::config::{SyncStrategy, VolumeConfig};
use crate::diff::{DiffResult, diff};
use crate::error::StorageResult;
use crate::fingerprint::{FingerprintMap, HashAlgorithm, fingerprint_files, scan_tree};
use crate::path_utils::relative_key;

use super::cache::FingerprintCache;
use super::stats::{SyncDirection, SyncStats, SyncStatus};

/// Fingerprints of one tree plus the moment its scan started
struct Snapshot {
    files: BTreeMap<String, PathBuf>,
    fingerprints: FingerprintMap,
    scanned_at: DateTime<Utc>,
    from_cache: bool,
}

/// Copy one file, creating parent directories and keeping the source mtime
///
/// A failure to carry over the mtime is logged and ignored.
pub fn copy_file(src: &Path, dst: &Path) -> io::Result<u64> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(src, dst)?;

    let preserved = fs::metadata(src)
        .and_then(|m| m.modified())
        .and_then(|mtime| fs::File::options().write(true).open(dst)?.set_modified(mtime));
    if let Err(e) = preserved {
        debug!("Could not preserve mtime on {}: {}", dst.display(), e);
    }

    Ok(bytes)
}

/// Sync engine for a single volume
#[derive(Debug)]
pub struct SyncEngine {
    config: VolumeConfig,
    algorithm: HashAlgorithm,
    cache: FingerprintCache,
}

impl SyncEngine {
    /// Create an engine using the fastest available digest
    pub fn new(config: VolumeConfig) -> Self {
        let algorithm = HashAlgorithm::Auto
            .resolve()
            .unwrap_or(HashAlgorithm::Md5);
        let cache = FingerprintCache::load(config.disk_path.join(&config.hash_cache_file));
        Self {
            config,
            algorithm,
            cache,
        }
    }

    /// Create an engine with an explicit digest algorithm
    ///
    /// # Returns
    /// `StorageError::UnsupportedAlgorithm` when the algorithm is not
    /// compiled into this build
    pub fn with_algorithm(config: VolumeConfig, algorithm: HashAlgorithm) -> StorageResult<Self> {
        let mut engine = Self::new(config);
        engine.algorithm = algorithm.resolve()?;
        Ok(engine)
    }

    /// Keep the fingerprint cache somewhere other than `disk_path`
    pub fn with_cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache = FingerprintCache::load(path.into());
        self
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn cache_path(&self) -> &Path {
        self.cache.path()
    }

    /// Fingerprints from the last successful sync, if any
    pub fn cached_fingerprints(&self) -> Option<&FingerprintMap> {
        self.cache.fingerprints()
    }

    fn scan(&self, root: &Path) -> StorageResult<BTreeMap<String, PathBuf>> {
        let cache_key = relative_key(root, self.cache.path());
        scan_tree(root, &self.config.patterns, |key| {
            self.config.is_reserved(key) || cache_key.as_deref() == Some(key)
        })
    }

    fn snapshot(&self, root: &Path) -> StorageResult<Snapshot> {
        let scanned_at = Utc::now();
        let files = self.scan(root)?;
        let fingerprints = fingerprint_files(&files, self.algorithm);
        Ok(Snapshot {
            files,
            fingerprints,
            scanned_at,
            from_cache: false,
        })
    }

    /// Snapshot the persistent tree, reusing cached digests when they are provably current
    fn disk_snapshot(&self) -> StorageResult<Snapshot> {
        let scanned_at = Utc::now();
        let files = self.scan(&self.config.disk_path)?;
        if let Some(cached) = self.cache.reusable_for(&files, self.algorithm) {
            debug!("Reusing {} cached fingerprints", cached.len());
            return Ok(Snapshot {
                fingerprints: cached.clone(),
                files,
                scanned_at,
                from_cache: true,
            });
        }
        let fingerprints = fingerprint_files(&files, self.algorithm);
        Ok(Snapshot {
            files,
            fingerprints,
            scanned_at,
            from_cache: false,
        })
    }

    /// Populate the memory tree from the persistent tree
    ///
    /// # Arguments
    /// * `force_full` - Ignore the configured strategy and do a full sync
    ///
    /// # Returns
    /// Statistics for the run; `success` is false on any precondition or
    /// per-file failure
    pub fn disk_to_ram(&mut self, force_full: bool) -> SyncStats {
        let started = Instant::now();
        let strategy = if force_full {
            SyncStrategy::Full
        } else {
            self.config.sync_strategy
        };
        let mut stats = SyncStats::new(SyncDirection::DiskToRam, strategy);

        let Some(ram_path) = self.config.ram_path.clone() else {
            stats.abort("RAM path not configured");
            return stats.finish(started);
        };
        let disk_path = self.config.disk_path.clone();
        if !disk_path.is_dir() {
            stats.abort(format!("Disk path does not exist: {}", disk_path.display()));
            return stats.finish(started);
        }

        info!(
            "Syncing {} -> {} ({})",
            disk_path.display(),
            ram_path.display(),
            strategy
        );

        let snapshot = match strategy {
            SyncStrategy::Full | SyncStrategy::Pattern => {
                self.full_sync(&disk_path, &ram_path, &mut stats);
                None
            }
            SyncStrategy::Incremental => self.incremental_sync(&ram_path, &mut stats),
        };

        if stats.files_failed > 0 {
            stats.success = false;
        }
        if !stats.success {
            return stats.finish(started);
        }

        let fresh = self.verify(&disk_path, &ram_path, &mut stats);

        if stats.success {
            match fresh.or(snapshot) {
                Some(snap) if snap.from_cache => {}
                Some(snap) => self.store_cache(snap.fingerprints, snap.scanned_at),
                None => match self.snapshot(&disk_path) {
                    Ok(snap) => self.store_cache(snap.fingerprints, snap.scanned_at),
                    Err(e) => warn!("Failed to fingerprint {} for cache: {}", disk_path.display(), e),
                },
            }
        }

        stats.finish(started)
    }

    /// Clear the memory tree, then copy every matched file into it
    fn full_sync(&self, disk_path: &Path, ram_path: &Path, stats: &mut SyncStats) {
        if ram_path.exists() {
            let entries = match fs::read_dir(ram_path) {
                Ok(entries) => entries,
                Err(e) => {
                    stats.abort(format!("Failed to read {}: {}", ram_path.display(), e));
                    return;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        stats.record_failure(format!("Failed to list {}: {}", ram_path.display(), e));
                        continue;
                    }
                };
                let path = entry.path();
                // symlinks are unlinked, never followed
                let removed = match entry.file_type() {
                    Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
                    Ok(_) => fs::remove_file(&path),
                    Err(e) => Err(e),
                };
                match removed {
                    Ok(()) => stats.files_deleted += 1,
                    Err(e) => {
                        stats.record_failure(format!("Failed to delete {}: {}", path.display(), e))
                    }
                }
            }
        } else if let Err(e) = fs::create_dir_all(ram_path) {
            stats.abort(format!("Failed to create {}: {}", ram_path.display(), e));
            return;
        }

        let files = match self.scan(disk_path) {
            Ok(files) => files,
            Err(e) => {
                stats.abort(format!("Failed to scan {}: {}", disk_path.display(), e));
                return;
            }
        };

        for (key, src) in &files {
            match copy_file(src, &ram_path.join(key)) {
                Ok(bytes) => stats.record_copy(bytes),
                Err(e) => stats.record_failure(format!("Failed to copy {key}: {e}")),
            }
        }
    }

    /// Bring the memory tree in line with the persistent tree using fingerprints
    fn incremental_sync(&self, ram_path: &Path, stats: &mut SyncStats) -> Option<Snapshot> {
        if let Err(e) = fs::create_dir_all(ram_path) {
            stats.abort(format!("Failed to create {}: {}", ram_path.display(), e));
            return None;
        }

        let source = match self.disk_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.abort(format!("Failed to scan {}: {}", self.config.disk_path.display(), e));
                return None;
            }
        };
        stats.used_cached_fingerprints = source.from_cache;

        let target = match self.snapshot(ram_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.abort(format!("Failed to scan {}: {}", ram_path.display(), e));
                return None;
            }
        };

        let plan = diff(&source.fingerprints, &target.fingerprints);
        apply_plan(&plan, &source.files, ram_path, stats);

        Some(source)
    }

    /// Persist the memory tree back to the persistent tree
    ///
    /// Always a fingerprint diff with memory as the source: added and
    /// modified files are copied, files missing from memory are deleted.
    pub fn ram_to_disk(&mut self) -> SyncStats {
        let started = Instant::now();
        let mut stats = SyncStats::new(SyncDirection::RamToDisk, SyncStrategy::Full);

        let Some(ram_path) = self.config.ram_path.clone() else {
            stats.abort("RAM path not configured");
            return stats.finish(started);
        };
        if !ram_path.is_dir() {
            stats.abort(format!("RAM path does not exist: {}", ram_path.display()));
            return stats.finish(started);
        }
        let disk_path = self.config.disk_path.clone();
        if let Err(e) = fs::create_dir_all(&disk_path) {
            stats.abort(format!("Failed to create {}: {}", disk_path.display(), e));
            return stats.finish(started);
        }

        info!("Syncing {} -> {}", ram_path.display(), disk_path.display());

        // the persistent tree is about to change under the cache
        self.cache.invalidate();

        let source = match self.snapshot(&ram_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.abort(format!("Failed to scan {}: {}", ram_path.display(), e));
                return stats.finish(started);
            }
        };
        let target = match self.snapshot(&disk_path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stats.abort(format!("Failed to scan {}: {}", disk_path.display(), e));
                return stats.finish(started);
            }
        };

        let plan = diff(&source.fingerprints, &target.fingerprints);
        apply_plan(&plan, &source.files, &disk_path, &mut stats);

        if stats.files_failed > 0 {
            stats.success = false;
            return stats.finish(started);
        }

        let fresh = self.verify(&ram_path, &disk_path, &mut stats);
        if stats.success {
            let snap = fresh.unwrap_or(source);
            self.store_cache(snap.fingerprints, snap.scanned_at);
        }

        stats.finish(started)
    }

    /// Re-fingerprint both trees and compare
    ///
    /// Returns the fresh snapshot of the persistent tree when verification ran.
    fn verify(&self, source_root: &Path, target_root: &Path, stats: &mut SyncStats) -> Option<Snapshot> {
        if !self.config.verify_after_sync {
            return None;
        }

        let (source, target) = match (self.snapshot(source_root), self.snapshot(target_root)) {
            (Ok(source), Ok(target)) => (source, target),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Verification could not scan trees: {}", e);
                stats.errors.push(format!("Verification failed: {e}"));
                stats.verified = Some(false);
                if self.config.strict_verify {
                    stats.success = false;
                }
                return None;
            }
        };

        let result = diff(&source.fingerprints, &target.fingerprints);
        if result.is_identical() {
            debug!("Verified {} files", result.unchanged.len());
            stats.verified = Some(true);
        } else {
            warn!(
                "Verification mismatch: {} missing, {} extra, {} modified",
                result.added.len(),
                result.removed.len(),
                result.modified.len()
            );
            stats.errors.push(format!(
                "Verification found {} mismatched files",
                result.added.len() + result.removed.len() + result.modified.len()
            ));
            stats.verified = Some(false);
            if self.config.strict_verify {
                stats.success = false;
            }
        }

        if source_root == self.config.disk_path {
            Some(source)
        } else {
            Some(target)
        }
    }

    fn store_cache(&mut self, fingerprints: FingerprintMap, scanned_at: DateTime<Utc>) {
        if let Err(e) = self.cache.store(fingerprints, self.algorithm, scanned_at) {
            warn!("Failed to save hash cache: {}", e);
        }
    }

    /// Compare the two trees without changing either
    pub fn status(&self) -> SyncStatus {
        let disk_path = self.config.disk_path.clone();
        let ram_path = self.config.ram_path.clone();
        let disk_exists = disk_path.is_dir();
        let ram_exists = ram_path.as_deref().is_some_and(Path::is_dir);

        let mut status = SyncStatus {
            disk_path,
            ram_path,
            disk_exists,
            ram_exists,
            in_sync: false,
            differences: None,
        };
        if !(disk_exists && ram_exists) {
            return status;
        }
        let Some(ram_root) = status.ram_path.as_deref() else {
            return status;
        };

        match (self.snapshot(&status.disk_path), self.snapshot(ram_root)) {
            (Ok(disk), Ok(ram)) => {
                let result = diff(&disk.fingerprints, &ram.fingerprints);
                status.in_sync = result.is_identical();
                status.differences = Some(result.into());
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to compute sync status: {}", e),
        }
        status
    }
}

/// Copy `added ∪ modified` into `target_root` and delete `removed` from it
fn apply_plan(
    plan: &DiffResult,
    source_files: &BTreeMap<String, PathBuf>,
    target_root: &Path,
    stats: &mut SyncStats,
) {
    for key in plan.to_copy() {
        let Some(src) = source_files.get(key) else {
            stats.record_failure(format!("Failed to copy {key}: source vanished"));
            continue;
        };
        match copy_file(src, &target_root.join(key)) {
            Ok(bytes) => stats.record_copy(bytes),
            Err(e) => stats.record_failure(format!("Failed to copy {key}: {e}")),
        }
    }

    for key in &plan.removed {
        match fs::remove_file(target_root.join(key)) {
            Ok(()) => stats.files_deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => stats.files_deleted += 1,
            Err(e) => stats.record_failure(format!("Failed to delete {key}: {e}")),
        }
    }

    stats.files_unchanged = plan.unchanged.len();
}
