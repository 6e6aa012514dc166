use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::info;
use serde::{Serialize, Serializer};

use crate::config::SyncStrategy;
use crate::diff::DiffResult;

/// Which way a sync moved data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    DiskToRam,
    RamToDisk,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::DiskToRam => f.write_str("disk_to_ram"),
            SyncDirection::RamToDisk => f.write_str("ram_to_disk"),
        }
    }
}

/// Statistics from one sync call
///
/// `success` is false iff a precondition failed or at least one per-file
/// operation failed. A verification mismatch only adds to `errors` unless
/// the volume runs in strict-verify mode.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub success: bool,
    pub direction: SyncDirection,
    pub strategy: SyncStrategy,

    pub files_copied: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,

    pub bytes_copied: u64,

    /// Wall clock for the whole call, verification included
    #[serde(rename = "duration_ms", serialize_with = "duration_as_millis")]
    pub duration: Duration,

    /// Per-file failures and verification warnings, in the order they happened
    pub errors: Vec<String>,

    /// `Some(passed)` when post-sync verification ran
    pub verified: Option<bool>,

    /// Source digests came from the persisted cache instead of a fresh hash
    pub used_cached_fingerprints: bool,
}

impl SyncStats {
    pub(crate) fn new(direction: SyncDirection, strategy: SyncStrategy) -> Self {
        Self {
            success: true,
            direction,
            strategy,
            files_copied: 0,
            files_deleted: 0,
            files_unchanged: 0,
            files_failed: 0,
            bytes_copied: 0,
            duration: Duration::ZERO,
            errors: Vec::new(),
            verified: None,
            used_cached_fingerprints: false,
        }
    }

    pub(crate) fn record_copy(&mut self, bytes: u64) {
        self.files_copied += 1;
        self.bytes_copied += bytes;
    }

    pub(crate) fn record_failure<S: Into<String>>(&mut self, message: S) {
        self.files_failed += 1;
        self.errors.push(message.into());
    }

    /// Precondition failure: nothing was attempted
    pub(crate) fn abort<S: Into<String>>(&mut self, message: S) {
        self.success = false;
        self.errors.push(message.into());
    }

    pub(crate) fn finish(mut self, started: Instant) -> Self {
        self.duration = started.elapsed();
        info!(
            "Sync {} ({}): {} copied, {} deleted, {} unchanged, {} failed in {:.1}ms",
            self.direction,
            self.strategy,
            self.files_copied,
            self.files_deleted,
            self.files_unchanged,
            self.files_failed,
            self.duration_ms()
        );
        self
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

fn duration_as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Categorized differences between the two tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierDifferences {
    pub disk_only: Vec<String>,
    pub ram_only: Vec<String>,
    pub modified: Vec<String>,
    pub identical: usize,
}

impl From<DiffResult> for TierDifferences {
    fn from(diff: DiffResult) -> Self {
        Self {
            disk_only: diff.added,
            ram_only: diff.removed,
            modified: diff.modified,
            identical: diff.unchanged.len(),
        }
    }
}

/// Point-in-time view of how far the tiers have drifted
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub disk_path: PathBuf,
    pub ram_path: Option<PathBuf>,
    pub disk_exists: bool,
    pub ram_exists: bool,
    pub in_sync: bool,
    pub differences: Option<TierDifferences>,
}
