// ============================================================================
// File: packages/ramsync/src/recovery/manager.rs
// ----------------------------------------------------------------------------
// Crash detection and automatic repopulation of the memory tree.
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::{Serialize, Serializer};

use crate::config::VolumeConfig;
use crate::error::{StorageError, StorageResult};
use crate::fingerprint::{HashAlgorithm, scan_tree};
use crate::sync::{SyncEngine, SyncStats, copy_file};

use super::integrity::{IntegrityResult, verify_integrity_with};
use super::marker::{
    ShutdownMarker, clear_shutdown_marker, mark_clean_shutdown, read_shutdown_marker,
    was_clean_shutdown,
};

/// Outcome of [`RecoveryManager::recover`]
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryResult {
    pub recovery_needed: bool,
    pub clean_shutdown: bool,
    pub integrity_before: Option<IntegrityResult>,
    pub integrity_after: Option<IntegrityResult>,
    pub files_synced: usize,
    pub files_copied: Vec<String>,
    pub files_failed: Vec<String>,
    #[serde(rename = "duration_ms", serialize_with = "duration_as_millis")]
    pub duration: Duration,
    pub error: Option<String>,
}

impl RecoveryResult {
    fn new() -> Self {
        Self {
            recovery_needed: false,
            clean_shutdown: true,
            integrity_before: None,
            integrity_after: None,
            files_synced: 0,
            files_copied: Vec::new(),
            files_failed: Vec::new(),
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.files_failed.is_empty()
    }
}

/// Outcome of a shutdown preparation
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownOutcome {
    /// Memory -> disk sync, when one ran
    pub sync: Option<SyncStats>,
    pub marker_written: bool,
    pub error: Option<String>,
}

impl ShutdownOutcome {
    pub fn success(&self) -> bool {
        self.marker_written && self.sync.as_ref().is_none_or(|stats| stats.success)
    }
}

/// Read-only recovery diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStatus {
    pub clean_shutdown: bool,
    pub recovery_needed: bool,
    pub shutdown_info: Option<ShutdownMarker>,
    pub disk_path_exists: bool,
    pub ram_path_exists: bool,
    pub integrity: Option<IntegrityResult>,
}

fn duration_as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

/// Coordinates crash detection, integrity checks and recovery copies
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    algorithm: HashAlgorithm,
    verify_integrity: bool,
    verify_after: bool,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self {
            algorithm: HashAlgorithm::Auto,
            verify_integrity: true,
            verify_after: true,
        }
    }

    /// Digest used for integrity checks and shutdown syncs
    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Check integrity after a clean shutdown before trusting the memory tree
    pub fn with_integrity_check(mut self, enabled: bool) -> Self {
        self.verify_integrity = enabled;
        self
    }

    /// Re-verify integrity after a recovery copy
    pub fn with_verify_after(mut self, enabled: bool) -> Self {
        self.verify_after = enabled;
        self
    }

    fn checks_integrity(&self, config: &VolumeConfig) -> bool {
        self.verify_integrity && config.verify_after_sync
    }

    /// Run once per volume activation
    ///
    /// Reads and then unconditionally clears the shutdown marker. Recovery
    /// runs when forced, after an unclean shutdown, or when a clean shutdown
    /// is followed by a failed integrity check of an existing memory tree.
    ///
    /// # Arguments
    /// * `config` - Volume to recover
    /// * `force` - Recover regardless of the marker
    pub fn recover(&self, config: &VolumeConfig, force: bool) -> RecoveryResult {
        let started = Instant::now();
        let mut result = RecoveryResult::new();

        result.clean_shutdown = was_clean_shutdown(config);

        if force {
            result.recovery_needed = true;
        } else if !result.clean_shutdown {
            warn!("Unclean shutdown detected for {}", config.name);
            result.recovery_needed = true;
        } else if self.checks_integrity(config) && config.ram_path().is_some_and(Path::exists) {
            let integrity = verify_integrity_with(config, &config.patterns, self.algorithm);
            result.recovery_needed = integrity.needs_recovery();
            result.integrity_before = Some(integrity);
        }

        // re-arm crash detection for this session
        if let Err(e) = clear_shutdown_marker(config) {
            warn!("Failed to clear shutdown marker for {}: {}", config.name, e);
        }

        if result.recovery_needed {
            info!("Recovering {} from {}", config.name, config.disk_path.display());
            match copy_disk_to_ram(config) {
                Ok((copied, failed)) => {
                    result.files_synced = copied.len();
                    result.files_copied = copied;
                    result.files_failed = failed;
                }
                Err(e) => result.error = Some(e.to_string()),
            }

            if self.verify_after
                && result.error.is_none()
                && config.ram_path().is_some_and(Path::exists)
            {
                result.integrity_after =
                    Some(verify_integrity_with(config, &config.patterns, self.algorithm));
            }
        }

        result.duration = started.elapsed();
        if result.recovery_needed {
            info!(
                "Recovery of {}: {} copied, {} failed in {:.1}ms",
                config.name,
                result.files_synced,
                result.files_failed.len(),
                result.duration.as_secs_f64() * 1000.0
            );
        }
        result
    }

    /// Persist the memory tree with a temporary engine and write the clean marker
    pub fn prepare_shutdown(&self, config: &VolumeConfig) -> ShutdownOutcome {
        match SyncEngine::with_algorithm(config.clone(), self.algorithm) {
            Ok(mut engine) => self.prepare_shutdown_with(&mut engine),
            Err(e) => ShutdownOutcome {
                sync: None,
                marker_written: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// Persist the memory tree with the volume's live engine and write the clean marker
    ///
    /// The sync runs only when `persist_on_unmount` is set and the memory
    /// tree exists. The marker is written only when that sync succeeded.
    pub fn prepare_shutdown_with(&self, engine: &mut SyncEngine) -> ShutdownOutcome {
        let config = engine.config().clone();
        let mut outcome = ShutdownOutcome {
            sync: None,
            marker_written: false,
            error: None,
        };

        if config.persist_on_unmount && config.ram_path().is_some_and(Path::exists) {
            let stats = engine.ram_to_disk();
            let synced = stats.success;
            outcome.sync = Some(stats);
            if !synced {
                outcome.error = Some("Failed to persist memory tree".to_string());
                warn!("Not marking {} clean: persist failed", config.name);
                return outcome;
            }
        }

        match mark_clean_shutdown(&config) {
            Ok(()) => outcome.marker_written = true,
            Err(e) => {
                warn!("Failed to write shutdown marker for {}: {}", config.name, e);
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    /// Report marker and integrity state without changing anything
    pub fn check_status(&self, config: &VolumeConfig) -> RecoveryStatus {
        let shutdown_info = read_shutdown_marker(config);
        let clean_shutdown = shutdown_info.as_ref().is_some_and(|m| m.clean_shutdown);
        let ram_path_exists = config.ram_path().is_some_and(Path::exists);

        let integrity = (ram_path_exists && self.checks_integrity(config))
            .then(|| verify_integrity_with(config, &config.patterns, self.algorithm));
        let recovery_needed =
            !clean_shutdown || integrity.as_ref().is_some_and(IntegrityResult::needs_recovery);

        RecoveryStatus {
            clean_shutdown,
            recovery_needed,
            shutdown_info,
            disk_path_exists: config.disk_path.exists(),
            ram_path_exists,
            integrity,
        }
    }
}

/// Copy every matched file from disk to memory without clearing memory first
fn copy_disk_to_ram(config: &VolumeConfig) -> StorageResult<(Vec<String>, Vec<String>)> {
    let ram_path = config
        .ram_path()
        .ok_or_else(|| StorageError::config("RAM path not configured"))?;
    if !config.disk_path.is_dir() {
        return Err(StorageError::NotFound(config.disk_path.clone()));
    }
    fs::create_dir_all(ram_path)?;

    let files = scan_tree(&config.disk_path, &config.patterns, |key| config.is_reserved(key))?;

    let mut copied = Vec::new();
    let mut failed = Vec::new();
    for (key, src) in files {
        match copy_file(&src, &ram_path.join(&key)) {
            Ok(_) => copied.push(key),
            Err(e) => {
                warn!("Recovery copy failed for {}: {}", key, e);
                failed.push(key);
            }
        }
    }
    Ok((copied, failed))
}
