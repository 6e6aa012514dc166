// ============================================================================
// File: packages/ramsync/src/manager/lifecycle.rs
// ----------------------------------------------------------------------------
// Volume lifecycle operations:
// - Registration and removal
// - Mount with recovery and initial sync
// - Unmount with persistence and clean-shutdown marker
// - Deterministic shutdown of every mounted volume
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;

use crate::config::VolumeConfig;
use crate::dual_write::DualWriteController;
use crate::error::{StorageError, StorageResult};
use crate::recovery::{RecoveryResult, ShutdownOutcome};
use crate::sync::{SyncEngine, SyncStats};

use super::{ManagedVolume, VolumeManager};

/// What happened while mounting a volume
#[derive(Debug, Clone, Serialize)]
pub struct MountReport {
    pub volume: String,
    pub ram_path: PathBuf,
    /// The volume was already mounted; nothing else ran
    pub already_mounted: bool,
    pub recovery: Option<RecoveryResult>,
    pub initial_sync: Option<SyncStats>,
}

/// What happened while unmounting a volume
#[derive(Debug, Clone, Serialize)]
pub struct UnmountOutcome {
    pub volume: String,
    pub was_mounted: bool,
    /// Persist and marker step, when persistence was requested
    pub shutdown: Option<ShutdownOutcome>,
    /// The memory tier was released
    pub destroyed: bool,
    pub error: Option<String>,
}

impl UnmountOutcome {
    fn new(volume: &str) -> Self {
        Self {
            volume: volume.to_string(),
            was_mounted: false,
            shutdown: None,
            destroyed: false,
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

impl VolumeManager {
    /// Register a volume
    ///
    /// Fills in `ram_path` when unset (under `base_ram_path` if configured,
    /// otherwise the backend's default location) and applies the manager's
    /// marker file name before validating.
    ///
    /// # Arguments
    /// * `config` - Volume configuration
    ///
    /// # Returns
    /// The memory tree root assigned to the volume
    pub fn register(&self, mut config: VolumeConfig) -> StorageResult<PathBuf> {
        config.marker_file = self.config.recovery_marker_file.clone();
        config.validate()?;

        let mut volumes = self.volumes.write();
        if volumes.contains_key(&config.name) {
            return Err(StorageError::DuplicateVolume(config.name));
        }

        let ram_path = match (&config.ram_path, &self.config.base_ram_path) {
            (Some(path), _) => path.clone(),
            (None, Some(base)) => base.join(&config.name),
            (None, None) => self.backend.default_ram_path(&config),
        };
        config.ram_path = Some(ram_path.clone());

        if !config.disk_path.exists() {
            warn!("Disk path does not exist: {}", config.disk_path.display());
        }

        let engine = SyncEngine::with_algorithm(config.clone(), self.config.hash_algorithm)?;
        info!(
            "Registered volume '{}': {} -> {}",
            config.name,
            config.disk_path.display(),
            ram_path.display()
        );
        volumes.insert(config.name, ManagedVolume::new(engine));
        Ok(ram_path)
    }

    /// Remove a volume from the registry
    ///
    /// # Returns
    /// The removed configuration, or `StorageError::VolumeMounted` while the
    /// volume is still mounted
    pub fn unregister(&self, name: &str) -> StorageResult<VolumeConfig> {
        let mut volumes = self.volumes.write();
        let mounted = volumes
            .get(name)
            .map(|volume| volume.mounted)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;
        if mounted {
            warn!("Cannot unregister '{}' - still mounted", name);
            return Err(StorageError::VolumeMounted(name.to_string()));
        }

        let removed = volumes
            .remove(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;
        info!("Unregistered volume '{}'", name);
        Ok(removed.config().clone())
    }

    /// Provision and populate a volume's memory tier
    ///
    /// Runs recovery first (clearing the shutdown marker for this session),
    /// then the initial disk -> memory sync when `sync_on_mount` is set.
    /// Recovery and sync problems are reported in the returned
    /// [`MountReport`]; the volume counts as mounted as long as the backend
    /// could provision it.
    pub fn mount(&self, name: &str) -> StorageResult<MountReport> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;
        let config = volume.config().clone();

        if volume.mounted {
            let ram_path = config.ram_path.clone().unwrap_or_default();
            info!("Volume '{}' already mounted at {}", name, ram_path.display());
            return Ok(MountReport {
                volume: name.to_string(),
                ram_path,
                already_mounted: true,
                recovery: None,
                initial_sync: None,
            });
        }

        info!("Mounting volume '{}' ({} MB)...", name, config.size_mb);
        let ram_path = self.backend.create(&config)?;

        let recovery = self.recovery.recover(&config, false);
        if !recovery.success() {
            warn!(
                "Recovery for '{}' incomplete: {}",
                name,
                recovery.error.as_deref().unwrap_or("some files failed to copy")
            );
        }

        let initial_sync = config.sync_on_mount.then(|| {
            let stats = volume.engine.disk_to_ram(false);
            if stats.success {
                volume.last_sync_to_ram = Some(Utc::now());
                volume.sync_count += 1;
            } else {
                warn!("Initial sync failed for '{}': {}", name, stats.errors.join("; "));
            }
            stats
        });

        if self.config.enable_dual_write {
            volume.dual_write = Some(Arc::new(DualWriteController::new(&config)));
        }
        volume.mounted = true;
        volume.mounted_at = Some(Utc::now());

        info!("Volume '{}' mounted at {}", name, ram_path.display());
        Ok(MountReport {
            volume: name.to_string(),
            ram_path,
            already_mounted: false,
            recovery: Some(recovery),
            initial_sync,
        })
    }

    /// Release a volume's memory tier
    ///
    /// With `persist`, pending dual-write repairs are flushed, the memory
    /// tree is synced back to disk and the clean-shutdown marker is written.
    /// The memory tier is destroyed only if that whole step succeeded.
    pub fn unmount(&self, name: &str, persist: bool) -> StorageResult<UnmountOutcome> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;
        let mut outcome = UnmountOutcome::new(name);

        if !volume.mounted {
            warn!("Volume '{}' is not mounted", name);
            return Ok(outcome);
        }
        outcome.was_mounted = true;

        if persist {
            if let Err(message) = flush_pending_writes(volume) {
                error!("Failed to persist '{}': {}", name, message);
                outcome.error = Some(message);
                return Ok(outcome);
            }

            info!("Persisting volume '{}' to {}", name, volume.config().disk_path.display());
            let shutdown = self.recovery.prepare_shutdown_with(&mut volume.engine);
            if shutdown.sync.as_ref().is_some_and(|stats| stats.success) {
                volume.last_sync_to_disk = Some(Utc::now());
                volume.sync_count += 1;
            }
            if !shutdown.success() {
                let message = shutdown
                    .error
                    .clone()
                    .unwrap_or_else(|| "shutdown preparation failed".to_string());
                error!("Failed to persist '{}': {}", name, message);
                outcome.error = Some(message);
                outcome.shutdown = Some(shutdown);
                return Ok(outcome);
            }
            outcome.shutdown = Some(shutdown);
        }

        match self.backend.destroy(volume.config()) {
            Ok(()) => {
                volume.mounted = false;
                volume.mounted_at = None;
                volume.dual_write = None;
                outcome.destroyed = true;
                info!("Volume '{}' unmounted", name);
            }
            Err(e) => {
                error!("Failed to destroy memory tier of '{}': {}", name, e);
                outcome.error = Some(e.to_string());
            }
        }
        Ok(outcome)
    }

    /// Persist and unmount every mounted volume
    ///
    /// Volumes are handled in name order; one volume failing does not stop
    /// the others.
    pub fn shutdown(&self) -> Vec<UnmountOutcome> {
        info!("Volume manager shutdown initiated");
        let mut names: Vec<String> = self
            .volumes
            .read()
            .iter()
            .filter(|(_, volume)| volume.mounted)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let outcomes = names
            .iter()
            .map(|name| {
                self.unmount(name, true).unwrap_or_else(|e| {
                    error!("Error during shutdown for '{}': {}", name, e);
                    let mut outcome = UnmountOutcome::new(name);
                    outcome.error = Some(e.to_string());
                    outcome
                })
            })
            .collect();
        info!("Volume manager shutdown complete");
        outcomes
    }
}

/// Repair stale memory copies before the memory tree is treated as the source
///
/// A path flagged by the dual-write controller has a newer disk copy than
/// memory copy; persisting memory over it would lose the write.
pub(crate) fn flush_pending_writes(volume: &ManagedVolume) -> Result<(), String> {
    let Some(controller) = &volume.dual_write else {
        return Ok(());
    };
    if controller.needs_resync().is_empty() {
        return Ok(());
    }

    controller.resync_pending();
    let remaining = controller.needs_resync();
    if remaining.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} path(s) still need resync: {}",
            remaining.len(),
            remaining.join(", ")
        ))
    }
}
