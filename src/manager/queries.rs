// ============================================================================
// File: packages/ramsync/src/manager/queries.rs
// ----------------------------------------------------------------------------
// On-demand syncs, controller access and status reporting.
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::Serialize;

use crate::backend::UsageStats;
use crate::config::{SyncStrategy, VolumeConfig};
use crate::dual_write::DualWriteController;
use crate::error::{StorageError, StorageResult};
use crate::sync::{SyncDirection, SyncStats};

use super::VolumeManager;
use super::lifecycle::flush_pending_writes;

/// Serializable snapshot of the whole manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub backend: String,
    pub backend_available: bool,
    pub backend_message: String,
    pub volumes: BTreeMap<String, VolumeStatus>,
}

/// Serializable snapshot of one volume
#[derive(Debug, Clone, Serialize)]
pub struct VolumeStatus {
    pub mounted: bool,
    pub disk_path: PathBuf,
    pub ram_path: Option<PathBuf>,
    pub size_mb: u64,
    pub sync_strategy: SyncStrategy,
    pub mounted_at: Option<DateTime<Utc>>,
    pub last_sync_to_ram: Option<DateTime<Utc>>,
    pub last_sync_to_disk: Option<DateTime<Utc>>,
    pub sync_count: u64,
    pub dual_write_enabled: bool,
    /// Paths whose memory copy is known to be stale
    pub pending_resync: Vec<String>,
    /// Only reported while mounted
    pub usage: Option<UsageStats>,
}

impl VolumeManager {
    /// Pull the persistent tree into a volume's memory tree
    ///
    /// A successful pull also refreshes every path the dual-write controller
    /// had flagged, so the resync set is cleared.
    ///
    /// # Arguments
    /// * `name` - Registered volume
    /// * `force_full` - Ignore the configured strategy and do a full sync
    pub fn sync_to_ram(&self, name: &str, force_full: bool) -> StorageResult<SyncStats> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;

        // writers stay blocked until the flags are cleared, so a write
        // failing mid-sync keeps its flag
        let engine = &mut volume.engine;
        let stats = match volume.dual_write.as_deref() {
            Some(controller) => controller.exclusive(|| {
                let stats = engine.disk_to_ram(force_full);
                if stats.success {
                    controller.clear_needs_resync();
                }
                stats
            }),
            None => engine.disk_to_ram(force_full),
        };

        if stats.success {
            volume.last_sync_to_ram = Some(Utc::now());
            volume.sync_count += 1;
        } else {
            warn!("Sync to RAM failed for '{}': {}", name, stats.errors.join("; "));
        }
        Ok(stats)
    }

    /// Push a volume's memory tree back to the persistent tree
    ///
    /// Stale memory copies are repaired first; if any remain the push is
    /// refused rather than letting old memory content overwrite newer disk
    /// content.
    pub fn sync_to_disk(&self, name: &str) -> StorageResult<SyncStats> {
        let mut volumes = self.volumes.write();
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;

        if let Err(message) = flush_pending_writes(volume) {
            error!("Sync to disk refused for '{}': {}", name, message);
            let mut stats = SyncStats::new(SyncDirection::RamToDisk, SyncStrategy::Full);
            stats.abort(message);
            return Ok(stats);
        }

        let stats = volume.engine.ram_to_disk();
        if stats.success {
            volume.last_sync_to_disk = Some(Utc::now());
            volume.sync_count += 1;
        } else {
            error!("Sync to disk failed for '{}': {}", name, stats.errors.join("; "));
        }
        Ok(stats)
    }

    /// Dual-write controller of a mounted volume
    ///
    /// # Returns
    /// `None` while unmounted or when dual-write is disabled
    pub fn dual_write(&self, name: &str) -> StorageResult<Option<Arc<DualWriteController>>> {
        let volumes = self.volumes.read();
        let volume = volumes
            .get(name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))?;
        Ok(volume.dual_write.clone())
    }

    pub fn is_mounted(&self, name: &str) -> StorageResult<bool> {
        self.volumes
            .read()
            .get(name)
            .map(|volume| volume.mounted)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))
    }

    /// Effective configuration of a registered volume, `ram_path` filled in
    pub fn volume_config(&self, name: &str) -> StorageResult<VolumeConfig> {
        self.volumes
            .read()
            .get(name)
            .map(|volume| volume.config().clone())
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))
    }

    /// Registered volume names, sorted
    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.volumes.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn status(&self) -> ManagerStatus {
        let volumes = self.volumes.read();
        let volumes = volumes
            .iter()
            .map(|(name, volume)| {
                let config = volume.config();
                let status = VolumeStatus {
                    mounted: volume.mounted,
                    disk_path: config.disk_path.clone(),
                    ram_path: config.ram_path.clone(),
                    size_mb: config.size_mb,
                    sync_strategy: config.sync_strategy,
                    mounted_at: volume.mounted_at,
                    last_sync_to_ram: volume.last_sync_to_ram,
                    last_sync_to_disk: volume.last_sync_to_disk,
                    sync_count: volume.sync_count,
                    dual_write_enabled: volume.dual_write.is_some(),
                    pending_resync: volume
                        .dual_write
                        .as_ref()
                        .map(|controller| controller.needs_resync())
                        .unwrap_or_default(),
                    usage: if volume.mounted {
                        self.backend.get_usage(config)
                    } else {
                        None
                    },
                };
                (name.clone(), status)
            })
            .collect();

        ManagerStatus {
            backend: self.backend.name().to_string(),
            backend_available: self.backend.is_available(),
            backend_message: self.backend.availability_message(),
            volumes,
        }
    }
}
