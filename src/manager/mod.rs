// ============================================================================
// File: packages/ramsync/src/manager/mod.rs
// ----------------------------------------------------------------------------
// Owned registry of managed volumes.
//
// Ties the pieces together per volume:
// - Registration with default memory-tree placement
// - Mount: provision, recover, initial sync, dual-write controller
// - Unmount: persist, mark clean, release the memory tier
// - Explicit shutdown of every mounted volume
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;

use crate::backend::{VolumeBackend, create_backend};
use crate::config::{ManagerConfig, VolumeConfig};
use crate::dual_write::DualWriteController;
use crate::error::StorageResult;
use crate::recovery::RecoveryManager;
use crate::sync::SyncEngine;

mod lifecycle;
mod queries;


pub use lifecycle::{MountReport, UnmountOutcome};
pub use queries::{ManagerStatus, VolumeStatus};

/// Registry and lifecycle driver for memory-backed volumes
///
/// Each registered volume owns exactly one [`SyncEngine`], so the
/// fingerprint cache is shared by every sync that runs through the
/// manager. Nothing is global; drop order is the caller's business, and
/// [`VolumeManager::shutdown`] is the deterministic way to persist every
/// mounted volume before exit.
#[derive(Debug)]
pub struct VolumeManager {
    pub(crate) config: ManagerConfig,
    pub(crate) backend: Box<dyn VolumeBackend>,
    pub(crate) recovery: RecoveryManager,
    pub(crate) volumes: RwLock<HashMap<String, ManagedVolume>>,
}

/// Per-volume state held by the manager
#[derive(Debug)]
pub(crate) struct ManagedVolume {
    pub(crate) engine: SyncEngine,
    pub(crate) dual_write: Option<Arc<DualWriteController>>,
    pub(crate) mounted: bool,
    pub(crate) mounted_at: Option<DateTime<Utc>>,
    pub(crate) last_sync_to_ram: Option<DateTime<Utc>>,
    pub(crate) last_sync_to_disk: Option<DateTime<Utc>>,
    pub(crate) sync_count: u64,
}

impl ManagedVolume {
    fn new(engine: SyncEngine) -> Self {
        Self {
            engine,
            dual_write: None,
            mounted: false,
            mounted_at: None,
            last_sync_to_ram: None,
            last_sync_to_disk: None,
            sync_count: 0,
        }
    }

    pub(crate) fn config(&self) -> &VolumeConfig {
        self.engine.config()
    }
}

impl VolumeManager {
    /// Create a manager with the backend selected by `config.backend`
    ///
    /// # Returns
    /// The manager, or `StorageError::BackendUnavailable` when an explicitly
    /// requested backend cannot run here
    pub fn new(config: ManagerConfig) -> StorageResult<Self> {
        let backend = create_backend(config.backend)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Create a manager around an already constructed backend
    pub fn with_backend(config: ManagerConfig, backend: Box<dyn VolumeBackend>) -> Self {
        info!("Volume manager using {} backend", backend.name());
        if !backend.is_available() {
            warn!("Backend not fully available: {}", backend.availability_message());
        }
        let recovery = RecoveryManager::new().with_algorithm(config.hash_algorithm);
        Self {
            config,
            backend,
            recovery,
            volumes: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn VolumeBackend {
        self.backend.as_ref()
    }
}
