// ============================================================================
// File: packages/ramsync/src/backend/mod.rs
// ----------------------------------------------------------------------------
// Volume backend capability interface.
//
// A backend knows how to provision the memory tier for a volume. The sync,
// dual-write and recovery layers never look past this trait; the backend is
// chosen once at startup by `create_backend`.
// ============================================================================

mod directory;
#[cfg(target_os = "linux")]
mod tmpfs;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{BackendKind, VolumeConfig};
use crate::error::{StorageError, StorageResult};

pub use directory::DirectoryBackend;
#[cfg(target_os = "linux")]
pub use tmpfs::{MountDetector, PrivilegeManager, TmpfsBackend};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Memory-tier usage statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// 0-100, two decimals
    pub percent_used: f64,
}

impl UsageStats {
    /// Build from capacity and usage; free space saturates at zero
    pub fn new(total_bytes: u64, used_bytes: u64) -> Self {
        let percent = if total_bytes > 0 {
            used_bytes as f64 / total_bytes as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_bytes,
            used_bytes,
            free_bytes: total_bytes.saturating_sub(used_bytes),
            percent_used: (percent * 100.0).round() / 100.0,
        }
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }

    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_MB
    }

    pub fn free_mb(&self) -> f64 {
        self.free_bytes as f64 / BYTES_PER_MB
    }
}

/// Platform capability for provisioning memory-backed volumes
pub trait VolumeBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// Whether this backend can run on the current system
    fn is_available(&self) -> bool;

    /// Human-readable availability report
    fn availability_message(&self) -> String;

    /// Where a volume without an explicit `ram_path` is placed
    fn default_ram_path(&self, config: &VolumeConfig) -> PathBuf;

    /// Provision the memory tier; idempotent
    ///
    /// # Returns
    /// The memory tree root
    fn create(&self, config: &VolumeConfig) -> StorageResult<PathBuf>;

    /// Whether the memory tier is currently provisioned
    fn exists(&self, config: &VolumeConfig) -> bool;

    /// Release the memory tier and everything in it
    fn destroy(&self, config: &VolumeConfig) -> StorageResult<()>;

    /// Usage statistics, `None` when the volume does not exist
    fn get_usage(&self, config: &VolumeConfig) -> Option<UsageStats>;
}

/// Memory tree root for `config` under `backend`
pub(crate) fn resolve_ram_path(backend: &dyn VolumeBackend, config: &VolumeConfig) -> PathBuf {
    config
        .ram_path
        .clone()
        .unwrap_or_else(|| backend.default_ram_path(config))
}

/// Select the volume backend
///
/// `Auto` picks tmpfs on Linux when running as root and a plain directory
/// everywhere else.
///
/// # Returns
/// Boxed backend or `StorageError::BackendUnavailable`
pub fn create_backend(kind: BackendKind) -> StorageResult<Box<dyn VolumeBackend>> {
    match kind {
        BackendKind::Directory => Ok(Box::new(DirectoryBackend::new())),

        #[cfg(target_os = "linux")]
        BackendKind::Tmpfs => {
            let backend = TmpfsBackend::new();
            if !backend.is_available() {
                return Err(StorageError::BackendUnavailable {
                    backend: "tmpfs",
                    reason: backend.availability_message(),
                });
            }
            Ok(Box::new(backend))
        }

        #[cfg(not(target_os = "linux"))]
        BackendKind::Tmpfs => Err(StorageError::BackendUnavailable {
            backend: "tmpfs",
            reason: "tmpfs volumes are only available on Linux".to_string(),
        }),

        BackendKind::Auto => {
            #[cfg(target_os = "linux")]
            if nix::unistd::geteuid().is_root() {
                return Ok(Box::new(TmpfsBackend::new()));
            }
            Ok(Box::new(DirectoryBackend::new()))
        }
    }
}

/// Backend names usable on this platform
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = vec!["directory"];

    #[cfg(target_os = "linux")]
    backends.push("tmpfs");

    backends
}
