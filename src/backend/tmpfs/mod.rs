// ============================================================================
// File: packages/ramsync/src/backend/tmpfs/mod.rs
// ----------------------------------------------------------------------------
// Linux tmpfs volume backend.
//
// Mounts a dedicated, size-capped tmpfs per volume. Uses mount(2) directly
// when privileged and falls back to `sudo -n mount` otherwise.
// ============================================================================

mod mount;
mod privilege;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use nix::mount::{MsFlags, umount};
use nix::sys::statvfs::statvfs;
use nix::unistd::geteuid;

use crate::config::VolumeConfig;
use crate::error::{StorageError, StorageResult};
use crate::path_utils::safe_path_to_str;

use super::{UsageStats, VolumeBackend, resolve_ram_path};

pub use mount::MountDetector;
pub use privilege::PrivilegeManager;

/// Default parent directory for tmpfs mount points
const DEFAULT_MOUNT_BASE: &str = "/mnt/ramdisk";

/// Dedicated tmpfs mount per volume
#[derive(Debug, Clone)]
pub struct TmpfsBackend {
    mount_base: PathBuf,
}

impl Default for TmpfsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TmpfsBackend {
    pub fn new() -> Self {
        Self {
            mount_base: PathBuf::from(DEFAULT_MOUNT_BASE),
        }
    }

    /// Place default mount points under `base`
    pub fn with_mount_base<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            mount_base: base.into(),
        }
    }

    fn is_root() -> bool {
        geteuid().is_root()
    }

    fn mount_tmpfs(path: &Path, size_mb: u64) -> StorageResult<()> {
        let options = format!("size={}m,mode=0755", size_mb);

        match nix::mount::mount(
            Some("tmpfs"),
            path,
            Some("tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some(options.as_str()),
        ) {
            Ok(()) => return Ok(()),
            Err(errno) => warn!(
                "mount(2) failed for {}: {}, trying sudo",
                path.display(),
                errno
            ),
        }

        let target = safe_path_to_str(path)?;
        let mounted = PrivilegeManager::run_with_sudo(
            "mount",
            &["-t", "tmpfs", "-o", &options, "tmpfs", target],
        )?;
        if !mounted {
            error!("Failed to mount tmpfs at {}", path.display());
            return Err(StorageError::InsufficientPrivileges(format!(
                "mounting tmpfs at {} requires root or passwordless sudo",
                path.display()
            )));
        }
        Ok(())
    }

    fn unmount(path: &Path) -> StorageResult<()> {
        match umount(path) {
            Ok(()) => return Ok(()),
            Err(errno) => warn!("umount(2) failed for {}: {}, trying sudo", path.display(), errno),
        }

        let target = safe_path_to_str(path)?;
        if !PrivilegeManager::run_with_sudo("umount", &[target])? {
            error!("Unmount command failed even with sudo");
            return Err(StorageError::CommandFailed(format!(
                "Failed to unmount {}",
                path.display()
            )));
        }
        Ok(())
    }
}

impl VolumeBackend for TmpfsBackend {
    fn name(&self) -> &'static str {
        "tmpfs"
    }

    fn is_available(&self) -> bool {
        Self::is_root() || PrivilegeManager::sudo_available()
    }

    fn availability_message(&self) -> String {
        if Self::is_root() {
            "Running as root - full tmpfs support available".to_string()
        } else if PrivilegeManager::sudo_available() {
            "Running as non-root user - tmpfs mounts go through sudo".to_string()
        } else {
            "Running as non-root user without passwordless sudo - tmpfs mounts unavailable"
                .to_string()
        }
    }

    fn default_ram_path(&self, config: &VolumeConfig) -> PathBuf {
        self.mount_base.join(&config.name)
    }

    fn create(&self, config: &VolumeConfig) -> StorageResult<PathBuf> {
        let path = resolve_ram_path(self, config);
        if MountDetector::is_mount_point(&path)? {
            info!("tmpfs volume {} already mounted at {}", config.name, path.display());
            return Ok(path);
        }

        fs::create_dir_all(&path)?;
        Self::mount_tmpfs(&path, config.size_mb)?;
        info!(
            "Mounted {} MB tmpfs for {} at {}",
            config.size_mb,
            config.name,
            path.display()
        );
        Ok(path)
    }

    fn exists(&self, config: &VolumeConfig) -> bool {
        let path = resolve_ram_path(self, config);
        if !MountDetector::is_mount_point(&path).unwrap_or(false) {
            return false;
        }
        // a foreign filesystem mounted at the same place is not ours
        MountDetector::is_tmpfs_mount(&path).unwrap_or(true)
    }

    fn destroy(&self, config: &VolumeConfig) -> StorageResult<()> {
        let path = resolve_ram_path(self, config);
        if MountDetector::is_mount_point(&path)? {
            info!("Attempting to unmount {}", path.display());
            Self::unmount(&path)?;
        }

        match fs::remove_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                error!("Failed to remove mount point {}: {}", path.display(), e);
                return Err(StorageError::Io(e));
            }
        }
        info!("tmpfs volume {} destroyed", config.name);
        Ok(())
    }

    fn get_usage(&self, config: &VolumeConfig) -> Option<UsageStats> {
        let path = resolve_ram_path(self, config);
        if !path.exists() {
            return None;
        }
        match statvfs(&path) {
            Ok(stat) => {
                let fragment = stat.fragment_size() as u64;
                let total = stat.blocks() as u64 * fragment;
                let free = stat.blocks_available() as u64 * fragment;
                Some(UsageStats::new(total, total.saturating_sub(free)))
            }
            Err(errno) => {
                error!("Failed to stat {}: {}", path.display(), errno);
                None
            }
        }
    }
}
