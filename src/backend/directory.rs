use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::VolumeConfig;
use crate::error::{StorageError, StorageResult};

use super::{UsageStats, VolumeBackend, resolve_ram_path};

/// Shared-memory filesystem available to unprivileged users on Linux
const DEV_SHM: &str = "/dev/shm";

/// Memory tier as a plain directory
///
/// On Linux the default base is `/dev/shm`, which is already tmpfs, so no
/// privileges are needed. Elsewhere it falls back to the system temp
/// directory and the tier is only as fast as that filesystem. The size
/// budget is advisory.
#[derive(Debug, Clone)]
pub struct DirectoryBackend {
    base: PathBuf,
}

impl Default for DirectoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryBackend {
    pub fn new() -> Self {
        let shm = Path::new(DEV_SHM);
        let base = if cfg!(target_os = "linux") && is_writable_dir(shm) {
            shm.to_path_buf()
        } else {
            std::env::temp_dir()
        };
        Self { base }
    }

    /// Place default volumes under `base`
    pub fn with_base<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

fn is_writable_dir(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_dir() && !meta.permissions().readonly())
        .unwrap_or(false)
}

impl VolumeBackend for DirectoryBackend {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_message(&self) -> String {
        format!("Directory volumes under {}", self.base.display())
    }

    fn default_ram_path(&self, config: &VolumeConfig) -> PathBuf {
        self.base.join(format!("ramsync-{}", config.name))
    }

    fn create(&self, config: &VolumeConfig) -> StorageResult<PathBuf> {
        let path = resolve_ram_path(self, config);
        if path.exists() && !path.is_dir() {
            return Err(StorageError::NotADirectory(path));
        }
        fs::create_dir_all(&path)?;
        info!("Directory volume {} ready at {}", config.name, path.display());
        Ok(path)
    }

    fn exists(&self, config: &VolumeConfig) -> bool {
        resolve_ram_path(self, config).is_dir()
    }

    fn destroy(&self, config: &VolumeConfig) -> StorageResult<()> {
        let path = resolve_ram_path(self, config);
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!("Removed directory volume {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Directory volume {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn get_usage(&self, config: &VolumeConfig) -> Option<UsageStats> {
        let path = resolve_ram_path(self, config);
        if !path.is_dir() {
            return None;
        }

        let mut used = 0u64;
        for entry in WalkDir::new(&path).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    used += entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping entry while measuring {}: {}", path.display(), e),
            }
        }
        Some(UsageStats::new(config.size_mb * 1024 * 1024, used))
    }
}
