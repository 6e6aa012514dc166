use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::error::StorageError;

/// Mount point detection
pub struct MountDetector;

impl MountDetector {
    /// Read the kernel mount table
    ///
    /// # Returns
    /// `(mount point, filesystem type)` pairs from `/proc/mounts`
    pub fn mounted_filesystems() -> Result<Vec<(String, String)>, StorageError> {
        let table = fs::read_to_string("/proc/mounts").map_err(|e| {
            StorageError::CommandFailed(format!("Failed to read mount table: {}", e))
        })?;
        Ok(table
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _source = fields.next()?;
                let target = fields.next()?;
                let fstype = fields.next()?;
                Some((target.to_string(), fstype.to_string()))
            })
            .collect())
    }

    /// Check if a path is a mount point by comparing device IDs
    ///
    /// A directory is a mount point if its device ID differs from its parent's device ID.
    pub fn is_mount_point(path: &Path) -> Result<bool, StorageError> {
        if !path.exists() {
            return Ok(false);
        }
        let metadata = fs::metadata(path).map_err(StorageError::Io)?;
        let parent_metadata =
            fs::metadata(path.parent().unwrap_or(Path::new("/"))).map_err(StorageError::Io)?;
        Ok(metadata.dev() != parent_metadata.dev())
    }

    /// Check whether `path` itself is a tmpfs mount
    pub fn is_tmpfs_mount(path: &Path) -> Result<bool, StorageError> {
        let Some(target) = path.to_str() else {
            return Ok(false);
        };
        let target = target.trim_end_matches('/');
        Ok(Self::mounted_filesystems()?
            .iter()
            .any(|(mount_point, fstype)| mount_point == target && fstype == "tmpfs"))
    }
}
