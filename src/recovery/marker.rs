// ============================================================================
// File: packages/ramsync/src/recovery/marker.rs
// ----------------------------------------------------------------------------
// Clean-shutdown marker protocol.
//
// 1. Startup reads the marker, then clears it.
// 2. A clean shutdown writes it back after persisting the memory tree.
// 3. A crash leaves no marker, so the next startup sees "unclean".
// ============================================================================

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::VolumeConfig;
use crate::error::{StorageError, StorageResult};

/// Contents of the marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownMarker {
    pub clean_shutdown: bool,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub disk_path: PathBuf,
    #[serde(default)]
    pub ram_path: Option<PathBuf>,
}

impl ShutdownMarker {
    fn clean(config: &VolumeConfig) -> Self {
        Self {
            clean_shutdown: true,
            timestamp: Utc::now(),
            name: config.name.clone(),
            disk_path: config.disk_path.clone(),
            ram_path: config.ram_path.clone(),
        }
    }
}

/// Marker location; always under the persistent tree
pub fn marker_path(config: &VolumeConfig) -> PathBuf {
    config.disk_path.join(&config.marker_file)
}

/// Read the marker if it exists and is structurally valid
///
/// Absent, unreadable and malformed markers all yield `None`.
pub fn read_shutdown_marker(config: &VolumeConfig) -> Option<ShutdownMarker> {
    let path = marker_path(config);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read shutdown marker {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(marker) => Some(marker),
        Err(e) => {
            warn!("Ignoring malformed shutdown marker {}: {}", path.display(), e);
            None
        }
    }
}

/// True only for a valid marker whose `clean_shutdown` flag is set
pub fn was_clean_shutdown(config: &VolumeConfig) -> bool {
    read_shutdown_marker(config).is_some_and(|marker| marker.clean_shutdown)
}

/// Write a clean marker atomically
pub fn mark_clean_shutdown(config: &VolumeConfig) -> StorageResult<()> {
    fs::create_dir_all(&config.disk_path)?;

    let marker = ShutdownMarker::clean(config);
    let mut tmp = tempfile::NamedTempFile::new_in(&config.disk_path)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &marker)?;
        writer.flush()?;
    }
    tmp.persist(marker_path(config))
        .map_err(|e| StorageError::Io(e.error))?;

    debug!("Wrote clean shutdown marker for {}", config.name);
    Ok(())
}

/// Remove the marker; a missing marker is not an error
pub fn clear_shutdown_marker(config: &VolumeConfig) -> StorageResult<()> {
    match fs::remove_file(marker_path(config)) {
        Ok(()) => {
            debug!("Cleared shutdown marker for {}", config.name);
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::Io(e)),
    }
}
