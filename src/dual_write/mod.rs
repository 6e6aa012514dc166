// ============================================================================
// File: packages/ramsync/src/dual_write/mod.rs
// ----------------------------------------------------------------------------
// Per-operation dual-tier writes: persistent tier first, memory tier second.
//
// Provides:
// - write / write_file / delete with disk-first ordering
// - read with a memory fast path and a persistent fallback
// - a resync set tracking paths whose memory copy is known stale
// ============================================================================

mod result;


use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use parking_lot::ReentrantMutex;

use crate::config::VolumeConfig;
use crate::path_utils::normalize_relative;
use crate::sync::copy_file;

pub use result::WriteResult;

/// Called with the relative path and the error when a memory-tier write fails
pub type RamFailureHandler = Box<dyn Fn(&str, &io::Error) + Send + Sync>;

/// Called with the relative path when a read had to fall back to the persistent tier
pub type SyncNeededHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Thread-safe controller writing every change to both tiers
///
/// One reentrant lock serializes every public operation on the volume.
/// Callbacks run while the lock is held, so a callback may call back into
/// the controller from the same thread.
pub struct DualWriteController {
    disk_path: PathBuf,
    ram_path: Option<PathBuf>,
    needs_resync: ReentrantMutex<RefCell<HashSet<String>>>,
    on_ram_failure: Option<RamFailureHandler>,
    on_sync_needed: Option<SyncNeededHandler>,
}

impl fmt::Debug for DualWriteController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualWriteController")
            .field("disk_path", &self.disk_path)
            .field("ram_path", &self.ram_path)
            .field("needs_resync", &self.needs_resync())
            .finish_non_exhaustive()
    }
}

impl DualWriteController {
    pub fn new(config: &VolumeConfig) -> Self {
        Self {
            disk_path: config.disk_path.clone(),
            ram_path: config.ram_path.clone(),
            needs_resync: ReentrantMutex::new(RefCell::new(HashSet::new())),
            on_ram_failure: None,
            on_sync_needed: None,
        }
    }

    /// Install the memory-tier failure callback
    pub fn with_ram_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &io::Error) + Send + Sync + 'static,
    {
        self.on_ram_failure = Some(Box::new(handler));
        self
    }

    /// Install the stale-read callback
    pub fn with_sync_needed_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_sync_needed = Some(Box::new(handler));
        self
    }

    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }

    pub fn ram_path(&self) -> Option<&Path> {
        self.ram_path.as_deref()
    }

    /// Write `content` to the persistent tier, then to the memory tier
    ///
    /// # Arguments
    /// * `relative_path` - Path under both tier roots (`\` is accepted)
    /// * `content` - Bytes to write
    ///
    /// # Returns
    /// `WriteResult` with `success == disk_written`; a memory-tier failure
    /// flags the path for resync instead of failing the write
    pub fn write<C: AsRef<[u8]>>(&self, relative_path: &str, content: C) -> WriteResult {
        let content = content.as_ref();
        let key = match normalize_relative(relative_path) {
            Ok(key) => key,
            Err(e) => return WriteResult::rejected(e.to_string()),
        };

        let _guard = self.needs_resync.lock();

        if let Err(e) = write_bytes(&self.disk_path.join(&key), content) {
            let message = format!("Disk write failed: {e}");
            error!("{}: {}", message, key);
            return WriteResult::rejected(message);
        }
        debug!("Disk write success: {}", key);

        let mut result = WriteResult::persisted(content.len() as u64);
        if let Some(ram_path) = &self.ram_path {
            match write_bytes(&ram_path.join(&key), content) {
                Ok(()) => {
                    debug!("RAM write success: {}", key);
                    result.ram_written = true;
                    self.unflag(&key);
                }
                Err(e) => self.ram_failed(&key, &e),
            }
        }
        result
    }

    /// Copy an existing file into both tiers, keeping its modification time
    ///
    /// A missing source fails before either tier is touched.
    pub fn write_file(&self, relative_path: &str, source: &Path) -> WriteResult {
        let key = match normalize_relative(relative_path) {
            Ok(key) => key,
            Err(e) => return WriteResult::rejected(e.to_string()),
        };
        let size = match fs::metadata(source) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => {
                return WriteResult::rejected(format!(
                    "Source file not found: {}",
                    source.display()
                ));
            }
        };

        let _guard = self.needs_resync.lock();

        if let Err(e) = copy_file(source, &self.disk_path.join(&key)) {
            let message = format!("Disk copy failed: {e}");
            error!("{}: {}", message, key);
            return WriteResult::rejected(message);
        }
        debug!("Disk copy success: {}", key);

        let mut result = WriteResult::persisted(size);
        if let Some(ram_path) = &self.ram_path {
            match copy_file(source, &ram_path.join(&key)) {
                Ok(_) => {
                    debug!("RAM copy success: {}", key);
                    result.ram_written = true;
                    self.unflag(&key);
                }
                Err(e) => self.ram_failed(&key, &e),
            }
        }
        result
    }

    /// Read from the memory tier, falling back to the persistent tier
    ///
    /// The fast path is skipped for paths flagged for resync. A successful
    /// fallback notifies the stale-read callback.
    ///
    /// # Returns
    /// File bytes, or `None` when neither tier has the file
    pub fn read(&self, relative_path: &str) -> Option<Vec<u8>> {
        let key = normalize_relative(relative_path).ok()?;
        let state = self.needs_resync.lock();

        if let Some(ram_path) = &self.ram_path {
            let flagged = state.borrow().contains(&key);
            let ram_file = ram_path.join(&key);
            if !flagged && ram_file.exists() {
                match fs::read(&ram_file) {
                    Ok(content) => {
                        debug!("RAM read success: {}", key);
                        return Some(content);
                    }
                    Err(e) => warn!("RAM read failed, falling back to disk: {}: {}", key, e),
                }
            }
        }

        let disk_file = self.disk_path.join(&key);
        if !disk_file.exists() {
            return None;
        }
        match fs::read(&disk_file) {
            Ok(content) => {
                debug!("Disk read success (fallback): {}", key);
                if self.ram_path.is_some() {
                    self.notify_sync_needed(&key);
                }
                Some(content)
            }
            Err(e) => {
                error!("Disk read failed: {}: {}", key, e);
                None
            }
        }
    }

    /// UTF-8 convenience over [`read`](Self::read)
    pub fn read_to_string(&self, relative_path: &str) -> Option<String> {
        let content = self.read(relative_path)?;
        match String::from_utf8(content) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("{} is not valid UTF-8: {}", relative_path, e);
                None
            }
        }
    }

    /// Delete from the persistent tier, then from the memory tier
    ///
    /// A file already absent from a tier counts as deleted there. The path
    /// leaves the resync set once the call completes.
    pub fn delete(&self, relative_path: &str) -> WriteResult {
        let key = match normalize_relative(relative_path) {
            Ok(key) => key,
            Err(e) => return WriteResult::rejected(e.to_string()),
        };

        let _guard = self.needs_resync.lock();

        if let Err(e) = remove_if_present(&self.disk_path.join(&key)) {
            let message = format!("Disk delete failed: {e}");
            error!("{}: {}", message, key);
            return WriteResult::rejected(message);
        }
        debug!("Disk delete success: {}", key);

        let mut result = WriteResult::persisted(0);
        if let Some(ram_path) = &self.ram_path {
            match remove_if_present(&ram_path.join(&key)) {
                Ok(()) => {
                    debug!("RAM delete success: {}", key);
                    result.ram_written = true;
                }
                Err(e) => {
                    warn!("RAM delete failed: {}: {}", key, e);
                    self.notify_ram_failure(&key, &e);
                }
            }
        }

        self.unflag(&key);
        result
    }

    /// Existence according to the persistent tier only
    pub fn exists(&self, relative_path: &str) -> bool {
        normalize_relative(relative_path)
            .map(|key| self.disk_path.join(key).exists())
            .unwrap_or(false)
    }

    /// Paths whose memory copy is stale, sorted
    pub fn needs_resync(&self) -> Vec<String> {
        let state = self.needs_resync.lock();
        let mut paths: Vec<String> = state.borrow().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Forget every stale flag (after a full disk -> memory sync)
    pub fn clear_needs_resync(&self) {
        let state = self.needs_resync.lock();
        state.borrow_mut().clear();
    }

    /// Run `f` while no other thread can write, delete or resync
    ///
    /// The lock is reentrant, so `f` may call back into the controller.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.needs_resync.lock();
        f()
    }

    /// Repair one path's memory copy from the persistent tier
    ///
    /// Copies the current disk file into memory, or deletes the memory copy
    /// when the disk file is gone. The path leaves the resync set only on
    /// success.
    pub fn resync_path(&self, relative_path: &str) -> WriteResult {
        let key = match normalize_relative(relative_path) {
            Ok(key) => key,
            Err(e) => return WriteResult::rejected(e.to_string()),
        };

        let _guard = self.needs_resync.lock();
        // the persistent tier is the source here, never a target
        let mut result = WriteResult::persisted(0);
        let disk_file = self.disk_path.join(&key);

        let Some(ram_path) = &self.ram_path else {
            return result;
        };
        let ram_file = ram_path.join(&key);

        if !disk_file.exists() {
            if let Err(e) = remove_if_present(&ram_file) {
                result.success = false;
                result.error = Some(format!("RAM delete failed: {e}"));
                return result;
            }
            result.ram_written = true;
            self.unflag(&key);
            return result;
        }

        match copy_file(&disk_file, &ram_file) {
            Ok(bytes) => {
                debug!("Resync success: {}", key);
                result.ram_written = true;
                result.bytes_written = bytes;
                self.unflag(&key);
            }
            Err(e) => {
                let message = format!("RAM copy failed: {e}");
                error!("{}: {}", message, key);
                result.success = false;
                result.error = Some(message);
            }
        }
        result
    }

    /// Run [`resync_path`](Self::resync_path) over a snapshot of the resync set
    pub fn resync_pending(&self) -> Vec<(String, WriteResult)> {
        let _guard = self.needs_resync.lock();
        self.needs_resync()
            .into_iter()
            .map(|path| {
                let result = self.resync_path(&path);
                (path, result)
            })
            .collect()
    }

    fn unflag(&self, key: &str) {
        let state = self.needs_resync.lock();
        state.borrow_mut().remove(key);
    }

    fn ram_failed(&self, key: &str, e: &io::Error) {
        warn!("RAM write failed (disk is safe): {}: {}", key, e);
        {
            let state = self.needs_resync.lock();
            state.borrow_mut().insert(key.to_string());
        }
        self.notify_ram_failure(key, e);
    }

    fn notify_ram_failure(&self, key: &str, e: &io::Error) {
        if let Some(handler) = &self.on_ram_failure {
            if catch_unwind(AssertUnwindSafe(|| handler(key, e))).is_err() {
                error!("on_ram_failure callback panicked for {}", key);
            }
        }
    }

    fn notify_sync_needed(&self, key: &str) {
        if let Some(handler) = &self.on_sync_needed {
            if catch_unwind(AssertUnwindSafe(|| handler(key))).is_err() {
                error!("on_sync_needed callback panicked for {}", key);
            }
        }
    }
}

fn write_bytes(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
