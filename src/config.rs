// ============================================================================
// File: packages/ramsync/src/config.rs
// ----------------------------------------------------------------------------
// Configuration types for managed volumes and the volume manager.
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::fingerprint::HashAlgorithm;

/// Default name of the clean-shutdown marker, stored under `disk_path`
pub const DEFAULT_MARKER_FILE: &str = ".ram_disk_clean_shutdown";

/// Default name of the fingerprint cache, stored under `disk_path`
pub const DEFAULT_HASH_CACHE_FILE: &str = ".ram_disk_hashes.json";

const MIN_SIZE_MB: u64 = 1;
const MAX_SIZE_MB: u64 = 65_536;

/// How `disk_to_ram` reconciles the memory tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Clear the memory tree, then copy every matched file
    #[default]
    Full,
    /// Copy only added/modified files and delete removed ones
    Incremental,
    /// Full sync restricted to the configured patterns
    Pattern,
}

impl SyncStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Full => "full",
            SyncStrategy::Incremental => "incremental",
            SyncStrategy::Pattern => "pattern",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(SyncStrategy::Full),
            "incremental" => Ok(SyncStrategy::Incremental),
            "pattern" => Ok(SyncStrategy::Pattern),
            other => Err(StorageError::config(format!("unknown sync strategy '{other}'"))),
        }
    }
}

/// Which volume backend the manager should drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Detect once at startup
    #[default]
    Auto,
    /// Plain directory (e.g. under /dev/shm)
    Directory,
    /// Linux tmpfs mount
    Tmpfs,
}

/// Configuration for a single managed volume
///
/// `disk_path` is the persistent tree and the source of truth. `ram_path`
/// is the memory-backed mirror; it may stay unset until the volume manager
/// assigns a default location at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Unique volume name
    pub name: String,

    /// Persistent tree root
    pub disk_path: PathBuf,

    /// Memory tree root
    #[serde(default)]
    pub ram_path: Option<PathBuf>,

    /// Capacity budget in MiB
    #[serde(default = "default_size_mb")]
    pub size_mb: u64,

    /// Glob patterns selecting which files participate in sync
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub sync_strategy: SyncStrategy,

    /// Pull disk -> memory when the volume is mounted
    #[serde(default = "default_true")]
    pub sync_on_mount: bool,

    /// Push memory -> disk when the volume is unmounted
    #[serde(default = "default_true")]
    pub persist_on_unmount: bool,

    /// Re-fingerprint both trees after a sync
    #[serde(default = "default_true")]
    pub verify_after_sync: bool,

    /// Treat a post-sync verification mismatch as a sync failure
    #[serde(default)]
    pub strict_verify: bool,

    /// Clean-shutdown marker file name (under `disk_path`)
    #[serde(default = "default_marker_file")]
    pub marker_file: String,

    /// Fingerprint cache file name (under `disk_path`)
    #[serde(default = "default_hash_cache_file")]
    pub hash_cache_file: String,
}

fn default_size_mb() -> u64 {
    512
}

fn default_patterns() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_marker_file() -> String {
    DEFAULT_MARKER_FILE.to_string()
}

fn default_hash_cache_file() -> String {
    DEFAULT_HASH_CACHE_FILE.to_string()
}

impl VolumeConfig {
    /// Create a configuration with defaults for everything but the name and disk path
    pub fn new<N: Into<String>, P: Into<PathBuf>>(name: N, disk_path: P) -> Self {
        Self {
            name: name.into(),
            disk_path: disk_path.into(),
            ram_path: None,
            size_mb: default_size_mb(),
            patterns: default_patterns(),
            sync_strategy: SyncStrategy::default(),
            sync_on_mount: true,
            persist_on_unmount: true,
            verify_after_sync: true,
            strict_verify: false,
            marker_file: default_marker_file(),
            hash_cache_file: default_hash_cache_file(),
        }
    }

    /// Set the memory tree root
    pub fn with_ram_path<P: Into<PathBuf>>(mut self, ram_path: P) -> Self {
        self.ram_path = Some(ram_path.into());
        self
    }

    /// Set the capacity budget
    pub fn with_size_mb(mut self, size_mb: u64) -> Self {
        self.size_mb = size_mb;
        self
    }

    /// Replace the pattern set
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the sync strategy
    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.sync_strategy = strategy;
        self
    }

    /// Toggle disk -> memory sync on mount
    pub fn with_sync_on_mount(mut self, enabled: bool) -> Self {
        self.sync_on_mount = enabled;
        self
    }

    /// Toggle memory -> disk persistence on unmount
    pub fn with_persist_on_unmount(mut self, enabled: bool) -> Self {
        self.persist_on_unmount = enabled;
        self
    }

    /// Toggle post-sync verification
    pub fn with_verify_after_sync(mut self, enabled: bool) -> Self {
        self.verify_after_sync = enabled;
        self
    }

    /// Toggle verify-or-fail mode
    pub fn with_strict_verify(mut self, enabled: bool) -> Self {
        self.strict_verify = enabled;
        self
    }

    /// Set the clean-shutdown marker file name
    pub fn with_marker_file<S: Into<String>>(mut self, name: S) -> Self {
        self.marker_file = name.into();
        self
    }

    /// Memory tree root, if configured
    pub fn ram_path(&self) -> Option<&Path> {
        self.ram_path.as_deref()
    }

    /// True for the volume's own metadata files, which never take part in sync
    pub fn is_reserved(&self, relative_path: &str) -> bool {
        relative_path == self.marker_file || relative_path == self.hash_cache_file
    }

    /// Validate the configuration before any I/O happens
    ///
    /// # Returns
    /// `Ok(())` when the configuration is usable, `StorageError::Config` or
    /// `StorageError::InvalidPattern` otherwise
    pub fn validate(&self) -> StorageResult<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::config("volume name is required"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(StorageError::config(format!(
                "volume name '{}' must not contain path separators",
                self.name
            )));
        }
        if self.size_mb < MIN_SIZE_MB {
            return Err(StorageError::config("size must be at least 1 MB"));
        }
        if self.size_mb > MAX_SIZE_MB {
            return Err(StorageError::config(format!(
                "size cannot exceed {MAX_SIZE_MB} MB (64 GB)"
            )));
        }
        if self.disk_path.as_os_str().is_empty() {
            return Err(StorageError::config("disk_path is required"));
        }
        if self.patterns.is_empty() {
            return Err(StorageError::config("at least one sync pattern is required"));
        }
        for pattern in &self.patterns {
            validate_pattern(pattern)?;
        }
        for name in [&self.marker_file, &self.hash_cache_file] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(StorageError::config(format!(
                    "metadata file name '{name}' must be a plain file name"
                )));
            }
        }
        Ok(())
    }
}

/// Check that a sync pattern compiles and stays inside its tree
pub fn validate_pattern(pattern: &str) -> StorageResult<()> {
    if pattern.is_empty() {
        return Err(StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }
    if pattern.starts_with('/') || pattern.split(['/', '\\']).any(|part| part == "..") {
        return Err(StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern must be relative to the tree root".to_string(),
        });
    }
    glob::Pattern::new(pattern).map_err(|e| StorageError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })?;
    Ok(())
}

/// Global configuration for the volume manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Parent directory for volumes registered without a `ram_path`
    #[serde(default)]
    pub base_ram_path: Option<PathBuf>,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Create a dual-write controller for every mounted volume
    #[serde(default = "default_true")]
    pub enable_dual_write: bool,

    /// Marker file name pushed into every registered volume
    #[serde(default = "default_marker_file")]
    pub recovery_marker_file: String,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            base_ram_path: None,
            log_file: None,
            enable_dual_write: true,
            recovery_marker_file: default_marker_file(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl ManagerConfig {
    /// Select the volume backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the parent directory for default memory tree locations
    pub fn with_base_ram_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_ram_path = Some(path.into());
        self
    }

    /// Toggle dual-write controllers
    pub fn with_dual_write(mut self, enabled: bool) -> Self {
        self.enable_dual_write = enabled;
        self
    }

    /// Set the fingerprint algorithm
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }
}

/// On-disk configuration document used by the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

impl ConfigFile {
    /// Load and validate a JSON configuration document
    pub fn load(path: &Path) -> StorageResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_path_buf())
            } else {
                StorageError::Io(e)
            }
        })?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        for volume in &file.volumes {
            volume.validate()?;
        }
        Ok(file)
    }

    /// Look up a volume by name
    pub fn volume(&self, name: &str) -> StorageResult<&VolumeConfig> {
        self.volumes
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| StorageError::UnknownVolume(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VolumeConfig::new("cache", "/data/cache");
        assert_eq!(config.size_mb, 512);
        assert_eq!(config.patterns, vec!["*".to_string()]);
        assert_eq!(config.sync_strategy, SyncStrategy::Full);
        assert!(config.sync_on_mount);
        assert!(config.persist_on_unmount);
        assert!(config.verify_after_sync);
        assert!(!config.strict_verify);
        assert!(config.ram_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn size_limits() {
        let config = VolumeConfig::new("cache", "/data").with_size_mb(0);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));

        let config = VolumeConfig::new("cache", "/data").with_size_mb(65_537);
        assert!(matches!(config.validate(), Err(StorageError::Config(_))));

        let config = VolumeConfig::new("cache", "/data").with_size_mb(65_536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_patterns() {
        let config = VolumeConfig::new("cache", "/data").with_patterns(["[unclosed"]);
        assert!(matches!(
            config.validate(),
            Err(StorageError::InvalidPattern { .. })
        ));

        let config = VolumeConfig::new("cache", "/data").with_patterns(["../*.txt"]);
        assert!(config.validate().is_err());

        let config = VolumeConfig::new("cache", "/data").with_patterns(Vec::<String>::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(VolumeConfig::new("", "/data").validate().is_err());
        assert!(VolumeConfig::new("a/b", "/data").validate().is_err());
        assert!(VolumeConfig::new("cache", "").validate().is_err());
    }

    #[test]
    fn reserved_names() {
        let config = VolumeConfig::new("cache", "/data").with_marker_file(".clean");
        assert!(config.is_reserved(".clean"));
        assert!(config.is_reserved(DEFAULT_HASH_CACHE_FILE));
        assert!(!config.is_reserved("sub/.clean"));
        assert!(!config.is_reserved("data.json"));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("Incremental".parse::<SyncStrategy>().ok(), Some(SyncStrategy::Incremental));
        assert_eq!("pattern".parse::<SyncStrategy>().ok(), Some(SyncStrategy::Pattern));
        assert!("mirror".parse::<SyncStrategy>().is_err());
        assert_eq!(SyncStrategy::Full.to_string(), "full");
    }

    #[test]
    fn config_file_from_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ramsync.json");
        std::fs::write(
            &path,
            r#"{
                "manager": { "backend": "directory" },
                "volumes": [
                    { "name": "cache", "disk_path": "/data/cache", "sync_strategy": "incremental" }
                ]
            }"#,
        )
        .expect("write config");

        let file = ConfigFile::load(&path).expect("load config");
        assert_eq!(file.manager.backend, BackendKind::Directory);
        assert!(file.manager.enable_dual_write);

        let volume = file.volume("cache").expect("volume");
        assert_eq!(volume.sync_strategy, SyncStrategy::Incremental);
        assert_eq!(volume.patterns, vec!["*".to_string()]);
        assert_eq!(volume.marker_file, DEFAULT_MARKER_FILE);

        assert!(matches!(
            file.volume("missing"),
            Err(StorageError::UnknownVolume(_))
        ));
    }

    #[test]
    fn config_file_missing() {
        let result = ConfigFile::load(Path::new("/nonexistent/ramsync.json"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }
}
