// ============================================================================
// File: packages/ramsync/src/lib.rs
// ----------------------------------------------------------------------------
// ramsync: disk-backed memory volumes.
// ============================================================================

//! Memory-backed volumes that mirror a persistent directory tree.
//!
//! The persistent tree is the source of truth and the memory tree is a
//! rebuildable cache. Three pieces keep them consistent:
//!
//! - [`sync::SyncEngine`] reconciles the trees with content fingerprints
//! - [`dual_write::DualWriteController`] writes through to both tiers,
//!   persistent tier first
//! - [`recovery::RecoveryManager`] detects unclean shutdowns and repopulates
//!   the memory tree
//!
//! [`manager::VolumeManager`] drives all of them per volume on top of a
//! platform [`backend::VolumeBackend`].

pub mod backend;
pub mod config;
pub mod diff;
pub mod dual_write;
pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod manager;
pub mod path_utils;
pub mod recovery;
pub mod sync;

pub use backend::{UsageStats, VolumeBackend, create_backend};
pub use config::{BackendKind, ConfigFile, ManagerConfig, SyncStrategy, VolumeConfig};
pub use diff::{DiffResult, diff};
pub use dual_write::{DualWriteController, WriteResult};
pub use error::{StorageError, StorageResult};
pub use fingerprint::{FingerprintMap, HashAlgorithm, fingerprint_directory, fingerprint_file};
pub use manager::{ManagerStatus, MountReport, UnmountOutcome, VolumeManager, VolumeStatus};
pub use recovery::{IntegrityResult, RecoveryManager, RecoveryResult, ShutdownOutcome};
pub use sync::{SyncDirection, SyncEngine, SyncStats, SyncStatus};
