// ============================================================================
// File: packages/ramsync/src/sync/mod.rs
// ----------------------------------------------------------------------------
// Disk <-> memory synchronization for a single volume.
// ============================================================================

mod cache;
mod engine;
mod stats;


pub use cache::FingerprintCache;
pub use engine::{SyncEngine, copy_file};
pub use stats::{SyncDirection, SyncStats, SyncStatus, TierDifferences};
