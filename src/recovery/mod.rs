// ============================================================================
// File: packages/ramsync/src/recovery/mod.rs
// ----------------------------------------------------------------------------
// Crash detection, integrity verification and recovery.
//
// The marker and the fingerprint cache both live on the persistent tier:
// the memory tier does not survive the events they describe.
// ============================================================================

mod integrity;
mod manager;
mod marker;

#[cfg(test)]
mod tests;

pub use integrity::{
    FileVerification, IntegrityResult, verify_integrity, verify_integrity_with,
    verify_single_file,
};
pub use manager::{RecoveryManager, RecoveryResult, RecoveryStatus, ShutdownOutcome};
pub use marker::{
    ShutdownMarker, clear_shutdown_marker, mark_clean_shutdown, marker_path,
    read_shutdown_marker, was_clean_shutdown,
};
