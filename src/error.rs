// ============================================================================
// File: packages/ramsync/src/error.rs
// ----------------------------------------------------------------------------
// Crate-wide error type.
//
// Expected tier failures (a file that cannot be copied, a cache write that
// fails) are reported through result values such as `SyncStats` and
// `WriteResult`. `StorageError` covers configuration mistakes, caller bugs
// and the fingerprinting primitives.
// ============================================================================

use std::path::PathBuf;

/// Errors raised by ramsync operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path does not exist
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Path exists but is not a regular file
    #[error("Not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Path is malformed or escapes its tier root
    #[error("Invalid path: {0}")]
    PathInvalid(String),

    /// Glob pattern failed to compile
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Hash algorithm is unknown or not compiled in
    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Configuration rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),

    /// Volume name not present in the registry
    #[error("Volume '{0}' is not registered")]
    UnknownVolume(String),

    /// Volume name already present in the registry
    #[error("Volume '{0}' is already registered")]
    DuplicateVolume(String),

    /// Operation requires the volume to be unmounted
    #[error("Volume '{0}' is still mounted")]
    VolumeMounted(String),

    /// External command returned failure
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Operation needs elevated privileges
    #[error("Insufficient privileges: {0}")]
    InsufficientPrivileges(String),

    /// Selected volume backend cannot run here
    #[error("Backend {backend} is not available: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Shorthand for a configuration error
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::Config(message.into())
    }

    /// True when the error means "the path is not there"
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type for ramsync operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_detection() {
        assert!(StorageError::NotFound(PathBuf::from("/x")).is_not_found());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(StorageError::from(io).is_not_found());

        assert!(!StorageError::config("bad size").is_not_found());
    }

    #[test]
    fn messages_name_the_path() {
        let err = StorageError::NotAFile(PathBuf::from("/data/dir"));
        assert_eq!(err.to_string(), "Not a regular file: /data/dir");

        let err = StorageError::UnknownVolume("cache".into());
        assert_eq!(err.to_string(), "Volume 'cache' is not registered");
    }
}
