use serde::Serialize;

/// Outcome of one dual-write operation
///
/// For writes and deletes `success` equals `disk_written`: a memory-tier
/// failure never makes them fail. A resync reads the persistent tier and
/// succeeds only when the memory copy was repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub success: bool,
    pub disk_written: bool,
    pub ram_written: bool,
    pub bytes_written: u64,
    pub error: Option<String>,
}

impl WriteResult {
    /// Nothing reached the persistent tier
    pub(crate) fn rejected<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            disk_written: false,
            ram_written: false,
            bytes_written: 0,
            error: Some(error.into()),
        }
    }

    /// Persistent tier done, memory tier not (yet) written
    pub(crate) fn persisted(bytes_written: u64) -> Self {
        Self {
            success: true,
            disk_written: true,
            ram_written: false,
            bytes_written,
            error: None,
        }
    }

    /// Degraded but safe: the data is durable, the memory copy is not current
    pub fn partial(&self) -> bool {
        self.disk_written && !self.ram_written
    }
}
