use std::process::Command;

use log::{info, warn};

use crate::error::StorageError;

/// Runs mount commands with privilege escalation when needed
pub struct PrivilegeManager;

impl PrivilegeManager {
    /// Run a command directly, then through non-interactive sudo
    ///
    /// Volumes are mounted from services and the CLI alike, so a password
    /// prompt is never shown: `sudo -n` either works or the call reports
    /// failure.
    ///
    /// Returns Ok(true) if the command succeeded, Ok(false) if it failed gracefully,
    /// or Err if sudo itself could not be started.
    pub fn run_with_sudo(cmd: &str, args: &[&str]) -> Result<bool, StorageError> {
        info!("Attempting to run '{}' without sudo first", cmd);
        if let Ok(output) = Command::new(cmd).args(args).output() {
            if output.status.success() {
                info!("Command succeeded without sudo");
                return Ok(true);
            }
        }

        let full_cmd = format!("{} {}", cmd, args.join(" "));

        if !Self::sudo_available() {
            warn!("Non-interactive sudo is not available for: {}", full_cmd);
            return Ok(false);
        }

        let output = Command::new("sudo")
            .arg("-n")
            .arg(cmd)
            .args(args)
            .output()
            .map_err(|e| StorageError::CommandFailed(format!("Failed to run sudo: {}", e)))?;

        if output.status.success() {
            info!("Successfully executed command with sudo: {}", full_cmd);
            Ok(true)
        } else {
            warn!(
                "Command failed with sudo: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            Ok(false)
        }
    }

    /// Whether `sudo -n` can be used at all
    pub fn sudo_available() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}
