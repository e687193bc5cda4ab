//! Host tool validation before staging work begins.
//!
//! Shelling out to a missing tool halfway through a build produces
//! cryptic errors; callers check up front instead.

use anyhow::Result;

use crate::error::StageError;

/// Check if a command exists on the host PATH.
pub fn command_exists(command: &str) -> bool {
    which::which(command).is_ok()
}

/// Fail with [`StageError::MissingCommand`] when a required tool is
/// absent.
pub fn require_command(command: &str) -> Result<()> {
    if command_exists(command) {
        Ok(())
    } else {
        Err(StageError::MissingCommand(command.to_string()).into())
    }
}
