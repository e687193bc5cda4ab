//! Typed failures of the staging pipeline.
//!
//! Most plumbing uses `anyhow::Result`; these variants cover the failures
//! callers need to tell apart. They convert into `anyhow::Error` at the
//! point of return, so tests and callers can `downcast_ref` on them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    /// Unknown package name, or a pinned version the archive does not
    /// carry (reported as `name=version`).
    #[error("{}", not_found_message(.0))]
    PackageNotFound(String),

    /// Extraction of one archive failed. The staging root is in an
    /// undefined state and should be discarded.
    #[error("error while provisioning '{}'", .0.display())]
    Unpack(PathBuf),

    /// A required host command is not on PATH.
    #[error("required command '{0}' was not found on the host")]
    MissingCommand(String),
}

fn not_found_message(package: &str) -> String {
    let mut message = format!("The package '{package}' was not found.");
    // Arch-qualified names get a hint about enabling the architecture.
    if let Some((_, rest)) = package.split_once(':') {
        let arch = rest.split('=').next().unwrap_or(rest);
        if !arch.is_empty() {
            message.push_str(&format!(
                "\nYou may need to add support for this architecture with \
                 'dpkg --add-architecture {arch}'."
            ));
        }
    }
    message
}
