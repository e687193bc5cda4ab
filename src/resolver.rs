//! Adapter over the external archive resolver.
//!
//! The archive's own solver and index are a collaborator behind
//! [`ResolverSession`]: the adapter issues install/pin/keep intents and
//! reads back the pending change list. It never reaches into solver
//! state directly.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::StageError;
use crate::package::{PackageSpec, ResolvedChange};

/// Base-runtime packages excluded from staging unless explicitly
/// requested. These ship in every base image, so staging them would only
/// bloat the artifact and shadow the host runtime.
pub const MANIFEST_EXCLUDES: &[&str] = &[
    "adduser",
    "apt",
    "apt-utils",
    "bsdutils",
    "console-setup",
    "debconf",
    "debconf-i18n",
    "debianutils",
    "dpkg",
    "e2fsprogs",
    "eject",
    "gnupg",
    "ifupdown",
    "initramfs-tools",
    "initramfs-tools-bin",
    "initscripts",
    "insserv",
    "isc-dhcp-client",
    "isc-dhcp-common",
    "less",
    "libc6",
    "locales",
    "lsb-base",
    "makedev",
    "mawk",
    "mount",
    "net-tools",
    "netbase",
    "ntpdate",
    "passwd",
    "procps",
    "rsyslog",
    "sudo",
    "systemd",
    "sysv-rc",
    "sysvinit-utils",
    "tzdata",
    "ubuntu-minimal",
    "udev",
    "upstart",
    "util-linux",
    "vim-tiny",
    "whiptail",
];

/// One opened resolver session, rooted at a pool's solver root.
///
/// Contract notes:
/// - `mark_keep` may be applied to packages that marked dependents still
///   require. The session must tolerate the resulting broken consistency
///   state and keep `changes()` enumerable; the adapter never consults a
///   consistency check.
/// - `fetch_archive` should write `dest_dir/<change.archive_basename()>`
///   so archives are reused by name across builds sharing a pool.
/// - Transport progress reporting is injected into concrete sessions at
///   construction and never crosses this interface.
pub trait ResolverSession {
    /// Whether the archive knows `name` (possibly arch-qualified).
    fn contains(&self, name: &str) -> bool;

    /// Versions of `name` available in the archive.
    fn available_versions(&self, name: &str) -> Vec<String>;

    /// Pin the install candidate of `name` to `version`.
    fn set_candidate(&mut self, name: &str, version: &str) -> Result<()>;

    /// Mark `name`, and transitively its dependencies, for install.
    fn mark_install(&mut self, name: &str) -> Result<()>;

    /// Revert `name` to keep (do not install).
    fn mark_keep(&mut self, name: &str);

    /// Whether the archive considers `name` always present on a base
    /// system.
    fn is_essential(&self, name: &str) -> bool;

    /// The pending install set.
    fn changes(&self) -> Vec<ResolvedChange>;

    /// Retrieve the binary archive for one change into `dest_dir`,
    /// returning the written path.
    fn fetch_archive(&mut self, change: &ResolvedChange, dest_dir: &Path) -> Result<PathBuf>;
}

/// Resolve `specs` into the install closure, applying the exclusion
/// policy.
///
/// Unknown names and unknown pinned versions fail with
/// [`StageError::PackageNotFound`] before anything is fetched.
pub fn resolve(
    session: &mut dyn ResolverSession,
    specs: &[PackageSpec],
) -> Result<Vec<ResolvedChange>> {
    for spec in specs {
        let key = spec.resolver_key();
        if !session.contains(&key) {
            return Err(StageError::PackageNotFound(key).into());
        }
        if let Some(version) = &spec.version {
            if !session.available_versions(&key).iter().any(|v| v == version) {
                return Err(StageError::PackageNotFound(format!("{key}={version}")).into());
            }
            session.set_candidate(&key, version)?;
        }
        println!("  Marking {key} (and its dependencies) for fetch");
        session.mark_install(&key)?;
    }

    apply_exclusions(session, specs);
    Ok(session.changes())
}

/// Revert essential and base-runtime packages that were pulled in only as
/// dependencies. Explicitly requested names always stay.
fn apply_exclusions(session: &mut dyn ResolverSession, specs: &[PackageSpec]) {
    let requested: HashSet<String> = specs
        .iter()
        .flat_map(|spec| [spec.name.clone(), spec.resolver_key()])
        .collect();

    let mut skipped_essential = Vec::new();
    let mut skipped_excluded = Vec::new();
    for change in session.changes() {
        if requested.contains(&change.name) {
            continue;
        }
        if session.is_essential(&change.name) {
            skipped_essential.push(change.name.clone());
            session.mark_keep(&change.name);
        } else if MANIFEST_EXCLUDES.contains(&change.name.as_str()) {
            skipped_excluded.push(change.name.clone());
            session.mark_keep(&change.name);
        }
    }

    if !skipped_essential.is_empty() {
        println!("  Skipping essential packages: {}", skipped_essential.join(", "));
    }
    if !skipped_excluded.is_empty() {
        println!("  Skipping base-runtime packages: {}", skipped_excluded.join(", "));
    }
}
