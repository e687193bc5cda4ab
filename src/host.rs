//! Build-time host package handling.
//!
//! Staging covers the image's runtime packages; the tools a build itself
//! needs are plain host installs, driven through apt non-interactively.
//! This sits outside the staging pipeline and never touches the cache.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::process::Command;

/// Whether `package` is installed and configured on the host.
pub fn is_package_installed(package: &str) -> Result<bool> {
    let output = Command::new("dpkg-query")
        .args(["-W", "-f", "${Status}", package])
        .output()
        .context("running dpkg-query")?;
    if !output.status.success() {
        // Unknown to dpkg means not installed.
        return Ok(false);
    }
    Ok(status_is_installed(&String::from_utf8_lossy(&output.stdout)))
}

/// dpkg status strings end in "installed" for fully configured packages.
fn status_is_installed(status: &str) -> bool {
    status.trim().ends_with(" installed")
}

/// Install the not-yet-installed subset of `packages` on the host.
///
/// Installation failure is fatal; failing to mark the new packages
/// auto-installed afterwards is only warned. Returns the sorted list
/// that was installed.
pub fn install_build_packages(packages: &[String]) -> Result<Vec<String>> {
    let unique: BTreeSet<&str> = packages.iter().map(String::as_str).collect();
    let mut missing = Vec::new();
    for package in unique {
        if !is_package_installed(package)? {
            missing.push(package.to_string());
        }
    }
    if missing.is_empty() {
        return Ok(missing);
    }

    println!("  Installing build dependencies: {}", missing.join(" "));
    let status = Command::new("sudo")
        .args(["apt-get", "--no-install-recommends", "-y", "install"])
        .args(&missing)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .env("DEBCONF_NONINTERACTIVE_SEEN", "true")
        .status()
        .context("running apt-get install")?;
    if !status.success() {
        bail!("apt-get install failed for: {}", missing.join(" "));
    }

    let marked = Command::new("sudo")
        .args(["apt-mark", "auto"])
        .args(&missing)
        .status();
    match marked {
        Ok(status) if status.success() => {}
        _ => eprintln!("  [WARN] Could not mark packages as auto-installed"),
    }

    Ok(missing)
}

/// Host package needed to fetch a given source kind.
pub fn package_for_source_type(source_type: &str) -> Option<&'static str> {
    match source_type {
        "bzr" => Some("bzr"),
        "git" => Some("git"),
        "tar" => Some("tar"),
        "hg" | "mercurial" => Some("mercurial"),
        "subversion" | "svn" => Some("subversion"),
        _ => None,
    }
}
