//! Memoized lookup of library paths owned by installed host packages.

use anyhow::{bail, Context, Result};
use std::collections::{BTreeSet, HashMap};
use std::process::Command;

/// Which library-looking paths an installed host package owns.
///
/// The first query per package shells out to `dpkg -L`; the result is
/// kept for the lifetime of the index. Host package contents are treated
/// as immutable while a build runs, so entries are never invalidated.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    entries: HashMap<String, BTreeSet<String>>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An index with fixed contents, bypassing dpkg. For tests and hosts
    /// without a dpkg database.
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, BTreeSet<String>)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Paths owned by `package` that contain `lib`. Returns a copy; the
    /// index itself is not externally mutable.
    pub fn libs_of(&mut self, package: &str) -> Result<BTreeSet<String>> {
        if !self.entries.contains_key(package) {
            let libs = query_package_contents(package)?;
            self.entries.insert(package.to_string(), libs);
        }
        Ok(self.entries[package].clone())
    }
}

fn query_package_contents(package: &str) -> Result<BTreeSet<String>> {
    let output = Command::new("dpkg")
        .args(["-L", package])
        .output()
        .with_context(|| format!("running dpkg -L {package}"))?;
    if !output.status.success() {
        bail!(
            "dpkg -L {package} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(parse_contents(&String::from_utf8_lossy(&output.stdout)))
}

/// Whitespace-split a contents listing, keeping library-looking entries.
fn parse_contents(listing: &str) -> BTreeSet<String> {
    listing
        .split_whitespace()
        .filter(|path| path.contains("lib"))
        .map(str::to_string)
        .collect()
}
