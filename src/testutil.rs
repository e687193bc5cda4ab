//! Shared test doubles.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::package::ResolvedChange;
use crate::resolver::ResolverSession;

/// An in-memory archive standing in for a real resolver session.
///
/// Dependencies are followed transitively on `mark_install`; fetches
/// write a small deterministic payload and count transport round trips.
#[derive(Debug, Default)]
pub struct FakeSession {
    packages: BTreeMap<String, FakePackage>,
    marked: BTreeSet<String>,
    pub fetch_count: usize,
}

#[derive(Debug, Clone)]
struct FakePackage {
    versions: Vec<String>,
    candidate: Option<String>,
    depends: Vec<String>,
    essential: bool,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package; the first version is the default candidate.
    pub fn insert(&mut self, name: &str, versions: &[&str], depends: &[&str], essential: bool) {
        self.packages.insert(
            name.to_string(),
            FakePackage {
                versions: versions.iter().map(|v| v.to_string()).collect(),
                candidate: None,
                depends: depends.iter().map(|d| d.to_string()).collect(),
                essential,
            },
        );
    }

    fn candidate_version(&self, name: &str) -> String {
        let package = &self.packages[name];
        package
            .candidate
            .clone()
            .or_else(|| package.versions.first().cloned())
            .unwrap_or_default()
    }
}

impl ResolverSession for FakeSession {
    fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    fn available_versions(&self, name: &str) -> Vec<String> {
        self.packages
            .get(name)
            .map(|p| p.versions.clone())
            .unwrap_or_default()
    }

    fn set_candidate(&mut self, name: &str, version: &str) -> Result<()> {
        let Some(package) = self.packages.get_mut(name) else {
            bail!("unknown package {name}");
        };
        if !package.versions.iter().any(|v| v == version) {
            bail!("unknown version {name}={version}");
        }
        package.candidate = Some(version.to_string());
        Ok(())
    }

    fn mark_install(&mut self, name: &str) -> Result<()> {
        if !self.packages.contains_key(name) {
            bail!("unknown package {name}");
        }
        if !self.marked.insert(name.to_string()) {
            return Ok(());
        }
        let depends = self.packages[name].depends.clone();
        for dep in depends {
            self.mark_install(&dep)?;
        }
        Ok(())
    }

    fn mark_keep(&mut self, name: &str) {
        self.marked.remove(name);
    }

    fn is_essential(&self, name: &str) -> bool {
        self.packages.get(name).is_some_and(|p| p.essential)
    }

    fn changes(&self) -> Vec<ResolvedChange> {
        self.marked
            .iter()
            .map(|name| {
                let version = self.candidate_version(name);
                ResolvedChange {
                    name: name.clone(),
                    location: format!("http://archive.test/pool/{name}_{version}_amd64.deb"),
                    version,
                    size: 64,
                }
            })
            .collect()
    }

    fn fetch_archive(&mut self, change: &ResolvedChange, dest_dir: &Path) -> Result<PathBuf> {
        self.fetch_count += 1;
        let dest = dest_dir.join(change.archive_basename());
        fs::write(&dest, format!("{} archive bytes", change.describe()))?;
        Ok(dest)
    }
}
