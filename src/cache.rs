//! Fingerprint-namespaced on-disk package cache.
//!
//! Layout: `<root>/<fingerprint>/{archives/, solver-root/}`. The
//! `archives/` pool holds fetched binary packages, filename-addressed;
//! `solver-root/` is handed to the resolver session as its working root.
//! Pools are created lazily and never pruned here; housekeeping is an
//! external concern. Writes into `archives/` are create-or-reuse-by-name:
//! archive filenames embed the candidate version, so a name collision
//! implies identical content.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sources::{fingerprint_of, ArchiveConfig};

const ARCHIVES_DIR: &str = "archives";
const SOLVER_ROOT_DIR: &str = "solver-root";
const SOURCES_LIST_FILE: &str = "sources.list";
const CONFIG_SNAPSHOT_FILE: &str = "config.json";

/// The cache root holding one pool per sources fingerprint.
#[derive(Debug, Clone)]
pub struct StageCache {
    root: PathBuf,
}

impl StageCache {
    /// Open (and create if needed) a cache rooted at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("creating cache root {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Default cache root under the user cache directory.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("deb-stager")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get or create the pool for a sources fingerprint. Idempotent.
    pub fn pool_for(&self, fingerprint: &str) -> Result<CachePool> {
        validate_fingerprint(fingerprint)?;
        let root = self.root.join(fingerprint);
        fs::create_dir_all(root.join(ARCHIVES_DIR))
            .with_context(|| format!("creating archive pool {}", root.display()))?;
        fs::create_dir_all(root.join(SOLVER_ROOT_DIR))?;
        Ok(CachePool {
            root,
            fingerprint: fingerprint.to_string(),
        })
    }

    /// Get or create the pool for an archive configuration, recording the
    /// rendered sources list and a config snapshot inside it.
    pub fn pool_for_config(&self, config: &ArchiveConfig) -> Result<CachePool> {
        // Render once so the recorded text and the fingerprint agree even
        // when the geo lookup is live.
        let sources = config.sources_list();
        let pool = self.pool_for(&fingerprint_of(&sources))?;
        pool.write_sources_list(&sources)?;
        pool.write_config_snapshot(config)?;
        Ok(pool)
    }
}

/// One fingerprint's pool: fetched archives plus the resolver's root.
#[derive(Debug, Clone)]
pub struct CachePool {
    root: PathBuf,
    fingerprint: String,
}

impl CachePool {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Directory of fetched binary archives, filename-addressed.
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join(ARCHIVES_DIR)
    }

    /// Working root for the resolver session.
    pub fn solver_root(&self) -> PathBuf {
        self.root.join(SOLVER_ROOT_DIR)
    }

    /// Where the rendered sources list is kept for the resolver session.
    pub fn sources_list_path(&self) -> PathBuf {
        self.solver_root().join(SOURCES_LIST_FILE)
    }

    /// Write the rendered sources text where the resolver expects it.
    pub fn write_sources_list(&self, text: &str) -> Result<()> {
        atomic_write(&self.sources_list_path(), text.as_bytes())
    }

    fn write_config_snapshot(&self, config: &ArchiveConfig) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(config)?;
        atomic_write(&self.root.join(CONFIG_SNAPSHOT_FILE), &bytes)
    }
}

/// Reject anything that is not a plain hex path segment.
fn validate_fingerprint(fingerprint: &str) -> Result<()> {
    if fingerprint.is_empty() {
        bail!("cache fingerprint must not be empty");
    }
    if !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("cache fingerprint must be a hex digest: {fingerprint}");
    }
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}
