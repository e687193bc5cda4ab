//! One staging build session, from package specs to a fixed tree.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::{CachePool, StageCache};
use crate::fetch::fetch_changes;
use crate::libindex::LibraryIndex;
use crate::package::PackageSpec;
use crate::relocate::fix_tree;
use crate::resolver::{resolve, ResolverSession};
use crate::sources::ArchiveConfig;
use crate::unpack::unpack_all;

/// Stages archive packages into a relocatable root.
///
/// Owns the cache pool for one archive configuration, the per-build
/// download directory and the library index. The pipeline is strictly
/// sequential: [`DebStager::fetch`] resolves and downloads, then
/// [`DebStager::unpack`] extracts and fixes — the fixer needs the whole
/// unpacked tree to resolve symlinks across sibling packages.
pub struct DebStager {
    config: ArchiveConfig,
    pool: CachePool,
    download_dir: PathBuf,
    lib_index: LibraryIndex,
    prefix_trim: Option<String>,
}

impl DebStager {
    /// Open the pool for `config` and create the download directory.
    pub fn new(config: ArchiveConfig, cache: &StageCache, download_dir: &Path) -> Result<Self> {
        let pool = cache.pool_for_config(&config)?;
        fs::create_dir_all(download_dir)
            .with_context(|| format!("creating download dir {}", download_dir.display()))?;
        Ok(Self {
            config,
            pool,
            download_dir: download_dir.to_path_buf(),
            lib_index: LibraryIndex::new(),
            prefix_trim: None,
        })
    }

    /// Use a pre-seeded library index (tests, hosts without dpkg).
    #[must_use]
    pub fn with_lib_index(mut self, lib_index: LibraryIndex) -> Self {
        self.lib_index = lib_index;
        self
    }

    /// Strip this prefix from pkg-config values before re-prefixing them
    /// with the staging root.
    #[must_use]
    pub fn with_prefix_trim(mut self, prefix: &str) -> Self {
        self.prefix_trim = Some(prefix.to_string());
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn pool(&self) -> &CachePool {
        &self.pool
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Resolve `specs` against the session and fetch the install closure.
    ///
    /// Returns one `name=version` description per fetched package.
    pub fn fetch(
        &mut self,
        session: &mut dyn ResolverSession,
        specs: &[PackageSpec],
    ) -> Result<Vec<String>> {
        let changes = resolve(session, specs)?;
        fetch_changes(session, &changes, &self.pool, &self.download_dir)
    }

    /// Extract every downloaded archive into `target_root` and make the
    /// tree relocatable.
    pub fn unpack(&mut self, target_root: &Path) -> Result<()> {
        unpack_all(&self.download_dir, target_root)?;
        fix_tree(target_root, &mut self.lib_index, self.prefix_trim.as_deref())
    }
}
