//! Stages Debian/Ubuntu archive packages into a relocatable staging root.
//!
//! The pipeline resolves a requested package set against the archive,
//! excluding packages every base system already carries, fetches the
//! closure's binary archives through a cache keyed by the sources
//! fingerprint, extracts them into a staging root, and fixes the tree so
//! it works under an arbitrary prefix:
//!
//! ```text
//! specs ──▶ resolve ──▶ fetch ──▶ unpack ──▶ relocate
//!              │           │
//!        ResolverSession   └── CachePool (per sources fingerprint)
//! ```
//!
//! The archive's own solver and the download transport sit behind the
//! [`resolver::ResolverSession`] trait; this crate coordinates them and
//! owns the cache layout and the filesystem transformations.
//!
//! # Example
//!
//! ```rust,ignore
//! use deb_stager::{ArchiveConfig, DebStager, PackageSpec, StageCache};
//!
//! let cache = StageCache::open(&StageCache::default_root())?;
//! let config = ArchiveConfig::new("amd64", "xenial");
//! let mut stager = DebStager::new(config, &cache, &build_dir.join("download"))?;
//!
//! let specs = [PackageSpec::parse("libpng12-0")?];
//! let fetched = stager.fetch(&mut session, &specs)?;
//! stager.unpack(&build_dir.join("install"))?;
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod host;
pub mod libindex;
pub mod package;
pub mod preflight;
pub mod relocate;
pub mod resolver;
pub mod sources;
pub mod stager;
pub mod unpack;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CachePool, StageCache};
pub use error::StageError;
pub use libindex::LibraryIndex;
pub use package::{PackageSpec, ResolvedChange};
pub use resolver::ResolverSession;
pub use sources::ArchiveConfig;
pub use stager::DebStager;
