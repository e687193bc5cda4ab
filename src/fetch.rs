//! Fetching resolved archives into the pool and the build download
//! directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::cache::CachePool;
use crate::package::ResolvedChange;
use crate::resolver::ResolverSession;

/// Fetch every change's archive into the pool, then expose each one in
/// `download_dir`.
///
/// Archives already present in the pool are reused without another
/// transport round trip. A stale `download_dir` file with the same
/// basename is replaced; unrelated files are left alone. Returns one
/// `name=version` description per fetched package.
pub fn fetch_changes(
    session: &mut dyn ResolverSession,
    changes: &[ResolvedChange],
    pool: &CachePool,
    download_dir: &Path,
) -> Result<Vec<String>> {
    fs::create_dir_all(download_dir)
        .with_context(|| format!("creating download dir {}", download_dir.display()))?;

    let archives_dir = pool.archives_dir();
    let mut descriptions = Vec::with_capacity(changes.len());

    for change in changes {
        let mut pooled = archives_dir.join(change.archive_basename());
        if !pooled.exists() {
            pooled = session
                .fetch_archive(change, &archives_dir)
                .with_context(|| format!("fetching {}", change.describe()))?;
        }

        let basename = pooled
            .file_name()
            .with_context(|| format!("archive path {} has no filename", pooled.display()))?;
        let dest = download_dir.join(basename);
        if dest.symlink_metadata().is_ok() {
            fs::remove_file(&dest)
                .with_context(|| format!("removing stale {}", dest.display()))?;
        }
        link_or_copy(&pooled, &dest)?;

        descriptions.push(change.describe());
    }

    Ok(descriptions)
}

/// Hard link within a filesystem, copy across filesystems.
fn link_or_copy(src: &Path, dest: &Path) -> Result<()> {
    if fs::hard_link(src, dest).is_ok() {
        return Ok(());
    }
    fs::copy(src, dest)
        .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StageCache;
    use crate::testutil::FakeSession;
    use tempfile::tempdir;

    fn session_with_hello() -> (FakeSession, Vec<ResolvedChange>) {
        let mut session = FakeSession::new();
        session.insert("hello", &["2.10-1"], &[], false);
        session.mark_install("hello").unwrap();
        let changes = session.changes();
        (session, changes)
    }

    #[test]
    fn fetches_into_pool_and_download_dir() {
        let dir = tempdir().unwrap();
        let cache = StageCache::open(&dir.path().join("cache")).unwrap();
        let pool = cache.pool_for("aa11").unwrap();
        let download_dir = dir.path().join("download");

        let (mut session, changes) = session_with_hello();
        let described = fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();

        assert_eq!(described, ["hello=2.10-1"]);
        let basename = changes[0].archive_basename();
        assert!(pool.archives_dir().join(&basename).exists());
        assert!(download_dir.join(&basename).exists());
        assert_eq!(session.fetch_count, 1);
    }

    #[test]
    fn populated_pool_is_not_refetched() {
        let dir = tempdir().unwrap();
        let cache = StageCache::open(&dir.path().join("cache")).unwrap();
        let pool = cache.pool_for("aa11").unwrap();
        let download_dir = dir.path().join("download");

        let (mut session, changes) = session_with_hello();
        fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();
        let pooled = pool.archives_dir().join(changes[0].archive_basename());
        let bytes_before = fs::read(&pooled).unwrap();

        fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();
        assert_eq!(session.fetch_count, 1, "cache hit must skip the transport");
        assert_eq!(fs::read(&pooled).unwrap(), bytes_before);
    }

    #[test]
    fn stale_download_is_replaced_exactly_once() {
        let dir = tempdir().unwrap();
        let cache = StageCache::open(&dir.path().join("cache")).unwrap();
        let pool = cache.pool_for("aa11").unwrap();
        let download_dir = dir.path().join("download");
        fs::create_dir_all(&download_dir).unwrap();

        let (mut session, changes) = session_with_hello();
        let basename = changes[0].archive_basename();
        fs::write(download_dir.join(&basename), b"stale bytes").unwrap();

        fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();
        fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();

        let entries: Vec<_> = fs::read_dir(&download_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let staged = fs::read(download_dir.join(&basename)).unwrap();
        assert_ne!(staged, b"stale bytes");
        assert_eq!(staged, fs::read(pool.archives_dir().join(&basename)).unwrap());
    }

    #[test]
    fn unrelated_download_files_are_untouched() {
        let dir = tempdir().unwrap();
        let cache = StageCache::open(&dir.path().join("cache")).unwrap();
        let pool = cache.pool_for("aa11").unwrap();
        let download_dir = dir.path().join("download");
        fs::create_dir_all(&download_dir).unwrap();
        fs::write(download_dir.join("notes.txt"), b"keep me").unwrap();

        let (mut session, changes) = session_with_hello();
        fetch_changes(&mut session, &changes, &pool, &download_dir).unwrap();

        assert_eq!(fs::read(download_dir.join("notes.txt")).unwrap(), b"keep me");
    }
}
