//! Extraction of downloaded archives into the staging root.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::StageError;
use crate::preflight::require_command;

const EXTRACT_COMMAND: &str = "dpkg-deb";

/// Extract every `.deb` directly under `download_dir` into `target_root`.
///
/// The extract tool is checked before any work starts. A single failed
/// extraction aborts with [`StageError::Unpack`]; files it already wrote
/// are left in place and the whole staging root should be discarded by
/// the caller.
pub fn unpack_all(download_dir: &Path, target_root: &Path) -> Result<()> {
    require_command(EXTRACT_COMMAND)?;
    fs::create_dir_all(target_root)
        .with_context(|| format!("creating staging root {}", target_root.display()))?;

    for archive in deb_archives_in(download_dir)? {
        println!("  Extracting {}", archive.display());
        let status = Command::new(EXTRACT_COMMAND)
            .arg("--extract")
            .arg(&archive)
            .arg(target_root)
            .status()
            .with_context(|| format!("running {EXTRACT_COMMAND}"))?;
        if !status.success() {
            return Err(StageError::Unpack(archive).into());
        }
    }
    Ok(())
}

/// The `.deb` files directly under `dir`, in stable order.
pub fn deb_archives_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("deb") {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_only_deb_files_in_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("zlib.deb"), b"z").unwrap();
        fs::write(dir.path().join("abc.deb"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        fs::create_dir(dir.path().join("sub.deb")).unwrap();

        let archives = deb_archives_in(dir.path()).unwrap();
        let names: Vec<_> = archives
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["abc.deb", "zlib.deb"]);
    }

    #[test]
    fn empty_download_dir_unpacks_nothing() {
        let dir = tempdir().unwrap();
        let download = dir.path().join("download");
        fs::create_dir(&download).unwrap();
        let root = dir.path().join("root");

        // No archives to extract, so the tool is the only requirement
        // that can fail; accept either outcome on minimal hosts.
        match unpack_all(&download, &root) {
            Ok(()) => assert!(root.is_dir()),
            Err(e) => {
                assert!(matches!(
                    e.downcast_ref::<StageError>(),
                    Some(StageError::MissingCommand(_))
                ));
            }
        }
    }
}
