//! Post-extraction fixes that make a staged tree relocatable.
//!
//! Third-party packages assume they are installed at `/`. After
//! extraction the tree gets one fixing walk: absolute symlinks become
//! relative, setuid/setgid bits are stripped, pkg-config prefixes point
//! into the staging root. Two fixed-path passes then patch known tool
//! config scripts and Python shebangs. Per-entry failures are warned and
//! skipped; a partially fixed tree beats an aborted build.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::libindex::LibraryIndex;

/// Directories searched for scripts with hard-coded interpreter paths.
const BIN_PATHS: &[&str] = &["bin", "sbin", "usr/bin", "usr/sbin"];

/// Package whose library symlinks keep pointing at the host runtime.
const LIBC_PACKAGE: &str = "libc6";

/// Config scripts known to hard-code `prefix=/usr`.
const TOOL_CONFIG_SCRIPTS: &[&str] = &["usr/bin/xml2-config", "usr/bin/xslt-config"];

/// Fix every entry under `root` in one walk, then run the fixed-path
/// passes.
pub fn fix_tree(root: &Path, lib_index: &mut LibraryIndex, prefix_trim: Option<&str>) -> Result<()> {
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path == root {
            continue;
        }
        if let Err(e) = fix_entry(path, root, lib_index, prefix_trim) {
            eprintln!("  [WARN] Skipping fix for {}: {e:#}", path.display());
        }
    }

    fix_tool_scripts(root)?;
    fix_shebangs(root)?;
    Ok(())
}

fn fix_entry(
    path: &Path,
    root: &Path,
    lib_index: &mut LibraryIndex,
    prefix_trim: Option<&str>,
) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        let target = fs::read_link(path)?;
        if target.is_absolute() {
            fix_symlink(path, &target, root, lib_index)?;
        }
        return Ok(());
    }

    strip_privilege_bits(path, &meta)?;

    if meta.is_file() && path.extension().and_then(|e| e.to_str()) == Some("pc") {
        fix_pkg_config(root, path, prefix_trim)?;
    }
    Ok(())
}

/// Rewrite one absolute symlink to a relative one inside `root`.
///
/// C-library links are exempt: staged binaries must keep resolving them
/// against the host runtime, not a staged copy. A target that exists
/// neither in the root nor on the host stays dangling.
fn fix_symlink(
    path: &Path,
    target: &Path,
    root: &Path,
    lib_index: &mut LibraryIndex,
) -> Result<()> {
    if is_libc_path(lib_index, target) {
        return Ok(());
    }

    let stripped = target.strip_prefix("/").unwrap_or(target);
    let in_root = root.join(stripped);
    if !in_root.exists() && !copy_host_target(path, target, &in_root)? {
        return Ok(());
    }

    let parent = path
        .parent()
        .with_context(|| format!("symlink {} has no parent", path.display()))?;
    let relative = relative_path(&in_root, parent);
    fs::remove_file(path)?;
    std::os::unix::fs::symlink(&relative, path)?;
    Ok(())
}

fn is_libc_path(lib_index: &mut LibraryIndex, target: &Path) -> bool {
    let target = target.to_string_lossy();
    match lib_index.libs_of(LIBC_PACKAGE) {
        Ok(libs) => libs.contains(target.as_ref()),
        Err(e) => {
            eprintln!("  [WARN] Could not list {LIBC_PACKAGE} contents: {e:#}");
            false
        }
    }
}

/// Copy the dereferenced host file behind `target` into the root.
///
/// Returns false, after a warning, when the host file is missing and the
/// link has to stay dangling.
fn copy_host_target(link: &Path, target: &Path, in_root: &Path) -> Result<bool> {
    if fs::metadata(target).is_err() {
        eprintln!("  [WARN] {} will be a dangling symlink", link.display());
        return Ok(false);
    }
    eprintln!(
        "  [WARN] Copying needed link target {} from the host",
        target.display()
    );
    if let Some(parent) = in_root.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(target, in_root)
        .with_context(|| format!("copying {} to {}", target.display(), in_root.display()))?;
    Ok(true)
}

/// Relative path from the directory `base` to `target`. Both absolute,
/// compared lexically (the staged tree must not be resolved through the
/// host).
fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// Clear setuid/setgid while keeping every other permission bit.
fn strip_privilege_bits(path: &Path, meta: &fs::Metadata) -> Result<()> {
    let mode = meta.permissions().mode() & 0o7777;
    if mode & 0o6000 != 0 {
        eprintln!("  [WARN] Removing setuid/setgid from {}", path.display());
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o1777))?;
    }
    Ok(())
}

/// Point a pkg-config file's `prefix=` at the staging root.
///
/// Only the first matching line is rewritten. With `prefix_trim`, that
/// prefix is removed from the captured value before the root is
/// prepended.
pub fn fix_pkg_config(root: &Path, file: &Path, prefix_trim: Option<&str>) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let rewritten = rewrite_prefix_line(&text, &root.to_string_lossy(), prefix_trim)?;
    if rewritten != text {
        rewrite_in_place(file, rewritten.as_bytes())?;
    }
    Ok(())
}

/// Pure line transform behind [`fix_pkg_config`].
fn rewrite_prefix_line(text: &str, root: &str, prefix_trim: Option<&str>) -> Result<String> {
    let pattern = Regex::new(r"^prefix=(.*)$")?;
    let trim_pattern = match prefix_trim {
        Some(trim) => Some(Regex::new(&format!("^prefix={}(.*)$", regex::escape(trim)))?),
        None => None,
    };

    let mut out = String::with_capacity(text.len());
    let mut done = false;
    for line in text.split_inclusive('\n') {
        let bare = line.strip_suffix('\n').unwrap_or(line);
        if !done {
            let captured = trim_pattern
                .as_ref()
                .and_then(|p| p.captures(bare))
                .or_else(|| pattern.captures(bare));
            if let Some(captures) = captured {
                out.push_str(&format!("prefix={root}{}", &captures[1]));
                if line.ends_with('\n') {
                    out.push('\n');
                }
                done = true;
                continue;
            }
        }
        out.push_str(line);
    }
    Ok(out)
}

/// Patch known tool config scripts that hard-code `prefix=/usr`.
fn fix_tool_scripts(root: &Path) -> Result<()> {
    for script in TOOL_CONFIG_SCRIPTS {
        let path = root.join(script);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            // Not every staged tree ships these.
            Err(_) => continue,
        };
        let rewritten = text.replace("prefix=/usr", &format!("prefix={}/usr", root.display()));
        if rewritten != text {
            rewrite_in_place(&path, rewritten.as_bytes())?;
        }
    }
    Ok(())
}

/// Rewrite hard-coded Python interpreter paths under the executable
/// directories to dispatch via env instead.
fn fix_shebangs(root: &Path) -> Result<()> {
    let pattern = Regex::new(r"^#!\s*/\S*/(python[\w.]*)\s*$")?;
    for bin_dir in BIN_PATHS {
        let dir = root.join(bin_dir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Err(e) = fix_shebang_file(entry.path(), &pattern) {
                eprintln!(
                    "  [WARN] Skipping shebang fix for {}: {e:#}",
                    entry.path().display()
                );
            }
        }
    }
    Ok(())
}

fn fix_shebang_file(path: &Path, pattern: &Regex) -> Result<()> {
    let bytes = fs::read(path)?;
    if !bytes.starts_with(b"#!") {
        return Ok(());
    }
    let line_end = bytes.iter().position(|b| *b == b'\n').unwrap_or(bytes.len());
    let Ok(first_line) = std::str::from_utf8(&bytes[..line_end]) else {
        return Ok(());
    };
    let Some(captures) = pattern.captures(first_line) else {
        return Ok(());
    };

    let mut rewritten = format!("#!/usr/bin/env {}", &captures[1]).into_bytes();
    rewritten.extend_from_slice(&bytes[line_end..]);
    rewrite_in_place(path, &rewritten)
}

/// Replace a file's contents atomically, keeping its permissions.
fn rewrite_in_place(path: &Path, bytes: &[u8]) -> Result<()> {
    let perms = fs::metadata(path)?.permissions();
    let tmp = path.with_extension("tmp-rewrite");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::set_permissions(&tmp, perms)?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}
