//! Reshapes extracted trees into a flat server root.
//!
//! All operations are synchronous filesystem work; async callers run them on the
//! blocking pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Override folders merged over the server root, lowest precedence first.
pub const OVERRIDE_DIRS: &[&str] = &["overrides", "server-overrides"];

/// Merge `src_root/overrides/` (then `server-overrides/`) over `dest_root`,
/// overwriting existing files. Returns whether any override folder existed.
pub fn apply_overrides(src_root: &Path, dest_root: &Path) -> io::Result<bool> {
    let mut applied = false;
    for name in OVERRIDE_DIRS {
        let dir = src_root.join(name);
        if dir.is_dir() {
            let moved = merge_tree(&dir, dest_root)?;
            log::info!("Applied {} ({} files) over {:?}", name, moved, dest_root);
            applied = true;
        }
    }
    Ok(applied)
}

/// Hoist the contents of a lone wrapper directory into `root`.
///
/// Does nothing when any of `expected` already sits at the root. Otherwise the
/// entries of `root` minus `sidecars` are listed; if exactly one remains and it is a
/// directory, its children move up and the wrapper is removed. Calling it again on
/// the result is a no-op.
pub fn flatten_single_nested(root: &Path, expected: &[&str], sidecars: &[&str]) -> io::Result<bool> {
    let Some(wrapper) = find_wrapper(root, expected, sidecars)? else {
        return Ok(false);
    };

    // the wrapper may contain an entry with its own name
    let staging = root.join(format!(
        ".flatten-{}",
        wrapper.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    fs::rename(&wrapper, &staging)?;
    let moved = merge_tree(&staging, root)?;
    log::info!("Flattened nested folder {:?} ({} files)", wrapper, moved);
    Ok(true)
}

/// The lone wrapper directory [`flatten_single_nested`] would hoist, if any.
pub fn find_wrapper(root: &Path, expected: &[&str], sidecars: &[&str]) -> io::Result<Option<PathBuf>> {
    if expected.iter().any(|name| root.join(name).exists()) {
        return Ok(None);
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !sidecars.iter().any(|s| *s == name) {
            candidates.push(entry);
        }
    }

    if candidates.len() != 1 || !candidates[0].file_type()?.is_dir() {
        return Ok(None);
    }
    Ok(Some(candidates[0].path()))
}

/// Move everything under `src` into `dest`, merging directories and overwriting
/// files. `src` is removed afterwards. Returns the number of files moved.
pub fn merge_tree(src: &Path, dest: &Path) -> io::Result<usize> {
    fs::create_dir_all(dest)?;
    let mut moved = 0;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dest.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            if to.is_dir() {
                moved += merge_tree(&from, &to)?;
                continue;
            }
            remove_any(&to)?;
            moved += move_path(&from, &to)?;
        } else {
            if to.is_dir() {
                fs::remove_dir_all(&to)?;
            }
            moved += move_path(&from, &to)?;
        }
    }

    fs::remove_dir_all(src)?;
    Ok(moved)
}

fn remove_any(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Rename, falling back to copy + remove when crossing devices.
fn move_path(from: &Path, to: &Path) -> io::Result<usize> {
    match fs::rename(from, to) {
        Ok(()) => Ok(count_files(to)),
        Err(_) => {
            let copied = copy_recursive(from, to)?;
            remove_any(from)?;
            Ok(copied)
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<usize> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        let mut copied = 0;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copied += copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(copied)
    } else {
        fs::copy(from, to)?;
        Ok(1)
    }
}

fn count_files(path: &Path) -> usize {
    if !path.is_dir() {
        return 1;
    }
    fs::read_dir(path)
        .map(|entries| entries.flatten().map(|e| count_files(&e.path())).sum())
        .unwrap_or(0)
}
