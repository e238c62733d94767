use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::hash::{bytes_digest, file_digest};

/// What [`remove_entry`] found at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    /// Nothing was there.
    Absent,
    /// A symlink or junction was unlinked; its target is untouched.
    Link,
    /// A regular file was deleted.
    File,
    /// A directory was deleted recursively.
    Dir,
}

/// Atomically write bytes to a file by writing to a temp file then renaming.
///
/// The file will either have the old contents or the new contents, never a
/// partial write.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    // Same directory so the rename stays on one filesystem
    let mut temp_path = parent.to_path_buf();
    temp_path.push(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            // On Windows, rename can fail if target exists.
            if cfg!(windows) {
                fs::copy(&temp_path, path)?;
                let _ = fs::remove_file(&temp_path);
                Ok(())
            } else {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}

/// Atomically write `bytes` unless the file already holds exactly them.
///
/// Returns `true` when the file was (re)written.
///
/// # Errors
/// Returns an error if the existing file cannot be hashed or the write fails.
pub fn write_if_changed(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    if file_digest(path)?.as_deref() == Some(bytes_digest(bytes).as_str()) {
        return Ok(false);
    }
    atomic_write(path, bytes)?;
    Ok(true)
}

/// Whether `path` is a symlink (Unix) or a symlink/junction (Windows).
#[must_use]
pub fn is_link(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };

    if metadata.file_type().is_symlink() {
        return true;
    }

    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        // FILE_ATTRIBUTE_REPARSE_POINT = 0x400
        if metadata.file_attributes() & 0x400 != 0 {
            return true;
        }
    }

    false
}

/// Remove whatever lives at `path` without following links.
///
/// Symlinks and junctions are unlinked (the target survives), directories are
/// removed recursively, files are deleted. A missing path is not an error.
///
/// # Errors
/// Returns the underlying I/O error for anything other than `NotFound`.
pub fn remove_entry(path: &Path) -> io::Result<Removed> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Removed::Absent),
        Err(e) => return Err(e),
    };

    let result = if is_link(path) {
        // Junctions report as directories on Windows and need remove_dir
        if cfg!(windows) && metadata.is_dir() {
            fs::remove_dir(path).map(|()| Removed::Link)
        } else {
            fs::remove_file(path).map(|()| Removed::Link)
        }
    } else if metadata.is_dir() {
        fs::remove_dir_all(path).map(|()| Removed::Dir)
    } else {
        fs::remove_file(path).map(|()| Removed::File)
    };

    match result {
        // Raced with another remover; the goal state holds
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Removed::Absent),
        other => other,
    }
}

/// Remove `dir` if it exists and is empty. Returns `true` if it was removed.
///
/// # Errors
/// Returns an error if the directory cannot be listed or removed.
pub fn remove_dir_if_empty(dir: &Path) -> io::Result<bool> {
    let mut entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    match fs::remove_dir(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
