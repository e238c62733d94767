//! Executable entries in `node_modules/.bin`.
//!
//! How an entry is represented depends on the platform: Unix gets one symlink
//! per bin, Windows gets a trio of generated shims. Callers only deal with
//! [`BinLinker`] and [`owned_entries`].
//!
//! Several packages may declare the same bin name; whichever linked last owns
//! the entry. An entry is only ever removed on behalf of the package it
//! currently points at.

use super::graph::{NodeId, Tree};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Name of the shared bin directory inside each `node_modules`.
pub const BIN_DIR: &str = ".bin";

/// Platform representation of bin entries.
pub trait BinLinker: Send + Sync {
    /// Files that make up the entry for `bin_name` in `bin_dir`.
    fn entry_paths(&self, bin_dir: &Path, bin_name: &str) -> Vec<PathBuf>;

    /// Whether `entry` currently belongs to the package installed at `pkg_dir`.
    fn owned_by(&self, entry: &Path, pkg_dir: &Path) -> bool;

    /// Create the entry for `bin_name` pointing at `script`.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn link(&self, bin_dir: &Path, bin_name: &str, script: &Path) -> io::Result<()>;
}

/// One symlink per bin (Unix).
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkBins;

impl BinLinker for SymlinkBins {
    fn entry_paths(&self, bin_dir: &Path, bin_name: &str) -> Vec<PathBuf> {
        vec![bin_dir.join(bin_name)]
    }

    fn owned_by(&self, entry: &Path, pkg_dir: &Path) -> bool {
        let Ok(target) = fs::read_link(entry) else {
            return false;
        };
        let base = entry.parent().unwrap_or(Path::new("."));
        let joined = normalize(&base.join(target));
        if joined.starts_with(pkg_dir) {
            return true;
        }
        // Link targets may traverse symlinked package dirs
        match (dunce::canonicalize(entry), dunce::canonicalize(pkg_dir)) {
            (Ok(real), Ok(real_pkg)) => real.starts_with(real_pkg),
            _ => false,
        }
    }

    fn link(&self, bin_dir: &Path, bin_name: &str, script: &Path) -> io::Result<()> {
        fs::create_dir_all(bin_dir)?;
        let entry = bin_dir.join(bin_name);
        match fs::remove_file(&entry) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let target = relative_to(bin_dir, script);
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(&target, &entry);
        #[cfg(windows)]
        let result = std::os::windows::fs::symlink_file(&target, &entry);
        result
    }
}

/// `name`, `name.cmd`, and `name.ps1` shims (Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShimBins;

impl ShimBins {
    const EXTENSIONS: [&'static str; 3] = ["", ".cmd", ".ps1"];
}

impl BinLinker for ShimBins {
    fn entry_paths(&self, bin_dir: &Path, bin_name: &str) -> Vec<PathBuf> {
        Self::EXTENSIONS
            .iter()
            .map(|ext| bin_dir.join(format!("{bin_name}{ext}")))
            .collect()
    }

    fn owned_by(&self, entry: &Path, pkg_dir: &Path) -> bool {
        let Ok(content) = fs::read_to_string(entry) else {
            return false;
        };
        let bin_dir = entry.parent().unwrap_or(Path::new("."));
        let rel = relative_to(bin_dir, pkg_dir);
        let needle = format!("{}/", rel.to_string_lossy().replace('\\', "/"));
        content.replace('\\', "/").contains(&needle)
    }

    fn link(&self, bin_dir: &Path, bin_name: &str, script: &Path) -> io::Result<()> {
        fs::create_dir_all(bin_dir)?;
        let rel = relative_to(bin_dir, script)
            .to_string_lossy()
            .replace('\\', "/");
        let win_rel = rel.replace('/', "\\");

        let sh = format!(
            "#!/bin/sh\nbasedir=$(dirname \"$(echo \"$0\" | sed -e 's,\\\\,/,g')\")\nexec node \"$basedir/{rel}\" \"$@\"\n"
        );
        let cmd = format!("@ECHO off\r\nnode \"%~dp0\\{win_rel}\" %*\r\n");
        let ps1 = format!(
            "#!/usr/bin/env pwsh\n$basedir=Split-Path $MyInvocation.MyCommand.Definition -Parent\n& node \"$basedir/{rel}\" $args\nexit $LASTEXITCODE\n"
        );

        for (path, body) in self.entry_paths(bin_dir, bin_name).iter().zip([sh, cmd, ps1]) {
            fs::write(path, body)?;
        }
        Ok(())
    }
}

/// The linker for the current platform.
#[must_use]
pub fn platform_linker() -> Box<dyn BinLinker> {
    if cfg!(windows) {
        Box::new(ShimBins)
    } else {
        Box::new(SymlinkBins)
    }
}

/// The `.bin` directory serving a package installed at `pkg_path`: the one
/// in the same `node_modules`, one level further up for scoped packages.
#[must_use]
pub fn bin_dir_for(pkg_path: &Path) -> Option<PathBuf> {
    let mut dir = pkg_path.parent()?;
    if dir
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with('@'))
    {
        dir = dir.parent()?;
    }
    (dir.file_name()? == "node_modules").then(|| dir.join(BIN_DIR))
}

/// Existing bin entries that belong to node `id` and should go with it.
///
/// Links contribute the bins of their target package. Entries now owned by
/// another package (a later writer of the same name) are left out.
#[must_use]
pub fn owned_entries(tree: &Tree, id: NodeId, linker: &dyn BinLinker) -> Vec<PathBuf> {
    let Some(node) = tree.node(id) else {
        return Vec::new();
    };
    let bins = node
        .link_target
        .and_then(|t| tree.node(t))
        .map_or(&node.bins, |target| &target.bins);
    let Some(bin_dir) = bin_dir_for(&node.path) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for name in bins.keys() {
        let name = name.rsplit('/').next().unwrap_or(name);
        for entry in linker.entry_paths(&bin_dir, name) {
            if fs::symlink_metadata(&entry).is_ok() && linker.owned_by(&entry, &node.path) {
                entries.push(entry);
            }
        }
    }
    entries
}

/// Lexically resolve `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Relative path from directory `from` to `to`.
fn relative_to(from: &Path, to: &Path) -> PathBuf {
    let from_norm = normalize(from);
    let to_norm = normalize(to);
    let from: Vec<_> = from_norm.components().collect();
    let to: Vec<_> = to_norm.components().collect();

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component);
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn package_with_bin(root: &Path, name: &str, bin: &str) -> PathBuf {
        let dir = root.join("node_modules").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{bin}.js")), "").unwrap();
        dir
    }

    #[test]
    fn test_bin_dir_for() {
        assert_eq!(
            bin_dir_for(Path::new("/p/node_modules/a")).unwrap(),
            PathBuf::from("/p/node_modules/.bin")
        );
        assert_eq!(
            bin_dir_for(Path::new("/p/node_modules/@s/a")).unwrap(),
            PathBuf::from("/p/node_modules/.bin")
        );
        assert_eq!(
            bin_dir_for(Path::new("/p/node_modules/a/node_modules/b")).unwrap(),
            PathBuf::from("/p/node_modules/a/node_modules/.bin")
        );
        assert!(bin_dir_for(Path::new("/p/packages/a")).is_none());
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Path::new("/p/node_modules/.bin"), Path::new("/p/node_modules/yes/cli.js")),
            PathBuf::from("../yes/cli.js")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_ownership() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let yes = package_with_bin(root, "yes", "yes");
        let other = package_with_bin(root, "other", "yes");
        let bin_dir = root.join("node_modules/.bin");

        SymlinkBins.link(&bin_dir, "yes", &yes.join("yes.js")).unwrap();
        let entry = bin_dir.join("yes");
        assert!(SymlinkBins.owned_by(&entry, &yes));
        assert!(!SymlinkBins.owned_by(&entry, &other));

        // Last writer takes the name over
        SymlinkBins.link(&bin_dir, "yes", &other.join("yes.js")).unwrap();
        assert!(!SymlinkBins.owned_by(&entry, &yes));
        assert!(SymlinkBins.owned_by(&entry, &other));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_link_reports_unremovable_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let yes = package_with_bin(root, "yes", "yes");
        let bin_dir = root.join("node_modules/.bin");
        // A directory squatting on the entry name cannot be unlinked
        fs::create_dir_all(bin_dir.join("yes/inner")).unwrap();

        let err = SymlinkBins
            .link(&bin_dir, "yes", &yes.join("yes.js"))
            .unwrap_err();
        assert_ne!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(bin_dir.join("yes/inner").is_dir());
    }

    #[test]
    fn test_shim_ownership() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let yes = package_with_bin(root, "yes", "yes");
        let yesno = package_with_bin(root, "yesno", "yes");
        let bin_dir = root.join("node_modules/.bin");

        ShimBins.link(&bin_dir, "yes", &yes.join("yes.js")).unwrap();
        let paths = ShimBins.entry_paths(&bin_dir, "yes");
        assert_eq!(paths.len(), 3);
        for path in &paths {
            assert!(path.is_file());
            assert!(ShimBins.owned_by(path, &yes));
            // "yes/" must not match inside "yesno/"
            assert!(!ShimBins.owned_by(path, &yesno));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_owned_entries_skips_foreign_and_missing() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let a_dir = package_with_bin(root, "a", "tool");
        let b_dir = package_with_bin(root, "b", "tool");
        let bin_dir = root.join("node_modules/.bin");

        let mut tree = Tree::new("root", None, root);
        let root_id = tree.root_id();
        let a = tree.add_child(root_id, "a", "1.0.0");
        let b = tree.add_child(root_id, "b", "1.0.0");
        for id in [a, b] {
            let node = tree.node_mut(id).unwrap();
            node.bins.insert("tool".into(), "tool.js".into());
            node.bins.insert("never-linked".into(), "x.js".into());
        }

        SymlinkBins.link(&bin_dir, "tool", &a_dir.join("tool.js")).unwrap();
        SymlinkBins.link(&bin_dir, "tool", &b_dir.join("tool.js")).unwrap();

        assert!(owned_entries(&tree, a, &SymlinkBins).is_empty());
        assert_eq!(owned_entries(&tree, b, &SymlinkBins), vec![bin_dir.join("tool")]);
    }
}
