//! Workspace discovery for monorepos.
//!
//! Expands the root manifest's `workspaces` globs (`packages/*`, `apps/web`)
//! into the member packages they name.

use super::manifest::{Manifest, PACKAGE_JSON};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A discovered workspace package.
#[derive(Debug, Clone)]
pub struct WorkspacePackage {
    /// Package name from package.json, or the directory name if it has none
    pub name: String,
    /// Absolute path to the workspace directory
    pub path: PathBuf,
    /// Version from package.json
    pub version: Option<String>,
    pub manifest: Manifest,
}

/// Workspace configuration from root package.json.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Root directory of the monorepo
    pub root: PathBuf,
    /// Map of package name -> workspace info
    pub packages: BTreeMap<String, WorkspacePackage>,
}

impl WorkspaceConfig {
    /// Check if a package name is a workspace package.
    #[must_use]
    pub fn is_workspace_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Get workspace package info by name.
    #[must_use]
    pub fn get_package(&self, name: &str) -> Option<&WorkspacePackage> {
        self.packages.get(name)
    }

    /// Workspace package whose directory is `path`.
    #[must_use]
    pub fn package_at(&self, path: &Path) -> Option<&WorkspacePackage> {
        self.packages.values().find(|p| p.path == path)
    }
}

/// Detect workspace configuration for a project root.
///
/// Returns `None` if the project doesn't use workspaces.
#[must_use]
pub fn detect_workspaces(project_root: &Path) -> Option<WorkspaceConfig> {
    let manifest = Manifest::read(&project_root.join(PACKAGE_JSON)).ok()?;
    discover_workspaces(project_root, &manifest.workspaces)
}

/// Expand glob patterns relative to `project_root` into workspace packages.
///
/// Returns `None` when no pattern matches a directory with a `package.json`.
#[must_use]
pub fn discover_workspaces(project_root: &Path, patterns: &[String]) -> Option<WorkspaceConfig> {
    if patterns.is_empty() {
        return None;
    }

    let mut packages = BTreeMap::new();
    for pattern in patterns {
        let full_pattern = project_root.join(pattern);
        let pattern_str = full_pattern.to_string_lossy();

        let Ok(entries) = glob::glob(&pattern_str) else {
            debug!(pattern = %pattern, "invalid workspace pattern");
            continue;
        };
        for entry in entries.flatten() {
            if let Some(pkg) = read_workspace_package(&entry) {
                packages.insert(pkg.name.clone(), pkg);
            }
        }
    }

    if packages.is_empty() {
        return None;
    }

    Some(WorkspaceConfig {
        root: project_root.to_path_buf(),
        packages,
    })
}

/// Read package info from a workspace directory.
fn read_workspace_package(dir: &Path) -> Option<WorkspacePackage> {
    if !dir.is_dir() || dir.components().any(|c| c.as_os_str() == "node_modules") {
        return None;
    }

    let manifest = Manifest::read(&dir.join(PACKAGE_JSON)).ok()?;
    let path = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let name = manifest
        .name
        .clone()
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))?;

    Some(WorkspacePackage {
        name,
        version: manifest.version.clone(),
        path,
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_pkg(dir: &Path, json: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(PACKAGE_JSON), json).unwrap();
    }

    #[test]
    fn test_detect_workspaces_array() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        write_pkg(root, r#"{"name": "root", "workspaces": ["packages/*"]}"#);
        write_pkg(
            &root.join("packages/a"),
            r#"{"name": "a", "version": "1.0.0", "dependencies": {"once": ""}}"#,
        );
        write_pkg(&root.join("packages/b"), r#"{"name": "b", "version": "1.2.3"}"#);

        let config = detect_workspaces(root).unwrap();
        assert_eq!(config.packages.len(), 2);
        assert!(config.is_workspace_package("a"));
        assert!(config.is_workspace_package("b"));
        assert_eq!(config.get_package("b").unwrap().version.as_deref(), Some("1.2.3"));
        assert_eq!(
            config.get_package("a").unwrap().manifest.dependencies["once"],
            ""
        );
    }

    #[test]
    fn test_detect_workspaces_object() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        write_pkg(root, r#"{"workspaces": {"packages": ["apps/*"]}}"#);
        write_pkg(&root.join("apps/web"), r#"{"name": "@acme/web"}"#);

        let config = detect_workspaces(root).unwrap();
        let web = config.get_package("@acme/web").unwrap();
        assert!(web.path.ends_with("apps/web"));
        assert!(config.package_at(&web.path).is_some());
    }

    #[test]
    fn test_unnamed_member_uses_directory_name() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        write_pkg(root, r#"{"workspaces": ["tools/lint"]}"#);
        write_pkg(&root.join("tools/lint"), "{}");

        let config = detect_workspaces(root).unwrap();
        assert!(config.is_workspace_package("lint"));
    }

    #[test]
    fn test_no_workspaces() {
        let dir = tempdir().unwrap();
        write_pkg(dir.path(), r#"{"name": "solo"}"#);
        assert!(detect_workspaces(dir.path()).is_none());
    }

    #[test]
    fn test_pattern_without_packages() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_pkg(root, r#"{"workspaces": ["packages/*"]}"#);
        fs::create_dir_all(root.join("packages/empty")).unwrap();
        assert!(detect_workspaces(root).is_none());
    }
}
