//! npm lockfile model.
//!
//! Covers `package-lock.json`, `npm-shrinkwrap.json`, and the hidden lockfile
//! at `node_modules/.package-lock.json`. All three share one format:
//!
//! ```json
//! {
//!   "name": "my-project",
//!   "version": "1.0.0",
//!   "lockfileVersion": 3,
//!   "requires": true,
//!   "packages": {
//!     "": { "name": "my-project", "dependencies": { "a": "^1.0.0" } },
//!     "node_modules/a": { "version": "1.0.0", "resolved": "...", "integrity": "..." }
//!   }
//! }
//! ```
//!
//! Keys of `packages` are locations relative to the project root. Fields this
//! crate does not interpret are carried through unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lockfile versions with a `packages` section.
pub const SUPPORTED_LOCKFILE_VERSIONS: [u32; 2] = [2, 3];

/// Version written for lockfiles created from scratch.
pub const DEFAULT_LOCKFILE_VERSION: u32 = 3;

/// Primary lockfile filename.
pub const PACKAGE_LOCK: &str = "package-lock.json";

/// Publishable lockfile; takes precedence over `package-lock.json`.
pub const SHRINKWRAP: &str = "npm-shrinkwrap.json";

/// Hidden lockfile filename inside `node_modules`.
pub const HIDDEN_LOCKFILE: &str = ".package-lock.json";

/// Lockfile error codes.
pub mod codes {
    /// Lockfile not found at the expected path.
    pub const PKG_LOCK_NOT_FOUND: &str = "PKG_LOCK_NOT_FOUND";
    /// Lockfile has invalid JSON.
    pub const PKG_LOCK_INVALID_JSON: &str = "PKG_LOCK_INVALID_JSON";
    /// Lockfile version without a `packages` section.
    pub const PKG_LOCK_VERSION_MISMATCH: &str = "PKG_LOCK_VERSION_MISMATCH";
    /// Lockfile write failed.
    pub const PKG_LOCK_WRITE_FAILED: &str = "PKG_LOCK_WRITE_FAILED";
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !b
}

/// One entry of the `packages` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    /// Package name, recorded when it differs from the location's last segment
    /// (aliases) and for the root entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// For links: location of the target. Otherwise the fetch URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub link: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev_optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub peer: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub extraneous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies_meta: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bin: BTreeMap<String, String>,
    /// Everything else (`engines`, `os`, `cpu`, `hasInstallScript`,
    /// `workspaces`, `funding`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LockEntry {
    /// Workspace glob patterns recorded on the root entry.
    #[must_use]
    pub fn workspaces(&self) -> Vec<String> {
        match self.extra.get("workspaces") {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(Value::Object(obj)) => obj
                .get("packages")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Whether `name` is marked as an optional peer.
    #[must_use]
    pub fn is_optional_peer(&self, name: &str) -> bool {
        self.peer_dependencies_meta
            .get(name)
            .and_then(|m| m.get("optional"))
            .and_then(Value::as_bool)
            == Some(true)
    }
}

/// A parsed lockfile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub lockfile_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<bool>,
    /// Location → entry. `BTreeMap` keeps output deterministic.
    #[serde(default)]
    pub packages: BTreeMap<String, LockEntry>,
    /// Legacy `dependencies` tree (lockfileVersion 2) and unknown fields.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PackageLock {
    /// Create an empty lockfile for a project.
    #[must_use]
    pub fn new(name: Option<String>, version: Option<String>) -> Self {
        Self {
            name,
            version,
            lockfile_version: DEFAULT_LOCKFILE_VERSION,
            requires: Some(true),
            packages: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Find the lockfile a project uses: `npm-shrinkwrap.json` if present,
    /// else `package-lock.json` if present.
    #[must_use]
    pub fn locate(root: &Path) -> Option<PathBuf> {
        [SHRINKWRAP, PACKAGE_LOCK]
            .iter()
            .map(|name| root.join(name))
            .find(|p| p.is_file())
    }

    /// Path of the hidden lockfile for a project.
    #[must_use]
    pub fn hidden_path(root: &Path) -> PathBuf {
        root.join("node_modules").join(HIDDEN_LOCKFILE)
    }

    /// The root (`""`) entry, if recorded.
    #[must_use]
    pub fn root_entry(&self) -> Option<&LockEntry> {
        self.packages.get("")
    }

    /// Remove a location from the lockfile, including its node in the legacy
    /// `dependencies` tree when one is present.
    pub fn remove(&mut self, location: &str) -> Option<LockEntry> {
        let removed = self.packages.remove(location);
        if let Some(legacy) = self.extra.get_mut("dependencies") {
            remove_legacy(legacy, location);
        }
        removed
    }

    /// Read a lockfile from a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if its
    /// `lockfileVersion` predates the `packages` section.
    pub fn read_from(path: &Path) -> Result<Self, LockfileError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LockfileError::new(
                    codes::PKG_LOCK_NOT_FOUND,
                    format!("Lockfile not found: {}", path.display()),
                )
            } else {
                LockfileError::new(
                    codes::PKG_LOCK_INVALID_JSON,
                    format!("Failed to read lockfile: {e}"),
                )
            }
        })?;

        let lockfile = Self::from_json(&content)?;

        if !SUPPORTED_LOCKFILE_VERSIONS.contains(&lockfile.lockfile_version) {
            return Err(LockfileError::new(
                codes::PKG_LOCK_VERSION_MISMATCH,
                format!(
                    "Lockfile version {} not supported in {} (expected 2 or 3)",
                    lockfile.lockfile_version,
                    path.display()
                ),
            ));
        }

        Ok(lockfile)
    }

    /// Serialize in npm's layout: two-space indent plus trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, LockfileError> {
        let mut content = serde_json::to_string_pretty(self).map_err(|e| {
            LockfileError::new(
                codes::PKG_LOCK_WRITE_FAILED,
                format!("Failed to serialize lockfile: {e}"),
            )
        })?;
        content.push('\n');
        Ok(content)
    }

    /// Deserialize from JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, LockfileError> {
        serde_json::from_str(json).map_err(|e| {
            LockfileError::new(
                codes::PKG_LOCK_INVALID_JSON,
                format!("Invalid lockfile JSON: {e}"),
            )
        })
    }

    /// Write the lockfile atomically, skipping the write when the file
    /// already holds identical content. Returns whether it wrote.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<bool, LockfileError> {
        let content = self.to_json()?;
        arbor_util::fs::write_if_changed(path, content.as_bytes()).map_err(|e| {
            LockfileError::new(
                codes::PKG_LOCK_WRITE_FAILED,
                format!("Failed to write lockfile {}: {e}", path.display()),
            )
        })
    }
}

/// `node_modules/a/node_modules/@s/b` → `dependencies.a.dependencies["@s/b"]`.
fn remove_legacy(tree: &mut Value, location: &str) {
    let names = location_names(location);
    let Some((last, parents)) = names.split_last() else {
        return;
    };
    let mut current = tree;
    for name in parents {
        let Some(next) = current
            .get_mut(name.as_str())
            .and_then(|dep| dep.get_mut("dependencies"))
        else {
            return;
        };
        current = next;
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(last.as_str());
    }
}

/// Package names along a `node_modules` location, outermost first.
#[must_use]
pub fn location_names(location: &str) -> Vec<String> {
    location
        .split("node_modules/")
        .map(|s| s.trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Lockfile error.
#[derive(Debug)]
pub struct LockfileError {
    code: &'static str,
    message: String,
}

impl LockfileError {
    /// Create a new error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LockfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LockfileError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> PackageLock {
        serde_json::from_value(json!({
            "name": "proj",
            "version": "1.0.0",
            "lockfileVersion": 2,
            "requires": true,
            "packages": {
                "": {
                    "name": "proj",
                    "version": "1.0.0",
                    "dependencies": { "a": "^1.0.0" },
                    "devDependencies": { "b": "^1.0.0" },
                    "workspaces": ["packages/*"]
                },
                "node_modules/a": {
                    "version": "1.0.0",
                    "resolved": "https://registry.npmjs.org/a/-/a-1.0.0.tgz",
                    "integrity": "sha512-aaa",
                    "engines": { "node": ">=10" }
                },
                "node_modules/b": { "version": "1.0.0", "dev": true },
                "node_modules/b/node_modules/c": { "version": "2.0.0", "dev": true }
            },
            "dependencies": {
                "a": { "version": "1.0.0" },
                "b": {
                    "version": "1.0.0",
                    "dev": true,
                    "dependencies": { "c": { "version": "2.0.0", "dev": true } }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_error_codes_are_uppercase() {
        let all_codes = [
            codes::PKG_LOCK_NOT_FOUND,
            codes::PKG_LOCK_INVALID_JSON,
            codes::PKG_LOCK_VERSION_MISMATCH,
            codes::PKG_LOCK_WRITE_FAILED,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn test_parse_entries_and_flags() {
        let lock = sample();
        assert_eq!(lock.lockfile_version, 2);
        assert_eq!(lock.packages.len(), 4);

        let root = lock.root_entry().unwrap();
        assert_eq!(root.dev_dependencies["b"], "^1.0.0");
        assert_eq!(root.workspaces(), vec!["packages/*"]);

        assert!(lock.packages["node_modules/b"].dev);
        assert!(!lock.packages["node_modules/a"].dev);
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let lock = sample();
        let json = lock.to_json().unwrap();
        assert!(json.ends_with("}\n"));

        let reread = PackageLock::from_json(&json).unwrap();
        assert_eq!(
            reread.packages["node_modules/a"].extra["engines"],
            json!({ "node": ">=10" })
        );
        assert!(reread.extra.contains_key("dependencies"));
        assert_eq!(lock, reread);
    }

    #[test]
    fn test_remove_prunes_legacy_tree() {
        let mut lock = sample();
        assert!(lock.remove("node_modules/b/node_modules/c").is_some());
        assert_eq!(
            lock.extra["dependencies"]["b"]["dependencies"],
            json!({})
        );

        lock.remove("node_modules/a");
        assert!(lock.extra["dependencies"].get("a").is_none());
        assert!(!lock.packages.contains_key("node_modules/a"));
        assert!(lock.remove("node_modules/missing").is_none());
    }

    #[test]
    fn test_location_names() {
        assert_eq!(
            location_names("node_modules/a/node_modules/@s/b"),
            vec!["a", "@s/b"]
        );
        assert!(location_names("").is_empty());
    }

    #[test]
    fn test_optional_peer_meta() {
        let entry: LockEntry = serde_json::from_value(json!({
            "version": "1.0.0",
            "peerDependencies": { "p": "*" },
            "peerDependenciesMeta": { "p": { "optional": true } }
        }))
        .unwrap();
        assert!(entry.is_optional_peer("p"));
        assert!(!entry.is_optional_peer("q"));
    }

    #[test]
    fn test_lockfile_error() {
        let err = LockfileError::new(codes::PKG_LOCK_NOT_FOUND, "File not found");
        assert_eq!(err.code(), codes::PKG_LOCK_NOT_FOUND);
        assert_eq!(err.message(), "File not found");
        assert!(err.to_string().contains("PKG_LOCK_NOT_FOUND"));
    }

    #[test]
    fn test_lockfile_read_not_found() {
        let result = PackageLock::read_from(Path::new("/nonexistent/package-lock.json"));
        let err = result.unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCK_NOT_FOUND);
    }

    #[test]
    fn test_lockfile_read_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PACKAGE_LOCK);
        std::fs::write(&path, "not valid json").unwrap();

        let err = PackageLock::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCK_INVALID_JSON);
    }

    #[test]
    fn test_lockfile_v1_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PACKAGE_LOCK);
        std::fs::write(&path, r#"{"lockfileVersion": 1, "dependencies": {}}"#).unwrap();

        let err = PackageLock::read_from(&path).unwrap_err();
        assert_eq!(err.code(), codes::PKG_LOCK_VERSION_MISMATCH);
    }

    #[test]
    fn test_write_skips_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PACKAGE_LOCK);
        let lock = sample();

        assert!(lock.write_to(&path).unwrap());
        assert!(!lock.write_to(&path).unwrap());
        assert_eq!(PackageLock::read_from(&path).unwrap(), lock);
    }

    #[test]
    fn test_locate_prefers_shrinkwrap() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackageLock::locate(dir.path()).is_none());

        std::fs::write(dir.path().join(PACKAGE_LOCK), "{}").unwrap();
        assert_eq!(
            PackageLock::locate(dir.path()).unwrap(),
            dir.path().join(PACKAGE_LOCK)
        );

        std::fs::write(dir.path().join(SHRINKWRAP), "{}").unwrap();
        assert_eq!(
            PackageLock::locate(dir.path()).unwrap(),
            dir.path().join(SHRINKWRAP)
        );
    }
}
