//! `package.json` reading.
//!
//! Extracts the fields the tree loaders need: identity, the four dependency
//! sections, executables, and workspace patterns.

use super::error::{codes, PkgError};
use super::graph::DepType;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Manifest filename.
pub const PACKAGE_JSON: &str = "package.json";

/// Error encountered while extracting a single manifest field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgDepError {
    /// Dependency or section name.
    pub name: String,
    /// Error code.
    pub code: &'static str,
    /// Error message.
    pub message: String,
}

impl PkgDepError {
    /// Create a new dependency error.
    #[must_use]
    pub fn new(name: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code,
            message: message.into(),
        }
    }

    /// Create an invalid range error.
    #[must_use]
    pub fn invalid_range(name: &str, actual_type: &str) -> Self {
        Self::new(
            name,
            codes::PKG_DEP_RANGE_INVALID,
            format!("expected string, got {actual_type}"),
        )
    }

    /// Create an invalid section error.
    #[must_use]
    pub fn invalid_section(section: &str, actual_type: &str) -> Self {
        Self::new(
            section,
            codes::PKG_PACKAGE_JSON_INVALID,
            format!("'{section}' must be an object, got {actual_type}"),
        )
    }
}

/// A dependency as declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDep {
    pub name: String,
    pub spec: String,
    pub dep_type: DepType,
}

/// The parts of a `package.json` this crate cares about.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
    pub peer_dependencies: BTreeMap<String, String>,
    /// Peers marked `{"optional": true}` in `peerDependenciesMeta`.
    pub optional_peers: BTreeSet<String>,
    /// Bin name → script path.
    pub bin: BTreeMap<String, String>,
    /// Workspace glob patterns (root manifests only).
    pub workspaces: Vec<String>,
    pub resolved: Option<String>,
    pub integrity: Option<String>,
    pub license: Option<String>,
    /// Field-level problems that did not prevent reading the manifest.
    pub errors: Vec<PkgDepError>,
}

impl Manifest {
    /// Read and parse a `package.json` file.
    ///
    /// # Errors
    /// Returns `PKG_PACKAGE_JSON_NOT_FOUND` if the file is absent and
    /// `PKG_PACKAGE_JSON_INVALID` if it is unreadable or not a JSON object.
    pub fn read(package_json_path: &Path) -> Result<Self, PkgError> {
        let content = match fs::read_to_string(package_json_path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PkgError::package_json_not_found(package_json_path));
            }
            Err(e) => {
                return Err(PkgError::package_json_invalid(format!(
                    "Failed to read {}: {e}",
                    package_json_path.display()
                )));
            }
        };

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            PkgError::package_json_invalid(format!(
                "Invalid JSON in {}: {e}",
                package_json_path.display()
            ))
        })?;

        Self::from_value(&value)
    }

    /// Build a manifest from already-parsed JSON.
    ///
    /// # Errors
    /// Returns `PKG_PACKAGE_JSON_INVALID` if the value is not an object.
    pub fn from_value(value: &Value) -> Result<Self, PkgError> {
        let root = value
            .as_object()
            .ok_or_else(|| PkgError::package_json_invalid("package.json must be a JSON object"))?;

        let mut manifest = Self {
            name: string_field(root, "name"),
            version: string_field(root, "version"),
            resolved: string_field(root, "_resolved"),
            integrity: string_field(root, "_integrity"),
            license: string_field(root, "license"),
            ..Self::default()
        };

        let mut errors = Vec::new();
        manifest.dependencies = extract_section(root, "dependencies", &mut errors);
        manifest.dev_dependencies = extract_section(root, "devDependencies", &mut errors);
        manifest.optional_dependencies =
            extract_section(root, "optionalDependencies", &mut errors);
        manifest.peer_dependencies = extract_section(root, "peerDependencies", &mut errors);
        manifest.optional_peers = extract_optional_peers(root);
        manifest.bin = extract_bin(root, manifest.name.as_deref());
        manifest.workspaces = extract_workspaces(root);
        manifest.errors = errors;

        Ok(manifest)
    }

    /// Dependencies this package declares, one per name.
    ///
    /// Sections are read in the order development, peer, production,
    /// optional, and a later section replaces an earlier declaration of the
    /// same name. A package listed in `dependencies` therefore stays a
    /// production edge even when it is also a peer. Development
    /// dependencies are only included when `include_dev` is set (project
    /// roots and workspace members).
    #[must_use]
    pub fn declared(&self, include_dev: bool) -> Vec<DeclaredDep> {
        let mut by_name: BTreeMap<String, DeclaredDep> = BTreeMap::new();

        let mut put = |name: &String, spec: &String, dep_type: DepType| {
            by_name.insert(
                name.clone(),
                DeclaredDep {
                    name: name.clone(),
                    spec: spec.clone(),
                    dep_type,
                },
            );
        };

        if include_dev {
            for (name, spec) in &self.dev_dependencies {
                put(name, spec, DepType::Dev);
            }
        }
        for (name, spec) in &self.peer_dependencies {
            let dep_type = if self.optional_peers.contains(name) {
                DepType::PeerOptional
            } else {
                DepType::Peer
            };
            put(name, spec, dep_type);
        }
        for (name, spec) in &self.dependencies {
            put(name, spec, DepType::Prod);
        }
        for (name, spec) in &self.optional_dependencies {
            put(name, spec, DepType::Optional);
        }

        by_name.into_values().collect()
    }
}

fn string_field(root: &Map<String, Value>, key: &str) -> Option<String> {
    root.get(key).and_then(Value::as_str).map(String::from)
}

/// Extract one dependency section, recording non-string ranges as errors.
fn extract_section(
    root: &Map<String, Value>,
    section: &str,
    errors: &mut Vec<PkgDepError>,
) -> BTreeMap<String, String> {
    let mut deps = BTreeMap::new();

    let Some(section_value) = root.get(section) else {
        return deps;
    };

    let Some(section_obj) = section_value.as_object() else {
        errors.push(PkgDepError::invalid_section(
            section,
            json_type_name(section_value),
        ));
        return deps;
    };

    for (name, range_value) in section_obj {
        if let Some(range) = range_value.as_str() {
            deps.insert(name.clone(), range.to_string());
        } else {
            errors.push(PkgDepError::invalid_range(
                name,
                json_type_name(range_value),
            ));
        }
    }

    deps
}

fn extract_optional_peers(root: &Map<String, Value>) -> BTreeSet<String> {
    root.get("peerDependenciesMeta")
        .and_then(Value::as_object)
        .map(|meta| {
            meta.iter()
                .filter(|(_, v)| v.get("optional").and_then(Value::as_bool) == Some(true))
                .map(|(name, _)| name.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// `"bin": "cli.js"` is shorthand for `{"<unscoped name>": "cli.js"}`.
fn extract_bin(root: &Map<String, Value>, name: Option<&str>) -> BTreeMap<String, String> {
    match root.get("bin") {
        Some(Value::String(script)) => name
            .map(|n| n.rsplit('/').next().unwrap_or(n))
            .filter(|n| !n.is_empty())
            .map(|n| BTreeMap::from([(n.to_string(), script.clone())]))
            .unwrap_or_default(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Workspaces can be an array or an object with a `packages` field.
fn extract_workspaces(root: &Map<String, Value>) -> Vec<String> {
    let patterns = match root.get("workspaces") {
        Some(Value::Array(arr)) => Some(arr),
        Some(Value::Object(obj)) => obj.get("packages").and_then(Value::as_array),
        _ => None,
    };
    patterns
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Get a human-readable type name for a JSON value.
fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
