//! Tree loaders.
//!
//! - [`load_actual`] reads what is installed under `node_modules`.
//! - [`load_virtual`] reads what the lockfile says should be installed.
//!
//! Both produce a [`Tree`] whose root edges come from the current
//! `package.json`, with workspace members attached as extra walk roots.

mod actual;
mod virtual_tree;

pub use actual::load_actual;
pub use virtual_tree::load_virtual;

use super::error::PkgError;
use super::graph::{relative_location, GraphErrorInfo, Node, NodeId, Tree};
use super::manifest::{Manifest, PACKAGE_JSON};
use super::workspaces::WorkspaceConfig;
use std::path::{Path, PathBuf};

/// Canonical project root. A missing directory reports its `package.json`.
fn project_root(root: &Path) -> Result<PathBuf, PkgError> {
    dunce::canonicalize(root).map_err(|_| PkgError::package_json_not_found(&root.join(PACKAGE_JSON)))
}

/// Tree holding only the root, named after the manifest or the directory.
fn new_tree(root: &Path, manifest: &Manifest) -> Tree {
    let name = manifest.name.clone().unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let mut tree = Tree::new(name, manifest.version.clone(), root);
    if let Some(node) = tree.node_mut(tree.root_id()) {
        node.bins.clone_from(&manifest.bin);
        node.license.clone_from(&manifest.license);
    }
    tree
}

/// Detached node carrying a manifest's identity and metadata.
fn node_from_manifest(name: &str, path: &Path, manifest: &Manifest) -> Node {
    let mut node = Node::new(name, manifest.version.clone(), path);
    node.bins.clone_from(&manifest.bin);
    node.resolved.clone_from(&manifest.resolved);
    node.integrity.clone_from(&manifest.integrity);
    node.license.clone_from(&manifest.license);
    node
}

/// Declare a manifest's dependencies as edges out of `id`, recording any
/// malformed ranges on the tree.
fn add_declared_edges(tree: &mut Tree, id: NodeId, manifest: &Manifest, include_dev: bool) {
    for dep in manifest.declared(include_dev) {
        tree.add_edge(id, &dep.name, &dep.spec, dep.dep_type);
    }
    if manifest.errors.is_empty() {
        return;
    }
    let location = tree.location(id);
    for err in &manifest.errors {
        tree.errors.push(GraphErrorInfo::new(
            err.code,
            location.clone(),
            format!("{}: {}", err.name, err.message),
        ));
    }
}

/// Add each workspace member as a node outside the install area, plus one
/// workspace edge from the root. Returns the member ids and their paths.
fn add_workspace_members(tree: &mut Tree, config: &WorkspaceConfig) -> Vec<(NodeId, PathBuf)> {
    let root = tree.root_id();
    let mut members = Vec::new();

    for (name, pkg) in &config.packages {
        let mut node = node_from_manifest(name, &pkg.path, &pkg.manifest);
        node.is_workspace = true;
        node.fs_parent = Some(root);
        let id = tree.insert(node, None);
        tree.workspaces.insert(name.clone(), id);

        let spec = format!("file:{}", relative_location(&tree.path, &pkg.path));
        tree.add_workspace_edge(name, &spec);
        add_declared_edges(tree, id, &pkg.manifest, true);
        members.push((id, pkg.path.clone()));
    }
    members
}

/// `fs_parent` for a node outside any `node_modules`: the root when the
/// node's directory sits inside the project.
fn outside_parent(tree: &Tree, path: &Path) -> Option<NodeId> {
    (path != tree.path && path.starts_with(&tree.path)).then(|| tree.root_id())
}
