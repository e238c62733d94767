//! Virtual tree: what the lockfile declares.

use super::{add_declared_edges, add_workspace_members, new_tree, outside_parent, project_root};
use crate::pkg::error::PkgError;
use crate::pkg::graph::{codes, GraphErrorInfo, Node, NodeId, Tree};
use crate::pkg::lockfile::{codes as lock_codes, LockEntry, PackageLock};
use crate::pkg::manifest::{Manifest, PACKAGE_JSON};
use crate::pkg::walker::calc_dep_flags;
use crate::pkg::workspaces::discover_workspaces;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Load the tree declared by the project's lockfile.
///
/// The root's edges come from the current `package.json`; every other node
/// and edge comes from the lockfile's `packages` map. Each node keeps the
/// entry it was built from so the lockfile can be rewritten faithfully.
///
/// Returns `Ok(None)` when the project has no lockfile, or only one in the
/// pre-`packages` format.
///
/// # Errors
/// Returns an error if the root `package.json` is missing or invalid, or the
/// lockfile cannot be read or parsed.
pub fn load_virtual(root: &Path) -> Result<Option<Tree>, PkgError> {
    let root = project_root(root)?;
    let Some(lock_path) = PackageLock::locate(&root) else {
        return Ok(None);
    };
    let lock = match PackageLock::read_from(&lock_path) {
        Ok(lock) => lock,
        Err(e) if e.code() == lock_codes::PKG_LOCK_VERSION_MISMATCH => {
            warn!(lockfile = %lock_path.display(), "{}", e.message());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let manifest = Manifest::read(&root.join(PACKAGE_JSON))?;

    let tree = build(&root, &manifest, &lock);
    debug!(
        lockfile = %lock_path.display(),
        nodes = tree.len(),
        "loaded virtual tree"
    );
    Ok(Some(tree))
}

fn build(root: &Path, manifest: &Manifest, lock: &PackageLock) -> Tree {
    let mut tree = new_tree(root, manifest);
    let root_id = tree.root_id();
    let mut by_location: HashMap<String, NodeId> = HashMap::new();
    by_location.insert(String::new(), root_id);
    if let Some(node) = tree.node_mut(root_id) {
        node.lock_entry = lock.root_entry().cloned();
    }

    if let Some(config) = discover_workspaces(root, &manifest.workspaces) {
        for (id, _) in add_workspace_members(&mut tree, &config) {
            let location = tree.location(id);
            if let Some(node) = tree.node_mut(id) {
                node.lock_entry = lock.packages.get(&location).cloned();
            }
            by_location.insert(location, id);
        }
    }
    add_declared_edges(&mut tree, root_id, manifest, true);

    // Parents before children: depth is the number of node_modules hops
    let mut locations: Vec<(&String, &LockEntry)> = lock
        .packages
        .iter()
        .filter(|(loc, _)| !loc.is_empty() && !by_location.contains_key(*loc))
        .collect();
    let depth = |loc: &str| loc.matches("node_modules/").count();
    locations.sort_by(|(a, _), (b, _)| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));

    let mut links: Vec<(NodeId, String)> = Vec::new();
    for (location, entry) in locations {
        let path = location_path(root, location);
        let (parent, name) = match split_location(location) {
            Some((parent_loc, name)) => match by_location.get(parent_loc) {
                Some(&parent) => (Some(parent), name.to_string()),
                None => {
                    tree.errors.push(GraphErrorInfo::new(
                        codes::PKG_GRAPH_LOCK_ENTRY_INVALID,
                        location.clone(),
                        format!("No entry for containing package '{parent_loc}'"),
                    ));
                    continue;
                }
            },
            // Outside node_modules: a link target
            None => (None, entry.name.clone().unwrap_or_else(|| last_segment(location))),
        };

        let mut node = Node::new(name, entry.version.clone(), &path);
        node.bins.clone_from(&entry.bin);
        node.integrity.clone_from(&entry.integrity);
        node.license.clone_from(&entry.license);
        // For links, `resolved` is the target's location
        let link_target = if entry.link {
            entry.resolved.clone()
        } else {
            node.resolved.clone_from(&entry.resolved);
            None
        };
        node.lock_entry = Some(entry.clone());
        if parent.is_none() {
            node.fs_parent = outside_parent(&tree, &path);
        }

        let id = tree.insert(node, parent);
        if let Some(target) = link_target {
            links.push((id, target));
        }
        by_location.insert(location.clone(), id);
        if !entry.link {
            add_declared_edges(&mut tree, id, &entry_manifest(entry), false);
        }
    }

    for (link, target_loc) in links {
        let target = match by_location.get(&target_loc) {
            Some(&id) => id,
            None => {
                let path = location_path(root, &target_loc);
                let mut node = Node::new(last_segment(&target_loc), None, &path);
                node.fs_parent = outside_parent(&tree, &path);
                let id = tree.insert(node, None);
                by_location.insert(target_loc.clone(), id);
                id
            }
        };
        let version = tree.node(target).and_then(|n| n.version.clone());
        if let Some(node) = tree.node_mut(link) {
            node.link_target = Some(target);
            if node.version.is_none() {
                node.version = version;
            }
        }
    }

    tree.resolve_edges();
    calc_dep_flags(&mut tree);
    tree
}

/// Dependency sections of a lockfile entry, in manifest form.
fn entry_manifest(entry: &LockEntry) -> Manifest {
    Manifest {
        dependencies: entry.dependencies.clone(),
        optional_dependencies: entry.optional_dependencies.clone(),
        peer_dependencies: entry.peer_dependencies.clone(),
        optional_peers: entry
            .peer_dependencies
            .keys()
            .filter(|name| entry.is_optional_peer(name))
            .cloned()
            .collect(),
        ..Manifest::default()
    }
}

/// `node_modules/a/node_modules/@s/b` → (`node_modules/a`, `@s/b`).
/// `None` for locations outside any `node_modules`.
fn split_location(location: &str) -> Option<(&str, &str)> {
    let idx = location.rfind("node_modules/")?;
    let parent = location[..idx].trim_end_matches('/');
    Some((parent, &location[idx + "node_modules/".len()..]))
}

fn last_segment(location: &str) -> String {
    location.rsplit('/').next().unwrap_or(location).to_string()
}

fn location_path(root: &Path, location: &str) -> PathBuf {
    location
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}
