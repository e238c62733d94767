//! Lockfile synchronization after a prune.
//!
//! The lockfile describes what would be installed with nothing omitted, so it
//! is derived from the *declared* tree, never from what is left on disk.
//! Entries for omitted dependency classes stay; only entries no declaration
//! reaches at all are dropped.
//!
//! The hidden lockfile in `node_modules` is the opposite: a snapshot of what
//! is actually installed, rebuilt from the post-prune actual tree.

use super::graph::{DepType, NodeId, Tree};
use super::lockfile::{LockEntry, LockfileError, PackageLock};
use super::walker::{reachable, OmitSet, WalkOptions};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

/// What a lockfile sync changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Entries in the rewritten lockfile, root included.
    pub kept: usize,
    /// Locations dropped as extraneous.
    pub removed: Vec<String>,
    /// Locations kept although the omission set keeps them off disk.
    pub retained_omitted: Vec<String>,
    /// Whether the file on disk changed.
    pub written: bool,
}

/// Rebuild `existing` (or a fresh lockfile) from the declared tree.
///
/// Every node reachable from the walk roots with nothing omitted keeps an
/// entry. Existing entries are reused so fields this crate does not model
/// survive; their dependency flags are refreshed from the tree.
#[must_use]
pub fn sync_lockfile(
    declared: &Tree,
    omit: &OmitSet,
    existing: Option<PackageLock>,
) -> (PackageLock, SyncReport) {
    let root = declared.root();
    let mut lock = existing
        .unwrap_or_else(|| PackageLock::new(Some(root.name.clone()), root.version.clone()));
    lock.name = Some(root.name.clone());
    lock.version.clone_from(&root.version);

    let declared_reach = reachable(declared, &WalkOptions::default());
    let on_disk = reachable(
        declared,
        &WalkOptions {
            omit: omit.clone(),
            workspaces_enabled: true,
        },
    );

    let mut report = SyncReport::default();
    let mut keep = BTreeSet::new();
    for id in declared.walk_depth_first() {
        if !declared_reach.contains(&id) {
            continue;
        }
        let location = declared.location(id);
        if !on_disk.contains(&id) {
            report.retained_omitted.push(location.clone());
        }
        let previous = lock.packages.get(&location).cloned();
        lock.packages
            .insert(location.clone(), entry_for(declared, id, previous));
        keep.insert(location);
    }

    let stale: Vec<String> = lock
        .packages
        .keys()
        .filter(|loc| !keep.contains(*loc))
        .cloned()
        .collect();
    for location in stale {
        debug!(%location, "dropping extraneous lockfile entry");
        lock.remove(&location);
        report.removed.push(location);
    }

    report.kept = lock.packages.len();
    (lock, report)
}

/// Sync and write the project lockfile. Skips the write when nothing changed.
///
/// # Errors
/// Returns an error if the lockfile cannot be serialized or written.
pub fn write_lockfile(
    path: &Path,
    declared: &Tree,
    omit: &OmitSet,
    existing: Option<PackageLock>,
) -> Result<SyncReport, LockfileError> {
    let (lock, mut report) = sync_lockfile(declared, omit, existing);
    report.written = lock.write_to(path)?;
    if report.written {
        info!(
            path = %path.display(),
            kept = report.kept,
            removed = report.removed.len(),
            "wrote lockfile"
        );
    } else {
        debug!(path = %path.display(), "lockfile unchanged");
    }
    Ok(report)
}

/// Snapshot of the packages installed under the root `node_modules`.
#[must_use]
pub fn hidden_lockfile(actual: &Tree) -> PackageLock {
    let root = actual.root();
    let mut lock = PackageLock::new(Some(root.name.clone()), root.version.clone());
    for id in actual.walk_depth_first() {
        if actual.in_install_area(id) {
            lock.packages
                .insert(actual.location(id), entry_for(actual, id, None));
        }
    }
    lock
}

/// Rewrite `node_modules/.package-lock.json` when `node_modules` exists.
/// Returns whether the file changed.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_hidden_lockfile(actual: &Tree) -> Result<bool, LockfileError> {
    let path = PackageLock::hidden_path(&actual.path);
    if !path.parent().is_some_and(Path::is_dir) {
        return Ok(false);
    }
    let written = hidden_lockfile(actual).write_to(&path)?;
    debug!(path = %path.display(), written, "hidden lockfile");
    Ok(written)
}

/// Lockfile entry for a node, starting from `previous` when there is one.
fn entry_for(tree: &Tree, id: NodeId, previous: Option<LockEntry>) -> LockEntry {
    let Some(node) = tree.node(id) else {
        return previous.unwrap_or_default();
    };
    let location = tree.location(id);

    if let Some(target) = node.link_target {
        let mut entry = previous.unwrap_or_default();
        entry.link = true;
        entry.resolved = Some(tree.location(target));
        apply_flags(&mut entry, tree, id);
        return entry;
    }

    let from_package_json = node.is_root || node.is_workspace;
    let mut entry = match previous {
        Some(entry) if !from_package_json => entry,
        previous => {
            let mut entry = previous.unwrap_or_default();
            entry.version.clone_from(&node.version);
            if node.resolved.is_some() {
                entry.resolved.clone_from(&node.resolved);
            }
            if node.integrity.is_some() {
                entry.integrity.clone_from(&node.integrity);
            }
            if node.license.is_some() {
                entry.license.clone_from(&node.license);
            }
            entry.bin.clone_from(&node.bins);
            fill_dependencies(&mut entry, tree, id);
            entry
        }
    };

    let last = location.rsplit("node_modules/").next().unwrap_or_default();
    if from_package_json || last != node.name {
        entry.name = Some(node.name.clone());
    }
    if node.is_root && !tree.workspaces.is_empty() && !entry.extra.contains_key("workspaces") {
        let members: Vec<Value> = tree
            .workspaces
            .values()
            .map(|&ws| Value::String(tree.location(ws)))
            .collect();
        entry.extra.insert("workspaces".into(), Value::Array(members));
    }
    apply_flags(&mut entry, tree, id);
    entry
}

/// Dependency sections rebuilt from a node's declared edges.
fn fill_dependencies(entry: &mut LockEntry, tree: &Tree, id: NodeId) {
    let Some(node) = tree.node(id) else { return };
    entry.dependencies.clear();
    entry.dev_dependencies.clear();
    entry.optional_dependencies.clear();
    entry.peer_dependencies.clear();
    entry.peer_dependencies_meta.clear();

    for &edge_id in node.edges_out.values() {
        let edge = tree.edge(edge_id);
        if edge.workspace {
            continue;
        }
        let section = match edge.dep_type {
            DepType::Prod => &mut entry.dependencies,
            DepType::Dev => &mut entry.dev_dependencies,
            DepType::Optional => &mut entry.optional_dependencies,
            DepType::Peer => &mut entry.peer_dependencies,
            DepType::PeerOptional => {
                entry
                    .peer_dependencies_meta
                    .insert(edge.name.clone(), json!({ "optional": true }));
                &mut entry.peer_dependencies
            }
        };
        section.insert(edge.name.clone(), edge.spec.clone());
    }
}

fn apply_flags(entry: &mut LockEntry, tree: &Tree, id: NodeId) {
    let Some(node) = tree.node(id) else { return };
    let flags = &node.flags;
    entry.dev = flags.dev;
    entry.optional = flags.optional;
    entry.dev_optional = flags.dev_optional;
    entry.peer = flags.peer;
    entry.extraneous = flags.extraneous;
}
