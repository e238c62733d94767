//! Pruning: remove installed packages nothing reaches under the current
//! options.
//!
//! [`plan_prune`] and [`prune_tree`] are pure graph operations. [`prune`]
//! drives the whole operation for a project directory: load both trees,
//! prune the actual one, delete from disk, then sync the lockfiles.

use super::bins::{owned_entries, platform_linker, BinLinker};
use super::error::PkgError;
use super::graph::{Node, NodeId, Tree};
use super::lock_sync::{sync_lockfile, write_hidden_lockfile, write_lockfile, SyncReport};
use super::lockfile::{codes as lock_codes, PackageLock, PACKAGE_LOCK};
use super::loader::{load_actual, load_virtual};
use super::reconcile::{self, ReconcileReport, Removal, RemovalKind};
use super::walker::{calc_dep_flags, reachable, OmitSet, WalkOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for [`prune`].
#[derive(Debug, Clone)]
pub struct PruneOptions {
    /// Dependency classes to keep off disk.
    pub omit: OmitSet,
    /// When false, workspace members and whatever only they reach are pruned.
    pub workspaces_enabled: bool,
    /// Rewrite `package-lock.json` (creating it if absent).
    pub save_lockfile: bool,
    /// Compute the plan without touching the filesystem.
    pub dry_run: bool,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self {
            omit: OmitSet::none(),
            workspaces_enabled: true,
            save_lockfile: true,
            dry_run: false,
        }
    }
}

impl PruneOptions {
    #[must_use]
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            omit: self.omit.clone(),
            workspaces_enabled: self.workspaces_enabled,
        }
    }
}

/// Which nodes a prune takes out of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Unreachable nodes that leave the tree.
    pub remove: Vec<NodeId>,
    /// Unreachable nodes kept because a retained node is installed inside
    /// their directory.
    pub kept: Vec<NodeId>,
}

impl PrunePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
    }

    /// Filesystem removals for this plan: the top-most package directories
    /// (nested ones go with them) plus the bin entries the removed packages
    /// own in directories that survive.
    #[must_use]
    pub fn removals(&self, tree: &Tree, linker: &dyn BinLinker) -> Vec<Removal> {
        let mut dirs: Vec<(&Path, bool)> = self
            .remove
            .iter()
            .filter_map(|&id| tree.node(id))
            .map(|n| (n.path.as_path(), n.is_link()))
            .collect();
        dirs.sort_by(|a, b| a.0.cmp(b.0));

        let mut top: Vec<(&Path, bool)> = Vec::new();
        for (path, link) in dirs {
            if !top.iter().any(|(t, _)| path.starts_with(t)) {
                top.push((path, link));
            }
        }

        let mut removals: Vec<Removal> = top
            .iter()
            .map(|&(path, link)| {
                let kind = if link {
                    RemovalKind::Link
                } else {
                    RemovalKind::Package
                };
                Removal::new(path, kind)
            })
            .collect();

        for &id in &self.remove {
            for entry in owned_entries(tree, id, linker) {
                if !top.iter().any(|(t, _)| entry.starts_with(t)) {
                    removals.push(Removal::new(entry, RemovalKind::Bin));
                }
            }
        }
        removals
    }
}

/// A package a prune removed, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedPackage {
    pub name: String,
    pub version: Option<String>,
    pub location: String,
    pub link: bool,
}

/// Compute which nodes to remove from `tree` under `opts`.
///
/// Candidates are the nodes under some `node_modules` that the walk does not
/// reach. The root is never a candidate.
#[must_use]
pub fn plan_prune(tree: &Tree, opts: &WalkOptions) -> PrunePlan {
    let reach = reachable(tree, opts);
    let ids: Vec<NodeId> = tree.walk_depth_first();

    let (candidates, retained): (Vec<NodeId>, Vec<NodeId>) = ids
        .into_iter()
        .filter(|&id| id != tree.root_id() && tree.in_install_area(id))
        .partition(|id| !reach.contains(id));

    let mut plan = PrunePlan::default();
    for id in candidates {
        let Some(node) = tree.node(id) else { continue };
        let holds_retained = retained.iter().any(|&r| {
            tree.node(r)
                .is_some_and(|kept| kept.path != node.path && kept.path.starts_with(&node.path))
        });
        if holds_retained {
            warn!(
                location = %tree.location(id),
                "unreachable package kept: a retained package is installed inside it"
            );
            plan.kept.push(id);
        } else {
            plan.remove.push(id);
        }
    }
    plan
}

/// Detach the planned nodes and recompute edges and flags.
pub fn apply_plan(tree: &mut Tree, plan: &PrunePlan) -> Vec<RemovedPackage> {
    let mut removed: Vec<RemovedPackage> = plan
        .remove
        .iter()
        .filter_map(|&id| {
            let location = tree.location(id);
            tree.remove_node(id).map(|node: Node| RemovedPackage {
                link: node.is_link(),
                name: node.name,
                version: node.version,
                location,
            })
        })
        .collect();
    removed.sort_by(|a, b| a.location.cmp(&b.location));

    tree.resolve_edges();
    calc_dep_flags(tree);
    removed
}

/// Prune `tree` in memory. Returns what was removed.
pub fn prune_tree(tree: &mut Tree, opts: &WalkOptions) -> Vec<RemovedPackage> {
    let plan = plan_prune(tree, opts);
    apply_plan(tree, &plan)
}

/// Outcome of [`prune`].
#[derive(Debug)]
pub struct PruneResult {
    /// The actual tree after pruning.
    pub tree: Tree,
    pub removed: Vec<RemovedPackage>,
    /// Filesystem targets, scheduled or applied.
    pub targets: Vec<PathBuf>,
    /// `None` on a dry run.
    pub reconcile: Option<ReconcileReport>,
    /// `None` when the lockfile is not being saved.
    pub lockfile: Option<SyncReport>,
    pub hidden_lockfile_written: bool,
}

/// Prune the project at `root`.
///
/// # Errors
/// Returns an error if either tree cannot be loaded, a removal fails fatally,
/// or a lockfile cannot be written. Removals already applied stay applied;
/// running again completes the prune.
pub async fn prune(root: &Path, opts: &PruneOptions) -> Result<PruneResult, PkgError> {
    let mut actual = load_actual(root)?;
    let declared = match load_virtual(&actual.path)? {
        Some(tree) => tree,
        None => actual.clone(),
    };

    let walk = opts.walk_options();
    let plan = plan_prune(&actual, &walk);
    let linker = platform_linker();
    let removals = plan.removals(&actual, linker.as_ref());
    let targets: Vec<PathBuf> = removals.iter().map(|r| r.path.clone()).collect();
    let removed = apply_plan(&mut actual, &plan);
    debug!(
        removed = removed.len(),
        kept = plan.kept.len(),
        omit = %opts.omit,
        workspaces = opts.workspaces_enabled,
        "prune plan"
    );

    let reconcile = if opts.dry_run {
        None
    } else {
        Some(reconcile::apply(removals).await?)
    };

    let lockfile = if opts.save_lockfile {
        let located = PackageLock::locate(&actual.path);
        let existing = located.as_deref().map(read_existing).transpose()?.flatten();
        Some(if opts.dry_run {
            sync_lockfile(&declared, &opts.omit, existing).1
        } else {
            let path = located.unwrap_or_else(|| actual.path.join(PACKAGE_LOCK));
            write_lockfile(&path, &declared, &opts.omit, existing)?
        })
    } else {
        None
    };

    let hidden_lockfile_written = !opts.dry_run && write_hidden_lockfile(&actual)?;

    info!(
        removed = removed.len(),
        dry_run = opts.dry_run,
        "pruned {}",
        actual.path.display()
    );
    Ok(PruneResult {
        tree: actual,
        removed,
        targets,
        reconcile,
        lockfile,
        hidden_lockfile_written,
    })
}

/// The lockfile on disk, or `None` when its format predates `packages`.
fn read_existing(path: &Path) -> Result<Option<PackageLock>, PkgError> {
    match PackageLock::read_from(path) {
        Ok(lock) => Ok(Some(lock)),
        Err(e) if e.code() == lock_codes::PKG_LOCK_VERSION_MISMATCH => Ok(None),
        Err(e) => Err(e.into()),
    }
}
