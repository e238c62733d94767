//! Dependency tree engine.
//!
//! Provides:
//! - An arena graph of installed/declared packages ([`graph`])
//! - Loaders for the actual (`node_modules`) and virtual (lockfile) trees
//! - Edge-typed reachability with an omission set ([`walker`])
//! - Pruning of unreachable packages and their bin entries ([`prune`])
//! - Concurrent, retrying filesystem removal ([`reconcile`])
//! - Lockfile and hidden-lockfile rewriting ([`lock_sync`])

pub mod bins;
pub mod error;
pub mod graph;
pub mod loader;
pub mod lock_sync;
pub mod lockfile;
pub mod manifest;
pub mod npmrc;
pub mod prune;
pub mod reconcile;
pub mod version;
pub mod walker;
pub mod workspaces;

pub use bins::{platform_linker, BinLinker, ShimBins, SymlinkBins, BIN_DIR};
pub use error::{codes as pkg_codes, PkgError};
pub use graph::{
    codes as graph_codes, DepFlags, DepType, Edge, EdgeError, EdgeId, GraphErrorInfo, Node,
    NodeId, Tree,
};
pub use loader::{load_actual, load_virtual};
pub use lock_sync::{hidden_lockfile, sync_lockfile, SyncReport};
pub use lockfile::{
    codes as lockfile_codes, LockEntry, LockfileError, PackageLock, HIDDEN_LOCKFILE, PACKAGE_LOCK,
    SHRINKWRAP,
};
pub use manifest::{Manifest, PACKAGE_JSON};
pub use npmrc::{load_npmrc_files, NpmrcConfig};
pub use prune::{
    plan_prune, prune, prune_tree, PruneOptions, PrunePlan, PruneResult, RemovedPackage,
};
pub use reconcile::{ReconcileReport, Removal, RemovalKind, MAX_CONCURRENT_REMOVALS};
pub use version::version_satisfies;
pub use walker::{calc_dep_flags, reachable, DepClass, OmitSet, WalkOptions};
pub use workspaces::{detect_workspaces, WorkspaceConfig, WorkspacePackage};
