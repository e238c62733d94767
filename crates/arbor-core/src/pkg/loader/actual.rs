//! Actual tree: what is physically installed.

use super::{
    add_declared_edges, add_workspace_members, new_tree, node_from_manifest, outside_parent,
    project_root,
};
use crate::pkg::error::{codes as pkg_codes, PkgError};
use crate::pkg::graph::{codes, GraphErrorInfo, Node, NodeId, Tree};
use crate::pkg::manifest::{Manifest, PACKAGE_JSON};
use crate::pkg::walker::calc_dep_flags;
use crate::pkg::workspaces::discover_workspaces;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Load the tree installed under `root`.
///
/// Every package directory under `node_modules` (nested and scoped ones
/// included) becomes a node. Symlinks become link nodes pointing at the node
/// for their real path. Unreadable nested manifests are recorded in
/// `tree.errors` rather than failing the load.
///
/// # Errors
/// Returns an error if the root `package.json` is missing or invalid, or if
/// the root `node_modules` exists but cannot be listed.
pub fn load_actual(root: &Path) -> Result<Tree, PkgError> {
    let root = project_root(root)?;
    let manifest = Manifest::read(&root.join(PACKAGE_JSON))?;

    let mut loader = ActualLoader::new(new_tree(&root, &manifest));
    let root_id = loader.tree.root_id();
    loader.by_path.insert(root.clone(), root_id);

    let members = discover_workspaces(&root, &manifest.workspaces)
        .map(|config| add_workspace_members(&mut loader.tree, &config))
        .unwrap_or_default();
    add_declared_edges(&mut loader.tree, root_id, &manifest, true);

    match loader.scan(&root.join("node_modules"), root_id) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            return Err(PkgError::node_modules_read_failed(format!(
                "Failed to read {}: {e}",
                root.join("node_modules").display()
            )));
        }
        _ => {}
    }
    for (id, path) in members {
        loader.by_path.insert(path.clone(), id);
        loader.scan_lenient(&path.join("node_modules"), id);
    }
    loader.resolve_links();

    let mut tree = loader.tree;
    tree.resolve_edges();
    calc_dep_flags(&mut tree);

    debug!(
        root = %tree.path.display(),
        nodes = tree.len(),
        workspaces = tree.workspaces.len(),
        errors = tree.errors.len(),
        "loaded actual tree"
    );
    Ok(tree)
}

struct ActualLoader {
    tree: Tree,
    by_path: HashMap<PathBuf, NodeId>,
    /// Link nodes whose targets are resolved once every real directory is known.
    pending_links: Vec<(NodeId, PathBuf)>,
}

impl ActualLoader {
    fn new(tree: Tree) -> Self {
        Self {
            tree,
            by_path: HashMap::new(),
            pending_links: Vec::new(),
        }
    }

    /// Index all packages in a `node_modules` directory as children of `owner`.
    fn scan(&mut self, node_modules: &Path, owner: NodeId) -> io::Result<()> {
        let mut entries: Vec<_> = fs::read_dir(node_modules)?.flatten().collect();
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let path = entry.path();
            let file_name = entry.file_name();
            let name_str = file_name.to_string_lossy();

            // Skip .bin, the hidden lockfile, and other dot entries
            if name_str.starts_with('.') {
                continue;
            }

            if name_str.starts_with('@') {
                if arbor_util::fs::is_link(&path) || !path.is_dir() {
                    continue;
                }
                let mut scoped: Vec<_> = match fs::read_dir(&path) {
                    Ok(e) => e.flatten().collect(),
                    Err(e) => {
                        self.record_io(&path, &e);
                        continue;
                    }
                };
                scoped.sort_by_key(fs::DirEntry::file_name);
                for scope_entry in scoped {
                    let scoped_name =
                        format!("{}/{}", name_str, scope_entry.file_name().to_string_lossy());
                    self.load_package(&scope_entry.path(), &scoped_name, owner);
                }
            } else {
                self.load_package(&path, &name_str, owner);
            }
        }
        Ok(())
    }

    /// Like [`Self::scan`], recording failures instead of returning them.
    fn scan_lenient(&mut self, node_modules: &Path, owner: NodeId) {
        if let Err(e) = self.scan(node_modules, owner) {
            if e.kind() != io::ErrorKind::NotFound {
                self.record_io(node_modules, &e);
            }
        }
    }

    fn load_package(&mut self, path: &Path, name: &str, owner: NodeId) {
        if arbor_util::fs::is_link(path) {
            let id = self.tree.insert(Node::new(name, None, path), Some(owner));
            self.pending_links.push((id, path.to_path_buf()));
            return;
        }
        if !path.is_dir() {
            return;
        }

        let id = self.load_real(path, name, Some(owner));
        self.scan_lenient(&path.join("node_modules"), id);
    }

    /// Create the node for a real package directory. Installed packages never
    /// contribute development edges.
    fn load_real(&mut self, path: &Path, name: &str, parent: Option<NodeId>) -> NodeId {
        let manifest = match Manifest::read(&path.join(PACKAGE_JSON)) {
            Ok(m) => Some(m),
            Err(e) => {
                let code = if e.code() == pkg_codes::PKG_PACKAGE_JSON_NOT_FOUND {
                    codes::PKG_GRAPH_PACKAGE_JSON_MISSING
                } else {
                    codes::PKG_GRAPH_PACKAGE_JSON_INVALID
                };
                self.tree.errors.push(GraphErrorInfo::new(
                    code,
                    path.to_string_lossy(),
                    e.message().to_string(),
                ));
                None
            }
        };

        let node = match &manifest {
            Some(m) => node_from_manifest(name, path, m),
            None => Node::new(name, None, path),
        };
        let id = self.tree.insert(node, parent);
        self.by_path.insert(path.to_path_buf(), id);
        if let Some(m) = &manifest {
            add_declared_edges(&mut self.tree, id, m, false);
        }
        id
    }

    /// Point every link at the node for its real path, loading targets that
    /// live outside any scanned `node_modules`.
    fn resolve_links(&mut self) {
        while let Some((link, path)) = self.pending_links.pop() {
            let real = match dunce::canonicalize(&path) {
                Ok(real) => real,
                Err(e) => {
                    warn!(link = %path.display(), error = %e, "broken link in node_modules");
                    self.tree.errors.push(GraphErrorInfo::new(
                        codes::PKG_GRAPH_LINK_BROKEN,
                        path.to_string_lossy(),
                        format!("Link target unreadable: {e}"),
                    ));
                    continue;
                }
            };

            let target = match self.by_path.get(&real) {
                Some(&id) => id,
                None => {
                    let name = self
                        .tree
                        .node(link)
                        .map(|n| n.name.clone())
                        .unwrap_or_default();
                    let fs_parent = outside_parent(&self.tree, &real);
                    let id = self.load_real(&real, &name, None);
                    if let Some(node) = self.tree.node_mut(id) {
                        node.fs_parent = fs_parent;
                    }
                    // May queue further links
                    self.scan_lenient(&real.join("node_modules"), id);
                    id
                }
            };

            let version = self.tree.node(target).and_then(|n| n.version.clone());
            if let Some(node) = self.tree.node_mut(link) {
                node.link_target = Some(target);
                node.version = version;
            }
        }
    }

    fn record_io(&mut self, path: &Path, err: &io::Error) {
        self.tree.errors.push(GraphErrorInfo::new(
            codes::PKG_GRAPH_IO_ERROR,
            path.to_string_lossy(),
            format!("Failed to read: {err}"),
        ));
    }
}
