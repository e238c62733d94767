//! In-memory dependency tree.
//!
//! Nodes and edges live in a single arena owned by [`Tree`] and refer to each
//! other through [`NodeId`]/[`EdgeId`] handles, so dependency cycles need no
//! back-reference bookkeeping. Two structures are overlaid on the same nodes:
//!
//! - the nesting hierarchy (`parent`/`children`), which mirrors the
//!   `node_modules` layout on disk and drives name resolution;
//! - the dependency graph (`edges_out`/`edges_in`), which records declared
//!   relationships and their [`DepType`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use super::lockfile::LockEntry;
use super::version::version_satisfies;

/// Graph error codes.
pub mod codes {
    pub const PKG_GRAPH_PACKAGE_JSON_INVALID: &str = "PKG_GRAPH_PACKAGE_JSON_INVALID";
    pub const PKG_GRAPH_PACKAGE_JSON_MISSING: &str = "PKG_GRAPH_PACKAGE_JSON_MISSING";
    pub const PKG_GRAPH_IO_ERROR: &str = "PKG_GRAPH_IO_ERROR";
    pub const PKG_GRAPH_LINK_BROKEN: &str = "PKG_GRAPH_LINK_BROKEN";
    pub const PKG_GRAPH_LOCK_ENTRY_INVALID: &str = "PKG_GRAPH_LOCK_ENTRY_INVALID";
}

/// Handle to a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an edge in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dependency type of an edge. Fixed when the edge is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepType {
    Prod,
    Dev,
    Optional,
    Peer,
    PeerOptional,
}

impl DepType {
    /// Stable lowercase name, as used in JSON output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Optional => "optional",
            Self::Peer => "peer",
            Self::PeerOptional => "peerOptional",
        }
    }

    /// The `package.json` section this type is declared in.
    #[must_use]
    pub fn manifest_section(self) -> &'static str {
        match self {
            Self::Prod => "dependencies",
            Self::Dev => "devDependencies",
            Self::Optional => "optionalDependencies",
            Self::Peer | Self::PeerOptional => "peerDependencies",
        }
    }
}

/// Why an edge does not currently point at a satisfying node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeError {
    /// No node with this name is visible from the edge's source.
    Missing,
    /// A node was found but its version does not satisfy the spec.
    Invalid { found: String },
    /// The edge's source node was removed from the tree.
    Detached,
}

/// A declared dependency from one node to another.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeId,
    pub name: String,
    /// Requested spec as written in the manifest (range, tag, `file:` path, ...).
    pub spec: String,
    pub dep_type: DepType,
    /// Root → workspace member edge. Always of type [`DepType::Prod`].
    pub workspace: bool,
    pub to: Option<NodeId>,
    pub error: Option<EdgeError>,
}

impl Edge {
    /// An edge is valid when it points at a node that satisfies its spec.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.error.is_none() && self.to.is_some()
    }

    /// Whether no node resolves this edge at all.
    #[must_use]
    pub fn missing(&self) -> bool {
        matches!(self.error, Some(EdgeError::Missing))
    }
}

/// Reporting flags for a node, derived from edge-typed reachability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DepFlags {
    /// Only reachable through development edges.
    pub dev: bool,
    /// Only reachable through optional edges.
    pub optional: bool,
    /// Needs both dev and optional omitted to become unreachable.
    pub dev_optional: bool,
    /// Only reachable through peer edges.
    pub peer: bool,
    /// Not reachable from any root at all.
    pub extraneous: bool,
}

/// One package instance at one filesystem path.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub version: Option<String>,
    /// Absolute install path (for links: the path of the link itself).
    pub path: PathBuf,
    /// Node whose `node_modules` holds this one.
    pub parent: Option<NodeId>,
    /// Node whose directory contains this one when it has no `parent`
    /// (workspace members resolve their dependencies through it).
    pub fs_parent: Option<NodeId>,
    pub children: HashMap<String, NodeId>,
    pub edges_out: BTreeMap<String, EdgeId>,
    pub edges_in: BTreeSet<EdgeId>,
    /// Set for links: the node at the link's real path.
    pub link_target: Option<NodeId>,
    pub is_root: bool,
    /// Workspace member package (the real directory a link points at).
    pub is_workspace: bool,
    pub flags: DepFlags,
    /// Executables: bin name → script path relative to the package.
    pub bins: BTreeMap<String, String>,
    pub resolved: Option<String>,
    pub integrity: Option<String>,
    pub license: Option<String>,
    /// Entry this node was built from when loaded from a lockfile.
    pub lock_entry: Option<LockEntry>,
}

impl Node {
    /// Create a detached node; [`Tree::insert`] assigns its id.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: NodeId(u32::MAX),
            name: name.into(),
            version,
            path: path.into(),
            parent: None,
            fs_parent: None,
            children: HashMap::new(),
            edges_out: BTreeMap::new(),
            edges_in: BTreeSet::new(),
            link_target: None,
            is_root: false,
            is_workspace: false,
            flags: DepFlags::default(),
            bins: BTreeMap::new(),
            resolved: None,
            integrity: None,
            license: None,
            lock_entry: None,
        }
    }

    /// Whether this node is a symbolic reference to another node.
    #[must_use]
    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }
}

/// Error information for tree construction issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphErrorInfo {
    /// Stable error code.
    pub code: String,
    /// Path where the error occurred.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl GraphErrorInfo {
    /// Create a new graph error.
    #[must_use]
    pub fn new(code: &str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A dependency tree rooted at a project directory.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    edges: Vec<Edge>,
    root: NodeId,
    /// Absolute path of the project root.
    pub path: PathBuf,
    /// Workspace member name → workspace package node.
    pub workspaces: BTreeMap<String, NodeId>,
    /// Problems found while loading (invalid manifests, broken links).
    pub errors: Vec<GraphErrorInfo>,
}

impl Tree {
    /// Create a tree holding only its root node.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut root = Node::new(name, version, path.clone());
        root.id = NodeId(0);
        root.is_root = true;
        Self {
            nodes: vec![Some(root)],
            edges: Vec::new(),
            root: NodeId(0),
            path,
            workspaces: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Id of the root node.
    #[must_use]
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// The root node. It can never be removed.
    ///
    /// # Panics
    /// Never in practice: [`Tree::remove_node`] refuses to remove the root.
    #[must_use]
    pub fn root(&self) -> &Node {
        self.nodes[self.root.index()]
            .as_ref()
            .expect("root node is never removed")
    }

    /// Look up a live node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Look up a live node mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Look up an edge.
    ///
    /// # Panics
    /// Panics if the id did not come from this tree.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// All live nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes().count()
    }

    /// Whether the tree holds only its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    /// Child of `parent` named `name`, if any.
    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<&Node> {
        let id = *self.node(parent)?.children.get(name)?;
        self.node(id)
    }

    /// Top-level child of the root named `name`.
    #[must_use]
    pub fn root_child(&self, name: &str) -> Option<&Node> {
        self.child(self.root, name)
    }

    /// Add a node to the arena, placing it in `parent`'s children.
    ///
    /// A same-named child already under `parent` is shadowed: the mapping now
    /// points at the new node. Returns the new node's id.
    pub fn insert(&mut self, mut node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        node.id = id;
        node.parent = parent;
        if let Some(parent_node) = parent.and_then(|p| self.node_mut(p)) {
            parent_node.children.insert(node.name.clone(), id);
        }
        self.nodes.push(Some(node));
        id
    }

    /// Convenience for building trees in memory: a child installed at
    /// `<parent>/node_modules/<name>`.
    pub fn add_child(&mut self, parent: NodeId, name: &str, version: &str) -> NodeId {
        let parent_path = self
            .node(parent)
            .map_or_else(|| self.path.clone(), |p| p.path.clone());
        let path = node_modules_path(&parent_path, name);
        self.insert(Node::new(name, Some(version.to_string()), path), Some(parent))
    }

    /// Declare a dependency edge. The first declaration for a name wins; a
    /// repeated name returns `None`.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        name: &str,
        spec: &str,
        dep_type: DepType,
    ) -> Option<EdgeId> {
        self.push_edge(from, name, spec, dep_type, false)
    }

    /// Declare a root → workspace member edge.
    pub fn add_workspace_edge(&mut self, name: &str, spec: &str) -> Option<EdgeId> {
        self.push_edge(self.root, name, spec, DepType::Prod, true)
    }

    fn push_edge(
        &mut self,
        from: NodeId,
        name: &str,
        spec: &str,
        dep_type: DepType,
        workspace: bool,
    ) -> Option<EdgeId> {
        let id = EdgeId(u32::try_from(self.edges.len()).unwrap_or(u32::MAX));
        let node = self.node_mut(from)?;
        if node.edges_out.contains_key(name) {
            return None;
        }
        node.edges_out.insert(name.to_string(), id);
        self.edges.push(Edge {
            from,
            name: name.to_string(),
            spec: spec.to_string(),
            dep_type,
            workspace,
            to: None,
            error: Some(EdgeError::Missing),
        });
        Some(id)
    }

    /// Find the node `name` resolves to from `from`: its own children first,
    /// then each ancestor's (nearest shadows farthest).
    #[must_use]
    pub fn resolve(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut visited = HashSet::new();
        let mut current = Some(from);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let node = self.node(id)?;
            if let Some(&child) = node.children.get(name) {
                if self.node(child).is_some() {
                    return Some(child);
                }
            }
            current = node.parent.or(node.fs_parent);
        }
        None
    }

    /// Point every edge at the node it resolves to and record validity.
    pub fn resolve_edges(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.edges_in.clear();
        }
        for index in 0..self.edges.len() {
            let edge = &self.edges[index];
            if self.node(edge.from).is_none() {
                continue;
            }
            let to = self.resolve(edge.from, &edge.name);
            let error = match to.and_then(|id| self.node(id)) {
                None => Some(EdgeError::Missing),
                Some(target) => self.validate(edge, target),
            };
            let id = EdgeId(u32::try_from(index).unwrap_or(u32::MAX));
            if let Some(target) = to.and_then(|t| self.node_mut(t)) {
                target.edges_in.insert(id);
            }
            let edge = &mut self.edges[index];
            edge.to = to;
            edge.error = error;
        }
    }

    fn validate(&self, edge: &Edge, target: &Node) -> Option<EdgeError> {
        // Links and workspace edges are satisfied by location, not version
        if edge.workspace || target.is_link() {
            return None;
        }
        let version = target.version.as_deref()?;
        match version_satisfies(version, &edge.spec) {
            Some(false) => Some(EdgeError::Invalid {
                found: version.to_string(),
            }),
            Some(true) | None => None,
        }
    }

    /// Remove a node from the tree.
    ///
    /// Detaches its outgoing edges, marks edges that pointed at it as missing,
    /// and drops it from its parent's children. Descendants are left in place;
    /// callers decide separately whether they go too. The root is never
    /// removed (`None`).
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        if id == self.root {
            return None;
        }
        let node = self.nodes.get_mut(id.index())?.take()?;

        for &edge_id in node.edges_out.values() {
            let edge = &mut self.edges[edge_id.index()];
            let to = edge.to.take();
            edge.error = Some(EdgeError::Detached);
            if let Some(target) = to.and_then(|t| self.node_mut(t)) {
                target.edges_in.remove(&edge_id);
            }
        }
        for &edge_id in &node.edges_in {
            let edge = &mut self.edges[edge_id.index()];
            if edge.to == Some(id) {
                edge.to = None;
                edge.error = Some(EdgeError::Missing);
            }
        }
        if let Some(parent) = node.parent.and_then(|p| self.node_mut(p)) {
            if parent.children.get(&node.name) == Some(&id) {
                parent.children.remove(&node.name);
            }
        }
        self.workspaces.retain(|_, ws| *ws != id);

        Some(node)
    }

    /// Every live node reachable through the nesting hierarchy, links, and
    /// workspace members, depth-first from the root. Each node appears once.
    #[must_use]
    pub fn walk_depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        // Workspace members sit below the root so the root subtree comes out first
        let mut stack: Vec<NodeId> = self.workspaces.values().rev().copied().collect();
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            order.push(id);

            let mut next: Vec<NodeId> = node.children.values().copied().collect();
            next.extend(node.link_target);
            next.sort_by(|a, b| self.sort_name(*b).cmp(self.sort_name(*a)));
            stack.extend(next.into_iter().filter(|n| !seen.contains(n)));
        }
        order
    }

    fn sort_name(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.path.to_str().unwrap_or(""))
    }

    /// Path of a node relative to the project root, `/`-separated
    /// (`""` for the root, `node_modules/a/node_modules/b`, `packages/a`).
    #[must_use]
    pub fn location(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| relative_location(&self.path, &n.path))
            .unwrap_or_default()
    }

    /// Whether a node physically lives inside some `node_modules` directory.
    #[must_use]
    pub fn in_install_area(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| {
            n.path
                .strip_prefix(&self.path)
                .is_ok_and(|rel| rel.components().any(|c| c.as_os_str() == "node_modules"))
        })
    }

    /// Render the tree for humans, one node per line with its flags.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let root = self.root();
        let _ = writeln!(
            out,
            "{}@{} {}",
            root.name,
            root.version.as_deref().unwrap_or("0.0.0"),
            self.path.display()
        );
        for id in self.walk_depth_first().into_iter().skip(1) {
            let Some(node) = self.node(id) else { continue };
            let location = self.location(id);
            let depth = location.matches("node_modules").count().max(1);
            let mut line = format!(
                "{}{}@{}",
                "  ".repeat(depth),
                node.name,
                node.version.as_deref().unwrap_or("?")
            );
            if let Some(target) = node.link_target {
                let _ = write!(line, " -> {}", self.location(target));
            }
            for (set, label) in [
                (node.flags.dev, "dev"),
                (node.flags.optional, "optional"),
                (node.flags.dev_optional, "devOptional"),
                (node.flags.peer, "peer"),
                (node.flags.extraneous, "extraneous"),
                (node.is_workspace, "workspace"),
            ] {
                if set {
                    let _ = write!(line, " [{label}]");
                }
            }
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

/// `<dir>/node_modules/<name>`, splitting scoped names into two components.
#[must_use]
pub fn node_modules_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.join("node_modules");
    for part in name.split('/') {
        path.push(part);
    }
    path
}

/// `/`-separated path of `path` relative to `root`.
#[must_use]
pub fn relative_location(root: &Path, path: &Path) -> String {
    let Ok(rel) = path.strip_prefix(root) else {
        return path.to_string_lossy().replace('\\', "/");
    };
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new("root", Some("1.0.0".into()), "/proj");
        let root = tree.root_id();
        let a = tree.add_child(root, "a", "1.0.0");
        let b = tree.add_child(root, "b", "2.0.0");
        // a carries its own b@1, shadowing the top-level b@2 for a's deps
        let nested_b = tree.add_child(a, "b", "1.0.0");
        tree.add_edge(root, "a", "^1.0.0", DepType::Prod);
        tree.add_edge(root, "b", "^2.0.0", DepType::Dev);
        tree.add_edge(a, "b", "^1.0.0", DepType::Prod);
        tree.resolve_edges();
        let _ = b;
        (tree, root, a, nested_b)
    }

    #[test]
    fn test_child_lookup_and_paths() {
        let (tree, root, a, nested_b) = sample();
        assert_eq!(tree.root_child("a").unwrap().id, a);
        assert_eq!(tree.child(a, "b").unwrap().id, nested_b);
        assert_eq!(tree.location(nested_b), "node_modules/a/node_modules/b");
        assert_eq!(tree.location(root), "");
        assert!(tree.in_install_area(nested_b));
        assert!(!tree.in_install_area(root));
    }

    #[test]
    fn test_nested_resolution_shadows_ancestor() {
        let (tree, _, a, nested_b) = sample();
        let edge = tree.edge(tree.node(a).unwrap().edges_out["b"]);
        assert_eq!(edge.to, Some(nested_b));
        assert!(edge.valid());
    }

    #[test]
    fn test_version_mismatch_marks_edge_invalid() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        tree.add_child(root, "a", "1.0.0");
        let edge = tree.add_edge(root, "a", "^2.0.0", DepType::Prod).unwrap();
        tree.resolve_edges();

        let edge = tree.edge(edge);
        assert!(!edge.valid());
        assert_eq!(
            edge.error,
            Some(EdgeError::Invalid {
                found: "1.0.0".into()
            })
        );
    }

    #[test]
    fn test_missing_edge() {
        let mut tree = Tree::new("root", None, "/proj");
        let edge = tree
            .add_edge(tree.root_id(), "ghost", "^1.0.0", DepType::Prod)
            .unwrap();
        tree.resolve_edges();
        assert!(tree.edge(edge).missing());
    }

    #[test]
    fn test_first_edge_declaration_wins() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        assert!(tree.add_edge(root, "a", "^1.0.0", DepType::Peer).is_some());
        assert!(tree.add_edge(root, "a", "^1.0.0", DepType::Dev).is_none());
        let edge = tree.edge(tree.root().edges_out["a"]);
        assert_eq!(edge.dep_type, DepType::Peer);
    }

    #[test]
    fn test_remove_node_detaches_without_cascade() {
        let (mut tree, root, a, nested_b) = sample();
        let a_edge = tree.root().edges_out["a"];

        let removed = tree.remove_node(a).unwrap();
        assert_eq!(removed.name, "a");
        assert!(tree.root_child("a").is_none());
        assert!(tree.edge(a_edge).missing());
        // a's own dependency edge is detached
        let inner = tree.edge(removed.edges_out["b"]);
        assert_eq!(inner.error, Some(EdgeError::Detached));
        // descendant stays in the arena until removed explicitly
        assert!(tree.node(nested_b).is_some());
        assert!(tree.remove_node(root).is_none());
    }

    #[test]
    fn test_walk_depth_first_handles_cycles() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        tree.add_child(root, "a", "1.0.0");
        let b = tree.add_child(root, "b", "1.0.0");
        let a = tree.root().children["a"];
        tree.add_edge(root, "a", "*", DepType::Prod);
        tree.add_edge(a, "b", "*", DepType::Prod);
        tree.add_edge(b, "a", "*", DepType::Prod);
        tree.resolve_edges();

        let order = tree.walk_depth_first();
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], root);
        let unique: HashSet<_> = order.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_scoped_node_modules_path() {
        let path = node_modules_path(Path::new("/proj"), "@types/node");
        assert_eq!(path, PathBuf::from("/proj/node_modules/@types/node"));
        assert_eq!(
            relative_location(Path::new("/proj"), &path),
            "node_modules/@types/node"
        );
    }

    #[test]
    fn test_render_lists_every_node() {
        let (tree, ..) = sample();
        let text = tree.render();
        assert!(text.starts_with("root@1.0.0"));
        assert!(text.contains("a@1.0.0"));
        assert!(text.contains("b@2.0.0"));
        assert!(text.contains("b@1.0.0"));
    }
}
