//! Edge-typed reachability over a [`Tree`].
//!
//! Dependency type lives on edges, never on nodes: a node is reachable under
//! an omission set as soon as *any* followed edge into it has a type the set
//! does not exclude, so shared dependencies survive whichever path the walk
//! happens to take first.

use super::error::PkgError;
use super::graph::{DepType, NodeId, Tree};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Dependency class that can be omitted from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepClass {
    Dev,
    Optional,
    Peer,
}

impl DepClass {
    pub const ALL: [Self; 3] = [Self::Dev, Self::Optional, Self::Peer];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Optional => "optional",
            Self::Peer => "peer",
        }
    }
}

impl FromStr for DepClass {
    type Err = PkgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "dev" => Ok(Self::Dev),
            "optional" => Ok(Self::Optional),
            "peer" => Ok(Self::Peer),
            other => Err(PkgError::omit_invalid(other)),
        }
    }
}

impl fmt::Display for DepClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of dependency classes excluded from disk presence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OmitSet(BTreeSet<DepClass>);

impl OmitSet {
    /// Nothing omitted.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a list of class names (`dev`, `optional`, `peer`).
    ///
    /// # Errors
    /// Returns `PKG_OMIT_INVALID` for any other name.
    pub fn parse<S: AsRef<str>>(values: &[S]) -> Result<Self, PkgError> {
        values
            .iter()
            .map(|v| v.as_ref().parse::<DepClass>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn contains(&self, class: DepClass) -> bool {
        self.0.contains(&class)
    }

    pub fn insert(&mut self, class: DepClass) {
        self.0.insert(class);
    }

    pub fn remove(&mut self, class: DepClass) {
        self.0.remove(&class);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DepClass> + '_ {
        self.0.iter().copied()
    }

    /// Whether an edge of this type is excluded. Optional peers go as soon
    /// as either `peer` or `optional` is omitted.
    #[must_use]
    pub fn excludes(&self, dep_type: DepType) -> bool {
        match dep_type {
            DepType::Prod => false,
            DepType::Dev => self.contains(DepClass::Dev),
            DepType::Optional => self.contains(DepClass::Optional),
            DepType::Peer => self.contains(DepClass::Peer),
            DepType::PeerOptional => {
                self.contains(DepClass::Peer) || self.contains(DepClass::Optional)
            }
        }
    }
}

impl FromIterator<DepClass> for OmitSet {
    fn from_iter<I: IntoIterator<Item = DepClass>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for OmitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(DepClass::as_str).collect();
        write!(f, "[{}]", names.join(","))
    }
}

/// Options for one reachability walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub omit: OmitSet,
    /// When false, workspace edges from the root are not followed and
    /// workspace members are not walk roots.
    pub workspaces_enabled: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            omit: OmitSet::none(),
            workspaces_enabled: true,
        }
    }
}

/// Nodes the walk starts from: the root, plus each workspace member when
/// workspaces are enabled.
#[must_use]
pub fn walk_roots(tree: &Tree, workspaces_enabled: bool) -> Vec<NodeId> {
    let mut roots = vec![tree.root_id()];
    if workspaces_enabled {
        roots.extend(tree.workspaces.values().copied());
    }
    roots
}

/// Every node reachable from the walk roots under `opts`.
///
/// An edge is followed only if it is valid (resolved, version satisfied),
/// its type is not omitted, and it is not a workspace edge while workspaces
/// are disabled. Links always lead to their targets.
#[must_use]
pub fn reachable(tree: &Tree, opts: &WalkOptions) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = walk_roots(tree, opts.workspaces_enabled);

    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(node) = tree.node(id) else {
            continue;
        };

        if let Some(target) = node.link_target {
            stack.push(target);
        }

        for &edge_id in node.edges_out.values() {
            let edge = tree.edge(edge_id);
            if edge.workspace && !opts.workspaces_enabled {
                continue;
            }
            if opts.omit.excludes(edge.dep_type) || !edge.valid() {
                continue;
            }
            if let Some(to) = edge.to {
                if !seen.contains(&to) {
                    stack.push(to);
                }
            }
        }
    }

    seen
}

/// Recompute every node's reporting flags from edge-typed reachability.
///
/// Flags describe what *would* happen under each omission; nothing is
/// removed here.
pub fn calc_dep_flags(tree: &mut Tree) {
    let walk = |classes: &[DepClass]| {
        reachable(
            tree,
            &WalkOptions {
                omit: classes.iter().copied().collect(),
                workspaces_enabled: true,
            },
        )
    };

    let all = walk(&[]);
    let without_dev = walk(&[DepClass::Dev]);
    let without_optional = walk(&[DepClass::Optional]);
    let without_both = walk(&[DepClass::Dev, DepClass::Optional]);
    let without_peer = walk(&[DepClass::Peer]);

    let ids: Vec<NodeId> = tree.nodes().map(|n| n.id).collect();
    for id in ids {
        let Some(node) = tree.node_mut(id) else {
            continue;
        };
        if node.is_root {
            node.flags = Default::default();
            continue;
        }
        let flags = &mut node.flags;
        flags.extraneous = !all.contains(&id);
        let present = !flags.extraneous;
        flags.dev = present && !without_dev.contains(&id);
        flags.optional = present && !without_optional.contains(&id);
        flags.dev_optional = present
            && !flags.dev
            && !flags.optional
            && !without_both.contains(&id);
        flags.peer = present && !without_peer.contains(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::graph::Node;

    fn omit(classes: &[DepClass]) -> WalkOptions {
        WalkOptions {
            omit: classes.iter().copied().collect(),
            workspaces_enabled: true,
        }
    }

    /// root -prod-> a -prod-> shared
    /// root -dev-> d -prod-> shared, d -prod-> only-dev
    /// root -optional-> o
    /// root -peerOptional-> po
    fn fixture() -> Tree {
        let mut tree = Tree::new("root", Some("1.0.0".into()), "/proj");
        let root = tree.root_id();
        let a = tree.add_child(root, "a", "1.0.0");
        let d = tree.add_child(root, "d", "1.0.0");
        tree.add_child(root, "shared", "1.0.0");
        tree.add_child(root, "only-dev", "1.0.0");
        tree.add_child(root, "o", "1.0.0");
        tree.add_child(root, "po", "1.0.0");
        tree.add_child(root, "stray", "1.0.0");

        tree.add_edge(root, "a", "^1.0.0", DepType::Prod);
        tree.add_edge(root, "d", "^1.0.0", DepType::Dev);
        tree.add_edge(root, "o", "^1.0.0", DepType::Optional);
        tree.add_edge(root, "po", "^1.0.0", DepType::PeerOptional);
        tree.add_edge(a, "shared", "^1.0.0", DepType::Prod);
        tree.add_edge(d, "shared", "^1.0.0", DepType::Prod);
        tree.add_edge(d, "only-dev", "^1.0.0", DepType::Prod);
        tree.resolve_edges();
        tree
    }

    fn names(tree: &Tree, ids: &HashSet<NodeId>) -> BTreeSet<String> {
        ids.iter()
            .filter_map(|id| tree.node(*id))
            .map(|n| n.name.clone())
            .collect()
    }

    #[test]
    fn test_omit_parse() {
        let set = OmitSet::parse(&["dev", "peer"]).unwrap();
        assert!(set.contains(DepClass::Dev));
        assert!(!set.contains(DepClass::Optional));
        assert_eq!(set.to_string(), "[dev,peer]");

        let err = OmitSet::parse(&["prod"]).unwrap_err();
        assert_eq!(err.code(), crate::pkg::error::codes::PKG_OMIT_INVALID);
    }

    #[test]
    fn test_peer_optional_excluded_by_either_class() {
        let peer = OmitSet::parse(&["peer"]).unwrap();
        let optional = OmitSet::parse(&["optional"]).unwrap();
        assert!(peer.excludes(DepType::PeerOptional));
        assert!(optional.excludes(DepType::PeerOptional));
        assert!(!OmitSet::none().excludes(DepType::PeerOptional));
        assert!(!peer.excludes(DepType::Prod));
    }

    #[test]
    fn test_nothing_omitted_reaches_all_declared() {
        let tree = fixture();
        let reached = names(&tree, &reachable(&tree, &WalkOptions::default()));
        assert!(reached.contains("only-dev"));
        assert!(reached.contains("po"));
        assert!(!reached.contains("stray"));
    }

    #[test]
    fn test_shared_dependency_survives_omission() {
        let tree = fixture();
        let reached = names(&tree, &reachable(&tree, &omit(&[DepClass::Dev])));
        assert!(reached.contains("shared"));
        assert!(!reached.contains("d"));
        assert!(!reached.contains("only-dev"));
        assert!(reached.contains("o"));
    }

    #[test]
    fn test_omit_optional_drops_optional_peer() {
        let tree = fixture();
        let reached = names(&tree, &reachable(&tree, &omit(&[DepClass::Optional])));
        assert!(!reached.contains("o"));
        assert!(!reached.contains("po"));
        assert!(reached.contains("d"));
    }

    #[test]
    fn test_nested_peer_resolves_to_ancestor_install() {
        // root -prod-> host, root -prod-> wrapper -prod-> plugin (nested),
        // plugin -peer-> host resolves up to the root's copy
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        let host = tree.add_child(root, "host", "2.0.0");
        let wrapper = tree.add_child(root, "wrapper", "1.0.0");
        let plugin = tree.add_child(wrapper, "plugin", "1.0.0");
        tree.add_edge(root, "host", "^2.0.0", DepType::Prod);
        tree.add_edge(root, "wrapper", "^1.0.0", DepType::Prod);
        tree.add_edge(wrapper, "plugin", "^1.0.0", DepType::Prod);
        let peer = tree.add_edge(plugin, "host", "^2.0.0", DepType::Peer).unwrap();
        tree.resolve_edges();

        assert_eq!(tree.edge(peer).to, Some(host));
        assert_eq!(tree.nodes().filter(|n| n.name == "host").count(), 1);
        assert_eq!(tree.node(host).unwrap().edges_in.len(), 2);

        let reached = reachable(&tree, &omit(&[DepClass::Peer]));
        assert!(reached.contains(&host));
        assert!(reached.contains(&plugin));
        assert_eq!(reached.len(), 4);
    }

    #[test]
    fn test_peer_only_host_dropped_when_peer_omitted() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        let host = tree.add_child(root, "host", "2.0.0");
        let plugin = tree.add_child(root, "plugin", "1.0.0");
        tree.add_edge(root, "plugin", "^1.0.0", DepType::Prod);
        tree.add_edge(plugin, "host", "^2.0.0", DepType::Peer);
        tree.resolve_edges();

        assert!(reachable(&tree, &WalkOptions::default()).contains(&host));

        let reached = reachable(&tree, &omit(&[DepClass::Peer]));
        assert!(!reached.contains(&host));
        assert!(reached.contains(&plugin));
    }

    #[test]
    fn test_invalid_edge_does_not_reach() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        tree.add_child(root, "a", "1.0.0");
        tree.add_edge(root, "a", "^2.0.0", DepType::Prod);
        tree.resolve_edges();

        let reached = reachable(&tree, &WalkOptions::default());
        assert_eq!(reached.len(), 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        let a = tree.add_child(root, "a", "1.0.0");
        let b = tree.add_child(root, "b", "1.0.0");
        tree.add_edge(root, "a", "*", DepType::Prod);
        tree.add_edge(a, "b", "*", DepType::Prod);
        tree.add_edge(b, "a", "*", DepType::Prod);
        tree.resolve_edges();

        assert_eq!(reachable(&tree, &WalkOptions::default()).len(), 3);
    }

    #[test]
    fn test_workspace_edges_respect_toggle() {
        let mut tree = Tree::new("root", None, "/proj");
        let root = tree.root_id();
        let mut ws = Node::new("ws", Some("1.0.0".into()), "/proj/packages/ws");
        ws.is_workspace = true;
        ws.fs_parent = Some(root);
        let ws = tree.insert(ws, None);
        tree.workspaces.insert("ws".into(), ws);

        let link = tree.add_child(root, "ws", "1.0.0");
        tree.node_mut(link).unwrap().link_target = Some(ws);
        tree.add_child(root, "dep", "1.0.0");
        tree.add_workspace_edge("ws", "file:packages/ws");
        tree.add_edge(ws, "dep", "*", DepType::Dev);
        tree.resolve_edges();

        let on = names(&tree, &reachable(&tree, &WalkOptions::default()));
        assert!(on.contains("dep"));
        assert_eq!(on.iter().filter(|n| *n == "ws").count(), 1);
        assert!(reachable(&tree, &WalkOptions::default()).contains(&link));

        let off = reachable(
            &tree,
            &WalkOptions {
                omit: OmitSet::none(),
                workspaces_enabled: false,
            },
        );
        assert_eq!(off.len(), 1);
    }

    #[test]
    fn test_calc_dep_flags() {
        let mut tree = fixture();
        // d -optional-> both: only reachable through dev and optional
        let d = tree.root().children["d"];
        let root = tree.root_id();
        tree.add_child(root, "both", "1.0.0");
        tree.add_edge(d, "both", "*", DepType::Optional);
        // a -optional-> mixed, d -prod-> mixed: needs dev and optional omitted
        let a = tree.root().children["a"];
        tree.add_child(root, "mixed", "1.0.0");
        tree.add_edge(a, "mixed", "*", DepType::Optional);
        tree.add_edge(d, "mixed", "*", DepType::Prod);
        tree.resolve_edges();

        calc_dep_flags(&mut tree);
        let flags = |name: &str| tree.root_child(name).unwrap().flags;

        assert!(flags("d").dev);
        assert!(flags("only-dev").dev);
        assert!(!flags("shared").dev);
        assert!(flags("o").optional);
        assert!(flags("po").peer);
        assert!(flags("po").optional);
        assert!(flags("stray").extraneous);
        assert!(!flags("stray").dev);

        assert!(flags("both").dev && flags("both").optional);
        assert!(!flags("both").dev_optional);

        let mixed = flags("mixed");
        assert!(!mixed.dev && !mixed.optional);
        assert!(mixed.dev_optional);
        assert_eq!(tree.root().flags, Default::default());
    }
}
