//! Directory children and the insert/upgrade engine
//!
//! Every mutation of a sibling slot goes through
//! [`DirNode::emplace_or_upgrade`], which keeps the occupant of each slot at
//! the highest precedence ever offered and never constructs a node that
//! would be rejected.

use std::collections::btree_map::{self, BTreeMap};

use super::kind::NodeKind;
use super::node::Node;

/// Children of a directory-category node, ordered by name
#[derive(Debug, Default)]
pub struct DirNode<'a> {
    children: BTreeMap<String, Node<'a>>,
}

impl<'a> DirNode<'a> {
    pub fn new() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn get(&self, name: &str) -> Option<&Node<'a>> {
        self.children.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node<'a>> {
        self.children.get_mut(name)
    }

    /// Children in name order
    pub fn iter(&self) -> btree_map::Values<'_, String, Node<'a>> {
        self.children.values()
    }

    /// Snapshot of child names, for walks that mutate slots as they go
    pub fn names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// Detach a child, handing ownership to the caller
    pub fn extract(&mut self, name: &str) -> Option<Node<'a>> {
        self.children.remove(name)
    }

    /// Place `node` at its own name if the slot is vacant or held by a
    /// lower-precedence node. A rejected node is handed back untouched.
    pub fn insert(&mut self, node: Node<'a>) -> Result<(), Node<'a>> {
        let name = node.name().to_string();
        let kind = node.kind();
        let mut candidate = Some(node);
        self.emplace_or_upgrade(&name, kind, |_| candidate.take());
        match candidate {
            Some(rejected) => Err(rejected),
            None => Ok(()),
        }
    }

    /// Construct a node of `kind` at `name` unless the slot already holds
    /// something of equal or higher precedence. `make` only runs when the
    /// node is going to be kept.
    pub fn emplace<F>(&mut self, name: &str, kind: NodeKind, make: F) -> Option<&mut Node<'a>>
    where
        F: FnOnce() -> Node<'a>,
    {
        self.emplace_or_upgrade(name, kind, |_| {
            let node = make();
            debug_assert_eq!(node.kind(), kind);
            Some(node)
        })
    }

    /// Replace the existing occupant of `name` with a node of `kind` built
    /// from it. Vacant slots are left alone.
    pub fn upgrade<F>(&mut self, name: &str, kind: NodeKind, make: F) -> Option<&mut Node<'a>>
    where
        F: FnOnce(Node<'a>) -> Node<'a>,
    {
        self.emplace_or_upgrade(name, kind, |existing| {
            let node = existing.take().map(make);
            debug_assert!(node.as_ref().map_or(true, |n| n.kind() == kind));
            node
        })
    }

    /// Insert a new node at `name` or upgrade the occupant.
    ///
    /// When the slot is occupied by a node whose precedence is not strictly
    /// lower than `kind`, nothing happens and `build` is never called.
    /// Otherwise `build` receives the current occupant (or `None`). It may
    /// take the occupant out of the option to consume it itself; anything it
    /// leaves behind is consumed into the returned node. Returning `None`
    /// rejects the insertion, in which case `build` must not have taken the
    /// occupant.
    pub fn emplace_or_upgrade<F>(
        &mut self,
        name: &str,
        kind: NodeKind,
        build: F,
    ) -> Option<&mut Node<'a>>
    where
        F: FnOnce(&mut Option<Node<'a>>) -> Option<Node<'a>>,
    {
        if let Some(occupant) = self.children.get(name) {
            if !kind.outranks(occupant.kind()) {
                return None;
            }
        }

        let mut existing = self.children.remove(name);
        let Some(mut node) = build(&mut existing) else {
            if let Some(occupant) = existing {
                self.children.insert(name.to_string(), occupant);
            }
            return None;
        };
        if let Some(occupant) = existing {
            node.consume(occupant);
        }
        debug_assert_eq!(node.name(), name);

        match self.children.entry(name.to_string()) {
            btree_map::Entry::Vacant(slot) => Some(slot.insert(node)),
            btree_map::Entry::Occupied(mut slot) => {
                slot.insert(node);
                Some(slot.into_mut())
            }
        }
    }

    /// Move children of `other` that are not already present into `self`
    pub(crate) fn merge(&mut self, other: DirNode<'a>) {
        for (name, child) in other.children {
            self.children.entry(name).or_insert(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::kind::FileKind;
    use std::cell::Cell;

    fn mirror(name: &str) -> Node<'static> {
        Node::mirror(name, FileKind::Regular)
    }

    fn inter_with(name: &str, children: &[&str]) -> Node<'static> {
        let mut node = Node::inter(name);
        let dir = node.dir_mut().unwrap();
        for child in children {
            dir.insert(mirror(child)).unwrap();
        }
        node
    }

    #[test]
    fn test_mirror_then_inter_then_mirror() {
        let mut dir = DirNode::new();
        assert!(dir.insert(mirror("a")).is_ok());
        assert_eq!(dir.get("a").unwrap().kind(), NodeKind::Mirror);

        assert!(dir.emplace("a", NodeKind::Inter, || Node::inter("a")).is_some());
        let a = dir.get("a").unwrap();
        assert_eq!(a.kind(), NodeKind::Inter);
        assert_eq!(a.name(), "a");
        assert!(a.dir().unwrap().is_empty());

        let rejected = dir.insert(mirror("a")).unwrap_err();
        assert_eq!(rejected.name(), "a");
        assert_eq!(dir.get("a").unwrap().kind(), NodeKind::Inter);
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_rejection_never_builds() {
        let mut dir = DirNode::new();
        dir.emplace("x", NodeKind::Module, || Node::module("x", FileKind::Regular, "first"));

        let built = Cell::new(0);
        for kind in [NodeKind::Mirror, NodeKind::Inter, NodeKind::Tmpfs, NodeKind::Module] {
            let res = dir.emplace_or_upgrade("x", kind, |_| {
                built.set(built.get() + 1);
                Some(Node::inter("x"))
            });
            assert!(res.is_none());
        }
        assert_eq!(built.get(), 0);
        assert_eq!(dir.get("x").unwrap().module_name(), Some("first"));
    }

    #[test]
    fn test_slot_holds_max_precedence() {
        let sequence = [
            NodeKind::Inter,
            NodeKind::Mirror,
            NodeKind::Module,
            NodeKind::Tmpfs,
            NodeKind::Custom,
            NodeKind::Inter,
            NodeKind::Module,
        ];
        let mut dir = DirNode::new();
        let mut max: Option<NodeKind> = None;
        for kind in sequence {
            let node = match kind {
                NodeKind::Mirror => mirror("s"),
                NodeKind::Inter => Node::inter("s"),
                NodeKind::Tmpfs => Node::tmpfs("s"),
                NodeKind::Module => Node::module("s", FileKind::Regular, "m"),
                NodeKind::Custom => Node::custom("s", FileKind::Regular, "/src".into()),
                NodeKind::Root => Node::root("s", ""),
            };
            let accepted = dir.insert(node).is_ok();
            assert_eq!(accepted, max.map_or(true, |m| kind.outranks(m)));
            if accepted {
                max = Some(kind);
            }
            assert_eq!(dir.get("s").map(|n| n.kind()), max);
        }
        assert_eq!(max, Some(NodeKind::Custom));
    }

    #[test]
    fn test_equal_precedence_first_wins() {
        let mut dir = DirNode::new();
        assert!(dir.insert(Node::module("x", FileKind::Regular, "alpha")).is_ok());
        assert!(dir.insert(Node::module("x", FileKind::Regular, "beta")).is_err());
        assert_eq!(dir.get("x").unwrap().module_name(), Some("alpha"));
    }

    #[test]
    fn test_upgrade_preserves_children() {
        let mut dir = DirNode::new();
        dir.insert(inter_with("etc", &["hosts", "fstab", "init"])).unwrap();

        let node = dir
            .upgrade("etc", NodeKind::Tmpfs, |ex| {
                let mut node = Node::tmpfs("etc");
                node.consume(ex);
                node
            })
            .unwrap();
        assert_eq!(node.kind(), NodeKind::Tmpfs);

        let names: Vec<&str> = node.dir().unwrap().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["fstab", "hosts", "init"]);
    }

    #[test]
    fn test_upgrade_merge_keeps_new_children_first() {
        let mut dir = DirNode::new();
        let mut old = inter_with("bin", &["sh"]);
        old.dir_mut()
            .unwrap()
            .insert(Node::module("ls", FileKind::Regular, "old"))
            .unwrap();
        dir.insert(old).unwrap();

        let mut replacement = Node::root("bin", "/system");
        replacement
            .dir_mut()
            .unwrap()
            .insert(Node::module("ls", FileKind::Regular, "new"))
            .unwrap();
        dir.insert(replacement).unwrap();

        let bin = dir.get("bin").unwrap().dir().unwrap();
        assert_eq!(bin.len(), 2);
        assert_eq!(bin.get("ls").unwrap().module_name(), Some("new"));
        assert_eq!(bin.get("sh").unwrap().kind(), NodeKind::Mirror);
    }

    #[test]
    fn test_upgrade_requires_existing() {
        let mut dir = DirNode::new();
        let res = dir.upgrade("missing", NodeKind::Tmpfs, |ex| ex);
        assert!(res.is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_refusing_builder_keeps_occupant() {
        let mut dir = DirNode::new();
        dir.insert(mirror("a")).unwrap();
        assert!(dir.emplace_or_upgrade("a", NodeKind::Module, |_| None).is_none());
        assert_eq!(dir.get("a").unwrap().kind(), NodeKind::Mirror);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn test_upgrade_to_wrong_kind_panics() {
        let mut dir = DirNode::new();
        dir.insert(Node::inter("etc")).unwrap();
        dir.upgrade("etc", NodeKind::Tmpfs, |ex| {
            let mut node = Node::module("etc", FileKind::Regular, "m");
            node.consume(ex);
            node
        });
    }

    #[test]
    fn test_extract_then_insert_restores() {
        let mut dir = DirNode::new();
        dir.insert(inter_with("app", &["a.apk", "b.apk"])).unwrap();
        dir.insert(mirror("lib")).unwrap();

        let app = dir.extract("app").unwrap();
        assert!(dir.get("app").is_none());
        assert!(dir.extract("app").is_none());
        dir.insert(app).unwrap();

        assert_eq!(dir.names(), vec!["app", "lib"]);
        let app = dir.get("app").unwrap();
        assert_eq!(app.kind(), NodeKind::Inter);
        assert_eq!(app.dir().unwrap().names(), vec!["a.apk", "b.apk"]);
    }
}
