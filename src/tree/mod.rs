//! Mount tree
//!
//! The tree describes the merged view of the partitions: which paths keep
//! their original content, which come from modules and which directories
//! must be rebuilt on tmpfs. It is built once by [`TreeBuilder`], realized
//! once and dropped.

mod builder;
mod dir;
mod kind;
mod node;
mod realize;

pub use builder::{collect, hoist_partitions, inject, prepare, TreeBuilder};
pub use dir::DirNode;
pub use kind::{FileKind, NodeKind};
pub use node::{join_path, Node};
pub use realize::{MountFailure, MountReport};

use crate::fs::Mounter;
use crate::layout::Layout;
use std::fmt::Write as _;

/// Name of the partition every module contributes to
pub const SYSTEM: &str = "system";

/// Tree under construction
#[derive(Debug)]
pub struct MountTree<'a> {
    root: Node<'a>,
}

impl<'a> MountTree<'a> {
    /// Empty tree: the top root with a `system` partition root
    pub fn new() -> Self {
        let mut root = Node::root("", "");
        if let Some(dir) = root.dir_mut() {
            dir.emplace(SYSTEM, NodeKind::Root, || Node::root(SYSTEM, ""));
        }
        Self { root }
    }

    pub fn root(&self) -> &Node<'a> {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node<'a> {
        &mut self.root
    }

    /// The `system` partition root
    pub fn system_mut(&mut self) -> Option<&mut Node<'a>> {
        self.root.dir_mut()?.get_mut(SYSTEM)
    }

    /// Whether no module content has been collected
    pub fn is_empty(&self) -> bool {
        self.root
            .dir()
            .map(|dir| dir.iter().all(|part| part.dir().map_or(true, |d| d.is_empty())))
            .unwrap_or(true)
    }

    /// Node at an absolute tree path
    pub fn find(&self, path: &str) -> Option<&Node<'a>> {
        let mut node = &self.root;
        for name in path.split('/').filter(|s| !s.is_empty()) {
            node = node.dir()?.get(name)?;
        }
        Some(node)
    }
}

impl Default for MountTree<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Tree whose prepare phase has completed; the only form that can be mounted
#[derive(Debug)]
pub struct PreparedTree<'a> {
    tree: MountTree<'a>,
}

impl<'a> PreparedTree<'a> {
    pub(crate) fn new(tree: MountTree<'a>) -> Self {
        Self { tree }
    }

    pub fn root(&self) -> &Node<'a> {
        self.tree.root()
    }

    pub fn find(&self, path: &str) -> Option<&Node<'a>> {
        self.tree.find(path)
    }

    /// Visit every node, parents first, with its path
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&str, &Node<'a>),
    {
        self.tree.root.walk("", &mut f);
    }

    /// Mount the tree, parents before children. Failures are collected and
    /// the pass carries on with the siblings of a failed node.
    pub fn realize<M: Mounter>(&self, layout: &Layout, mounter: M) -> MountReport {
        realize::Realizer::new(layout, mounter).run(&self.tree.root)
    }

    /// Human readable listing of the tree
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.walk(|path, node| {
            if path.is_empty() {
                return;
            }
            let depth = path.matches('/').count() - 1;
            let mut line = format!("{:indent$}{} [{}", "", node.name(), node.kind(), indent = depth * 2);
            if let Some(module) = node.module_name() {
                let _ = write!(line, " {}", module);
            }
            if let Some(source) = node.source() {
                let _ = write!(line, " {}", source.display());
            }
            if node.skip_mirror() {
                line.push_str(" replace");
            }
            line.push(']');
            out.push_str(&line);
            out.push('\n');
        });
        out
    }
}
