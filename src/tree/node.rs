//! Tree node representation
//!
//! A node is the desired state of one path in the merged view. Its kind
//! decides where its content comes from when the tree is realized.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::dir::DirNode;
use super::kind::{FileKind, NodeKind};
use crate::fs::entries::read_entries;
use crate::layout::Layout;

/// Kind-specific payload of a node
#[derive(Debug)]
pub(crate) enum Body<'a> {
    Mirror,
    Module { module: &'a str },
    Custom { source: PathBuf },
    Inter(DirNode<'a>),
    Tmpfs(DirNode<'a>),
    Root { prefix: String, dir: DirNode<'a> },
}

/// One entry of the mount tree
#[derive(Debug)]
pub struct Node<'a> {
    name: String,
    file_kind: FileKind,
    exists: bool,
    skip_mirror: bool,
    pub(crate) body: Body<'a>,
}

impl<'a> Node<'a> {
    fn with_body(name: &str, file_kind: FileKind, body: Body<'a>) -> Self {
        Self {
            name: name.to_string(),
            file_kind,
            exists: false,
            skip_mirror: false,
            body,
        }
    }

    /// Passthrough of an original entry
    pub fn mirror(name: &str, file_kind: FileKind) -> Self {
        Self::with_body(name, file_kind, Body::Mirror)
    }

    /// Entry supplied by `module`
    pub fn module(name: &str, file_kind: FileKind, module: &'a str) -> Self {
        Self::with_body(name, file_kind, Body::Module { module })
    }

    /// Injected entry bound from an explicit source
    pub fn custom(name: &str, file_kind: FileKind, source: PathBuf) -> Self {
        Self::with_body(name, file_kind, Body::Custom { source })
    }

    /// Structural directory
    pub fn inter(name: &str) -> Self {
        Self::with_body(name, FileKind::Directory, Body::Inter(DirNode::new()))
    }

    /// Empty synthesized directory
    pub fn tmpfs(name: &str) -> Self {
        Self::with_body(name, FileKind::Directory, Body::Tmpfs(DirNode::new()))
    }

    /// Partition root with the given module source prefix
    pub fn root(name: &str, prefix: &str) -> Self {
        let mut node = Self::with_body(
            name,
            FileKind::Directory,
            Body::Root {
                prefix: prefix.to_string(),
                dir: DirNode::new(),
            },
        );
        node.exists = true;
        node
    }

    /// Partition root taking over an existing subtree
    pub fn root_from(existing: Node<'a>, prefix: &str) -> Self {
        let mut node = Self::root(existing.name(), prefix);
        node.consume(existing);
        node.exists = true;
        node
    }

    /// Synthesized directory taking over an existing node at `path`.
    ///
    /// Unless the directory replaces its original wholesale, every original
    /// entry not already claimed is added: files and symlinks as mirror
    /// children, subdirectories as structural children. Structural children
    /// are then synthesized as well, since they will live inside the new
    /// tmpfs.
    pub fn tmpfs_from(existing: Node<'a>, path: &str, layout: &Layout) -> Self {
        let mut node = Self::tmpfs(existing.name());
        node.consume(existing);

        if !node.skip_mirror {
            let mirror = layout.mirror_path(path);
            match read_entries(&mirror) {
                Ok(entries) => {
                    node.exists = true;
                    if let Some(dir) = node.dir_mut() {
                        for entry in entries {
                            if entry.kind == FileKind::Directory {
                                dir.emplace(&entry.name, NodeKind::Inter, || {
                                    Node::inter(&entry.name)
                                });
                            } else {
                                dir.emplace(&entry.name, NodeKind::Mirror, || {
                                    Node::mirror(&entry.name, entry.kind)
                                });
                            }
                        }
                    }
                }
                Err(e) => debug!("No mirror for {}: {}", path, e),
            }
        }

        if let Some(dir) = node.dir_mut() {
            for name in dir.names() {
                let is_inter = dir.get(&name).map(|c| c.kind()) == Some(NodeKind::Inter);
                if is_inter {
                    let child_path = join_path(path, &name);
                    dir.upgrade(&name, NodeKind::Tmpfs, |ex| {
                        Node::tmpfs_from(ex, &child_path, layout)
                    });
                }
            }
        }
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    pub fn is_dir(&self) -> bool {
        self.file_kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_kind == FileKind::Symlink
    }

    pub fn is_regular(&self) -> bool {
        self.file_kind == FileKind::Regular
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            Body::Mirror => NodeKind::Mirror,
            Body::Module { .. } => NodeKind::Module,
            Body::Custom { .. } => NodeKind::Custom,
            Body::Inter(_) => NodeKind::Inter,
            Body::Tmpfs(_) => NodeKind::Tmpfs,
            Body::Root { .. } => NodeKind::Root,
        }
    }

    /// Whether the entry is present on the real partition
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// Whether the original directory content is hidden entirely
    pub fn skip_mirror(&self) -> bool {
        self.skip_mirror
    }

    pub fn set_skip_mirror(&mut self, skip: bool) {
        self.skip_mirror = skip;
    }

    /// Owning module of a module node
    pub fn module_name(&self) -> Option<&'a str> {
        match self.body {
            Body::Module { module } => Some(module),
            _ => None,
        }
    }

    /// Source of an injected node
    pub fn source(&self) -> Option<&Path> {
        match &self.body {
            Body::Custom { source } => Some(source),
            _ => None,
        }
    }

    /// Module source prefix of a root node
    pub fn prefix(&self) -> Option<&str> {
        match &self.body {
            Body::Root { prefix, .. } => Some(prefix),
            _ => None,
        }
    }

    pub fn dir(&self) -> Option<&DirNode<'a>> {
        match &self.body {
            Body::Inter(dir) | Body::Tmpfs(dir) | Body::Root { dir, .. } => Some(dir),
            _ => None,
        }
    }

    pub fn dir_mut(&mut self) -> Option<&mut DirNode<'a>> {
        match &mut self.body {
            Body::Inter(dir) | Body::Tmpfs(dir) | Body::Root { dir, .. } => Some(dir),
            _ => None,
        }
    }

    fn into_dir(self) -> Option<DirNode<'a>> {
        match self.body {
            Body::Inter(dir) | Body::Tmpfs(dir) | Body::Root { dir, .. } => Some(dir),
            _ => None,
        }
    }

    /// Absorb the node this one supersedes: its identity, its flags and,
    /// between directories, its children. Children already present here
    /// take precedence over the absorbed ones.
    pub fn consume(&mut self, other: Node<'a>) {
        self.name = other.name.clone();
        self.file_kind = other.file_kind;
        self.exists = other.exists;
        self.skip_mirror = other.skip_mirror;

        if let Some(dir) = self.dir_mut() {
            if let Some(children) = other.into_dir() {
                dir.merge(children);
            }
        }
    }

    /// Visit this node and its descendants, parents first, with their paths
    pub fn walk<F>(&self, path: &str, f: &mut F)
    where
        F: FnMut(&str, &Node<'a>),
    {
        f(path, self);
        if let Some(dir) = self.dir() {
            for child in dir.iter() {
                child.walk(&join_path(path, child.name()), f);
            }
        }
    }
}

/// Path of a child named `name` under `parent`
pub fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name)
}
