//! Mount pass
//!
//! Realization walks the prepared tree depth first. A node's own mount is
//! complete before any of its children is visited, since children are
//! placed inside whatever the parent put on the path.

use tracing::{debug, warn};

use super::dir::DirNode;
use super::kind::FileKind;
use super::node::{join_path, Body, Node};
use crate::error::{Error, Result};
use crate::fs::materialize::FileAttr;
use crate::fs::Mounter;
use crate::layout::Layout;
use std::path::Path;

/// A node that could not be realized
#[derive(Debug)]
pub struct MountFailure {
    pub path: String,
    pub error: Error,
}

/// Outcome of a mount pass
#[derive(Debug, Default)]
pub struct MountReport {
    /// Mounts issued and links created
    pub mounted: usize,
    /// Nodes whose realization failed; their subtrees were skipped
    pub failures: Vec<MountFailure>,
}

impl MountReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Where in the tree a node is being realized
#[derive(Debug, Clone, Copy)]
struct Location<'p> {
    path: &'p str,
    prefix: &'p str,
    in_tmpfs: bool,
}

/// State shared by one mount pass
pub(crate) struct Realizer<'l, M: Mounter> {
    layout: &'l Layout,
    mounter: M,
    report: MountReport,
}

impl<'l, M: Mounter> Realizer<'l, M> {
    pub(crate) fn new(layout: &'l Layout, mounter: M) -> Self {
        Self {
            layout,
            mounter,
            report: MountReport::default(),
        }
    }

    /// Realize the children of the tree root
    pub(crate) fn run(mut self, root: &Node<'_>) -> MountReport {
        if let Some(dir) = root.dir() {
            let at = Location {
                path: "",
                prefix: root.prefix().unwrap_or(""),
                in_tmpfs: false,
            };
            self.children(dir, at);
        }
        self.report
    }

    fn children(&mut self, dir: &DirNode<'_>, at: Location<'_>) {
        for child in dir.iter() {
            let path = join_path(at.path, child.name());
            self.node(child, Location { path: &path, ..at });
        }
    }

    /// Realize `node` at `at.path`, where `at` describes its parent
    fn node(&mut self, node: &Node<'_>, at: Location<'_>) {
        let path = at.path;
        match &node.body {
            Body::Root { prefix, dir } => {
                let inner = Location {
                    path,
                    prefix: prefix.as_str(),
                    in_tmpfs: false,
                };
                self.children(dir, inner);
            }
            Body::Inter(dir) => self.children(dir, Location { in_tmpfs: false, ..at }),
            Body::Tmpfs(dir) => match self.tmpfs(node, at) {
                Ok(()) => self.children(dir, Location { in_tmpfs: true, ..at }),
                Err(e) => self.fail(path, e),
            },
            Body::Mirror => {
                let src = self.layout.mirror_path(path);
                self.leaf(node, "mirror", &src, path, true);
            }
            Body::Module { module } => {
                let src = self.layout.module_path(module, at.prefix, path);
                let create = at.in_tmpfs || !node.exists();
                self.leaf(node, "module", &src, path, create);
            }
            Body::Custom { source } => {
                let create = at.in_tmpfs || !node.exists();
                self.leaf(node, "custom", source, path, create);
            }
        }
    }

    fn tmpfs(&mut self, node: &Node<'_>, at: Location<'_>) -> Result<()> {
        let dest = self.layout.dest(at.path);
        let attr = FileAttr::read(&self.layout.mirror_path(at.path)).ok();

        self.mounter.create_target(FileKind::Directory, &dest)?;
        if !at.in_tmpfs {
            let tag = if node.skip_mirror() { "replace" } else { "tmpfs" };
            self.mounter.mount_tmpfs(tag, &dest)?;
            self.report.mounted += 1;
        }
        if let Some(attr) = attr {
            if let Err(e) = self.mounter.copy_attr(&attr, &dest) {
                warn!("Failed to copy attributes onto {:?}: {}", dest, e);
            }
        }
        Ok(())
    }

    fn leaf(&mut self, node: &Node<'_>, tag: &str, src: &Path, path: &str, create: bool) {
        if let Err(e) = self.mount_leaf(node, tag, src, path, create) {
            self.fail(path, e);
        }
    }

    fn mount_leaf(
        &mut self,
        node: &Node<'_>,
        tag: &str,
        src: &Path,
        path: &str,
        create: bool,
    ) -> Result<()> {
        let dest = self.layout.dest(path);
        if node.is_symlink() {
            debug!("{}: link {:?} -> {:?}", tag, src, dest);
            self.mounter.copy_link(src, &dest)?;
        } else {
            if create {
                self.mounter.create_target(node.file_kind(), &dest)?;
            }
            self.mounter.bind_mount(tag, src, &dest)?;
        }
        self.report.mounted += 1;
        Ok(())
    }

    fn fail(&mut self, path: &str, error: Error) {
        warn!("Unable to mount {}: {}", path, error);
        self.report.failures.push(MountFailure {
            path: path.to_string(),
            error,
        });
    }
}
