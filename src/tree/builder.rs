//! Two-phase tree construction
//!
//! *Collect* merges the files of every module into the tree. *Prepare* then
//! walks the real partitions, marks what exists and decides which
//! directories have to be rebuilt on tmpfs. Both phases finish before the
//! tree can be realized.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::kind::{FileKind, NodeKind};
use super::node::{join_path, Node};
use super::{MountTree, PreparedTree, SYSTEM};
use crate::error::{Error, Result};
use crate::fs::entries::{lstat_kind, read_entries};
use crate::layout::Layout;

/// Marker file asking for a directory to be replaced instead of merged
pub const REPLACE_MARKER: &str = ".replace";

/// Module source prefix of partitions hoisted out of `/system`
pub const HOISTED_PREFIX: &str = "/system";

/// Collect the `system` directory of `module` into the tree.
///
/// Returns `false` when the module has nothing to mount. Files already
/// contributed by an earlier module are kept.
pub fn collect<'a>(tree: &mut MountTree<'a>, layout: &Layout, module: &'a str) -> bool {
    let src = layout.module_dir(module).join(SYSTEM);
    if !src.is_dir() {
        debug!("{}: no {} directory", module, SYSTEM);
        return false;
    }
    let Some(system) = tree.system_mut() else {
        return false;
    };

    info!("{}: loading mount files", module);
    collect_dir(system, module, &src);
    true
}

fn collect_dir<'a>(node: &mut Node<'a>, module: &'a str, src: &Path) {
    let entries = match read_entries(src) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("{}: unable to read {:?}: {}", module, src, e);
            return;
        }
    };

    if entries.iter().any(|e| e.name == REPLACE_MARKER) {
        node.set_skip_mirror(true);
    }
    let Some(dir) = node.dir_mut() else {
        return;
    };

    for entry in entries {
        if entry.name == REPLACE_MARKER {
            continue;
        }
        if entry.kind == FileKind::Directory {
            if dir.get(&entry.name).is_none() {
                dir.emplace(&entry.name, NodeKind::Inter, || Node::inter(&entry.name));
            }
            match dir.get_mut(&entry.name) {
                Some(child) if child.kind().is_dir_category() => {
                    collect_dir(child, module, &src.join(&entry.name));
                }
                _ => debug!("{}: {:?} is shadowed by a file", module, src.join(&entry.name)),
            }
        } else {
            dir.emplace(&entry.name, NodeKind::Module, || {
                Node::module(&entry.name, entry.kind, module)
            });
        }
    }
}

/// Place a file from `source` at `path` inside `/system`, ahead of any
/// module content
pub fn inject(tree: &mut MountTree<'_>, path: &str, source: PathBuf) -> Result<()> {
    let kind = lstat_kind(&source)?.ok_or_else(|| {
        Error::InvalidConfig(format!("Unsupported file type: {}", source.display()))
    })?;

    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let (name, parents) = match parts.split_last() {
        Some((name, parents)) if parents.first() == Some(&SYSTEM) => (*name, &parents[1..]),
        _ => {
            return Err(Error::InvalidConfig(format!(
                "Injected path must be inside /{}: {}",
                SYSTEM, path
            )))
        }
    };

    let mut node = tree
        .system_mut()
        .ok_or_else(|| Error::Internal("tree has no system root".to_string()))?;
    for segment in parents {
        let dir = node
            .dir_mut()
            .ok_or_else(|| Error::Internal(format!("{} is not a directory", segment)))?;
        if dir.get(segment).is_none() {
            dir.emplace(segment, NodeKind::Inter, || Node::inter(segment));
        }
        node = dir
            .get_mut(segment)
            .filter(|child| child.kind().is_dir_category())
            .ok_or_else(|| {
                Error::InvalidConfig(format!("{}: {} is not a directory in the tree", path, segment))
            })?;
    }

    let dir = node
        .dir_mut()
        .ok_or_else(|| Error::Internal(format!("{} has no parent directory", path)))?;
    debug!("Injecting {:?} at {}", source, path);
    dir.insert(Node::custom(name, kind, source))
        .map_err(|_| Error::InvalidConfig(format!("{} is injected twice", path)))
}

/// Move `system/<part>` to the top of the tree for every partition that is
/// a real directory of its own
pub fn hoist_partitions<S: AsRef<str>>(tree: &mut MountTree<'_>, layout: &Layout, partitions: &[S]) {
    for part in partitions {
        let part = part.as_ref();
        let real = layout.dest(&join_path("", part));
        let is_dir = fs::symlink_metadata(&real)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        let Some(old) = tree
            .system_mut()
            .and_then(|system| system.dir_mut())
            .and_then(|dir| dir.extract(part))
        else {
            continue;
        };

        debug!("Mounting {} as its own partition", part);
        let root = Node::root_from(old, HOISTED_PREFIX);
        if let Some(top) = tree.root_mut().dir_mut() {
            if let Err(rejected) = top.insert(root) {
                warn!("Partition {} already in tree, skipped", rejected.name());
            }
        }
    }
}

/// Walk the real partitions and decide which directories need tmpfs
pub fn prepare(tree: &mut MountTree<'_>, layout: &Layout) {
    prepare_dir(tree.root_mut(), "", layout);
}

/// Returns true when `node` itself must be rebuilt on tmpfs
fn prepare_dir(node: &mut Node<'_>, path: &str, layout: &Layout) -> bool {
    let kind = node.kind();
    let skip = node.skip_mirror();
    let mut upgrade = skip || !node.exists();
    let Some(dir) = node.dir_mut() else {
        return false;
    };

    for name in dir.names() {
        let child_path = join_path(path, &name);
        let Some(child) = dir.get_mut(&name) else {
            continue;
        };

        // Paths missing on the real partition and symlinks on either side
        // cannot be bind mounted in place.
        let cannot_mount = match lstat_kind(&layout.dest(&child_path)) {
            Ok(real) => {
                child.set_exists(true);
                child.is_symlink() || real == Some(FileKind::Symlink)
            }
            Err(_) => true,
        };

        if cannot_mount {
            if kind.outranks(NodeKind::Tmpfs) {
                warn!("Unable to add {}, skipped", child_path);
                dir.extract(&name);
                continue;
            }
            upgrade = true;
        }

        if child.kind().is_dir_category() {
            if skip {
                child.set_skip_mirror(true);
            }
            if prepare_dir(child, &child_path, layout) {
                dir.upgrade(&name, NodeKind::Tmpfs, |ex| {
                    Node::tmpfs_from(ex, &child_path, layout)
                });
            }
        }
    }
    upgrade
}

/// Runs collect, then prepare, over a fresh tree
pub struct TreeBuilder<'a> {
    layout: &'a Layout,
    tree: MountTree<'a>,
    modules: Vec<&'a str>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self {
            layout,
            tree: MountTree::new(),
            modules: Vec::new(),
        }
    }

    /// Collect one module; earlier modules win conflicts
    pub fn add_module(&mut self, module: &'a str) -> bool {
        let loaded = collect(&mut self.tree, self.layout, module);
        if loaded {
            self.modules.push(module);
        }
        loaded
    }

    /// Inject a single file
    pub fn inject(&mut self, path: &str, source: &Path) -> Result<()> {
        inject(&mut self.tree, path, source.to_path_buf())
    }

    /// Modules that contributed to the tree, in order
    pub fn modules(&self) -> &[&'a str] {
        &self.modules
    }

    /// Whether there is nothing to mount
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Finish the tree: hoist partitions and run the prepare phase
    pub fn build<S: AsRef<str>>(mut self, partitions: &[S]) -> PreparedTree<'a> {
        hoist_partitions(&mut self.tree, self.layout, partitions);
        prepare(&mut self.tree, self.layout);
        PreparedTree::new(self.tree)
    }
}
