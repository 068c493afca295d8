//! Mount syscalls
//!
//! The tree asks for two kinds of mounts: bind a source onto a target, or
//! put a fresh tmpfs on a target. Targets that do not exist yet are created
//! through the same trait so a dry run leaves the filesystem untouched.

use super::materialize::{self, FileAttr};
use crate::error::{Error, Result};
use crate::tree::FileKind;
use nix::mount::{mount, MsFlags};
use std::path::Path;
use tracing::{debug, info};

const NONE: Option<&'static str> = None;

/// Performs the mounts requested while realizing a tree
pub trait Mounter {
    /// Bind `src` onto the existing target `dest`
    fn bind_mount(&mut self, tag: &str, src: &Path, dest: &Path) -> Result<()>;

    /// Mount an empty tmpfs on the existing directory `dest`
    fn mount_tmpfs(&mut self, tag: &str, dest: &Path) -> Result<()>;

    /// Create an empty mount target of `kind` at `dest`
    fn create_target(&mut self, kind: FileKind, dest: &Path) -> Result<()> {
        materialize::ensure_target(kind, dest)
    }

    /// Recreate the symlink `src` at `dest`
    fn copy_link(&mut self, src: &Path, dest: &Path) -> Result<()> {
        materialize::copy_link(src, dest)
    }

    /// Give `dest` the mode and owner in `attr`
    fn copy_attr(&mut self, attr: &FileAttr, dest: &Path) -> Result<()> {
        attr.apply(dest)
    }
}

impl<M: Mounter + ?Sized> Mounter for &mut M {
    fn bind_mount(&mut self, tag: &str, src: &Path, dest: &Path) -> Result<()> {
        (**self).bind_mount(tag, src, dest)
    }

    fn mount_tmpfs(&mut self, tag: &str, dest: &Path) -> Result<()> {
        (**self).mount_tmpfs(tag, dest)
    }

    fn create_target(&mut self, kind: FileKind, dest: &Path) -> Result<()> {
        (**self).create_target(kind, dest)
    }

    fn copy_link(&mut self, src: &Path, dest: &Path) -> Result<()> {
        (**self).copy_link(src, dest)
    }

    fn copy_attr(&mut self, attr: &FileAttr, dest: &Path) -> Result<()> {
        (**self).copy_attr(attr, dest)
    }
}

/// Mounter issuing real mount syscalls
#[derive(Debug, Clone, Default)]
pub struct NixMounter {
    /// Remount every bind read-only
    pub read_only: bool,
    /// Options passed to each tmpfs mount, e.g. `mode=755`
    pub tmpfs_opts: Option<String>,
}

impl NixMounter {
    pub fn new(read_only: bool, tmpfs_opts: Option<String>) -> Self {
        Self {
            read_only,
            tmpfs_opts,
        }
    }
}

impl Mounter for NixMounter {
    fn bind_mount(&mut self, tag: &str, src: &Path, dest: &Path) -> Result<()> {
        debug!("{}: {:?} <- {:?}", tag, dest, src);
        mount(Some(src), dest, NONE, MsFlags::MS_BIND | MsFlags::MS_REC, NONE)
            .map_err(|e| Error::mount(tag, src, dest, e))?;

        if self.read_only {
            mount(
                NONE,
                dest,
                NONE,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
                NONE,
            )
            .map_err(|e| Error::mount(tag, src, dest, e))?;
        }
        Ok(())
    }

    fn mount_tmpfs(&mut self, tag: &str, dest: &Path) -> Result<()> {
        debug!("{}: {:?} <- tmpfs", tag, dest);
        mount(
            Some("tmpfs"),
            dest,
            Some("tmpfs"),
            MsFlags::empty(),
            self.tmpfs_opts.as_deref(),
        )
        .map_err(|e| Error::mount(tag, "tmpfs", dest, e))
    }
}

/// Mounter that only logs what it would do
#[derive(Debug, Default)]
pub struct DryRunMounter {
    /// Number of mounts that would have been issued
    pub count: usize,
}

impl Mounter for DryRunMounter {
    fn bind_mount(&mut self, tag: &str, src: &Path, dest: &Path) -> Result<()> {
        self.count += 1;
        info!("[dry-run] {}: bind {:?} -> {:?}", tag, src, dest);
        Ok(())
    }

    fn mount_tmpfs(&mut self, tag: &str, dest: &Path) -> Result<()> {
        self.count += 1;
        info!("[dry-run] {}: tmpfs -> {:?}", tag, dest);
        Ok(())
    }

    fn create_target(&mut self, kind: FileKind, dest: &Path) -> Result<()> {
        debug!("[dry-run] create {} {:?}", kind, dest);
        Ok(())
    }

    fn copy_link(&mut self, src: &Path, dest: &Path) -> Result<()> {
        self.count += 1;
        info!("[dry-run] link {:?} -> {:?}", src, dest);
        Ok(())
    }

    fn copy_attr(&mut self, _attr: &FileAttr, _dest: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::PathBuf;

    /// One recorded mount request
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum MountOp {
        Bind {
            tag: String,
            src: PathBuf,
            dest: PathBuf,
        },
        Tmpfs {
            tag: String,
            dest: PathBuf,
        },
    }

    impl MountOp {
        pub(crate) fn dest(&self) -> &Path {
            match self {
                MountOp::Bind { dest, .. } | MountOp::Tmpfs { dest, .. } => dest,
            }
        }
    }

    /// Mounter recording requests, failing for chosen destinations
    #[derive(Debug, Default)]
    pub(crate) struct RecordingMounter {
        pub(crate) ops: Vec<MountOp>,
        pub(crate) fail_on: Vec<PathBuf>,
    }

    impl RecordingMounter {
        fn check(&self, tag: &str, dest: &Path) -> Result<()> {
            if self.fail_on.iter().any(|p| p == dest) {
                return Err(Error::mount(tag, "test", dest, nix::errno::Errno::EPERM));
            }
            Ok(())
        }
    }

    impl Mounter for RecordingMounter {
        fn bind_mount(&mut self, tag: &str, src: &Path, dest: &Path) -> Result<()> {
            self.check(tag, dest)?;
            self.ops.push(MountOp::Bind {
                tag: tag.to_string(),
                src: src.to_path_buf(),
                dest: dest.to_path_buf(),
            });
            Ok(())
        }

        fn mount_tmpfs(&mut self, tag: &str, dest: &Path) -> Result<()> {
            self.check(tag, dest)?;
            self.ops.push(MountOp::Tmpfs {
                tag: tag.to_string(),
                dest: dest.to_path_buf(),
            });
            Ok(())
        }
    }
}
