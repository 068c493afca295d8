//! Destination preparation before a mount
//!
//! A bind mount needs an existing target of the same type. Symlinks cannot
//! be bind mounted at all and are re-created instead.

use crate::error::Result;
use crate::tree::FileKind;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

/// Ownership and mode of an original entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FileAttr {
    /// Read attributes of `path` without following symlinks
    pub fn read(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        Ok(FileAttr {
            mode: meta.mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    /// Apply mode and ownership to `path`
    pub fn apply(&self, path: &Path) -> Result<()> {
        fs::set_permissions(path, fs::Permissions::from_mode(self.mode))?;
        let uid = nix::unistd::Uid::from_raw(self.uid);
        let gid = nix::unistd::Gid::from_raw(self.gid);
        // chown needs privileges, skip it when the owner already matches
        let meta = fs::symlink_metadata(path)?;
        if meta.uid() != self.uid || meta.gid() != self.gid {
            nix::unistd::chown(path, Some(uid), Some(gid))
                .map_err(std::io::Error::from)?;
        }
        Ok(())
    }
}

/// Create a directory unless one is already there
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create an empty file unless one is already there
pub fn ensure_file(path: &Path) -> Result<()> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(())
}

/// Re-create the symlink at `src` as `dest`
pub fn copy_link(src: &Path, dest: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    match std::os::unix::fs::symlink(&target, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            if fs::read_link(dest).ok().as_deref() == Some(target.as_path()) {
                Ok(())
            } else {
                Err(e.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Make sure a mount target of `kind` exists at `dest`
pub fn ensure_target(kind: FileKind, dest: &Path) -> Result<()> {
    match kind {
        FileKind::Directory => ensure_dir(dest),
        FileKind::Regular => ensure_file(dest),
        FileKind::Symlink => Ok(()),
    }
}
