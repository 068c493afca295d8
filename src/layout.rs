//! Locations the mount tree resolves its paths against
//!
//! Tree paths are absolute partition paths such as `/system/bin/sh`. The
//! layout maps them onto the live root, the mirror of original content and
//! the module store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default live root
pub const DEFAULT_SYSROOT: &str = "/";

/// Default mirror of original partition content
pub const DEFAULT_MIRROR_DIR: &str = "/debug_ramdisk/.magisk/mirror";

/// Default module store
pub const DEFAULT_MODULE_ROOT: &str = "/data/adb/modules";

/// Root directories for destinations, mirrors and modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Root of the live filesystem the tree is mounted onto
    pub sysroot: PathBuf,
    /// Read-only mirror of the original partitions
    pub mirror_dir: PathBuf,
    /// Directory holding one subdirectory per module
    pub module_root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            sysroot: PathBuf::from(DEFAULT_SYSROOT),
            mirror_dir: PathBuf::from(DEFAULT_MIRROR_DIR),
            module_root: PathBuf::from(DEFAULT_MODULE_ROOT),
        }
    }
}

impl Layout {
    /// Layout whose mirror is the live root itself, with modules under
    /// `<sysroot>/modules`. Handy when mounting into a scratch root.
    pub fn with_sysroot(sysroot: &Path) -> Self {
        Layout {
            sysroot: sysroot.to_path_buf(),
            mirror_dir: sysroot.to_path_buf(),
            module_root: sysroot.join("modules"),
        }
    }

    /// Where a tree path lives on the live filesystem
    pub fn dest(&self, path: &str) -> PathBuf {
        under(&self.sysroot, path)
    }

    /// Original content of a tree path
    pub fn mirror_path(&self, path: &str) -> PathBuf {
        under(&self.mirror_dir, path)
    }

    /// Root of one module's files
    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.module_root.join(module)
    }

    /// Module copy of a tree path under a partition root with `prefix`
    pub fn module_path(&self, module: &str, prefix: &str, path: &str) -> PathBuf {
        under(&self.module_dir(module), &format!("{}{}", prefix, path))
    }
}

fn under(base: &Path, path: &str) -> PathBuf {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() {
        base.to_path_buf()
    } else {
        base.join(relative)
    }
}
