//! Module discovery
//!
//! A module is a directory under the module root. Its `system` directory
//! mirrors the layout of the partition it overrides.

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::tree::SYSTEM;
use std::fs;
use tracing::debug;

/// Marker files that keep a module from being mounted
pub const SKIP_MARKERS: &[&str] = &["disable", "remove", "skip_mount"];

/// Whether `module` should take part in the mount
pub fn is_mountable(layout: &Layout, module: &str) -> bool {
    let dir = layout.module_dir(module);
    if let Some(marker) = SKIP_MARKERS.iter().find(|m| dir.join(m).exists()) {
        debug!("{}: skipped, found {}", module, marker);
        return false;
    }
    dir.join(SYSTEM).is_dir()
}

/// List mountable modules under the module root, sorted by name
pub fn discover(layout: &Layout) -> Result<Vec<String>> {
    let root = &layout.module_root;
    if !root.is_dir() {
        return Err(Error::PathNotFound(root.display().to_string()));
    }

    let mut modules = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if is_mountable(layout, &name) {
            modules.push(name);
        }
    }
    modules.sort();
    Ok(modules)
}

/// Filter an explicit module list down to the mountable ones, keeping order
pub fn select(layout: &Layout, modules: &[String]) -> Vec<String> {
    modules
        .iter()
        .filter(|m| is_mountable(layout, m))
        .cloned()
        .collect()
}
