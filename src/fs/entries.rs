//! Directory enumeration
//!
//! Entries are reported without following symlinks, so a link to a
//! directory is a link, not a directory.

use crate::error::Result;
use crate::tree::FileKind;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Directory entry with a kind the tree can represent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// Read the entries of `dir`, skipping devices, fifos, sockets and names
/// that are not valid UTF-8
pub fn read_entries(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            debug!("Skipping non UTF-8 entry {:?} in {:?}", file_name, dir);
            continue;
        };

        let file_type = entry.file_type()?;
        match FileKind::from_std(file_type) {
            Some(kind) => entries.push(DirEntry {
                name: name.to_string(),
                kind,
            }),
            None => debug!("Skipping special file {:?}", entry.path()),
        }
    }

    Ok(entries)
}

/// Kind of the entry at `path` without following a final symlink
pub fn lstat_kind(path: &Path) -> Result<Option<FileKind>> {
    let meta = fs::symlink_metadata(path)?;
    Ok(FileKind::from_std(meta.file_type()))
}
