//! Filesystem primitives used by the tree
//!
//! Enumeration of real directories, creation of mount targets and the
//! mount syscalls themselves.

pub mod entries;
pub mod materialize;
pub mod mount;

pub use entries::{read_entries, DirEntry};
pub use mount::{DryRunMounter, Mounter, NixMounter};
