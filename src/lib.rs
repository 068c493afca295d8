//! magicmount - overlay module files onto read-only partitions
//!
//! Module directories are merged into a mount tree that records, for every
//! path, whether the original content stays, a module file replaces it or
//! the directory has to be rebuilt on tmpfs. The tree is then realized with
//! bind mounts, parents before children.

pub mod cert;
pub mod config;
pub mod error;
pub mod fs;
pub mod layout;
pub mod modules;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
pub use layout::Layout;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::layout::Layout;
    pub use crate::tree::{MountReport, NodeKind, PreparedTree, TreeBuilder};
}
