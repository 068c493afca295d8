//! Node kinds and file kinds
//!
//! Node kinds form a strict total order used to decide whether a new
//! contribution may replace the current occupant of a path.

use std::fmt;

/// Provenance of a tree node, ordered by precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Passthrough of original content from the mirror
    Mirror,
    /// Structural directory with no backing content
    Inter,
    /// Directory synthesized on a fresh tmpfs
    Tmpfs,
    /// Content supplied by a module
    Module,
    /// Partition root
    Root,
    /// Injected file, beats everything else
    Custom,
}

impl NodeKind {
    /// All kinds in ascending precedence
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Mirror,
        NodeKind::Inter,
        NodeKind::Tmpfs,
        NodeKind::Module,
        NodeKind::Root,
        NodeKind::Custom,
    ];

    /// Precedence rank
    pub const fn rank(self) -> u8 {
        match self {
            NodeKind::Mirror => 1,
            NodeKind::Inter => 2,
            NodeKind::Tmpfs => 4,
            NodeKind::Module => 8,
            NodeKind::Root => 16,
            NodeKind::Custom => 32,
        }
    }

    /// Whether nodes of this kind host children
    pub const fn is_dir_category(self) -> bool {
        matches!(self, NodeKind::Inter | NodeKind::Tmpfs | NodeKind::Root)
    }

    /// Whether a node of this kind may replace an occupant of kind `occupant`
    pub fn outranks(self, occupant: NodeKind) -> bool {
        self.rank() > occupant.rank()
    }

    /// Short label used in logs and plans
    pub const fn label(self) -> &'static str {
        match self {
            NodeKind::Mirror => "mirror",
            NodeKind::Inter => "inter",
            NodeKind::Tmpfs => "tmpfs",
            NodeKind::Module => "module",
            NodeKind::Root => "root",
            NodeKind::Custom => "custom",
        }
    }
}

impl PartialOrd for NodeKind {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeKind {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of the real filesystem entry a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    Symlink,
    Regular,
}

impl FileKind {
    /// Map a std file type, returning `None` for devices, fifos and sockets
    pub fn from_std(ft: std::fs::FileType) -> Option<Self> {
        if ft.is_symlink() {
            Some(FileKind::Symlink)
        } else if ft.is_dir() {
            Some(FileKind::Directory)
        } else if ft.is_file() {
            Some(FileKind::Regular)
        } else {
            None
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Directory => "dir",
            FileKind::Symlink => "link",
            FileKind::Regular => "file",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_is_strict_and_total() {
        let ranks: Vec<u8> = NodeKind::ALL.iter().map(|k| k.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 4, 8, 16, 32]);

        for (i, a) in NodeKind::ALL.iter().enumerate() {
            for (j, b) in NodeKind::ALL.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j));
                assert_eq!(a.outranks(*b), i > j);
            }
        }
    }

    #[test]
    fn test_dir_category() {
        let dirs: Vec<NodeKind> = NodeKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_dir_category())
            .collect();
        assert_eq!(dirs, vec![NodeKind::Inter, NodeKind::Tmpfs, NodeKind::Root]);
    }

    #[test]
    fn test_custom_always_wins() {
        for kind in NodeKind::ALL {
            if kind != NodeKind::Custom {
                assert!(NodeKind::Custom.outranks(kind));
            }
        }
        assert!(!NodeKind::Custom.outranks(NodeKind::Custom));
    }
}
