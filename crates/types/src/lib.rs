//! Shared value types for the subdav client core.
//!
//! Everything here is wire-format agnostic: revision numbers, node kinds,
//! MD5 content fingerprints, reserved property names, and helpers for
//! canonical repository paths.

pub mod checksum;
pub mod path;
pub mod props;
pub mod revision;

pub use checksum::Md5;
pub use revision::Revision;

use serde::{Deserialize, Serialize};

/// The kind of a node in the repository tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Absent node.
    None,
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Present, but the server would not say what it is.
    Unknown,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::None => "none",
            NodeKind::File => "file",
            NodeKind::Dir => "dir",
            NodeKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for NodeKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(NodeKind::None),
            "file" => Ok(NodeKind::File),
            "dir" => Ok(NodeKind::Dir),
            "unknown" => Ok(NodeKind::Unknown),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_round_trip() {
        for kind in [NodeKind::None, NodeKind::File, NodeKind::Dir, NodeKind::Unknown] {
            assert_eq!(kind.to_string().parse::<NodeKind>(), Ok(kind));
        }
        assert!("folder".parse::<NodeKind>().is_err());
    }
}
