//! Core identifier types for network representation.

use std::fmt;

/// Index of a node in the network.
///
/// Nodes are numbered `0..n` and map directly onto rows of the admittance
/// matrix. [`NodeId::GROUND`] is a sentinel for the fixed-potential ground
/// node, which never appears in the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node sentinel.
    pub const GROUND: NodeId = NodeId(usize::MAX);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        *self == Self::GROUND
    }

    /// Matrix row of this node, `None` for ground.
    pub fn index(&self) -> Option<usize> {
        if self.is_ground() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// Index of a link in the solver's link arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_has_no_index() {
        assert!(NodeId::GROUND.is_ground());
        assert_eq!(NodeId::GROUND.index(), None);
        assert_eq!(NodeId(3).index(), Some(3));
        assert_eq!(NodeId::GROUND.to_string(), "GND");
        assert_eq!(NodeId(2).to_string(), "N2");
    }
}
