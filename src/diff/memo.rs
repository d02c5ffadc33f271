//! Cache of pairwise subtree distances.
//!
//! Keyed by the literal ordered id pair (left forest, right forest), so
//! id spaces of any size get the map's native equality handling; there
//! is no compressed key to collide.

use std::collections::HashMap;

use crate::forest::NodeId;

/// Distance memo shared by one diff run.
#[derive(Debug, Default)]
pub struct MatchMemo {
    table: HashMap<(NodeId, NodeId), u32>,
}

impl MatchMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the distance between a left-forest and a right-forest
    /// subtree.
    pub fn insert(&mut self, left: NodeId, right: NodeId, distance: u32) {
        self.table.insert((left, right), distance);
    }

    /// Previously recorded distance, or `None` on a miss.
    pub fn get(&self, left: NodeId, right: NodeId) -> Option<u32> {
        self.table.get(&(left, right)).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId(n)
    }

    #[test]
    fn test_miss_before_write() {
        let memo = MatchMemo::new();
        assert_eq!(memo.get(id(1), id(2)), None);
    }

    #[test]
    fn test_pairs_differing_in_one_coordinate() {
        let mut memo = MatchMemo::new();
        memo.insert(id(1), id(2), 7);
        assert_eq!(memo.get(id(1), id(2)), Some(7));
        // A miss never masks a hit for a pair differing in either slot.
        assert_eq!(memo.get(id(2), id(1)), None);
        assert_eq!(memo.get(id(1), id(3)), None);
        assert_eq!(memo.get(id(0), id(2)), None);
    }

    #[test]
    fn test_overwrite_returns_latest() {
        let mut memo = MatchMemo::new();
        memo.insert(id(5), id(9), 3);
        memo.insert(id(5), id(9), 1);
        assert_eq!(memo.get(id(5), id(9)), Some(1));
    }

    #[test]
    fn test_wide_id_space() {
        // Ids beyond any 16-bit packing must not collide.
        let mut memo = MatchMemo::new();
        memo.insert(id(0x1_0001), id(0x2), 4);
        memo.insert(id(0x1), id(0x1_0002), 9);
        assert_eq!(memo.get(id(0x1_0001), id(0x2)), Some(4));
        assert_eq!(memo.get(id(0x1), id(0x1_0002)), Some(9));
    }
}
