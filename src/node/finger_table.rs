use std::fmt::Debug;

use serde::Serialize;

use crate::node::finger_entry::FingerEntry;
use crate::node::Node;
use crate::utils::crypto::{finger_start, in_open_interval, HashRingKey};
use crate::utils::types::HashPos;

/// Per node cache of `find_successor(own + 2^i)` for every i. The table is
/// a routing hint, lookups stay correct on stale entries.
#[derive(Debug, Clone, Serialize)]
pub struct FingerTable {
    own: Node,
    pub fingers: Vec<FingerEntry>,
}

impl FingerTable {
    /// A fresh table points every finger at the node itself, the state of a
    /// ring of one.
    pub fn new(own: &Node) -> FingerTable {
        let fingers = (0..HashPos::finger_count())
            .map(|i| FingerEntry::new(finger_start(own.id, i), own))
            .collect();
        FingerTable {
            own: own.clone(),
            fingers,
        }
    }

    pub fn set_finger(&mut self, index: usize, node: Node) {
        self.fingers[index].node = node;
    }

    /// Scans from the farthest finger down for the first entry strictly
    /// inside the open arc (own, target). Entries still pointing at the
    /// node itself carry no routing information and are skipped.
    pub fn closest_preceding(&self, target: HashPos) -> Option<Node> {
        for finger in self.fingers.iter().rev() {
            if finger.node.id == self.own.id {
                continue;
            }
            if in_open_interval(finger.node.id, self.own.id, target) {
                return Some(finger.node.clone());
            }
        }
        None
    }

    /// Farthest fingers first, own entries dropped. Fallback candidates for
    /// when no finger precedes the target.
    pub fn known_nodes_farthest_first(&self) -> Vec<Node> {
        let mut seen: Vec<Node> = Vec::new();
        for finger in self.fingers.iter().rev() {
            if finger.node.id == self.own.id {
                continue;
            }
            if seen.iter().any(|node| node.id == finger.node.id) {
                continue;
            }
            seen.push(finger.node.clone());
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: HashPos) -> Node {
        Node::with_id(id, &format!("127.0.0.1:{}", 5000 + id % 1000))
    }

    #[test]
    fn fresh_table_points_at_self() {
        let own = node(100);
        let table = FingerTable::new(&own);
        assert_eq!(table.fingers.len(), HashPos::finger_count());
        assert_eq!(table.fingers[0].get_start(), 101);
        assert_eq!(table.fingers[3].get_start(), 108);
        assert!(table.fingers.iter().all(|f| f.get_node().id == 100));
        assert!(table.closest_preceding(250).is_none());
    }

    #[test]
    fn closest_preceding_prefers_farthest_qualifying_finger() {
        let own = node(100);
        let mut table = FingerTable::new(&own);
        table.set_finger(0, node(120));
        table.set_finger(4, node(180));
        table.set_finger(10, node(400));

        // 400 does not precede 250, 180 is the farthest one that does
        let hop = table.closest_preceding(250).unwrap();
        assert_eq!(hop.id, 180);

        // everything known precedes a target just behind us on the ring
        let hop = table.closest_preceding(99).unwrap();
        assert_eq!(hop.id, 400);
    }

    #[test]
    fn closest_preceding_wraps_through_zero() {
        let own = node(250);
        let mut table = FingerTable::new(&own);
        table.set_finger(2, node(300));
        // target 10 lies on the arc wrapping through zero
        let hop = table.closest_preceding(10).unwrap();
        assert_eq!(hop.id, 300);
    }

    #[test]
    fn known_nodes_dedupe_and_skip_self() {
        let own = node(100);
        let mut table = FingerTable::new(&own);
        table.set_finger(0, node(120));
        table.set_finger(1, node(120));
        table.set_finger(5, node(300));

        let known = table.known_nodes_farthest_first();
        assert_eq!(known.len(), 2);
        assert_eq!(known[0].id, 300);
        assert_eq!(known[1].id, 120);
    }
}
