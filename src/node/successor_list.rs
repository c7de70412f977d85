use std::fmt::Debug;

use serde::Serialize;

use crate::node::Node;

/// Ordered cache of the next successors on the ring, index 0 being the
/// immediate successor. Entries are pairwise distinct; on a ring smaller
/// than the configured size the list is simply shorter.
#[derive(Debug, Clone, Serialize)]
pub struct SuccessorList {
    size: usize,
    pub successors: Vec<Node>,
}

impl SuccessorList {
    /// A fresh list contains only the node itself, the state of a ring of
    /// one.
    pub fn new(own: &Node, size: usize) -> SuccessorList {
        SuccessorList {
            size,
            successors: vec![own.clone()],
        }
    }

    pub fn first(&self) -> Node {
        self.successors[0].clone()
    }

    /// Inserts a closer successor at the front, keeping the list deduped
    /// and bounded.
    pub fn adopt(&mut self, node: Node) {
        self.successors.retain(|entry| entry.id != node.id);
        self.successors.insert(0, node);
        self.successors.truncate(self.size);
    }

    /// Drops the first `count` entries after their nodes turned out dead,
    /// promoting the next entry to immediate successor. An emptied list
    /// collapses back to `own`.
    pub fn drop_front(&mut self, count: usize, own: &Node) {
        let count = count.min(self.successors.len());
        self.successors.drain(..count);
        if self.successors.is_empty() {
            self.successors.push(own.clone());
        }
    }

    /// Rebuilds the list from the immediate successor and its own successor
    /// list: `[head]` followed by the first entries of `tail`, deduped and
    /// truncated. The node itself never appears as its own successor
    /// backup.
    pub fn refresh(&mut self, own: &Node, head: Node, tail: Vec<Node>) {
        let mut rebuilt = vec![head];
        for node in tail {
            if rebuilt.len() == self.size {
                break;
            }
            if node.id == own.id {
                continue;
            }
            if rebuilt.iter().any(|entry| entry.id == node.id) {
                continue;
            }
            rebuilt.push(node);
        }
        self.successors = rebuilt;
    }

    /// True when the list no longer names anyone but the node itself.
    pub fn is_collapsed(&self, own: &Node) -> bool {
        self.successors.iter().all(|entry| entry.id == own.id)
    }

    pub fn reset_to(&mut self, node: &Node) {
        self.successors = vec![node.clone()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::types::HashPos;

    fn node(id: HashPos) -> Node {
        Node::with_id(id, &format!("127.0.0.1:{}", 5000 + id % 1000))
    }

    #[test]
    fn fresh_list_is_collapsed() {
        let own = node(10);
        let list = SuccessorList::new(&own, 3);
        assert_eq!(list.first().id, 10);
        assert!(list.is_collapsed(&own));
    }

    #[test]
    fn adopt_moves_new_successor_to_front() {
        let own = node(10);
        let mut list = SuccessorList::new(&own, 3);
        list.refresh(&own, node(30), vec![node(40), node(50)]);
        list.adopt(node(20));
        let ids: Vec<HashPos> = list.successors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![20, 30, 40]);
    }

    #[test]
    fn adopt_dedupes_readopted_node() {
        let own = node(10);
        let mut list = SuccessorList::new(&own, 3);
        list.refresh(&own, node(30), vec![node(40)]);
        list.adopt(node(40));
        let ids: Vec<HashPos> = list.successors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![40, 30]);
    }

    #[test]
    fn drop_front_promotes_next_entry() {
        let own = node(10);
        let mut list = SuccessorList::new(&own, 3);
        list.refresh(&own, node(20), vec![node(30), node(40)]);
        list.drop_front(1, &own);
        assert_eq!(list.first().id, 30);

        list.drop_front(5, &own);
        assert!(list.is_collapsed(&own));
        assert_eq!(list.first().id, 10);
    }

    #[test]
    fn refresh_dedupes_and_skips_self() {
        let own = node(10);
        let mut list = SuccessorList::new(&own, 3);
        list.refresh(&own, node(20), vec![node(20), node(10), node(30), node(40), node(50)]);
        let ids: Vec<HashPos> = list.successors.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![20, 30, 40]);
    }
}
