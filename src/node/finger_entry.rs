use std::fmt;
use std::fmt::Debug;

use serde::Serialize;

use crate::node::Node;
use crate::utils::types::HashPos;

/// An entry in the FingerTable: the start of the covered arc and the node
/// currently believed to own it.
#[derive(Clone, Serialize)]
pub struct FingerEntry {
    pub(crate) start: HashPos,
    pub(crate) node: Node,
}

impl Debug for FingerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("")
            .field("start", &self.start)
            .field("node", &self.node)
            .finish()
    }
}

impl FingerEntry {
    pub fn new(start: HashPos, node: &Node) -> Self {
        FingerEntry {
            start,
            node: node.clone(),
        }
    }

    pub fn get_start(&self) -> HashPos {
        self.start
    }

    pub fn get_node(&self) -> &Node {
        &self.node
    }
}
