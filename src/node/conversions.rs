use crate::node::finger_entry::FingerEntry;
use crate::node::successor_list::SuccessorList;
use crate::node::Node;
use crate::threads::ring::ring_proto::{FingerEntryMsg, KvPairMsg, NodeMsg, SuccessorListMsg};
use crate::utils::types::{Key, Value};

impl Into<NodeMsg> for Node {
    fn into(self) -> NodeMsg {
        NodeMsg {
            id: self.id,
            address: self.address,
        }
    }
}

impl Into<NodeMsg> for &Node {
    fn into(self) -> NodeMsg {
        self.clone().into()
    }
}

impl Into<Node> for NodeMsg {
    fn into(self) -> Node {
        Node {
            id: self.id,
            address: self.address,
        }
    }
}

impl Into<Node> for &NodeMsg {
    fn into(self) -> Node {
        self.clone().into()
    }
}

impl Into<FingerEntryMsg> for FingerEntry {
    fn into(self) -> FingerEntryMsg {
        FingerEntryMsg {
            start: self.start,
            node: Some(self.node.into()),
        }
    }
}

impl Into<FingerEntryMsg> for &FingerEntry {
    fn into(self) -> FingerEntryMsg {
        self.clone().into()
    }
}

impl Into<SuccessorListMsg> for SuccessorList {
    fn into(self) -> SuccessorListMsg {
        SuccessorListMsg {
            successors: self.successors.into_iter().map(|node| node.into()).collect(),
        }
    }
}

impl Into<SuccessorListMsg> for &SuccessorList {
    fn into(self) -> SuccessorListMsg {
        self.clone().into()
    }
}

impl Into<Vec<Node>> for SuccessorListMsg {
    fn into(self) -> Vec<Node> {
        self.successors.into_iter().map(|msg| msg.into()).collect()
    }
}

impl Into<KvPairMsg> for (Key, Value) {
    fn into(self) -> KvPairMsg {
        KvPairMsg {
            key: self.0,
            value: self.1,
        }
    }
}

impl Into<(Key, Value)> for KvPairMsg {
    fn into(self) -> (Key, Value) {
        (self.key, self.value)
    }
}
