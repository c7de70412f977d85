use log::warn;

use crate::node::Node;
use crate::remote::RemoteNode;
use crate::utils::crypto::hash;
use crate::utils::types::{Address, HashPos, Value};

/// Routes a ring position through the local node to the node responsible
/// for it.
pub async fn perform_ring_lookup(
    pos: HashPos,
    local_address: &Address,
    retry_budget: u32,
) -> Option<Node> {
    RemoteNode::to(local_address)
        .find_successor(pos, 0, retry_budget)
        .await
        .map(|(node, _)| node)
}

/// Client-side PUT: hash the textual key onto the ring, look up the owner
/// and write into the owner's store. The owner fans the write out to its
/// replicas on its own.
pub async fn client_put(
    text_key: &str,
    value: &str,
    local_address: &Address,
    retry_budget: u32,
) -> bool {
    let key = hash(text_key.as_bytes());
    match perform_ring_lookup(key, local_address, retry_budget).await {
        Some(owner) => {
            RemoteNode::new(&owner)
                .add_key(owner.id, key, &value.as_bytes().to_vec(), retry_budget)
                .await
        }
        None => {
            warn!("Lookup for key '{}' failed, write dropped", text_key);
            false
        }
    }
}

/// Client-side GET: hash the textual key, look up the owner and read from
/// its store.
pub async fn client_get(
    text_key: &str,
    local_address: &Address,
    retry_budget: u32,
) -> Option<Value> {
    let key = hash(text_key.as_bytes());
    let owner = perform_ring_lookup(key, local_address, retry_budget).await?;
    RemoteNode::new(&owner)
        .find_key(owner.id, key, retry_budget)
        .await
        .flatten()
}
