use std::future::Future;
use std::time::Duration;

use log::debug;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::node::Node;
use crate::threads::ring::ring_proto::ring_client::RingClient;
use crate::threads::ring::ring_proto::{
    AddKeyRequest, DeleteStoreRequest, Empty, FindKeyRequest, FindKeyStatus,
    FindSuccessorRequest, GetStoreVersionRequest, KvPairMsg, NodeMsg, NotifyRequest,
    ReplicateInRequest,
};
use crate::utils::constants::{CONNECT_TIMEOUT_MILLIS, REQUEST_TIMEOUT_MILLIS};
use crate::utils::types::{Address, HashPos, Key, StoreVersion, Value};

/// Opens a channel to `address` with finite connect and request timeouts,
/// so that a dead peer turns into an error instead of a hang.
pub async fn connect(address: &Address) -> Result<RingClient<Channel>, Status> {
    let endpoint = Endpoint::from_shared(format!("http://{}", address))
        .map_err(|e| Status::invalid_argument(e.to_string()))?
        .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MILLIS))
        .timeout(Duration::from_millis(REQUEST_TIMEOUT_MILLIS));
    let channel = endpoint
        .connect()
        .await
        .map_err(|e| Status::unavailable(e.to_string()))?;
    Ok(RingClient::new(channel))
}

/// Remote view of one ring node. Every operation takes a retry budget;
/// transport and remote failures are logged at debug and retried, and an
/// exhausted budget collapses to `None` for reads or `false` for writes.
/// The budget is per logical operation and is not forwarded to other hops,
/// so a lookup traversing the ring cannot amplify its own retry cost.
pub struct RemoteNode {
    address: Address,
}

impl RemoteNode {
    pub fn new(node: &Node) -> RemoteNode {
        RemoteNode {
            address: node.address.clone(),
        }
    }

    pub fn to(address: &Address) -> RemoteNode {
        RemoteNode {
            address: address.clone(),
        }
    }

    async fn retry<T, F, Fut>(&self, what: &str, retries: u32, mut op: F) -> Option<T>
    where
        F: FnMut(RingClient<Channel>) -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let mut budget = retries;
        loop {
            let attempt = match connect(&self.address).await {
                Ok(client) => op(client).await,
                Err(status) => Err(status),
            };
            match attempt {
                Ok(value) => return Some(value),
                Err(status) => {
                    debug!("{} on {} failed: {}", what, self.address, status);
                    if budget == 0 {
                        return None;
                    }
                    budget -= 1;
                }
            }
        }
    }

    pub async fn find_successor(
        &self,
        id: HashPos,
        hops: u32,
        retries: u32,
    ) -> Option<(Node, u32)> {
        self.retry("find_successor", retries, |mut client| async move {
            let response = client
                .find_successor(Request::new(FindSuccessorRequest { id, hops }))
                .await?
                .into_inner();
            let node: NodeMsg = response
                .node
                .ok_or_else(|| Status::internal("find_successor response without node"))?;
            Ok((node.into(), response.hops))
        })
        .await
    }

    /// Outer `None`: the peer is unreachable. Inner `None`: the peer is
    /// reachable but currently has no predecessor.
    pub async fn predecessor(&self, retries: u32) -> Option<Option<Node>> {
        self.retry("get_predecessor", retries, |mut client| async move {
            let response = client.get_predecessor(Request::new(Empty {})).await?.into_inner();
            Ok(response.node.map(|msg| msg.into()))
        })
        .await
    }

    pub async fn successor(&self, retries: u32) -> Option<Node> {
        self.retry("get_successor", retries, |mut client| async move {
            let msg: NodeMsg = client.get_successor(Request::new(Empty {})).await?.into_inner();
            Ok(msg.into())
        })
        .await
    }

    pub async fn successor_list(&self, retries: u32) -> Option<Vec<Node>> {
        self.retry("get_successor_list", retries, |mut client| async move {
            let response = client
                .get_successor_list(Request::new(Empty {}))
                .await?
                .into_inner();
            Ok(response.successors.into_iter().map(|msg| msg.into()).collect())
        })
        .await
    }

    pub async fn notify(&self, caller: &Node, retries: u32) -> bool {
        let caller_msg: NodeMsg = caller.into();
        self.retry("notify", retries, |mut client| {
            let caller = caller_msg.clone();
            async move {
                client
                    .notify(Request::new(NotifyRequest { caller: Some(caller) }))
                    .await
                    .map(|_| ())
            }
        })
        .await
        .is_some()
    }

    pub async fn add_key(&self, owner: HashPos, key: Key, value: &Value, retries: u32) -> bool {
        self.retry("add_key", retries, |mut client| {
            let value = value.clone();
            async move {
                client
                    .add_key(Request::new(AddKeyRequest { owner, key, value }))
                    .await
                    .map(|_| ())
            }
        })
        .await
        .is_some()
    }

    /// Outer `None`: unreachable. Inner `None`: the peer holds no value for
    /// the key.
    pub async fn find_key(&self, owner: HashPos, key: Key, retries: u32) -> Option<Option<Value>> {
        self.retry("find_key", retries, |mut client| async move {
            let response = client
                .find_key(Request::new(FindKeyRequest { owner, key }))
                .await?
                .into_inner();
            match FindKeyStatus::from_i32(response.status) {
                Some(FindKeyStatus::FindKeyOk) => Ok(Some(response.value)),
                _ => Ok(None),
            }
        })
        .await
    }

    pub async fn store_version(&self, owner: HashPos, retries: u32) -> Option<StoreVersion> {
        self.retry("get_store_version", retries, |mut client| async move {
            let response = client
                .get_store_version(Request::new(GetStoreVersionRequest { owner }))
                .await?
                .into_inner();
            Ok(response.version)
        })
        .await
    }

    pub async fn delete_store(&self, owner: HashPos, retries: u32) -> bool {
        self.retry("delete_store", retries, |mut client| async move {
            client
                .delete_store(Request::new(DeleteStoreRequest { owner }))
                .await
                .map(|_| ())
        })
        .await
        .is_some()
    }

    pub async fn replicate_in(
        &self,
        owner: HashPos,
        version: StoreVersion,
        pairs: &[(Key, Value)],
        retries: u32,
    ) -> bool {
        let pair_msgs: Vec<KvPairMsg> = pairs.iter().cloned().map(|pair| pair.into()).collect();
        self.retry("replicate_in", retries, |mut client| {
            let pairs = pair_msgs.clone();
            async move {
                client
                    .replicate_in(Request::new(ReplicateInRequest { owner, version, pairs }))
                    .await
                    .map(|_| ())
            }
        })
        .await
        .is_some()
    }

    pub async fn is_alive(&self, retries: u32) -> bool {
        self.retry("health", retries, |mut client| async move {
            client.health(Request::new(Empty {})).await.map(|_| ())
        })
        .await
        .is_some()
    }

    pub async fn port(&self, retries: u32) -> Option<u16> {
        self.retry("get_port", retries, |mut client| async move {
            let response = client.get_port(Request::new(Empty {})).await?.into_inner();
            Ok(response.port as u16)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausted_budget_collapses_to_sentinel() {
        // nothing listens on port 1
        let remote = RemoteNode::to(&"127.0.0.1:1".to_string());
        assert_eq!(remote.store_version(42, 1).await, None);
        assert!(!remote.is_alive(0).await);
    }
}
