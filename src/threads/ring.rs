use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::sync::oneshot::Receiver;
use tonic::{Request, Response, Status};

use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::node::Node;
use crate::remote::RemoteNode;
use crate::storage::{plan_sync, StorageManager, SyncAction};
use crate::threads::ring::ring_proto::{
    AddKeyRequest, DeleteStoreRequest, Empty, FindKeyRequest, FindKeyResponse, FindKeyStatus,
    FindSuccessorRequest, FindSuccessorResponse, GetPortResponse, GetPredecessorResponse,
    GetStoreVersionRequest, GetStoreVersionResponse, NodeSummaryMsg, NotifyRequest,
    ReplicateInRequest, SuccessorListMsg,
};
use crate::utils::config::Config;
use crate::utils::constants::DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE;
use crate::utils::crypto::{finger_start, in_interval_right_inclusive, in_open_interval, HashRingKey};
use crate::utils::types::{HashPos, Key, Value};

pub mod ring_proto {
    tonic::include_proto!("ring");
}

/// Handles distributed by the setup thread once the join decision is made.
pub type SharedState = (
    Arc<Mutex<FingerTable>>,
    Arc<Mutex<Option<Node>>>,
    Arc<Mutex<SuccessorList>>,
    Arc<Mutex<StorageManager>>,
    Arc<AtomicBool>,
);

/// The struct representing the running node.
pub struct RingService {
    /// this node's (id, address) record
    node: Node,
    /// routing hints towards far away arcs of the ring
    finger_table: Arc<Mutex<FingerTable>>,
    /// believed immediate predecessor
    predecessor: Arc<Mutex<Option<Node>>>,
    /// the next successors, ordered clockwise
    successor_list: Arc<Mutex<SuccessorList>>,
    /// own store plus the replicas held for other nodes
    storage: Arc<Mutex<StorageManager>>,
    /// raised when the successor cache was exhausted, consumed by the rejoin watchdog
    rejoin_needed: Arc<AtomicBool>,
    /// round-robin pointer to the finger refreshed by the next fix_fingers pass
    fix_finger_index: Mutex<usize>,
    retry_budget: u32,
    dev_mode: bool,
}

impl RingService {
    pub async fn new(rx: Receiver<SharedState>, node: Node, config: &Config) -> RingService {
        let (finger_table, predecessor, successor_list, storage, rejoin_needed) =
            rx.await.expect("setup thread dropped its channel");
        RingService {
            node,
            finger_table,
            predecessor,
            successor_list,
            storage,
            rejoin_needed,
            fix_finger_index: Mutex::new(0),
            retry_budget: config.retry_budget,
            dev_mode: config.dev_mode,
        }
    }

    fn successor_snapshot(&self) -> Vec<Node> {
        self.successor_list.lock().unwrap().successors.clone()
    }

    /// First reachable entry of the successor cache, promoted to the front
    /// if dead entries had to be skipped. Exhausting the cache collapses
    /// the node to a ring of one and raises the rejoin flag.
    async fn reachable_successor(&self) -> Node {
        let successors = self.successor_snapshot();
        for (index, candidate) in successors.iter().enumerate() {
            if candidate.id == self.node.id {
                return self.node.clone();
            }
            if RemoteNode::new(candidate).is_alive(self.retry_budget).await {
                if index > 0 {
                    warn!(
                        "Skipped {} dead successor(s), promoting {:?} to immediate successor",
                        index, candidate
                    );
                    let mut list = self.successor_list.lock().unwrap();
                    list.drop_front(index, &self.node);
                }
                return candidate.clone();
            }
        }

        warn!("Successor cache exhausted, falling back to a ring of one");
        self.rejoin_needed.store(true, Ordering::SeqCst);
        let mut list = self.successor_list.lock().unwrap();
        list.reset_to(&self.node);
        self.node.clone()
    }

    /// The best next hop for `target`: the farthest finger strictly inside
    /// the open arc (own, target), otherwise the farthest known reachable
    /// node, otherwise the node itself.
    async fn closest_preceding_node(&self, target: HashPos) -> Node {
        let (candidate, fallbacks) = {
            let table = self.finger_table.lock().unwrap();
            (table.closest_preceding(target), table.known_nodes_farthest_first())
        };
        if let Some(node) = candidate {
            return node;
        }
        for node in fallbacks {
            if RemoteNode::new(&node).is_alive(self.retry_budget).await {
                return node;
            }
        }
        self.node.clone()
    }

    fn successor_response(successor: Node, hops: u32) -> Response<FindSuccessorResponse> {
        Response::new(FindSuccessorResponse {
            node: Some(successor.into()),
            hops,
        })
    }
}

#[tonic::async_trait]
impl ring_proto::ring_server::Ring for RingService {
    /// Finds the node responsible for `id`, forwarding through the finger
    /// table until the target falls into the arc owned by a successor. The
    /// hop counter is carried along for diagnostics only.
    async fn find_successor(
        &self,
        request: Request<FindSuccessorRequest>,
    ) -> Result<Response<FindSuccessorResponse>, Status> {
        let FindSuccessorRequest { id, hops } = request.into_inner();

        let successor = self.reachable_successor().await;
        if in_interval_right_inclusive(id, self.node.id, successor.id) {
            debug!("find_successor({}) answered locally after {} hops", id, hops);
            return Ok(Self::successor_response(successor, hops));
        }

        let hop = self.closest_preceding_node(id).await;
        if hop.id == self.node.id {
            // nobody closer is known, the successor is the best answer
            return Ok(Self::successor_response(successor, hops));
        }

        match RemoteNode::new(&hop).find_successor(id, hops + 1, self.retry_budget).await {
            Some((node, hops_out)) => Ok(Self::successor_response(node, hops_out)),
            None => {
                warn!(
                    "Forwarding find_successor({}) via {:?} failed, answering with own successor",
                    id, hop
                );
                Ok(Self::successor_response(successor, hops))
            }
        }
    }

    /// Returns the current node's value of the predecessor handle.
    async fn get_predecessor(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<GetPredecessorResponse>, Status> {
        let predecessor = self.predecessor.lock().unwrap().clone();
        Ok(Response::new(GetPredecessorResponse {
            node: predecessor.map(|node| node.into()),
        }))
    }

    async fn get_successor(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ring_proto::NodeMsg>, Status> {
        let successor = self.reachable_successor().await;
        Ok(Response::new(successor.into()))
    }

    async fn get_successor_list(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<SuccessorListMsg>, Status> {
        Ok(Response::new(self.successor_list.lock().unwrap().clone().into()))
    }

    /// Unsolicited message from a node announcing it may be our
    /// predecessor. Accepted when we have none or when the caller sits
    /// inside the arc (predecessor, self).
    async fn notify(&self, request: Request<NotifyRequest>) -> Result<Response<Empty>, Status> {
        let caller: Node = request
            .into_inner()
            .caller
            .ok_or_else(|| Status::invalid_argument("notify without caller"))?
            .into();

        if caller.id == self.node.id {
            return Ok(Response::new(Empty {}));
        }

        let mut predecessor = self.predecessor.lock().unwrap();
        let accept = match &*predecessor {
            None => true,
            Some(current) => in_open_interval(caller.id, current.id, self.node.id),
        };
        if accept {
            debug!("Updated predecessor to {:?} due to notify call", caller);
            *predecessor = Some(caller);
        }
        Ok(Response::new(Empty {}))
    }

    async fn get_port(&self, _request: Request<Empty>) -> Result<Response<GetPortResponse>, Status> {
        match self.node.port() {
            Some(port) => Ok(Response::new(GetPortResponse { port: port as u32 })),
            None => Err(Status::internal(format!(
                "own address '{}' carries no port",
                self.node.address
            ))),
        }
    }

    /// Dummy call, used to check if the receiver node is still available.
    async fn health(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        Ok(Response::new(Empty {}))
    }

    /// Writes into the store owned by `owner`. A write into our own store
    /// is eagerly fanned out to every cached successor; the fan-out is
    /// fire-and-forget and drops to the log on retry exhaustion.
    async fn add_key(&self, request: Request<AddKeyRequest>) -> Result<Response<Empty>, Status> {
        let AddKeyRequest { owner, key, value } = request.into_inner();

        let previous = {
            let mut storage = self.storage.lock().unwrap();
            storage.add_key(owner, key, value.clone())
        };
        match previous {
            Ok(Some(_)) => {
                warn!("Overwrote existing value for key {:016x} in store {:016x}", key, owner)
            }
            Ok(None) => debug!("Stored key {:016x} in store {:016x}", key, owner),
            Err(e) => {
                error!("add_key({:016x}, {:016x}) not applied: {}", owner, key, e);
                return Err(Status::internal(e.to_string()));
            }
        }

        if owner == self.node.id {
            let successors = self.successor_snapshot();
            for successor in successors.into_iter().filter(|node| node.id != self.node.id) {
                let value = value.clone();
                let budget = self.retry_budget;
                tokio::spawn(async move {
                    if !RemoteNode::new(&successor).add_key(owner, key, &value, budget).await {
                        debug!(
                            "Dropped eager replica write of key {:016x} towards {:?}",
                            key, successor
                        );
                    }
                });
            }
        }
        Ok(Response::new(Empty {}))
    }

    /// Pure read on the store owned by `owner`, no side effects.
    async fn find_key(
        &self,
        request: Request<FindKeyRequest>,
    ) -> Result<Response<FindKeyResponse>, Status> {
        let FindKeyRequest { owner, key } = request.into_inner();
        let value = self.storage.lock().unwrap().find_key(owner, key);
        let response = match value {
            Some(value) => FindKeyResponse {
                status: FindKeyStatus::FindKeyOk.into(),
                value,
            },
            None => FindKeyResponse {
                status: FindKeyStatus::FindKeyNotFound.into(),
                value: Vec::new(),
            },
        };
        Ok(Response::new(response))
    }

    async fn get_store_version(
        &self,
        request: Request<GetStoreVersionRequest>,
    ) -> Result<Response<GetStoreVersionResponse>, Status> {
        let owner = request.into_inner().owner;
        let version = self.storage.lock().unwrap().version_of(owner);
        Ok(Response::new(GetStoreVersionResponse { version }))
    }

    async fn delete_store(
        &self,
        request: Request<DeleteStoreRequest>,
    ) -> Result<Response<Empty>, Status> {
        let owner = request.into_inner().owner;
        info!("Deleting store {:016x}", owner);
        self.storage.lock().unwrap().delete_store(owner);
        Ok(Response::new(Empty {}))
    }

    /// Applies a replication batch shipped by the primary of `owner`.
    async fn replicate_in(
        &self,
        request: Request<ReplicateInRequest>,
    ) -> Result<Response<Empty>, Status> {
        let ReplicateInRequest { owner, version, pairs } = request.into_inner();
        let pairs: Vec<(Key, Value)> = pairs.into_iter().map(|pair| pair.into()).collect();
        debug!(
            "Receiving replica batch for store {:016x}: version {}, {} pair(s)",
            owner,
            version,
            pairs.len()
        );
        let result = {
            let mut storage = self.storage.lock().unwrap();
            storage.replicate_in(owner, version, pairs)
        };
        match result {
            Ok(()) => Ok(Response::new(Empty {})),
            Err(e) => {
                error!("replicate_in for store {:016x} not applied: {}", owner, e);
                Err(Status::internal(e.to_string()))
            }
        }
    }

    /// One stabilize pass: adopt the successor's predecessor when it sits
    /// between us, notify the (possibly new) successor of our existence and
    /// rebuild the successor cache from its cache.
    async fn stabilize(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let successor = self.reachable_successor().await;
        if successor.id == self.node.id {
            // ring of one: the only way out is a predecessor learned
            // through a notify, which then becomes our first successor
            let candidate = self.predecessor.lock().unwrap().clone();
            match candidate {
                Some(candidate) if candidate.id != self.node.id => {
                    info!("Ring of one learned of {:?}, adopting it as successor", candidate);
                    self.successor_list.lock().unwrap().adopt(candidate.clone());
                    self.finger_table.lock().unwrap().set_finger(0, candidate);
                }
                _ => return Ok(Response::new(Empty {})),
            }
        } else if let Some(Some(candidate)) =
            RemoteNode::new(&successor).predecessor(self.retry_budget).await
        {
            if candidate.id != self.node.id
                && in_open_interval(candidate.id, self.node.id, successor.id)
                && RemoteNode::new(&candidate).is_alive(self.retry_budget).await
            {
                info!("Adopting {:?} as new immediate successor", candidate);
                {
                    let mut list = self.successor_list.lock().unwrap();
                    list.adopt(candidate.clone());
                }
                self.finger_table.lock().unwrap().set_finger(0, candidate);
            }
        }

        let successor = self.successor_list.lock().unwrap().first();
        if successor.id == self.node.id {
            return Ok(Response::new(Empty {}));
        }
        let remote = RemoteNode::new(&successor);
        remote.notify(&self.node, self.retry_budget).await;
        if let Some(tail) = remote.successor_list(self.retry_budget).await {
            let mut list = self.successor_list.lock().unwrap();
            list.refresh(&self.node, successor, tail);
        }
        Ok(Response::new(Empty {}))
    }

    /// Pings the predecessor and clears the handle when it stopped
    /// responding; ownership of its arc is then re-established by the next
    /// notify.
    async fn check_predecessor(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let predecessor = self.predecessor.lock().unwrap().clone();
        if let Some(node) = predecessor {
            if !RemoteNode::new(&node).is_alive(self.retry_budget).await {
                warn!("Predecessor {:?} stopped responding, clearing the handle", node);
                let mut handle = self.predecessor.lock().unwrap();
                if handle.as_ref().map(|current| current.id) == Some(node.id) {
                    *handle = None;
                }
            }
        }
        Ok(Response::new(Empty {}))
    }

    /// Refreshes one finger per pass in a round robin fashion by looking up
    /// the successor of the finger's start position.
    async fn fix_fingers(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let index = {
            let mut current = self.fix_finger_index.lock().unwrap();
            *current = (*current + 1) % HashPos::finger_count();
            *current
        };
        let target = finger_start(self.node.id, index);
        debug!("Fixing finger entry {} (start {})", index, target);

        let response = self
            .find_successor(Request::new(FindSuccessorRequest { id: target, hops: 0 }))
            .await?;
        if let Some(node_msg) = response.into_inner().node {
            let node: Node = node_msg.into();
            if index == 0 && node.id != self.node.id {
                self.successor_list.lock().unwrap().adopt(node.clone());
            }
            self.finger_table.lock().unwrap().set_finger(index, node);
        }
        Ok(Response::new(Empty {}))
    }

    /// Pushes our own store towards every cached successor: a full seed for
    /// replicas that have never heard of us, a reset for replicas claiming
    /// versions we never issued and a history-derived delta otherwise.
    async fn replicate_storage(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        let owner = self.node.id;
        if self.storage.lock().unwrap().store(owner).is_none() {
            // nothing written locally yet
            return Ok(Response::new(Empty {}));
        }

        let successors: Vec<Node> = self
            .successor_snapshot()
            .into_iter()
            .filter(|node| node.id != self.node.id)
            .collect();

        for successor in successors {
            let remote = RemoteNode::new(&successor);
            let remote_version = match remote.store_version(owner, self.retry_budget).await {
                Some(version) => version,
                None => {
                    debug!("Skipping replication towards unreachable {:?}", successor);
                    continue;
                }
            };

            let (action, local_version, payload) = {
                let storage = self.storage.lock().unwrap();
                let store = match storage.store(owner) {
                    Some(store) => store,
                    None => break,
                };
                let action = plan_sync(store, remote_version);
                let payload = match &action {
                    SyncAction::Skip => Vec::new(),
                    SyncAction::FullSeed | SyncAction::ResetAndSeed => storage.all_pairs(owner),
                    SyncAction::Delta(keys) => storage.pairs_for(owner, keys),
                };
                (action, store.version(), payload)
            };

            match action {
                SyncAction::Skip => {}
                SyncAction::FullSeed => {
                    debug!(
                        "Seeding replica of our store on {:?} at version {}",
                        successor, local_version
                    );
                    remote.replicate_in(owner, local_version, &payload, self.retry_budget).await;
                }
                SyncAction::ResetAndSeed => {
                    warn!(
                        "Replica on {:?} reports version {} ahead of our {}, resetting it",
                        successor, remote_version, local_version
                    );
                    if remote.delete_store(owner, self.retry_budget).await {
                        remote
                            .replicate_in(owner, local_version, &payload, self.retry_budget)
                            .await;
                    }
                }
                SyncAction::Delta(keys) => {
                    debug!(
                        "Shipping delta of {} key(s) to replica on {:?} ({} -> {})",
                        keys.len(),
                        successor,
                        remote_version,
                        local_version
                    );
                    remote.replicate_in(owner, local_version, &payload, self.retry_budget).await;
                }
            }
        }
        Ok(Response::new(Empty {}))
    }

    /// Returns a human readable node summary (requires dev_mode = true).
    async fn get_node_summary(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<NodeSummaryMsg>, Status> {
        if !self.dev_mode {
            return Err(Status::unimplemented(DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE));
        }

        let predecessor = self.predecessor.lock().unwrap().clone();
        let successor_list = self.successor_list.lock().unwrap().clone();
        let fingers = self.finger_table.lock().unwrap().fingers.clone();
        let stores = self.storage.lock().unwrap().summaries();

        Ok(Response::new(NodeSummaryMsg {
            node: Some(self.node.clone().into()),
            predecessor: predecessor.map(|node| node.into()),
            successor_list: Some(successor_list.into()),
            finger_entries: fingers.into_iter().map(|finger| finger.into()).collect(),
            stores: stores
                .into_iter()
                .map(|summary| ring_proto::StoreSummaryMsg {
                    owner: summary.owner,
                    version: summary.version,
                    size: summary.size as u64,
                })
                .collect(),
        }))
    }
}
