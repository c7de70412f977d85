use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use log::{error, info};
use tokio::sync::oneshot::Sender;

use crate::node::finger_table::FingerTable;
use crate::node::successor_list::SuccessorList;
use crate::node::Node;
use crate::remote::RemoteNode;
use crate::storage::StorageManager;
use crate::threads::ring::SharedState;
use crate::utils::config::Config;

/// Handles the rejoin watchdog operates on.
pub type RejoinState = (
    Arc<Mutex<FingerTable>>,
    Arc<Mutex<Option<Node>>>,
    Arc<Mutex<SuccessorList>>,
    Arc<AtomicBool>,
);

/// Handles the web status interface renders from.
pub type WebState = (
    Arc<Mutex<FingerTable>>,
    Arc<Mutex<Option<Node>>>,
    Arc<Mutex<SuccessorList>>,
    Arc<Mutex<StorageManager>>,
);

#[derive(Debug)]
pub enum SetupError {
    SeedUnreachable(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::SeedUnreachable(seed) => {
                write!(f, "join failed, seed {} did not answer find_successor", seed)
            }
        }
    }
}

impl std::error::Error for SetupError {}

/// Builds the node's initial routing and storage state and hands the
/// shared handles to the gRPC service, the web interface and the rejoin
/// watchdog. Two scenarios:
/// 1. No peer (or the peer is this very node): start a new ring of one.
/// 2. A peer is given: ask it for the successor of our own id and hook in
///    front of that node; the predecessor stays unset until the first
///    notify arrives.
pub async fn setup(
    config: &Config,
    own: &Node,
    tx_grpc: Sender<SharedState>,
    tx_web: Sender<WebState>,
    tx_rejoin: Sender<RejoinState>,
) -> Result<(), SetupError> {
    info!("Starting up setup thread");

    let finger_table_arc = Arc::new(Mutex::new(FingerTable::new(own)));
    let predecessor_arc: Arc<Mutex<Option<Node>>> = Arc::new(Mutex::new(None));
    let successor_list_arc = Arc::new(Mutex::new(SuccessorList::new(
        own,
        config.successor_list_size,
    )));
    let storage_arc = Arc::new(Mutex::new(StorageManager::new(
        config.store_backend,
        config.store_root.clone().map(PathBuf::from),
    )));
    let rejoin_needed_arc = Arc::new(AtomicBool::new(false));

    let seed = config
        .peer
        .clone()
        .filter(|peer| peer != &own.address);

    match seed {
        Some(peer_address) => {
            info!("Joining existing ring via {}", peer_address);
            let seed = RemoteNode::to(&peer_address);
            let (successor, _) = seed
                .find_successor(own.id, 0, config.retry_budget)
                .await
                .ok_or(SetupError::SeedUnreachable(peer_address.clone()))?;
            info!("Our successor is {:?}", successor);

            let tail = RemoteNode::new(&successor)
                .successor_list(config.retry_budget)
                .await
                .unwrap_or_default();

            {
                let mut successor_list = successor_list_arc.lock().unwrap();
                successor_list.refresh(own, successor.clone(), tail);
            }
            finger_table_arc.lock().unwrap().set_finger(0, successor);
        }
        None => {
            info!("Starting up a new ring");
        }
    };

    if tx_grpc
        .send((
            finger_table_arc.clone(),
            predecessor_arc.clone(),
            successor_list_arc.clone(),
            storage_arc.clone(),
            rejoin_needed_arc.clone(),
        ))
        .is_err()
    {
        error!("gRPC thread is gone, cannot hand over state");
    }
    // the web interface is optional, its receiver may already be gone
    let _ = tx_web.send((
        finger_table_arc.clone(),
        predecessor_arc.clone(),
        successor_list_arc.clone(),
        storage_arc,
    ));
    let _ = tx_rejoin.send((
        finger_table_arc,
        predecessor_arc,
        successor_list_arc,
        rejoin_needed_arc,
    ));
    Ok(())
}
