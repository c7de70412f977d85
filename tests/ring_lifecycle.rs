//! End-to-end ring behavior against real gRPC nodes on loopback: singleton
//! rings, two-node stabilization, wrap-around lookups, replication to
//! successors and recovery from a killed successor.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tonic::transport::Server;

use ringdht::node::finger_table::FingerTable;
use ringdht::node::successor_list::SuccessorList;
use ringdht::node::Node;
use ringdht::remote::RemoteNode;
use ringdht::storage::{StorageManager, StoreBackend};
use ringdht::threads::driver::{run_maintenance_loop, MaintenanceTask};
use ringdht::threads::rejoin::run_rejoin_loop;
use ringdht::threads::ring::ring_proto::ring_server::RingServer;
use ringdht::threads::ring::RingService;
use ringdht::utils::config::Config;
use ringdht::utils::types::HashPos;

fn test_config(grpc_address: &str) -> Config {
    Config {
        grpc_address: grpc_address.to_string(),
        web_address: None,
        peer: None,
        dev_mode: false,
        successor_list_size: 3,
        finger_bits: 64,
        retry_budget: 1,
        stabilize_period_ms: 100,
        check_predecessor_period_ms: 200,
        fix_fingers_period_ms: 100,
        rejoin_period_ms: 1_000,
        replication_period_ms: 200,
        store_backend: StoreBackend::Memory,
        store_root: None,
    }
}

struct TestNode {
    node: Node,
    shutdown: watch::Sender<bool>,
}

impl TestNode {
    fn remote(&self) -> RemoteNode {
        RemoteNode::new(&self.node)
    }

    fn kill(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Boots a node with a pinned ring id: state handles, the gRPC service and
/// the four maintenance loops, optionally joined through a seed node.
async fn start_node(id: HashPos, port: u16, seed: Option<&TestNode>) -> TestNode {
    let address = format!("127.0.0.1:{}", port);
    let own = Node::with_id(id, &address);
    let config = test_config(&address);
    let seed_address = seed.map(|seed| seed.node.address.clone());

    let finger_table = Arc::new(Mutex::new(FingerTable::new(&own)));
    let predecessor: Arc<Mutex<Option<Node>>> = Arc::new(Mutex::new(None));
    let successor_list = Arc::new(Mutex::new(SuccessorList::new(
        &own,
        config.successor_list_size,
    )));
    let storage = Arc::new(Mutex::new(StorageManager::in_memory()));
    let rejoin_needed = Arc::new(AtomicBool::new(false));

    if let Some(seed) = seed {
        let (successor, _) = seed
            .remote()
            .find_successor(own.id, 0, 3)
            .await
            .expect("seed did not answer find_successor");
        successor_list
            .lock()
            .unwrap()
            .refresh(&own, successor.clone(), Vec::new());
        finger_table.lock().unwrap().set_finger(0, successor);
    }

    let (tx, rx) = oneshot::channel();
    tx.send((
        finger_table.clone(),
        predecessor.clone(),
        successor_list.clone(),
        storage,
        rejoin_needed.clone(),
    ))
    .ok();
    let service = RingService::new(rx, own.clone(), &config).await;

    let (shutdown_tx, mut server_shutdown) = watch::channel(false);

    let (tx_rejoin, rx_rejoin) = oneshot::channel();
    tx_rejoin
        .send((finger_table, predecessor, successor_list, rejoin_needed))
        .ok();
    tokio::spawn(run_rejoin_loop(
        rx_rejoin,
        own.clone(),
        seed_address,
        config.retry_budget,
        Duration::from_millis(config.rejoin_period_ms),
        shutdown_tx.subscribe(),
    ));
    let socket = address.parse().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(RingServer::new(service))
            .serve_with_shutdown(socket, async move {
                let _ = server_shutdown.changed().await;
            })
            .await
            .unwrap();
    });

    for (task, period_ms) in [
        (MaintenanceTask::Stabilize, config.stabilize_period_ms),
        (MaintenanceTask::CheckPredecessor, config.check_predecessor_period_ms),
        (MaintenanceTask::FixFingers, config.fix_fingers_period_ms),
        (MaintenanceTask::ReplicateStorage, config.replication_period_ms),
    ] {
        tokio::spawn(run_maintenance_loop(
            task,
            address.clone(),
            Duration::from_millis(period_ms),
            shutdown_tx.subscribe(),
        ));
    }

    let started = TestNode {
        node: own,
        shutdown: shutdown_tx,
    };
    let probe = started.node.clone();
    eventually("node comes up", move || {
        let probe = probe.clone();
        async move { RemoteNode::new(&probe).is_alive(0).await }
    })
    .await;
    started
}

async fn eventually<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if condition().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn singleton_ring_owns_every_key() {
    let a = start_node(100, 53011, None).await;

    let (successor, _) = a.remote().find_successor(7, 0, 1).await.unwrap();
    assert_eq!(successor.id, 100);
    assert_eq!(a.remote().predecessor(1).await, Some(None));

    // the liveness pair answers over the wire
    assert!(a.remote().is_alive(0).await);
    assert_eq!(a.remote().port(0).await, Some(53011));

    assert!(a.remote().add_key(100, 7, &b"x".to_vec(), 1).await);
    assert_eq!(
        a.remote().find_key(100, 7, 1).await,
        Some(Some(b"x".to_vec()))
    );
    assert_eq!(a.remote().find_key(100, 8, 1).await, Some(None));

    a.kill();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_nodes_stabilize_and_replicate() {
    let a = start_node(100, 53021, None).await;
    let b = start_node(200, 53022, Some(&a)).await;

    // mutual successor/predecessor pointers settle through stabilize
    let (a_node, b_node) = (a.node.clone(), b.node.clone());
    eventually("ring of two closes", move || {
        let (a_node, b_node) = (a_node.clone(), b_node.clone());
        async move {
            let a_succ = RemoteNode::new(&a_node).successor(0).await.map(|n| n.id);
            let b_succ = RemoteNode::new(&b_node).successor(0).await.map(|n| n.id);
            let a_pred = RemoteNode::new(&a_node).predecessor(0).await.flatten().map(|n| n.id);
            let b_pred = RemoteNode::new(&b_node).predecessor(0).await.flatten().map(|n| n.id);
            a_succ == Some(200) && b_succ == Some(100) && a_pred == Some(200) && b_pred == Some(100)
        }
    })
    .await;

    // 150 lies in (100, 200], 50 wraps around to A
    let (owner_of_150, _) = a.remote().find_successor(150, 0, 1).await.unwrap();
    assert_eq!(owner_of_150.id, 200);
    let (owner_of_50, _) = a.remote().find_successor(50, 0, 1).await.unwrap();
    assert_eq!(owner_of_50.id, 100);
    // lookups are stable while the ring is quiet
    let (owner_again, _) = a.remote().find_successor(150, 0, 1).await.unwrap();
    assert_eq!(owner_again.id, 200);

    // a write into B's store shows up on A, B's only successor
    assert!(b.remote().add_key(200, 150, &b"v".to_vec(), 1).await);
    assert_eq!(
        b.remote().find_key(200, 150, 1).await,
        Some(Some(b"v".to_vec()))
    );
    let a_node = a.node.clone();
    eventually("replica reaches A", move || {
        let a_node = a_node.clone();
        async move {
            RemoteNode::new(&a_node).find_key(200, 150, 0).await == Some(Some(b"v".to_vec()))
        }
    })
    .await;
    let a_node = a.node.clone();
    eventually("replica version catches up", move || {
        let a_node = a_node.clone();
        async move { RemoteNode::new(&a_node).store_version(200, 0).await == Some(1) }
    })
    .await;

    a.kill();
    b.kill();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn killed_successor_is_skipped_and_its_replica_stays_readable() {
    let n10 = start_node(10, 53031, None).await;
    let n20 = start_node(20, 53032, Some(&n10)).await;
    let n30 = start_node(30, 53033, Some(&n10)).await;

    // wait until every successor cache names the two following nodes
    let nodes = [n10.node.clone(), n20.node.clone(), n30.node.clone()];
    eventually("ring of three closes", move || {
        let nodes = nodes.clone();
        async move {
            let expected: [Vec<HashPos>; 3] = [vec![20, 30], vec![30, 10], vec![10, 20]];
            for (node, expected) in nodes.iter().zip(expected) {
                let cached = match RemoteNode::new(node).successor_list(0).await {
                    Some(list) => list.iter().map(|n| n.id).collect::<Vec<_>>(),
                    None => return false,
                };
                if cached != expected {
                    return false;
                }
            }
            true
        }
    })
    .await;

    // key 15 belongs to node 20; the eager fan-out mirrors it onto 30 and 10
    assert!(n20.remote().add_key(20, 15, &b"survivor".to_vec(), 1).await);
    let (n10_node, n30_node) = (n10.node.clone(), n30.node.clone());
    eventually("both replicas hold the key", move || {
        let (n10_node, n30_node) = (n10_node.clone(), n30_node.clone());
        async move {
            let on_10 = RemoteNode::new(&n10_node).find_key(20, 15, 0).await;
            let on_30 = RemoteNode::new(&n30_node).find_key(20, 15, 0).await;
            on_10 == Some(Some(b"survivor".to_vec())) && on_30 == Some(Some(b"survivor".to_vec()))
        }
    })
    .await;

    n20.kill();

    // node 10 routes around the dead successor
    let n10_node = n10.node.clone();
    eventually("10 promotes 30 to immediate successor", move || {
        let n10_node = n10_node.clone();
        async move { RemoteNode::new(&n10_node).successor(0).await.map(|n| n.id) == Some(30) }
    })
    .await;

    // the replica of the dead node's store is still readable on 10
    assert_eq!(
        n10.remote().find_key(20, 15, 1).await,
        Some(Some(b"survivor".to_vec()))
    );

    n10.kill();
    n30.kill();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn isolated_node_rejoins_once_the_seed_returns() {
    let a = start_node(100, 53051, None).await;
    let b = start_node(200, 53052, Some(&a)).await;

    let (a_node, b_node) = (a.node.clone(), b.node.clone());
    eventually("ring of two closes", move || {
        let (a_node, b_node) = (a_node.clone(), b_node.clone());
        async move {
            let a_succ = RemoteNode::new(&a_node).successor(0).await.map(|n| n.id);
            let b_succ = RemoteNode::new(&b_node).successor(0).await.map(|n| n.id);
            a_succ == Some(200) && b_succ == Some(100)
        }
    })
    .await;

    // partition: the seed disappears and B collapses to a ring of one
    a.kill();
    let b_node = b.node.clone();
    eventually("B falls back to itself", move || {
        let b_node = b_node.clone();
        async move { RemoteNode::new(&b_node).successor(0).await.map(|n| n.id) == Some(200) }
    })
    .await;

    // the seed comes back at its old address; the watchdog reattaches B
    // and stabilize closes the ring again, no restart of B required
    let a = start_node(100, 53051, None).await;
    let (a_node, b_node) = (a.node.clone(), b.node.clone());
    eventually("ring of two closes again", move || {
        let (a_node, b_node) = (a_node.clone(), b_node.clone());
        async move {
            let a_succ = RemoteNode::new(&a_node).successor(0).await.map(|n| n.id);
            let b_succ = RemoteNode::new(&b_node).successor(0).await.map(|n| n.id);
            a_succ == Some(200) && b_succ == Some(100)
        }
    })
    .await;

    a.kill();
    b.kill();
}
