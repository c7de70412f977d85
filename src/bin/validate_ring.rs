//! Connects to a list of running nodes (dev_mode = true required) and
//! checks that the quiesced cluster forms one closed ring: every node
//! answers the liveness pair and reports the port it is addressed on,
//! successor and predecessor pointers chain through every node in id
//! order, successor caches name the following nodes and every finger
//! points at the node actually responsible for its start position.

use std::env;

use tonic::transport::Channel;
use tonic::Request;

use ringdht::remote::RemoteNode;

use crate::ring_proto::ring_client::RingClient;
use crate::ring_proto::{Empty, NodeSummaryMsg};

pub mod ring_proto {
    tonic::include_proto!("ring");
}

type HashPos = u64;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() == 1 {
        eprintln!("Usage: validate_ring <node-url> [<node-url> ...]");
        std::process::exit(1);
    }

    let mut is_valid = true;

    // liveness pair: every node answers the health ping and reports the
    // same port it is being addressed through
    for host in args.iter().skip(1) {
        let remote = RemoteNode::to(host);
        if !remote.is_alive(1).await {
            eprintln!("Node {}: no answer to health ping", host);
            is_valid = false;
            continue;
        }
        let reported = remote.port(1).await;
        let addressed = host.rsplit(':').next().and_then(|raw| raw.parse::<u16>().ok());
        if reported != addressed {
            eprintln!(
                "Node {}: reports port {:?} but is addressed via {:?}",
                host, reported, addressed
            );
            is_valid = false;
        }
    }

    let mut summaries: Vec<NodeSummaryMsg> = Vec::new();
    for host in args.iter().skip(1) {
        let mut client: RingClient<Channel> = RingClient::connect(format!("http://{}", host))
            .await
            .unwrap();
        let summary = client
            .get_node_summary(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        summaries.push(summary);
    }

    summaries.sort_by_key(node_id);
    let node_ids: Vec<HashPos> = summaries.iter().map(node_id).collect();

    // ring closure: walking successor pointers visits every node in
    // clockwise id order and returns to the start
    for i in 0..summaries.len() {
        let current = &summaries[i];
        let next = &summaries[(i + 1) % summaries.len()];

        let successor = current
            .successor_list
            .as_ref()
            .and_then(|list| list.successors.first())
            .map(|node| node.id);
        if successor != Some(node_id(next)) {
            eprintln!(
                "Node ({}, {}): wrong successor, expected {} but was {:?}",
                node_id(current),
                address(current),
                node_id(next),
                successor
            );
            is_valid = false;
        }

        let predecessor = next.predecessor.as_ref().map(|node| node.id);
        if predecessor != Some(node_id(current)) {
            eprintln!(
                "Node ({}, {}): wrong predecessor, expected {} but was {:?}",
                node_id(next),
                address(next),
                node_id(current),
                predecessor
            );
            is_valid = false;
        }
    }

    // successor caches name the nodes that actually follow on the ring
    for (i, summary) in summaries.iter().enumerate() {
        let successors = match summary.successor_list.as_ref() {
            Some(list) => &list.successors,
            None => continue,
        };
        for (j, cached) in successors.iter().enumerate() {
            let expected = node_ids[(i + j + 1) % node_ids.len()];
            if cached.id != expected {
                eprintln!(
                    "Node ({}, {}): successor cache entry {} is {} but should be {}",
                    node_id(summary),
                    address(summary),
                    j,
                    cached.id,
                    expected
                );
                is_valid = false;
            }
        }
    }

    // every finger points at the current owner of its start position
    for summary in &summaries {
        for (j, finger) in summary.finger_entries.iter().enumerate() {
            let pointed_to = finger.node.as_ref().map(|node| node.id);
            let responsible = owner_of(finger.start, &node_ids);
            if pointed_to != Some(responsible) {
                eprintln!(
                    "Node ({}, {}): finger {} (start {}) points at {:?} but {} is responsible",
                    node_id(summary),
                    address(summary),
                    j,
                    finger.start,
                    pointed_to,
                    responsible
                );
                is_valid = false;
            }
        }
    }

    if is_valid {
        eprintln!("Looks good!")
    } else {
        eprintln!("Cluster is invalid!");
        std::process::exit(1);
    }
}

fn node_id(summary: &NodeSummaryMsg) -> HashPos {
    summary.node.as_ref().map(|node| node.id).unwrap_or_default()
}

fn address(summary: &NodeSummaryMsg) -> String {
    summary
        .node
        .as_ref()
        .map(|node| node.address.clone())
        .unwrap_or_default()
}

/// First node id clockwise from `key`, with wrap through zero.
fn owner_of(key: HashPos, node_ids: &[HashPos]) -> HashPos {
    node_ids
        .iter()
        .filter(|&&id| id >= key)
        .min()
        .or_else(|| node_ids.iter().min())
        .copied()
        .unwrap_or_default()
}
