use std::sync::atomic::Ordering;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::oneshot::Receiver;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::node::Node;
use crate::remote::RemoteNode;
use crate::threads::setup::RejoinState;
use crate::utils::types::Address;

/// Watchdog for whole-partition recovery: when the node's view of the ring
/// has collapsed (successor cache exhausted or reduced to itself with no
/// predecessor), re-run the join handshake against the original seed.
pub async fn run_rejoin_loop(
    rx: Receiver<RejoinState>,
    own: Node,
    seed: Option<Address>,
    retry_budget: u32,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let (finger_table, predecessor, successor_list, rejoin_needed) = match rx.await {
        Ok(state) => state,
        Err(_) => return,
    };

    let seed = match seed.filter(|address| address != &own.address) {
        Some(address) => address,
        None => {
            info!("No distinct seed configured, rejoin watchdog stays idle");
            return;
        }
    };
    info!("Starting up rejoin watchdog, period {:?}", period);

    loop {
        tokio::select! {
            _ = sleep(period) => {}
            _ = shutdown.changed() => {
                info!("Stopping rejoin watchdog");
                return;
            }
        }

        let flagged = rejoin_needed.swap(false, Ordering::SeqCst);
        let collapsed = successor_list.lock().unwrap().is_collapsed(&own)
            && predecessor.lock().unwrap().is_none();
        if !(flagged || collapsed) {
            continue;
        }

        warn!("Ring view collapsed, attempting rejoin via seed {}", seed);
        match RemoteNode::to(&seed).find_successor(own.id, 0, retry_budget).await {
            Some((successor, _)) if successor.id != own.id => {
                {
                    let mut list = successor_list.lock().unwrap();
                    list.reset_to(&successor);
                }
                finger_table.lock().unwrap().set_finger(0, successor.clone());
                info!("Rejoined the ring, successor is {:?}", successor);
            }
            Some(_) => {
                debug!("Seed still routes our id back to us, staying a ring of one")
            }
            None => warn!("Rejoin via seed {} failed, retrying next period", seed),
        }
    }
}
