use std::fmt;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::time::sleep;
use tonic::Request;

use crate::remote::connect;
use crate::threads::ring::ring_proto::Empty;
use crate::utils::types::Address;

/// The periodic protocol steps a node runs against its own endpoint.
#[derive(Debug, Clone, Copy)]
pub enum MaintenanceTask {
    Stabilize,
    CheckPredecessor,
    FixFingers,
    ReplicateStorage,
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceTask::Stabilize => write!(f, "stabilize"),
            MaintenanceTask::CheckPredecessor => write!(f, "check_predecessor"),
            MaintenanceTask::FixFingers => write!(f, "fix_fingers"),
            MaintenanceTask::ReplicateStorage => write!(f, "replicate_storage"),
        }
    }
}

/// Drives one maintenance task: sleep one period, invoke the matching RPC
/// on the local gRPC service, repeat. Every iteration is fail-soft, a
/// failed pass is logged and the loop carries on. The shutdown channel
/// interrupts the sleep immediately.
pub async fn run_maintenance_loop(
    task: MaintenanceTask,
    local_address: Address,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Starting up periodic {} loop, period {:?}", task, period);
    loop {
        tokio::select! {
            _ = sleep(period) => {}
            _ = shutdown.changed() => {
                info!("Stopping {} loop", task);
                return;
            }
        }

        let pass = match connect(&local_address).await {
            Ok(mut client) => match task {
                MaintenanceTask::Stabilize => {
                    client.stabilize(Request::new(Empty {})).await.map(|_| ())
                }
                MaintenanceTask::CheckPredecessor => {
                    client.check_predecessor(Request::new(Empty {})).await.map(|_| ())
                }
                MaintenanceTask::FixFingers => {
                    client.fix_fingers(Request::new(Empty {})).await.map(|_| ())
                }
                MaintenanceTask::ReplicateStorage => {
                    client.replicate_storage(Request::new(Empty {})).await.map(|_| ())
                }
            },
            Err(status) => Err(status),
        };

        if let Err(status) = pass {
            warn!("{} pass failed: {}", task, status);
        }
    }
}
