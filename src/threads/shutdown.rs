use log::{error, info};
use tokio::sync::watch;

/// Waits for ctrl-c and broadcasts the shutdown flag. Maintenance loops
/// observe the flag between iterations and the gRPC server drains through
/// `serve_with_shutdown`.
pub async fn wait_for_shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
    }
    info!("Shutdown signal received, stopping node");
    let _ = tx.send(true);
}
