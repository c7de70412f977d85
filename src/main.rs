use std::net::SocketAddr;
use std::process::exit;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use log::{error, info, LevelFilter};
use tokio::sync::{oneshot, watch};
use tonic::transport::Server;

use ringdht::node::Node;
use ringdht::threads::driver::{run_maintenance_loop, MaintenanceTask};
use ringdht::threads::rejoin::run_rejoin_loop;
use ringdht::threads::ring::ring_proto::ring_server::RingServer;
use ringdht::threads::ring::RingService;
use ringdht::threads::setup::setup;
use ringdht::threads::shutdown::wait_for_shutdown_signal;
use ringdht::threads::web::{index, WebHandles};
use ringdht::utils::cli::Cli;
use ringdht::utils::config::Config;

pub mod ring_descriptor {
    pub(crate) const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("ring_descriptor");
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    simple_logger::SimpleLogger::new()
        .env()
        .with_level(LevelFilter::Debug)
        .init()
        .unwrap();

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            exit(1);
        }
    };
    let grpc_socket: SocketAddr = match config.grpc_address.parse() {
        Ok(socket) => socket,
        Err(_) => {
            error!("'{}' is not a valid socket address", config.grpc_address);
            exit(1);
        }
    };

    let own = Node::from_address(&config.grpc_address);
    info!("Node {} takes ring position {}", own.address, own.id);

    let (tx_grpc, rx_grpc) = oneshot::channel();
    let (tx_web, rx_web) = oneshot::channel();
    let (tx_rejoin, rx_rejoin) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut thread_handles = Vec::new();

    info!("Starting up setup thread");
    let setup_config = config.clone();
    let setup_node = own.clone();
    thread_handles.push(tokio::spawn(async move {
        if let Err(e) = setup(&setup_config, &setup_node, tx_grpc, tx_web, tx_rejoin).await {
            error!("{}", e);
            exit(3);
        }
    }));

    let grpc_config = config.clone();
    let grpc_node = own.clone();
    let mut grpc_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        let ring_service = RingService::new(rx_grpc, grpc_node, &grpc_config).await;
        info!("Starting up gRPC service on {}", grpc_config.grpc_address);

        let reflection_service = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(ring_descriptor::FILE_DESCRIPTOR_SET)
            .build()
            .unwrap();

        let result = Server::builder()
            .add_service(RingServer::new(ring_service))
            .add_service(reflection_service)
            .serve_with_shutdown(grpc_socket, async move {
                let _ = grpc_shutdown.changed().await;
            })
            .await;
        if let Err(e) = result {
            error!("gRPC transport failed on {}: {}", grpc_config.grpc_address, e);
            exit(2);
        }
    });

    if let Some(web_address) = config.web_address.clone() {
        let web_config = config.clone();
        let web_node = own.clone();
        thread_handles.push(tokio::task::spawn_blocking(move || {
            actix_web::rt::System::new().block_on(async move {
                let (finger_table, predecessor, successor_list, storage) = match rx_web.await {
                    Ok(state) => state,
                    Err(_) => return,
                };
                let handles = web::Data::new(WebHandles {
                    node: web_node,
                    finger_table,
                    predecessor,
                    successor_list,
                    storage,
                });
                let config_data = web::Data::new(web_config);

                info!("Starting up web interface on {}", web_address);
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(handles.clone())
                        .app_data(config_data.clone())
                        .service(index)
                })
                .bind(&web_address);
                match server {
                    Ok(server) => {
                        if let Err(e) = server.run().await {
                            error!("Web interface failed: {}", e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to bind web interface on {}: {}", web_address, e);
                        exit(2);
                    }
                }
            });
        }));
    }

    for (task, period_ms) in [
        (MaintenanceTask::Stabilize, config.stabilize_period_ms),
        (MaintenanceTask::CheckPredecessor, config.check_predecessor_period_ms),
        (MaintenanceTask::FixFingers, config.fix_fingers_period_ms),
        (MaintenanceTask::ReplicateStorage, config.replication_period_ms),
    ] {
        thread_handles.push(tokio::spawn(run_maintenance_loop(
            task,
            config.grpc_address.clone(),
            Duration::from_millis(period_ms),
            shutdown_rx.clone(),
        )));
    }

    thread_handles.push(tokio::spawn(run_rejoin_loop(
        rx_rejoin,
        own.clone(),
        config.peer.clone(),
        config.retry_budget,
        Duration::from_millis(config.rejoin_period_ms),
        shutdown_rx.clone(),
    )));

    thread_handles.push(tokio::spawn(wait_for_shutdown_signal(shutdown_tx)));

    if let Err(e) = server_handle.await {
        error!("gRPC thread ended abnormally: {}", e);
    }
    info!("Node departed, clean shutdown");
    exit(0);
}
