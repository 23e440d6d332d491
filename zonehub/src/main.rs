mod http;
mod metrics;
mod settings;
mod udp;

use std::collections::HashSet;
use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::process;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use zonehub_core::{CacheHandle, Replicator};

#[tokio::main]
async fn main() {
    begin_logging();

    let config = Arc::new(settings::load());
    tracing::info!(node_id = %config.node_id, peers = config.peers.len(), "starting up");

    let report = zonehub_core::startup::scan_zones_folder(&config.zones_folder).await;
    tracing::info!(valid = report.valid, invalid = report.invalid, "zones directory scanned");

    let storage = zonehub_core::storage::Storage::new(config.zones_folder.clone());
    let replicator = Replicator::with_observer(config.clone(), Arc::new(metrics::PrometheusReplicationObserver));
    let cache = CacheHandle::spawn(storage, replicator);

    tracing::info!(port = %config.dns_port, "binding DNS UDP socket");
    let udp_socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.dns_port)).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };
    tokio::spawn(udp::listen_udp_task(cache.clone(), udp_socket));

    let http_state = http::AppState {
        cache,
        config: config.clone(),
    };
    let http_address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port));
    tracing::info!(port = %config.http_port, "binding HTTP TCP socket");
    let http_listener = match tokio::net::TcpListener::bind(http_address).await {
        Ok(l) => l,
        Err(error) => {
            tracing::error!(?error, "could not bind HTTP TCP socket");
            process::exit(1);
        }
    };
    tokio::spawn(async move {
        if let Err(error) = axum::serve(http_listener, http::router(http_state)).await {
            tracing::error!(?error, "HTTP server stopped");
        }
    });

    let metrics_address = SocketAddr::from((Ipv4Addr::LOCALHOST, config.metrics_port));
    tracing::info!(port = %config.metrics_port, "binding metrics TCP socket");
    if let Err(error) = metrics::serve_prometheus_endpoint_task(metrics_address).await {
        tracing::error!(?error, "could not bind metrics TCP socket");
        process::exit(1);
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        var.split(',').map(str::to_string).collect::<HashSet<_>>()
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}
