//! Prometheus counters and histograms, served on their own HTTP
//! listener separate from the operator API, mirroring the teacher's
//! `serve_prometheus_endpoint_task` and its `metrics_port` split.

use std::net::SocketAddr;
use std::sync::LazyLock;

use axum::{http::StatusCode, routing};
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use zonehub_core::{Action, ReplicationObserver};

pub const PROCESSING_TIME_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.0010, 0.0025, 0.0050, 0.0100, 0.0250, 0.0500, 0.1000, 0.2500, 0.5000, 1.0000,
];

pub static DNS_REQUESTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(opts!(
        "dns_requests_total",
        "Total number of DNS datagrams received."
    ))
    .unwrap()
});

pub static DNS_RESPONSES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        opts!("dns_responses_total", "Total number of DNS responses sent."),
        &["rcode", "truncated"]
    )
    .unwrap()
});

pub static DNS_QUESTION_PROCESSING_TIME_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "dns_question_processing_time_seconds",
        "Time spent resolving one DNS question.",
        &["rcode"],
        PROCESSING_TIME_BUCKETS.to_vec()
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        opts!(
            "http_requests_total",
            "Total number of zone management HTTP requests."
        ),
        &["route", "status"]
    )
    .unwrap()
});

pub static REPLICATION_ACKS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "replication_acks",
        "Acks received per broadcast, against the quorum required.",
        &["action", "quorum_met"],
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
    )
    .unwrap()
});

pub static REPLICATION_ROLLBACKS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        opts!(
            "replication_rollbacks_total",
            "Total number of compensating rollbacks driven after a failed quorum."
        ),
        &["action"]
    )
    .unwrap()
});

/// Feeds `Replicator` broadcast/rollback outcomes into the
/// `REPLICATION_ACKS`/`REPLICATION_ROLLBACKS_TOTAL` statics above.
pub struct PrometheusReplicationObserver;

impl ReplicationObserver for PrometheusReplicationObserver {
    fn record_broadcast(&self, action: Action, acks: usize, required: usize) {
        REPLICATION_ACKS
            .with_label_values(&[action.as_str(), &(acks >= required).to_string()])
            .observe(acks as f64);
    }

    fn record_rollback(&self, action: Action) {
        REPLICATION_ROLLBACKS_TOTAL.with_label_values(&[action.as_str()]).inc();
    }
}

async fn get_metrics() -> (StatusCode, String) {
    match TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(body) => (StatusCode::OK, body),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
    }
}

pub async fn serve_prometheus_endpoint_task(address: SocketAddr) -> std::io::Result<()> {
    let app = axum::Router::new().route("/metrics", routing::get(get_metrics));
    let listener = tokio::net::TcpListener::bind(address).await?;
    axum::serve(listener, app).await
}
