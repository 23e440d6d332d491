//! Layered configuration: environment variables prefixed `ZONEHUB_`
//! provide defaults via the `config` crate, and CLI flags (parsed with
//! `clap`, the way the teacher's `Args` doubles as CLI help text)
//! override them.

use std::path::PathBuf;

use clap::Parser;
use config::{Config as ConfigSource, Environment};
use serde::Deserialize;

use zonehub_core::config::{Config, Peer};

#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default = "default_zones_folder")]
    zones_folder: String,
    #[serde(default = "default_dns_port")]
    dns_port: u16,
    #[serde(default = "default_http_port")]
    http_port: u16,
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
    #[serde(default)]
    api_token: String,
    #[serde(default = "default_quorum_ratio")]
    replication_quorum_ratio: f64,
    #[serde(default = "default_timeout_ms")]
    replication_timeout_ms: u64,
    #[serde(default = "default_node_id")]
    node_id: String,
    #[serde(default)]
    peers: String,
}

fn default_zones_folder() -> String {
    "./zones".to_string()
}
fn default_dns_port() -> u16 {
    53
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9420
}
fn default_quorum_ratio() -> f64 {
    1.0
}
fn default_timeout_ms() -> u64 {
    500
}
fn default_node_id() -> String {
    "node".to_string()
}

impl Default for EnvSettings {
    fn default() -> Self {
        EnvSettings {
            zones_folder: default_zones_folder(),
            dns_port: default_dns_port(),
            http_port: default_http_port(),
            metrics_port: default_metrics_port(),
            api_token: String::new(),
            replication_quorum_ratio: default_quorum_ratio(),
            replication_timeout_ms: default_timeout_ms(),
            node_id: default_node_id(),
            peers: String::new(),
        }
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// An authoritative DNS server with JSON-persisted, cluster-replicated
/// zones.
///
/// Every setting can also be given as an environment variable
/// prefixed `ZONEHUB_` (e.g. `ZONEHUB_DNS_PORT`); flags given here
/// take priority over the environment.
struct Args {
    /// Directory zone files are stored under
    #[clap(long, value_parser)]
    zones_folder: Option<PathBuf>,

    /// UDP port to serve authoritative DNS queries on
    #[clap(long, value_parser)]
    dns_port: Option<u16>,

    /// HTTP port for the zone management API
    #[clap(long, value_parser)]
    http_port: Option<u16>,

    /// HTTP port for the Prometheus metrics endpoint
    #[clap(long, value_parser)]
    metrics_port: Option<u16>,

    /// Bearer token required on the operator and internal cluster APIs
    #[clap(long, value_parser)]
    api_token: Option<String>,

    /// Fraction of the cluster (including self) that must ack a mutation
    #[clap(long, value_parser)]
    replication_quorum_ratio: Option<f64>,

    /// Per-peer replication RPC timeout, in milliseconds
    #[clap(long, value_parser)]
    replication_timeout_ms: Option<u64>,

    /// This node's identity, used in logs and metrics
    #[clap(long, value_parser)]
    node_id: Option<String>,

    /// Comma-separated list of `node_id=host:port` peer entries
    #[clap(long, value_parser)]
    peers: Option<String>,
}

pub fn load() -> Config {
    let env_settings = ConfigSource::builder()
        .add_source(Environment::with_prefix("ZONEHUB"))
        .build()
        .and_then(ConfigSource::try_deserialize::<EnvSettings>)
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "could not load ZONEHUB_* environment settings, using defaults");
            EnvSettings::default()
        });

    let args = Args::parse();

    Config {
        zones_folder: args.zones_folder.unwrap_or_else(|| PathBuf::from(env_settings.zones_folder)),
        dns_port: args.dns_port.unwrap_or(env_settings.dns_port),
        http_port: args.http_port.unwrap_or(env_settings.http_port),
        metrics_port: args.metrics_port.unwrap_or(env_settings.metrics_port),
        api_token: args.api_token.unwrap_or(env_settings.api_token),
        replication_quorum_ratio: args
            .replication_quorum_ratio
            .unwrap_or(env_settings.replication_quorum_ratio),
        replication_timeout_ms: args.replication_timeout_ms.unwrap_or(env_settings.replication_timeout_ms),
        node_id: args.node_id.unwrap_or(env_settings.node_id),
        peers: parse_peers(&args.peers.unwrap_or(env_settings.peers)),
    }
}

fn parse_peers(spec: &str) -> Vec<Peer> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let (node_id, address) = entry.split_once('=')?;
            Some(Peer {
                node_id: node_id.to_string(),
                address: address.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_peers_spec_is_no_peers() {
        assert!(parse_peers("").is_empty());
    }

    #[test]
    fn parses_comma_separated_peers() {
        let peers = parse_peers("b=10.0.0.2:53, c=10.0.0.3:53");
        assert_eq!(
            peers,
            vec![
                Peer {
                    node_id: "b".to_string(),
                    address: "10.0.0.2:53".to_string()
                },
                Peer {
                    node_id: "c".to_string(),
                    address: "10.0.0.3:53".to_string()
                },
            ]
        );
    }

    #[test]
    fn malformed_entry_without_equals_is_skipped() {
        assert!(parse_peers("not-a-valid-entry").is_empty());
    }
}
