//! Process-wide configuration, held as an `Arc<Config>` and cloned
//! into every task, mirroring the teacher's `ListenArgs`/`Args` being
//! `Clone` and handed to every spawned task.

use std::path::PathBuf;

/// A peer node's address, as `host:port`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Peer {
    pub node_id: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub zones_folder: PathBuf,
    pub dns_port: u16,
    pub http_port: u16,
    pub metrics_port: u16,
    pub api_token: String,
    pub replication_quorum_ratio: f64,
    pub replication_timeout_ms: u64,
    pub node_id: String,
    pub peers: Vec<Peer>,
}

impl Config {
    /// `required = max(1, ceil(total_nodes * replication_quorum_ratio))`,
    /// where `total_nodes` counts this node plus its peers.
    pub fn required_acks(&self) -> usize {
        let total_nodes = self.peers.len() + 1;
        let required = (total_nodes as f64 * self.replication_quorum_ratio).ceil() as usize;
        required.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(peers: usize, ratio: f64) -> Config {
        Config {
            zones_folder: PathBuf::from("/tmp/zones"),
            dns_port: 53,
            http_port: 8080,
            metrics_port: 9420,
            api_token: "secret".to_string(),
            replication_quorum_ratio: ratio,
            replication_timeout_ms: 500,
            node_id: "node-a".to_string(),
            peers: (0..peers)
                .map(|i| Peer {
                    node_id: format!("node-{i}"),
                    address: format!("127.0.0.1:{}", 9000 + i),
                })
                .collect(),
        }
    }

    #[test]
    fn single_node_always_requires_one_ack() {
        assert_eq!(config(0, 1.0).required_acks(), 1);
    }

    #[test]
    fn majority_of_three_is_two() {
        assert_eq!(config(2, 0.5).required_acks(), 2);
    }

    #[test]
    fn ratio_above_one_forces_impossible_quorum() {
        assert_eq!(config(2, 2.0).required_acks(), 6);
    }
}
