//! Fans a committed change out to peers, waits for quorum, and drives
//! compensating rollback or remote fetch. The transport is HTTP/JSON
//! against each peer's own `/internal/apply-change`, authenticated
//! with the same bearer token as the operator API (see the peer
//! transport decision recorded alongside the rest of this document).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zonehub_proto::zone::Zone;

use crate::config::{Config, Peer};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Put,
    Delete,
    Fetch,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Put => "put",
            Action::Delete => "delete",
            Action::Fetch => "fetch",
        }
    }
}

/// Hook for observing replication outcomes, so the binary crate can
/// feed them into its own metrics without this crate depending on it.
pub trait ReplicationObserver: Send + Sync {
    fn record_broadcast(&self, action: Action, acks: usize, required: usize);
    fn record_rollback(&self, action: Action);
}

struct NoopObserver;

impl ReplicationObserver for NoopObserver {
    fn record_broadcast(&self, _action: Action, _acks: usize, _required: usize) {}
    fn record_rollback(&self, _action: Action) {}
}

#[derive(Debug, Serialize)]
struct ApplyChangeRequest<'a> {
    action: Action,
    domain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Zone>,
}

#[derive(Debug, Deserialize)]
struct ApplyChangeResponse {
    ok: bool,
    #[serde(default)]
    data: Option<Zone>,
}

/// The result of a replication broadcast: who ack'd, and whether that
/// met quorum.
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    pub acked_peers: Vec<Peer>,
    pub required: usize,
    pub acks: usize,
}

impl BroadcastOutcome {
    pub fn quorum_met(&self) -> bool {
        self.acks >= self.required
    }
}

#[derive(Clone)]
pub struct Replicator {
    config: Arc<Config>,
    client: reqwest::Client,
    observer: Arc<dyn ReplicationObserver>,
}

impl Replicator {
    pub fn new(config: Arc<Config>) -> Self {
        Replicator {
            config,
            client: reqwest::Client::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Same as `new`, but reports broadcast and rollback outcomes to
    /// `observer` (used by the binary crate to drive its metrics).
    pub fn with_observer(config: Arc<Config>, observer: Arc<dyn ReplicationObserver>) -> Self {
        Replicator {
            config,
            client: reqwest::Client::new(),
            observer,
        }
    }

    /// Spawn one RPC per peer, wait up to `replication_timeout_ms`
    /// each, and count acks (self plus every peer that returned
    /// success in time).
    pub async fn broadcast(&self, action: Action, domain: &str, data: Option<&Zone>) -> BroadcastOutcome {
        let required = self.config.required_acks();
        let timeout = Duration::from_millis(self.config.replication_timeout_ms);

        let mut tasks = Vec::with_capacity(self.config.peers.len());
        for peer in &self.config.peers {
            let client = self.client.clone();
            let peer = peer.clone();
            let token = self.config.api_token.clone();
            let domain = domain.to_string();
            let data = data.cloned();
            tasks.push(tokio::spawn(async move {
                let outcome = tokio::time::timeout(
                    timeout,
                    apply_change_rpc(&client, &peer, &token, action, &domain, data.as_ref()),
                )
                .await;
                let ok = matches!(outcome, Ok(Ok(resp)) if resp.ok);
                (peer, ok)
            }));
        }

        let mut acked_peers = Vec::new();
        for task in tasks {
            if let Ok((peer, true)) = task.await {
                acked_peers.push(peer);
            }
        }

        let acks = 1 + acked_peers.len();
        self.observer.record_broadcast(action, acks, required);
        BroadcastOutcome {
            acked_peers,
            required,
            acks,
        }
    }

    /// Best-effort compensation sent to every peer that ack'd the
    /// aborted change. The local rollback must already have happened
    /// before calling this; results here are ignored.
    pub async fn rollback(
        &self,
        aborted: Action,
        domain: &str,
        previous: Option<&Zone>,
        acked_peers: &[Peer],
    ) {
        let rollback_action = match aborted {
            Action::Create => Action::Delete,
            Action::Delete | Action::Update | Action::Put => Action::Put,
            Action::Fetch => return,
        };
        self.observer.record_rollback(aborted);
        let timeout = Duration::from_millis(self.config.replication_timeout_ms);

        for peer in acked_peers {
            let client = self.client.clone();
            let peer = peer.clone();
            let token = self.config.api_token.clone();
            let domain = domain.to_string();
            let previous = previous.cloned();
            tokio::spawn(async move {
                let _ = tokio::time::timeout(
                    timeout,
                    apply_change_rpc(&client, &peer, &token, rollback_action, &domain, previous.as_ref()),
                )
                .await;
            });
        }
    }

    /// Probe peers in order; the first successful hit wins.
    pub async fn remote_fetch(&self, domain: &str) -> Option<Zone> {
        let timeout = Duration::from_millis(self.config.replication_timeout_ms);
        for peer in &self.config.peers {
            let outcome = tokio::time::timeout(
                timeout,
                apply_change_rpc(&self.client, peer, &self.config.api_token, Action::Fetch, domain, None),
            )
            .await;
            if let Ok(Ok(resp)) = outcome {
                if resp.ok && resp.data.is_some() {
                    return resp.data;
                }
            }
        }
        None
    }
}

async fn apply_change_rpc(
    client: &reqwest::Client,
    peer: &Peer,
    token: &str,
    action: Action,
    domain: &str,
    data: Option<&Zone>,
) -> Result<ApplyChangeResponse, reqwest::Error> {
    let url = format!("http://{}/internal/apply-change", peer.address);
    let response = client
        .post(url)
        .header("Authentication", format!("Bearer {token}"))
        .json(&ApplyChangeRequest { action, domain, data })
        .send()
        .await?;
    response.json::<ApplyChangeResponse>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn config(peers: Vec<Peer>, ratio: f64) -> Arc<Config> {
        Arc::new(Config {
            zones_folder: PathBuf::from("/tmp/zones"),
            dns_port: 53,
            http_port: 8080,
            metrics_port: 9420,
            api_token: "secret".to_string(),
            replication_quorum_ratio: ratio,
            replication_timeout_ms: 50,
            node_id: "node-a".to_string(),
            peers,
        })
    }

    #[derive(Default)]
    struct RecordingObserver {
        broadcasts: Mutex<Vec<(Action, usize, usize)>>,
        rollbacks: Mutex<Vec<Action>>,
    }

    impl ReplicationObserver for RecordingObserver {
        fn record_broadcast(&self, action: Action, acks: usize, required: usize) {
            self.broadcasts.lock().unwrap().push((action, acks, required));
        }
        fn record_rollback(&self, action: Action) {
            self.rollbacks.lock().unwrap().push(action);
        }
    }

    #[tokio::test]
    async fn observer_sees_broadcast_and_rollback_outcomes() {
        let observer = Arc::new(RecordingObserver::default());
        let replicator = Replicator::with_observer(config(Vec::new(), 1.0), observer.clone());

        replicator.broadcast(Action::Create, "hello.test", None).await;
        assert_eq!(observer.broadcasts.lock().unwrap().as_slice(), &[(Action::Create, 1, 1)]);

        replicator.rollback(Action::Create, "hello.test", None, &[]).await;
        assert_eq!(observer.rollbacks.lock().unwrap().as_slice(), &[Action::Create]);
    }

    #[tokio::test]
    async fn broadcast_with_no_peers_always_meets_quorum() {
        let replicator = Replicator::new(config(Vec::new(), 1.0));
        let outcome = replicator.broadcast(Action::Create, "hello.test", None).await;
        assert_eq!(outcome.acks, 1);
        assert_eq!(outcome.required, 1);
        assert!(outcome.quorum_met());
    }

    #[tokio::test]
    async fn unreachable_peers_never_ack() {
        let peers = vec![Peer {
            node_id: "node-b".to_string(),
            address: "127.0.0.1:1".to_string(),
        }];
        let replicator = Replicator::new(config(peers, 2.0));
        let outcome = replicator.broadcast(Action::Create, "hello.test", None).await;
        assert_eq!(outcome.acks, 1);
        assert!(outcome.acked_peers.is_empty());
        assert!(!outcome.quorum_met());
    }

    #[test]
    fn rollback_action_table() {
        assert!(matches!(
            match Action::Create {
                Action::Create => Action::Delete,
                _ => unreachable!(),
            },
            Action::Delete
        ));
    }
}
