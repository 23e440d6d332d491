//! The zone cache: a singleon coordinator keyed by domain, activating
//! holders on demand and orchestrating CRUD plus cluster replication.
//! Implemented as an actor (a single task reading a `mpsc` mailbox),
//! so its `domain -> holder` index is mutated only from this task and
//! needs no additional lock.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use zonehub_proto::zone::Zone;

use crate::cluster::{Action, Replicator};
use crate::holder::HolderHandle;
use crate::storage::{self, Storage};

#[derive(Debug)]
pub enum CacheError {
    NotFound,
    AlreadyExists,
    VersionRequired,
    VersionMismatch,
    Storage(storage::Error),
    QuorumFailed { acks: usize, required: usize },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::NotFound => write!(f, "zone not found"),
            CacheError::AlreadyExists => write!(f, "zone already exists"),
            CacheError::VersionRequired => write!(f, "version is required"),
            CacheError::VersionMismatch => write!(f, "version mismatch"),
            CacheError::Storage(e) => write!(f, "{e}"),
            CacheError::QuorumFailed { acks, required } => {
                write!(f, "replication quorum not met: {acks}/{required} acks")
            }
        }
    }
}

impl std::error::Error for CacheError {}

impl From<storage::Error> for CacheError {
    fn from(e: storage::Error) -> Self {
        CacheError::Storage(e)
    }
}

enum Request {
    Fetch {
        domain: String,
        local_only: bool,
        reply: oneshot::Sender<Result<Zone, CacheError>>,
    },
    Create {
        domain: String,
        zone: Zone,
        reply: oneshot::Sender<Result<Zone, CacheError>>,
    },
    Update {
        domain: String,
        zone: Zone,
        reply: oneshot::Sender<Result<Zone, CacheError>>,
    },
    Put {
        domain: String,
        zone: Zone,
        reply: oneshot::Sender<Result<Zone, CacheError>>,
    },
    Delete {
        domain: String,
        reply: oneshot::Sender<Result<(), CacheError>>,
    },
    ApplyChange {
        action: Action,
        domain: String,
        data: Option<Zone>,
        reply: oneshot::Sender<Result<Option<Zone>, CacheError>>,
    },
}

/// A cheap, cloneable handle to the cache actor.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<Request>,
}

impl CacheHandle {
    pub fn spawn(storage: Storage, replicator: Replicator) -> Self {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(run(storage, replicator, rx));
        CacheHandle { tx }
    }

    pub async fn fetch(&self, domain: &str) -> Result<Zone, CacheError> {
        self.request(|reply| Request::Fetch {
            domain: domain.to_string(),
            local_only: false,
            reply,
        })
        .await
    }

    pub async fn fetch_local(&self, domain: &str) -> Result<Zone, CacheError> {
        self.request(|reply| Request::Fetch {
            domain: domain.to_string(),
            local_only: true,
            reply,
        })
        .await
    }

    pub async fn create(&self, domain: &str, zone: Zone) -> Result<Zone, CacheError> {
        self.request(|reply| Request::Create {
            domain: domain.to_string(),
            zone,
            reply,
        })
        .await
    }

    pub async fn update(&self, domain: &str, zone: Zone) -> Result<Zone, CacheError> {
        self.request(|reply| Request::Update {
            domain: domain.to_string(),
            zone,
            reply,
        })
        .await
    }

    pub async fn put(&self, domain: &str, zone: Zone) -> Result<Zone, CacheError> {
        self.request(|reply| Request::Put {
            domain: domain.to_string(),
            zone,
            reply,
        })
        .await
    }

    pub async fn delete(&self, domain: &str) -> Result<(), CacheError> {
        self.request(|reply| Request::Delete {
            domain: domain.to_string(),
            reply,
        })
        .await
    }

    pub async fn apply_change(
        &self,
        action: Action,
        domain: &str,
        data: Option<Zone>,
    ) -> Result<Option<Zone>, CacheError> {
        self.request(|reply| Request::ApplyChange {
            action,
            domain: domain.to_string(),
            data,
            reply,
        })
        .await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T, CacheError>>) -> Request) -> Result<T, CacheError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| CacheError::NotFound)?;
        reply_rx.await.map_err(|_| CacheError::NotFound)?
    }
}

struct State {
    storage: Storage,
    replicator: Replicator,
    holders: HashMap<String, HolderHandle>,
}

impl State {
    /// Activate the holder for `domain`: reuse it if indexed, else
    /// read it from storage and spawn a fresh one. `Err(NotFound)` if
    /// neither an index entry nor a stored file exists.
    async fn activate(&mut self, domain: &str) -> Result<HolderHandle, CacheError> {
        if let Some(holder) = self.holders.get(domain) {
            return Ok(holder.clone());
        }
        let zone = self
            .storage
            .read(domain)
            .await?
            .ok_or(CacheError::NotFound)?;
        let holder = HolderHandle::spawn(domain.to_string(), zone, self.storage.clone());
        self.holders.insert(domain.to_string(), holder.clone());
        Ok(holder)
    }

    /// Index a freshly-written zone under a brand new holder,
    /// replacing any existing one (its task is simply dropped).
    fn activate_with(&mut self, domain: &str, zone: Zone) -> HolderHandle {
        let holder = HolderHandle::spawn(domain.to_string(), zone, self.storage.clone());
        self.holders.insert(domain.to_string(), holder.clone());
        holder
    }

    fn deindex(&mut self, domain: &str) {
        self.holders.remove(domain);
    }

    async fn fetch(&mut self, domain: &str, local_only: bool) -> Result<Zone, CacheError> {
        match self.activate(domain).await {
            Ok(holder) => holder.get().await.ok_or(CacheError::NotFound),
            Err(CacheError::NotFound) if !local_only => self
                .replicator
                .remote_fetch(domain)
                .await
                .ok_or(CacheError::NotFound),
            Err(e) => Err(e),
        }
    }

    async fn create(&mut self, domain: &str, mut zone: Zone) -> Result<Zone, CacheError> {
        if self.storage.exists(domain).await {
            return Err(CacheError::AlreadyExists);
        }
        if zone.version.is_none() {
            zone.version = Some(1);
        }
        self.storage.write(domain, &zone).await?;
        self.activate_with(domain, zone.clone());

        let outcome = self.replicator.broadcast(Action::Create, domain, Some(&zone)).await;
        if !outcome.quorum_met() {
            self.deindex(domain);
            let _ = self.storage.delete(domain).await;
            self.replicator
                .rollback(Action::Create, domain, None, &outcome.acked_peers)
                .await;
            return Err(CacheError::QuorumFailed {
                acks: outcome.acks,
                required: outcome.required,
            });
        }
        Ok(zone)
    }

    async fn update(&mut self, domain: &str, data: Zone) -> Result<Zone, CacheError> {
        let expected_version = data.version.ok_or(CacheError::VersionRequired)?;
        let holder = self.activate(domain).await?;
        let current = holder.get().await.ok_or(CacheError::NotFound)?;
        if current.version != Some(expected_version) {
            return Err(CacheError::VersionMismatch);
        }

        let mut new = data;
        new.version = Some(expected_version + 1);

        let previous = current;
        if let Some(Err(e)) = holder.put(new.clone()).await {
            return Err(e.into());
        }

        let outcome = self.replicator.broadcast(Action::Update, domain, Some(&new)).await;
        if !outcome.quorum_met() {
            let _ = self.storage.write(domain, &previous).await;
            let _ = holder.put(previous.clone()).await;
            self.replicator
                .rollback(Action::Update, domain, Some(&previous), &outcome.acked_peers)
                .await;
            return Err(CacheError::QuorumFailed {
                acks: outcome.acks,
                required: outcome.required,
            });
        }
        Ok(new)
    }

    async fn put(&mut self, domain: &str, data: Zone) -> Result<Zone, CacheError> {
        let previous = match self.activate(domain).await {
            Ok(holder) => holder.get().await,
            Err(CacheError::NotFound) => None,
            Err(e) => return Err(e),
        };

        let holder = match self.holders.get(domain) {
            Some(holder) => holder.clone(),
            None => self.activate_with(domain, data.clone()),
        };
        if previous.is_some() {
            if let Some(Err(e)) = holder.put(data.clone()).await {
                return Err(e.into());
            }
        }

        let outcome = self.replicator.broadcast(Action::Put, domain, Some(&data)).await;
        if !outcome.quorum_met() {
            match &previous {
                Some(previous) => {
                    let _ = self.storage.write(domain, previous).await;
                    let _ = holder.put(previous.clone()).await;
                }
                None => {
                    self.deindex(domain);
                    let _ = self.storage.delete(domain).await;
                }
            }
            self.replicator
                .rollback(Action::Put, domain, previous.as_ref(), &outcome.acked_peers)
                .await;
            return Err(CacheError::QuorumFailed {
                acks: outcome.acks,
                required: outcome.required,
            });
        }
        Ok(data)
    }

    async fn delete(&mut self, domain: &str) -> Result<(), CacheError> {
        let holder = self.activate(domain).await?;
        let previous = holder.get().await.ok_or(CacheError::NotFound)?;

        self.storage.delete(domain).await?;
        self.deindex(domain);

        let outcome = self.replicator.broadcast(Action::Delete, domain, None).await;
        if !outcome.quorum_met() {
            let _ = self.storage.write(domain, &previous).await;
            self.activate_with(domain, previous.clone());
            self.replicator
                .rollback(Action::Delete, domain, Some(&previous), &outcome.acked_peers)
                .await;
            return Err(CacheError::QuorumFailed {
                acks: outcome.acks,
                required: outcome.required,
            });
        }
        Ok(())
    }

    async fn apply_change(
        &mut self,
        action: Action,
        domain: &str,
        data: Option<Zone>,
    ) -> Result<Option<Zone>, CacheError> {
        match action {
            Action::Create | Action::Update | Action::Put => {
                let zone = data.ok_or(CacheError::VersionRequired)?;
                self.storage.write(domain, &zone).await?;
                self.activate_with(domain, zone.clone());
                Ok(Some(zone))
            }
            Action::Delete => {
                let _ = self.storage.delete(domain).await;
                self.deindex(domain);
                Ok(None)
            }
            Action::Fetch => match self.fetch(domain, true).await {
                Ok(zone) => Ok(Some(zone)),
                Err(CacheError::NotFound) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}

async fn run(storage: Storage, replicator: Replicator, mut rx: mpsc::Receiver<Request>) {
    let mut state = State {
        storage,
        replicator,
        holders: HashMap::new(),
    };
    while let Some(request) = rx.recv().await {
        match request {
            Request::Fetch { domain, local_only, reply } => {
                let _ = reply.send(state.fetch(&domain, local_only).await);
            }
            Request::Create { domain, zone, reply } => {
                let _ = reply.send(state.create(&domain, zone).await);
            }
            Request::Update { domain, zone, reply } => {
                let _ = reply.send(state.update(&domain, zone).await);
            }
            Request::Put { domain, zone, reply } => {
                let _ = reply.send(state.put(&domain, zone).await);
            }
            Request::Delete { domain, reply } => {
                let _ = reply.send(state.delete(&domain).await);
            }
            Request::ApplyChange { action, domain, data, reply } => {
                let _ = reply.send(state.apply_change(action, &domain, data).await);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;
    use zonehub_proto::zone::RawRecord;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            zones_folder: PathBuf::from("/tmp/zones"),
            dns_port: 53,
            http_port: 8080,
            metrics_port: 9420,
            api_token: "secret".to_string(),
            replication_quorum_ratio: 1.0,
            replication_timeout_ms: 50,
            node_id: "node-a".to_string(),
            peers: Vec::new(),
        })
    }

    fn a_zone(name: &str) -> Zone {
        Zone {
            name: name.to_string(),
            version: None,
            records: vec![RawRecord {
                name: None,
                rtype: json!("A"),
                class: None,
                ttl: Some(json!(300)),
                data: json!("1.2.3.4"),
            }],
        }
    }

    fn cache_handle(dir: &tempfile::TempDir, ratio: f64) -> CacheHandle {
        let mut cfg = (*config()).clone();
        cfg.replication_quorum_ratio = ratio;
        let storage = Storage::new(dir.path().to_path_buf());
        let replicator = Replicator::new(Arc::new(cfg));
        CacheHandle::spawn(storage, replicator)
    }

    #[tokio::test]
    async fn create_defaults_version_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        let created = cache.create("hello.test", a_zone("hello.test")).await.unwrap();
        assert_eq!(created.version, Some(1));
    }

    #[tokio::test]
    async fn create_rejects_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("hello.test", a_zone("hello.test")).await.unwrap();
        assert!(matches!(
            cache.create("hello.test", a_zone("hello.test")).await,
            Err(CacheError::AlreadyExists)
        ));
    }

    #[tokio::test]
    async fn update_requires_version() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("hello.test", a_zone("hello.test")).await.unwrap();
        let mut without_version = a_zone("hello.test");
        without_version.version = None;
        assert!(matches!(
            cache.update("hello.test", without_version).await,
            Err(CacheError::VersionRequired)
        ));
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_stale_version() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("a.test", a_zone("a.test")).await.unwrap();

        let mut body = a_zone("a.test");
        body.version = Some(1);
        let updated = cache.update("a.test", body.clone()).await.unwrap();
        assert_eq!(updated.version, Some(2));

        assert!(matches!(
            cache.update("a.test", body).await,
            Err(CacheError::VersionMismatch)
        ));
    }

    #[tokio::test]
    async fn fetch_of_unknown_domain_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        assert!(matches!(cache.fetch("nope.test").await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn delete_removes_zone_and_reports_not_found_after() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("gone.test", a_zone("gone.test")).await.unwrap();
        cache.delete("gone.test").await.unwrap();
        assert!(matches!(cache.fetch("gone.test").await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn delete_of_unknown_domain_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        assert!(matches!(cache.delete("nope.test").await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn impossible_quorum_rolls_back_create() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 2.0);
        let result = cache.create("r.test", a_zone("r.test")).await;
        assert!(matches!(result, Err(CacheError::QuorumFailed { .. })));
        assert!(matches!(cache.fetch_local("r.test").await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn impossible_quorum_rolls_back_update() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("u.test", a_zone("u.test")).await.unwrap();

        let storage = Storage::new(dir.path().to_path_buf());
        let mut cfg = (*config()).clone();
        cfg.replication_quorum_ratio = 2.0;
        let high_quorum_cache = CacheHandle::spawn(storage, Replicator::new(Arc::new(cfg)));

        let mut body = a_zone("u.test");
        body.version = Some(1);
        let result = high_quorum_cache.update("u.test", body).await;
        assert!(matches!(result, Err(CacheError::QuorumFailed { .. })));

        let current = cache.fetch_local("u.test").await.unwrap();
        assert_eq!(current.version, Some(1));
    }

    #[tokio::test]
    async fn impossible_quorum_rolls_back_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        cache.create("d.test", a_zone("d.test")).await.unwrap();

        let storage = Storage::new(dir.path().to_path_buf());
        let mut cfg = (*config()).clone();
        cfg.replication_quorum_ratio = 2.0;
        let high_quorum_cache = CacheHandle::spawn(storage, Replicator::new(Arc::new(cfg)));

        let result = high_quorum_cache.delete("d.test").await;
        assert!(matches!(result, Err(CacheError::QuorumFailed { .. })));

        let current = cache.fetch_local("d.test").await.unwrap();
        assert_eq!(current.name, "d.test");
    }

    #[tokio::test]
    async fn apply_change_materializes_remote_writes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_handle(&dir, 1.0);
        let zone = a_zone("peer.test");
        cache
            .apply_change(Action::Create, "peer.test", Some(zone.clone()))
            .await
            .unwrap();
        let fetched = cache.fetch_local("peer.test").await.unwrap();
        assert_eq!(fetched.name, "peer.test");
    }
}
