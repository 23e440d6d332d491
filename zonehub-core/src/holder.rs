//! The zone holder: a dedicated task owning one zone's current
//! content, reached only through its mailbox. `get`/`put` are
//! messages with a `oneshot` reply channel, so concurrent callers
//! never observe a torn write and mutations are strictly serialized.

use tokio::sync::{mpsc, oneshot};
use zonehub_proto::zone::Zone;

use crate::storage::{self, Storage};

enum Message {
    Get(oneshot::Sender<Zone>),
    Put(Zone, oneshot::Sender<Result<(), storage::Error>>),
}

/// A cheap, cloneable handle to a running holder task.
#[derive(Clone)]
pub struct HolderHandle {
    tx: mpsc::Sender<Message>,
}

impl HolderHandle {
    /// Spawn a holder actor for `domain`, starting from `initial`
    /// content already known to be valid and already on disk.
    pub fn spawn(domain: String, initial: Zone, storage: Storage) -> Self {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(run(domain, initial, storage, rx));
        HolderHandle { tx }
    }

    pub async fn get(&self) -> Option<Zone> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Message::Get(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Persist `zone` via storage, then swap it into memory only if
    /// the write succeeds.
    pub async fn put(&self, zone: Zone) -> Option<Result<(), storage::Error>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(Message::Put(zone, reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }
}

async fn run(domain: String, initial: Zone, storage: Storage, mut rx: mpsc::Receiver<Message>) {
    let mut current = initial;
    while let Some(message) = rx.recv().await {
        match message {
            Message::Get(reply) => {
                let _ = reply.send(current.clone());
            }
            Message::Put(zone, reply) => match storage.write(&domain, &zone).await {
                Ok(()) => {
                    current = zone;
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    tracing::warn!(%domain, error = %e, "zone write failed, holder content unchanged");
                    let _ = reply.send(Err(e));
                }
            },
        }
    }
}
