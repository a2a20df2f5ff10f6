//! Cloneable handle to a running hub

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{Post, ReplayWindow};
use crate::registry::{MediaKey, RegistryError};
use crate::stats::HubStats;

use super::client::{Client, ClientId};
use super::event::HubEvent;

/// Process-unique identifier of a hub instance
///
/// A media key gets a fresh id every time a new hub is created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HubId(u64);

impl HubId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State shared between a hub task and its handles
pub(crate) struct HubShared {
    pub(crate) id: HubId,
    pub(crate) media_key: MediaKey,
    /// Joins reserved under the registry lock whose `Register` the hub has not
    /// processed yet; the hub never retires while this is non-zero
    pub(crate) pending_joins: AtomicUsize,
    pub(crate) created_at: Instant,
}

/// Handle used to feed events into a hub
#[derive(Clone)]
pub struct HubHandle {
    shared: Arc<HubShared>,
    tx: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    /// Create the handle and the event receiver for a new hub
    pub(crate) fn channel(
        id: HubId,
        media_key: MediaKey,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<HubEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shared = Arc::new(HubShared {
            id,
            media_key,
            pending_joins: AtomicUsize::new(0),
            created_at: Instant::now(),
        });
        (Self { shared, tx }, rx)
    }

    pub(crate) fn shared(&self) -> Arc<HubShared> {
        Arc::clone(&self.shared)
    }

    pub fn id(&self) -> HubId {
        self.shared.id
    }

    pub fn media_key(&self) -> &MediaKey {
        &self.shared.media_key
    }

    /// Whether the hub's event loop has terminated
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the hub's event loop has terminated
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether both handles point at the same hub instance
    pub fn same_hub(&self, other: &HubHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Queue a live comment; waits while the hub's queue is full
    pub async fn ingest(&self, post: Post) -> Result<(), RegistryError> {
        self.send(HubEvent::LiveIngest(post)).await
    }

    /// Queue a replay of `window` for one client
    pub async fn replay(
        &self,
        client_id: ClientId,
        window: ReplayWindow,
    ) -> Result<(), RegistryError> {
        self.send(HubEvent::Replay { client_id, window }).await
    }

    /// Queue the removal of a client
    pub async fn unregister(&self, client_id: ClientId) -> Result<(), RegistryError> {
        self.send(HubEvent::Unregister(client_id)).await
    }

    /// Ask the hub for a statistics snapshot
    pub async fn stats(&self) -> Result<HubStats, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubEvent::Stats(reply)).await?;
        rx.await.map_err(|_| self.closed_error())
    }

    /// Reserve a join; must be called while holding the registry lock
    pub(crate) fn reserve_join(&self) -> JoinTicket {
        self.shared.pending_joins.fetch_add(1, Ordering::AcqRel);
        JoinTicket {
            hub: self.clone(),
            armed: true,
        }
    }

    async fn send(&self, event: HubEvent) -> Result<(), RegistryError> {
        self.tx.send(event).await.map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> RegistryError {
        RegistryError::HubClosed(self.shared.media_key.clone())
    }
}

impl fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubHandle")
            .field("id", &self.shared.id)
            .field("media_key", &self.shared.media_key)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A join reserved on a hub, redeemed by sending the client's `Register`
///
/// Dropping an unredeemed ticket tells the hub the join will not happen.
pub(crate) struct JoinTicket {
    hub: HubHandle,
    armed: bool,
}

impl JoinTicket {
    pub(crate) async fn register(mut self, client: Client) -> Result<HubHandle, RegistryError> {
        self.hub.send(HubEvent::Register(client)).await?;
        self.armed = false;
        Ok(self.hub.clone())
    }
}

impl Drop for JoinTicket {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.hub.tx.try_send(HubEvent::JoinCancelled) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let tx = self.hub.tx.clone();
                    runtime.spawn(async move {
                        let _ = tx.send(event).await;
                    });
                }
                Err(_) => {
                    self.hub.shared.pending_joins.fetch_sub(1, Ordering::AcqRel);
                }
            },
            Err(TrySendError::Closed(_)) => {
                self.hub.shared.pending_joins.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
}

/// A client's membership in a hub, returned by a successful join
#[derive(Debug, Clone)]
pub struct Membership {
    pub hub: HubHandle,
    pub client_id: ClientId,
}
