//! Hub registry implementation
//!
//! The process-wide table of live hubs. It is an ordinary owned value: the
//! server creates one and hands an `Arc` of it to every connection it accepts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::hub::{Client, ClientId, Hub, HubHandle, HubId, Membership};
use crate::persistence::CommentStore;
use crate::session::CommentSink;
use crate::stats::{HubStats, RegistryStats};

use super::config::HubConfig;
use super::error::RegistryError;
use super::key::MediaKey;

/// Map of media key to its live hub, shared with the hubs so they can remove
/// themselves
pub(crate) type HubTable = Mutex<HashMap<MediaKey, HubHandle>>;

/// Registry of all live hubs
pub struct HubRegistry {
    hubs: Arc<HubTable>,
    store: Arc<dyn CommentStore>,
    config: HubConfig,
    next_hub_id: AtomicU64,
    next_client_id: AtomicU64,
    hubs_created: AtomicU64,
    clients_joined: AtomicU64,
}

impl HubRegistry {
    /// Create a registry whose hubs use `store` and the default configuration
    pub fn new(store: Arc<dyn CommentStore>) -> Self {
        Self::with_config(store, HubConfig::default())
    }

    /// Create a registry with a custom hub configuration
    pub fn with_config(store: Arc<dyn CommentStore>, config: HubConfig) -> Self {
        Self {
            hubs: Arc::new(Mutex::new(HashMap::new())),
            store,
            config,
            next_hub_id: AtomicU64::new(1),
            next_client_id: AtomicU64::new(1),
            hubs_created: AtomicU64::new(0),
            clients_joined: AtomicU64::new(0),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Get the comment store shared by all hubs
    pub fn store(&self) -> &Arc<dyn CommentStore> {
        &self.store
    }

    /// Return the live hub for `key`, creating and starting one if needed
    ///
    /// Concurrent callers with the same key get the same hub for as long as it
    /// is alive.
    pub async fn get_or_create_hub(&self, key: &MediaKey) -> HubHandle {
        let mut hubs = self.hubs.lock().await;
        self.lookup_or_spawn(&mut hubs, key)
    }

    /// Register a new client on the hub for `key`
    ///
    /// The join is reserved under the registry lock, so the hub cannot retire
    /// between being looked up and receiving the client.
    pub async fn join(
        &self,
        key: &MediaKey,
        sink: Box<dyn CommentSink>,
    ) -> Result<Membership, RegistryError> {
        let ticket = {
            let mut hubs = self.hubs.lock().await;
            self.lookup_or_spawn(&mut hubs, key).reserve_join()
        };

        let client_id = ClientId::new(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        let hub = ticket.register(Client::new(client_id, sink)).await?;
        self.clients_joined.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            media = %key,
            hub_id = %hub.id(),
            client_id = %client_id,
            "Client joined"
        );

        Ok(Membership { hub, client_id })
    }

    /// Get the live hub for `key`, if any
    pub async fn hub(&self, key: &MediaKey) -> Option<HubHandle> {
        self.hubs.lock().await.get(key).cloned()
    }

    /// Statistics of the live hub for `key`, if any
    pub async fn hub_stats(&self, key: &MediaKey) -> Option<HubStats> {
        let hub = self.hub(key).await?;
        hub.stats().await.ok()
    }

    /// Number of live hubs
    pub async fn hub_count(&self) -> usize {
        self.hubs.lock().await.len()
    }

    /// Registry-wide counters
    pub async fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_hubs: self.hub_count().await,
            hubs_created: self.hubs_created.load(Ordering::Relaxed),
            clients_joined: self.clients_joined.load(Ordering::Relaxed),
        }
    }

    fn lookup_or_spawn(
        &self,
        hubs: &mut HashMap<MediaKey, HubHandle>,
        key: &MediaKey,
    ) -> HubHandle {
        if let Some(hub) = hubs.get(key) {
            return hub.clone();
        }

        let id = HubId::new(self.next_hub_id.fetch_add(1, Ordering::Relaxed));
        let (handle, events) = HubHandle::channel(id, key.clone(), self.config.queue_capacity);

        Hub::spawn(
            handle.shared(),
            events,
            Arc::clone(&self.store),
            Arc::clone(&self.hubs),
            self.config.clone(),
        );

        hubs.insert(key.clone(), handle.clone());
        self.hubs_created.fetch_add(1, Ordering::Relaxed);

        tracing::info!(media = %key, hub_id = %id, "Hub created");

        handle
    }
}

impl std::fmt::Debug for HubRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubRegistry")
            .field("config", &self.config)
            .field("hubs_created", &self.hubs_created.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
