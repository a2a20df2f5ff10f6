//! Hub event loop
//!
//! One hub runs per active media key as its own task. It alone owns the set of
//! registered clients; every membership change, live comment and replay for
//! that media goes through its queue and is applied strictly one at a time:
//!
//! ```text
//!   session A ──┐
//!   session B ──┼──► mpsc<HubEvent> ──► Hub::run ──┬──► CommentStore
//!   session C ──┘                                  └──► client sinks
//! ```
//!
//! Because storage calls are awaited inside the loop, a slow store delays every
//! pending event of this hub, while hubs of other media keep running.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::persistence::{CommentStore, NewComment, StoreError};
use crate::protocol::{OutboundFrame, OutboundMessage, Post, ReplayWindow};
use crate::registry::{HubConfig, HubTable};
use crate::stats::HubStats;

use super::client::{Client, ClientId};
use super::event::HubEvent;
use super::handle::HubShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Continue,
    Terminate,
}

#[derive(Debug, Default)]
struct HubCounters {
    comments_ingested: u64,
    persistence_failures: u64,
    replays_served: u64,
    delivery_failures: u64,
}

pub(crate) struct Hub {
    shared: Arc<HubShared>,
    events: mpsc::Receiver<HubEvent>,
    clients: HashMap<ClientId, Client>,
    /// Clients whose delivery failed, unregistered before the next event
    deferred: VecDeque<ClientId>,
    store: Arc<dyn CommentStore>,
    table: Arc<HubTable>,
    config: HubConfig,
    counters: HubCounters,
}

impl Hub {
    /// Start the event loop of a new hub
    pub(crate) fn spawn(
        shared: Arc<HubShared>,
        events: mpsc::Receiver<HubEvent>,
        store: Arc<dyn CommentStore>,
        table: Arc<HubTable>,
        config: HubConfig,
    ) -> JoinHandle<()> {
        let hub = Self {
            shared,
            events,
            clients: HashMap::new(),
            deferred: VecDeque::new(),
            store,
            table,
            config,
            counters: HubCounters::default(),
        };

        tokio::spawn(hub.run())
    }

    async fn run(mut self) {
        tracing::info!(
            media = %self.shared.media_key,
            hub_id = %self.shared.id,
            "Hub started"
        );

        'events: loop {
            while let Some(client_id) = self.deferred.pop_front() {
                if self.unregister(client_id).await == Lifecycle::Terminate {
                    break 'events;
                }
            }

            let Some(event) = self.events.recv().await else {
                break;
            };

            let lifecycle = match event {
                HubEvent::Register(client) => {
                    self.register(client);
                    Lifecycle::Continue
                }
                HubEvent::JoinCancelled => self.join_cancelled().await,
                HubEvent::Unregister(client_id) => self.unregister(client_id).await,
                HubEvent::LiveIngest(post) => {
                    self.ingest(post).await;
                    Lifecycle::Continue
                }
                HubEvent::Replay { client_id, window } => {
                    self.replay(client_id, window).await;
                    Lifecycle::Continue
                }
                HubEvent::Stats(reply) => {
                    let _ = reply.send(self.stats());
                    Lifecycle::Continue
                }
            };

            if lifecycle == Lifecycle::Terminate {
                break;
            }
        }

        tracing::info!(
            media = %self.shared.media_key,
            hub_id = %self.shared.id,
            comments = self.counters.comments_ingested,
            uptime_secs = self.shared.created_at.elapsed().as_secs(),
            "Hub terminated"
        );
    }

    fn register(&mut self, client: Client) {
        self.shared.pending_joins.fetch_sub(1, Ordering::AcqRel);

        let client_id = client.id();
        if self.clients.insert(client_id, client).is_some() {
            tracing::warn!(
                media = %self.shared.media_key,
                client_id = %client_id,
                "Client registered twice"
            );
        }

        tracing::debug!(
            media = %self.shared.media_key,
            client_id = %client_id,
            clients = self.clients.len(),
            "Client registered"
        );
    }

    async fn join_cancelled(&mut self) -> Lifecycle {
        self.shared.pending_joins.fetch_sub(1, Ordering::AcqRel);

        if self.clients.is_empty() {
            self.try_retire().await
        } else {
            Lifecycle::Continue
        }
    }

    async fn unregister(&mut self, client_id: ClientId) -> Lifecycle {
        let Some(mut client) = self.clients.remove(&client_id) else {
            tracing::debug!(
                media = %self.shared.media_key,
                client_id = %client_id,
                "Unregister for unknown client"
            );
            return Lifecycle::Continue;
        };

        client.close().await;

        tracing::debug!(
            media = %self.shared.media_key,
            client_id = %client_id,
            clients = self.clients.len(),
            connected_secs = client.connected_for().as_secs(),
            "Client unregistered"
        );

        if self.clients.is_empty() {
            self.try_retire().await
        } else {
            Lifecycle::Continue
        }
    }

    /// Remove this hub from the registry, unless a join is in flight
    async fn try_retire(&mut self) -> Lifecycle {
        let mut hubs = self.table.lock().await;

        if self.shared.pending_joins.load(Ordering::Acquire) > 0 {
            tracing::debug!(
                media = %self.shared.media_key,
                hub_id = %self.shared.id,
                "Hub empty but a join is pending"
            );
            return Lifecycle::Continue;
        }

        let owns_entry = hubs
            .get(&self.shared.media_key)
            .is_some_and(|entry| entry.id() == self.shared.id);
        if owns_entry {
            hubs.remove(&self.shared.media_key);
        }

        // Closed while still holding the lock: no handle can queue anything
        // past this point.
        self.events.close();
        Lifecycle::Terminate
    }

    async fn ingest(&mut self, post: Post) {
        let comment = NewComment::from(&post);
        let stored = bounded(
            self.config.persistence_timeout,
            self.store.insert_comment(&comment),
        )
        .await;

        let message = match stored {
            Ok(inserted) => {
                self.counters.comments_ingested += 1;
                tracing::debug!(
                    media = %self.shared.media_key,
                    comment_id = inserted.id,
                    time_of_media = post.time_of_media,
                    "Comment stored"
                );
                OutboundMessage::persisted(&post, inserted)
            }
            Err(e) => {
                self.counters.persistence_failures += 1;
                tracing::warn!(
                    media = %self.shared.media_key,
                    error = %e,
                    "Failed to store comment, broadcasting it unpersisted"
                );
                OutboundMessage::unpersisted(&post, Utc::now())
            }
        };

        let frame = match OutboundFrame::single(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(media = %self.shared.media_key, error = %e, "Failed to encode comment");
                return;
            }
        };

        for (client_id, client) in self.clients.iter_mut() {
            if let Err(e) = client.deliver(&frame, self.config.send_timeout).await {
                self.counters.delivery_failures += 1;
                tracing::warn!(
                    media = %self.shared.media_key,
                    client_id = %client_id,
                    error = %e,
                    "Failed to deliver comment, dropping client"
                );
                self.deferred.push_back(*client_id);
            }
        }
    }

    async fn replay(&mut self, client_id: ClientId, requested: ReplayWindow) {
        let Some(client) = self.clients.get_mut(&client_id) else {
            tracing::debug!(
                media = %self.shared.media_key,
                client_id = %client_id,
                "Replay for unknown client"
            );
            return;
        };

        client.set_window(requested);
        let window = client.window();

        let query = self.store.comments_in_range(
            &self.shared.media_key,
            window.min_time_of_media,
            window.max_time_of_media,
        );
        let comments = match bounded(self.config.persistence_timeout, query).await {
            Ok(comments) => comments,
            Err(e) => {
                self.counters.persistence_failures += 1;
                tracing::warn!(
                    media = %self.shared.media_key,
                    client_id = %client_id,
                    error = %e,
                    "Failed to load comments for replay"
                );
                return;
            }
        };

        let frame = match OutboundFrame::encode(comments.into_iter().map(OutboundMessage::from).collect()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(media = %self.shared.media_key, error = %e, "Failed to encode replay");
                return;
            }
        };

        match client.deliver(&frame, self.config.send_timeout).await {
            Ok(()) => {
                self.counters.replays_served += 1;
                tracing::debug!(
                    media = %self.shared.media_key,
                    client_id = %client_id,
                    min = window.min_time_of_media,
                    max = window.max_time_of_media,
                    comments = frame.len(),
                    "Replay delivered"
                );
            }
            Err(e) => {
                self.counters.delivery_failures += 1;
                tracing::warn!(
                    media = %self.shared.media_key,
                    client_id = %client_id,
                    error = %e,
                    "Failed to deliver replay, dropping client"
                );
                self.deferred.push_back(client_id);
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            hub_id: self.shared.id,
            media_key: self.shared.media_key.clone(),
            client_count: self.clients.len(),
            pending_joins: self.shared.pending_joins.load(Ordering::Acquire),
            comments_ingested: self.counters.comments_ingested,
            persistence_failures: self.counters.persistence_failures,
            replays_served: self.counters.replays_served,
            delivery_failures: self.counters.delivery_failures,
            uptime: self.shared.created_at.elapsed(),
        }
    }
}

/// Run a storage call, failing with [`StoreError::Timeout`] past `limit`
async fn bounded<T, F>(limit: Option<Duration>, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?,
        None => call.await,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::mpsc::error::TryRecvError;

    use crate::hub::Membership;
    use crate::persistence::{Comment, InsertedComment, MemoryCommentStore};
    use crate::protocol::{OutboundMessage, Poster, UNPERSISTED_COMMENT_ID};
    use crate::registry::{HubRegistry, MediaKey};
    use crate::session::{ChannelSink, CommentSink, ConnectionError};

    use super::*;

    struct FlakyStore {
        inner: MemoryCommentStore,
        fail_inserts: bool,
        fail_queries: bool,
    }

    #[async_trait]
    impl CommentStore for FlakyStore {
        async fn ensure_media(&self, media_key: &MediaKey) -> Result<(), StoreError> {
            self.inner.ensure_media(media_key).await
        }

        async fn insert_comment(&self, comment: &NewComment) -> Result<InsertedComment, StoreError> {
            if self.fail_inserts {
                return Err(StoreError::Backend("insert refused".into()));
            }
            self.inner.insert_comment(comment).await
        }

        async fn comments_in_range(
            &self,
            media_key: &MediaKey,
            min_time: i64,
            max_time: i64,
        ) -> Result<Vec<Comment>, StoreError> {
            if self.fail_queries {
                return Err(StoreError::Backend("query refused".into()));
            }
            self.inner.comments_in_range(media_key, min_time, max_time).await
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CommentStore for SlowStore {
        async fn ensure_media(&self, _media_key: &MediaKey) -> Result<(), StoreError> {
            Ok(())
        }

        async fn insert_comment(&self, _comment: &NewComment) -> Result<InsertedComment, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(StoreError::Backend("unreachable".into()))
        }

        async fn comments_in_range(
            &self,
            _media_key: &MediaKey,
            _min_time: i64,
            _max_time: i64,
        ) -> Result<Vec<Comment>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl CommentSink for BrokenSink {
        async fn send(&mut self, _frame: &OutboundFrame) -> Result<(), ConnectionError> {
            Err(ConnectionError::Closed)
        }

        async fn close(&mut self) {}
    }

    fn key() -> MediaKey {
        MediaKey::new("abc").unwrap()
    }

    fn post(message: &str, poster: i64, time_of_media: i64) -> Post {
        Post {
            message: message.into(),
            poster: Poster::Id(poster),
            time_of_media,
            media_key: key(),
        }
    }

    async fn registry_with(store: Arc<dyn CommentStore>) -> HubRegistry {
        store.ensure_media(&key()).await.unwrap();
        HubRegistry::new(store)
    }

    async fn join(registry: &HubRegistry) -> (Membership, mpsc::Receiver<Vec<OutboundMessage>>) {
        let (sink, rx) = ChannelSink::new(16);
        let membership = registry.join(&key(), Box::new(sink)).await.unwrap();
        (membership, rx)
    }

    #[tokio::test]
    async fn test_live_comment_reaches_registered_client() {
        let store = Arc::new(MemoryCommentStore::new());
        let registry = registry_with(store.clone()).await;
        let (a, mut a_rx) = join(&registry).await;

        a.hub.ingest(post("hi", 42, 100)).await.unwrap();

        let batch = a_rx.recv().await.unwrap();
        let stored = store.comments_in_range(&key(), 100, 100).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].comment_id, stored[0].id);
        assert_eq!(batch[0].created_at, stored[0].created_at);
        assert_eq!(batch[0].message, "hi");
        assert_eq!(batch[0].poster, Poster::Id(42));
        assert_eq!(batch[0].time_of_media, 100);
    }

    #[tokio::test]
    async fn test_live_comment_fans_out_to_every_client() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        let (_b, mut b_rx) = join(&registry).await;

        a.hub.ingest(post("both", 1, 5)).await.unwrap();

        let to_a = a_rx.recv().await.unwrap();
        let to_b = b_rx.recv().await.unwrap();
        assert_eq!(to_a, to_b);
        assert_eq!(to_a[0].comment_id, 1);
    }

    #[tokio::test]
    async fn test_replay_goes_to_requester_only() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        a.hub.ingest(post("hi", 42, 100)).await.unwrap();
        let live = a_rx.recv().await.unwrap();

        let (b, mut b_rx) = join(&registry).await;
        b.hub
            .replay(b.client_id, ReplayWindow::around(105, 10))
            .await
            .unwrap();

        let replayed = b_rx.recv().await.unwrap();
        assert_eq!(replayed, live);

        // Stats are answered after the replay, so anything for A would be queued by now
        let stats = a.hub.stats().await.unwrap();
        assert_eq!(stats.replays_served, 1);
        assert!(matches!(a_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_replay_outside_window_is_empty() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        a.hub.ingest(post("early", 1, 3)).await.unwrap();
        a_rx.recv().await.unwrap();

        a.hub
            .replay(a.client_id, ReplayWindow::around(50, 10))
            .await
            .unwrap();

        assert!(a_rx.recv().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        for t in [10, 12, 30] {
            a.hub.ingest(post("c", 1, t)).await.unwrap();
            a_rx.recv().await.unwrap();
        }

        let window = ReplayWindow::around(15, 10);
        a.hub.replay(a.client_id, window).await.unwrap();
        a.hub.replay(a.client_id, window).await.unwrap();

        let first = a_rx.recv().await.unwrap();
        let second = a_rx.recv().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unregistered_client_stops_receiving() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        let (b, mut b_rx) = join(&registry).await;

        b.hub.unregister(b.client_id).await.unwrap();
        a.hub.ingest(post("only a", 1, 1)).await.unwrap();

        assert_eq!(a_rx.recv().await.unwrap()[0].message, "only a");
        // B's sink was closed by the hub, so its receiver ends without the comment
        assert!(b_rx.recv().await.is_none());

        let stats = a.hub.stats().await.unwrap();
        assert_eq!(stats.client_count, 1);
    }

    #[tokio::test]
    async fn test_register_unregister_membership_count() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (anchor, _anchor_rx) = join(&registry).await;

        let mut members = Vec::new();
        for _ in 0..5 {
            members.push(join(&registry).await);
        }
        for (membership, _) in members.iter().take(3) {
            membership.hub.unregister(membership.client_id).await.unwrap();
        }
        // Unregistering twice is a no-op
        members[0].0.hub.unregister(members[0].0.client_id).await.unwrap();

        let stats = anchor.hub.stats().await.unwrap();
        assert_eq!(stats.client_count, 3);
        assert_eq!(stats.pending_joins, 0);
    }

    #[tokio::test]
    async fn test_insert_failure_still_broadcasts() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCommentStore::new(),
            fail_inserts: true,
            fail_queries: false,
        });
        let registry = registry_with(store).await;
        let (a, mut a_rx) = join(&registry).await;

        a.hub.ingest(post("degraded", 9, 20)).await.unwrap();

        let batch = a_rx.recv().await.unwrap();
        assert_eq!(batch[0].comment_id, UNPERSISTED_COMMENT_ID);
        assert_eq!(batch[0].message, "degraded");

        let stats = a.hub.stats().await.unwrap();
        assert_eq!(stats.persistence_failures, 1);
        assert_eq!(stats.comments_ingested, 0);
    }

    #[tokio::test]
    async fn test_query_failure_sends_nothing() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCommentStore::new(),
            fail_inserts: false,
            fail_queries: true,
        });
        let registry = registry_with(store).await;
        let (a, mut a_rx) = join(&registry).await;

        a.hub
            .replay(a.client_id, ReplayWindow::around(0, 10))
            .await
            .unwrap();

        let stats = a.hub.stats().await.unwrap();
        assert_eq!(stats.persistence_failures, 1);
        assert_eq!(stats.client_count, 1);
        assert!(matches!(a_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_timeout_degrades_like_failure() {
        let store: Arc<dyn CommentStore> = Arc::new(SlowStore);
        let registry = HubRegistry::with_config(
            store,
            HubConfig::default().persistence_timeout(Duration::from_millis(50)),
        );
        let (a, mut a_rx) = join(&registry).await;

        a.hub.ingest(post("slow", 1, 1)).await.unwrap();

        let batch = a_rx.recv().await.unwrap();
        assert_eq!(batch[0].comment_id, UNPERSISTED_COMMENT_ID);
    }

    #[tokio::test]
    async fn test_failed_delivery_drops_only_that_client() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let (a, mut a_rx) = join(&registry).await;
        registry.join(&key(), Box::new(BrokenSink)).await.unwrap();

        a.hub.ingest(post("first", 1, 1)).await.unwrap();
        a.hub.ingest(post("second", 1, 2)).await.unwrap();

        assert_eq!(a_rx.recv().await.unwrap()[0].message, "first");
        assert_eq!(a_rx.recv().await.unwrap()[0].message, "second");

        let stats = a.hub.stats().await.unwrap();
        assert_eq!(stats.client_count, 1);
        assert_eq!(stats.delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_of_last_client_terminates_hub() {
        let registry = registry_with(Arc::new(MemoryCommentStore::new())).await;
        let membership = registry.join(&key(), Box::new(BrokenSink)).await.unwrap();

        membership.hub.ingest(post("nobody", 1, 1)).await.unwrap();
        membership.hub.closed().await;

        assert!(registry.hub(&key()).await.is_none());
    }
}
