//! Events processed by a hub's event loop

use tokio::sync::oneshot;

use crate::protocol::{Post, ReplayWindow};
use crate::stats::HubStats;

use super::client::{Client, ClientId};

/// Everything that can happen to a hub, applied one at a time in arrival order
pub(crate) enum HubEvent {
    /// Add a client to the set
    Register(Client),
    /// A reserved join was abandoned before its `Register` was sent
    JoinCancelled,
    /// Remove a client from the set and close its connection
    Unregister(ClientId),
    /// Store a new comment and broadcast it to every client
    LiveIngest(Post),
    /// Send the history inside `window` to one client
    Replay {
        client_id: ClientId,
        window: ReplayWindow,
    },
    /// Report a statistics snapshot
    Stats(oneshot::Sender<HubStats>),
}
