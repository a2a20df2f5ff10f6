//! Statistics snapshots for hubs and the registry

use std::time::Duration;

use crate::hub::HubId;
use crate::registry::MediaKey;

/// Snapshot of one hub, taken inside its event loop
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Hub instance id
    pub hub_id: HubId,
    /// Media served by the hub
    pub media_key: MediaKey,
    /// Currently registered clients
    pub client_count: usize,
    /// Joins reserved but not yet registered
    pub pending_joins: usize,
    /// Live comments stored successfully
    pub comments_ingested: u64,
    /// Failed or timed out storage calls
    pub persistence_failures: u64,
    /// Replays delivered
    pub replays_served: u64,
    /// Clients dropped because a delivery failed
    pub delivery_failures: u64,
    /// Time since the hub was created
    pub uptime: Duration,
}

/// Registry-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Hubs currently in the registry
    pub active_hubs: usize,
    /// Hubs created since startup
    pub hubs_created: u64,
    /// Clients that joined since startup
    pub clients_joined: u64,
}
