//! Hub configuration

use std::time::Duration;

use crate::protocol::DEFAULT_REPLAY_RADIUS;

/// Settings applied to every hub created by a registry
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each hub's event queue
    ///
    /// When the queue is full, senders wait until the hub catches up. A hub
    /// stalled on storage therefore slows down the clients posting to it
    /// without growing memory.
    pub queue_capacity: usize,

    /// Upper bound on each storage call made by a hub (None = unbounded)
    pub persistence_timeout: Option<Duration>,

    /// Upper bound on delivering one frame to one client
    pub send_timeout: Duration,

    /// Half-width of the replay window around a requested position
    pub replay_radius: i64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            persistence_timeout: Some(Duration::from_secs(10)),
            send_timeout: Duration::from_secs(5),
            replay_radius: DEFAULT_REPLAY_RADIUS,
        }
    }
}

impl HubConfig {
    /// Set the event queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Bound storage calls
    pub fn persistence_timeout(mut self, timeout: Duration) -> Self {
        self.persistence_timeout = Some(timeout);
        self
    }

    /// Let storage calls run as long as they take
    pub fn unbounded_persistence(mut self) -> Self {
        self.persistence_timeout = None;
        self
    }

    /// Bound per-client delivery
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the replay window half-width (negative values are treated as 0)
    pub fn replay_radius(mut self, radius: i64) -> Self {
        self.replay_radius = radius.max(0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.persistence_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.send_timeout, Duration::from_secs(5));
        assert_eq!(config.replay_radius, 10);
    }

    #[test]
    fn test_builder_queue_capacity_floor() {
        let config = HubConfig::default().queue_capacity(0);

        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = HubConfig::default()
            .queue_capacity(8)
            .persistence_timeout(Duration::from_millis(250))
            .send_timeout(Duration::from_secs(1))
            .replay_radius(30);

        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.persistence_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.send_timeout, Duration::from_secs(1));
        assert_eq!(config.replay_radius, 30);
    }

    #[test]
    fn test_unbounded_persistence() {
        let config = HubConfig::default().unbounded_persistence();

        assert!(config.persistence_timeout.is_none());
    }

    #[test]
    fn test_negative_radius_clamped() {
        let config = HubConfig::default().replay_radius(-5);

        assert_eq!(config.replay_radius, 0);
    }
}
