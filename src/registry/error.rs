//! Registry error types

use super::key::MediaKey;

/// Error type for registry and hub handle operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The hub's event loop has terminated
    #[error("hub closed: {0}")]
    HubClosed(MediaKey),
}
