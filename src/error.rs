//! Error types

use crate::persistence::StoreError;
use crate::protocol::ProtocolError;
use crate::registry::RegistryError;
use crate::server::ConfigError;
use crate::session::ConnectionError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use crate::registry::MediaKey;

    use super::*;

    #[test]
    fn test_wraps_module_errors() {
        let err: Error = RegistryError::HubClosed(MediaKey::new("abc").unwrap()).into();
        assert_eq!(err.to_string(), "registry error: hub closed: abc");

        let err: Error = ConfigError::Missing("DATABASE_URL").into();
        assert!(matches!(err, Error::Config(_)));

        let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
