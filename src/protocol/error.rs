//! Protocol error types

/// Errors raised while decoding or encoding wire frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Inbound frame is not a valid comment message
    #[error("malformed inbound frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// Outbound batch could not be serialized
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[source] serde_json::Error),
}
