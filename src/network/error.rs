use libp2p::PeerId;
use std::time::Duration;
use thiserror::Error;

/// Errors from the networking layer.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A peer address could not be parsed. Never retried.
    #[error("invalid peer address {address:?}: {reason}")]
    Parse { address: String, reason: String },

    #[error("network manager not started - call start() first")]
    NotStarted,

    #[error("network manager already started")]
    AlreadyStarted,

    #[error("failed to connect to {peer_id}: {reason}")]
    Dial { peer_id: PeerId, reason: String },

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gossipsub error: {0}")]
    Gossipsub(String),

    #[error("routing error: {0}")]
    Routing(String),

    /// The event loop went away while a command was in flight.
    #[error("command channel closed")]
    ChannelClosed,

    #[error("operation cancelled")]
    Cancelled,
}
