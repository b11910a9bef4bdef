use crate::content::ContentId;
use crate::network::error::NetworkError;
use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::oneshot;

/// A bootstrap address resolved into its identity and dialable address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    pub peer_id: PeerId,
    pub address: Multiaddr,
}

/// Parse a textual multiaddress carrying a `/p2p/` component into a
/// peer identity and address pair.
///
/// Parse failures are local and terminal; they are never retried.
pub fn parse_peer_address(address: &str) -> Result<PeerAddress, NetworkError> {
    let addr: Multiaddr = address.parse().map_err(|e: libp2p::multiaddr::Error| {
        NetworkError::Parse {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })?;

    let peer_id = addr
        .iter()
        .find_map(|p| match p {
            Protocol::P2p(peer_id) => Some(peer_id),
            _ => None,
        })
        .ok_or_else(|| NetworkError::Parse {
            address: address.to_string(),
            reason: "missing /p2p/ component".to_string(),
        })?;

    Ok(PeerAddress {
        peer_id,
        address: addr,
    })
}

/// An in-flight dial awaiting connection establishment
pub(crate) struct PendingDial {
    pub response_tx: oneshot::Sender<Result<(), String>>,
    pub created_at: Instant,
}

/// An in-flight provider discovery query
pub(crate) struct PendingProviderQuery {
    pub cid: ContentId,
    pub response_tx: oneshot::Sender<Result<HashSet<PeerId>, String>>,
    pub providers: HashSet<PeerId>,
    pub max: usize,
    pub created_at: Instant,
}

/// An in-flight provider announcement awaiting DHT confirmation
pub(crate) struct PendingAnnouncement {
    pub cid: ContentId,
    pub response_tx: oneshot::Sender<Result<(), String>>,
    pub created_at: Instant,
}
