//! Internal command types for NetworkManager to NetworkEventLoop communication

use crate::content::ContentId;
use libp2p::{Multiaddr, PeerId};
use std::collections::HashSet;
use tokio::sync::oneshot;

/// Commands sent to the network event loop
pub(crate) enum NetworkCommand {
    /// Gracefully shutdown the network
    Shutdown,

    /// Query the current number of connected peers
    GetPeerCount(oneshot::Sender<usize>),

    /// Get the addresses this node is listening on
    GetListenAddresses(oneshot::Sender<Vec<Multiaddr>>),

    /// Check whether a peer is currently connected
    GetConnectedness {
        peer_id: PeerId,
        response: oneshot::Sender<bool>,
    },

    /// Dial a peer; the response fires once the connection is established
    /// or the dial fails
    DialPeer {
        peer_id: PeerId,
        addresses: Vec<Multiaddr>,
        response: oneshot::Sender<Result<(), String>>,
    },

    /// Subscribe to a topic at the gossip layer
    Subscribe {
        topic: String,
        response: oneshot::Sender<Result<(), String>>,
    },

    /// Unsubscribe from a topic
    Unsubscribe {
        topic: String,
        response: oneshot::Sender<Result<(), String>>,
    },

    /// Publish raw bytes to a topic
    Publish {
        topic: String,
        data: Vec<u8>,
        response: oneshot::Sender<Result<String, String>>,
    },

    /// Get the number of mesh peers for a topic
    GetMeshPeerCount {
        topic: String,
        response: oneshot::Sender<usize>,
    },

    /// Announce this node as a provider; the response fires once the DHT
    /// confirms the provider record (or the query fails)
    Provide {
        cid: ContentId,
        response: oneshot::Sender<Result<(), String>>,
    },

    /// Query the DHT for providers of a content identifier
    GetProviders {
        cid: ContentId,
        max: usize,
        response: oneshot::Sender<Result<HashSet<PeerId>, String>>,
    },
}
