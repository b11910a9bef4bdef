//! mDNS event handler - passive local-network discovery.
//!
//! Discovery is best-effort: a failed connection to one discovered peer is
//! logged and swallowed, and the peer becomes eligible again on a later
//! discovery event once the rate limit allows.

use super::NetworkEventLoop;
use libp2p::{mdns, Multiaddr, PeerId};
use std::time::Instant;
use tracing::{debug, info, warn};

impl NetworkEventLoop {
    pub(crate) async fn handle_mdns_event(&mut self, event: mdns::Event) {
        match event {
            mdns::Event::Discovered(peers) => {
                for (peer_id, address) in peers {
                    self.discover_peer(peer_id, address);
                }
            }

            mdns::Event::Expired(peers) => {
                for (peer_id, address) in peers {
                    // The peer may still be reachable; existing connections
                    // are left to the idle timeout
                    debug!(%peer_id, %address, "Local peer stopped advertising");
                }
            }
        }
    }

    /// Feed a discovered peer into the overlay: remember its address and,
    /// unless it is already connected, being dialed, or rate-limited,
    /// attempt a connection.
    fn discover_peer(&mut self, peer_id: PeerId, address: Multiaddr) {
        info!(source = "mdns", %peer_id, %address, "Peer discovered");

        self.swarm
            .behaviour_mut()
            .add_peer_address(peer_id, address.clone());

        if !self.should_dial_peer(&peer_id) {
            debug!(%peer_id, "Skipping discovered peer (connected, dialing, or rate limited)");
            return;
        }

        self.last_dial_attempt.insert(peer_id, Instant::now());

        match self.swarm.dial(address) {
            Ok(()) => {
                debug!(%peer_id, "Connecting to discovered peer");
                self.dialing_peers.insert(peer_id);
            }
            Err(e) => {
                warn!(%peer_id, error = %e, "Connection attempt to discovered peer failed");
            }
        }
    }
}
