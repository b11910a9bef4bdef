//! Swarm event dispatch - connection lifecycle and per-protocol routing

use super::NetworkEventLoop;
use crate::network::behaviour::NodeBehaviourEvent;
use libp2p::swarm::SwarmEvent;
use libp2p::PeerId;
use tracing::{debug, info, warn};

impl NetworkEventLoop {
    pub(crate) async fn handle_swarm_event(&mut self, event: SwarmEvent<NodeBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(NodeBehaviourEvent::Kademlia(event)) => {
                self.handle_kad_event(event).await;
            }

            SwarmEvent::Behaviour(NodeBehaviourEvent::Mdns(event)) => {
                self.handle_mdns_event(event).await;
            }

            SwarmEvent::Behaviour(NodeBehaviourEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event).await;
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "Listener ready");
            }

            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                established_in,
                ..
            } => {
                info!(
                    %peer_id,
                    address = %endpoint.get_remote_address(),
                    elapsed = ?established_in,
                    "Connection established"
                );

                self.dialing_peers.remove(&peer_id);
                self.complete_pending_dials(&peer_id, Ok(()));
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(?peer_id, %error, "Outgoing connection failed");

                if let Some(peer) = peer_id {
                    self.dialing_peers.remove(&peer);
                    self.complete_pending_dials(&peer, Err(error.to_string()));
                }
            }

            SwarmEvent::ConnectionClosed { peer_id, cause, .. } => {
                debug!(%peer_id, ?cause, "Connection closed");
                self.dialing_peers.remove(&peer_id);
            }

            SwarmEvent::IncomingConnectionError {
                send_back_addr,
                error,
                ..
            } => {
                warn!(from = %send_back_addr, %error, "Inbound connection failed");
            }

            event => {
                debug!(?event, "Swarm event");
            }
        }
    }

    /// Release every caller waiting on a dial to this peer with the
    /// connection outcome.
    fn complete_pending_dials(&mut self, peer_id: &PeerId, outcome: Result<(), String>) {
        if let Some(dials) = self.pending_dials.remove(peer_id) {
            for dial in dials {
                let _ = dial.response_tx.send(outcome.clone());
            }
        }
    }
}
