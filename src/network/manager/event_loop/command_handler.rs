//! Command handler - executes NetworkManager commands against the swarm

use super::NetworkEventLoop;
use crate::network::manager::commands::NetworkCommand;
use crate::network::manager::types::PendingDial;
use libp2p::gossipsub::IdentTopic;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::DialError;
use libp2p::{Multiaddr, PeerId};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

impl NetworkEventLoop {
    /// Handle a single command; returns true if the loop should shut down
    pub(crate) async fn handle_command(&mut self, command: NetworkCommand) -> bool {
        match command {
            NetworkCommand::Shutdown => {
                info!("Shutdown command received");
                return true;
            }

            NetworkCommand::GetPeerCount(response) => {
                let _ = response.send(self.swarm.connected_peers().count());
            }

            NetworkCommand::GetListenAddresses(response) => {
                let _ = response.send(self.swarm.listeners().cloned().collect());
            }

            NetworkCommand::GetConnectedness { peer_id, response } => {
                let _ = response.send(self.swarm.is_connected(&peer_id));
            }

            NetworkCommand::DialPeer {
                peer_id,
                addresses,
                response,
            } => {
                self.handle_dial(peer_id, addresses, response);
            }

            NetworkCommand::Subscribe { topic, response } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .subscribe(&IdentTopic::new(&topic));

                let _ = match result {
                    Ok(true) => response.send(Ok(())),
                    Ok(false) => response.send(Err("gossipsub is disabled".to_string())),
                    Err(e) => response.send(Err(format!("subscribe failed: {:?}", e))),
                };
            }

            NetworkCommand::Unsubscribe { topic, response } => {
                self.swarm
                    .behaviour_mut()
                    .unsubscribe(&IdentTopic::new(&topic));
                let _ = response.send(Ok(()));
            }

            NetworkCommand::Publish {
                topic,
                data,
                response,
            } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .publish(IdentTopic::new(&topic), data);

                let _ = match result {
                    Ok(message_id) => response.send(Ok(message_id.to_string())),
                    Err(e) => {
                        warn!(topic = %topic, error = ?e, "Publish failed");
                        response.send(Err(format!("publish failed: {:?}", e)))
                    }
                };
            }

            NetworkCommand::GetMeshPeerCount { topic, response } => {
                let hash = IdentTopic::new(&topic).hash();
                let _ = response.send(self.swarm.behaviour().mesh_peer_count(&hash));
            }

            NetworkCommand::Provide { cid, response } => {
                self.handle_provide(cid, response);
            }

            NetworkCommand::GetProviders {
                cid,
                max,
                response,
            } => {
                self.handle_get_providers(cid, max, response);
            }
        }

        false
    }

    /// Start a dial and register the caller for completion on connection
    /// establishment or failure.
    fn handle_dial(
        &mut self,
        peer_id: PeerId,
        addresses: Vec<Multiaddr>,
        response_tx: oneshot::Sender<Result<(), String>>,
    ) {
        if self.swarm.is_connected(&peer_id) {
            let _ = response_tx.send(Ok(()));
            return;
        }

        let opts = DialOpts::peer_id(peer_id)
            .addresses(addresses)
            .extend_addresses_through_behaviour()
            .build();

        self.last_dial_attempt.insert(peer_id, Instant::now());

        match self.swarm.dial(opts) {
            Ok(()) => {
                debug!(peer_id = %peer_id, "Dial initiated");
                self.dialing_peers.insert(peer_id);
                self.pending_dials
                    .entry(peer_id)
                    .or_default()
                    .push(PendingDial {
                        response_tx,
                        created_at: Instant::now(),
                    });
            }
            Err(DialError::DialPeerConditionFalse(_)) => {
                // A dial to this peer is already in flight; wait for its outcome
                debug!(peer_id = %peer_id, "Dial already in progress, awaiting outcome");
                self.pending_dials
                    .entry(peer_id)
                    .or_default()
                    .push(PendingDial {
                        response_tx,
                        created_at: Instant::now(),
                    });
            }
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "Dial failed to start");
                let _ = response_tx.send(Err(e.to_string()));
            }
        }
    }
}
