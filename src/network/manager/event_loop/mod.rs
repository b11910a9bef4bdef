//! Network event loop - processes swarm events and commands

mod command_handler;
mod gossipsub_handler;
mod kademlia_handler;
mod mdns_handler;
mod provider_handler;
mod swarm_events;

use crate::network::behaviour::NodeBehaviour;
use crate::network::gossipsub::TopicSubscriptionManager;
use crate::network::manager::commands::NetworkCommand;
use crate::network::manager::types::{PendingAnnouncement, PendingDial, PendingProviderQuery};
use futures::StreamExt;
use libp2p::kad::QueryId;
use libp2p::{PeerId, Swarm};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How long a pending DHT query may stay unanswered before being failed
const STALE_QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Internal event loop handling Swarm events
pub(crate) struct NetworkEventLoop {
    /// The libp2p Swarm managing connections and protocol behaviours
    pub swarm: Swarm<NodeBehaviour>,

    /// Channel receiver for commands from the NetworkManager API
    pub command_rx: mpsc::UnboundedReceiver<NetworkCommand>,

    /// Subscription manager delivering inbound gossip messages to consumers
    pub subscription_manager: Arc<TopicSubscriptionManager>,

    /// Shared cancellation scope; cancelling it stops the loop
    pub cancel: CancellationToken,

    /// Peers we are currently dialing, to prevent duplicate attempts
    pub dialing_peers: HashSet<PeerId>,

    /// When we last attempted to dial each peer (for rate limiting)
    pub last_dial_attempt: HashMap<PeerId, Instant>,

    /// Dials awaiting connection establishment, completed from swarm events
    pub pending_dials: HashMap<PeerId, Vec<PendingDial>>,

    /// Pending provider discovery queries
    pub pending_provider_queries: HashMap<QueryId, PendingProviderQuery>,

    /// Pending provider announcements awaiting DHT confirmation
    pub pending_announcements: HashMap<QueryId, PendingAnnouncement>,

    /// Timeout applied to connection attempts
    pub connect_timeout: Duration,

    /// Minimum interval between dial attempts to the same peer
    pub dial_retry_interval: Duration,
}

impl NetworkEventLoop {
    /// Main event loop processing Swarm events and commands
    pub async fn run(&mut self) {
        info!("Network event loop started");

        let mut cleanup_timer = tokio::time::interval(Duration::from_secs(5));
        cleanup_timer.tick().await; // Skip immediate first tick

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Network event loop cancelled");
                    break;
                }

                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_operations();
                }

                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }

                Some(command) = self.command_rx.recv() => {
                    if self.handle_command(command).await {
                        break;
                    }
                }
            }
        }

        self.fail_all_pending("network event loop stopped");

        info!("Network event loop stopped");
    }

    /// Determine if we should dial a discovered peer
    fn should_dial_peer(&self, peer_id: &PeerId) -> bool {
        should_attempt_dial(
            peer_id == self.swarm.local_peer_id(),
            self.swarm.is_connected(peer_id),
            self.dialing_peers.contains(peer_id),
            self.last_dial_attempt.get(peer_id).map(|t| t.elapsed()),
            self.dial_retry_interval,
        )
    }

    /// Fail dials and queries that have outlived their timeout
    fn cleanup_stale_operations(&mut self) {
        let now = Instant::now();

        // Stale dials
        let mut stale_peers = Vec::new();
        for (peer_id, dials) in &mut self.pending_dials {
            let (stale, fresh): (Vec<_>, Vec<_>) = dials
                .drain(..)
                .partition(|d| now.duration_since(d.created_at) > self.connect_timeout);

            *dials = fresh;

            for dial in stale {
                debug!(peer_id = %peer_id, "Failing stale dial attempt");
                let _ = dial
                    .response_tx
                    .send(Err("connection attempt timed out".to_string()));
            }

            if dials.is_empty() {
                stale_peers.push(*peer_id);
            }
        }
        for peer_id in stale_peers {
            self.pending_dials.remove(&peer_id);
            self.dialing_peers.remove(&peer_id);
        }

        // Stale provider queries
        self.cleanup_stale_queries(now, STALE_QUERY_TIMEOUT);
    }

    /// Fail every in-flight operation; used on loop shutdown so blocked
    /// callers return promptly instead of hanging.
    fn fail_all_pending(&mut self, reason: &str) {
        for (_, dials) in self.pending_dials.drain() {
            for dial in dials {
                let _ = dial.response_tx.send(Err(reason.to_string()));
            }
        }
        for (_, pending) in self.pending_provider_queries.drain() {
            let _ = pending.response_tx.send(Err(reason.to_string()));
        }
        for (_, pending) in self.pending_announcements.drain() {
            let _ = pending.response_tx.send(Err(reason.to_string()));
        }
    }
}

/// Gate for connection attempts to discovered peers
///
/// This prevents:
/// - Dialing ourselves
/// - Dialing already-connected peers
/// - Duplicate dial attempts
/// - Connection storms (rate limiting)
pub(crate) fn should_attempt_dial(
    is_self: bool,
    connected: bool,
    dialing: bool,
    since_last_attempt: Option<Duration>,
    retry_interval: Duration,
) -> bool {
    if is_self || connected || dialing {
        return false;
    }

    match since_last_attempt {
        Some(elapsed) if elapsed < retry_interval => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETRY: Duration = Duration::from_secs(30);

    #[test]
    fn test_discovered_peer_already_connected_is_not_dialed() {
        assert!(!should_attempt_dial(false, true, false, None, RETRY));
    }

    #[test]
    fn test_self_is_never_dialed() {
        assert!(!should_attempt_dial(true, false, false, None, RETRY));
    }

    #[test]
    fn test_in_flight_dial_is_not_repeated() {
        assert!(!should_attempt_dial(false, false, true, None, RETRY));
    }

    #[test]
    fn test_recent_attempt_is_rate_limited() {
        assert!(!should_attempt_dial(
            false,
            false,
            false,
            Some(Duration::from_secs(5)),
            RETRY
        ));
    }

    #[test]
    fn test_unknown_peer_is_dialed() {
        assert!(should_attempt_dial(false, false, false, None, RETRY));
        assert!(should_attempt_dial(
            false,
            false,
            false,
            Some(Duration::from_secs(60)),
            RETRY
        ));
    }
}
