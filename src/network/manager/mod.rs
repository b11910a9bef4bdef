//! Network manager - high-level P2P networking interface
//!
//! Provides thread-safe access to overlay membership, gossip topics, and
//! the DHT provider facility. Commands are executed by a background event
//! loop owning the libp2p Swarm.

mod commands;
mod event_loop;
mod types;

pub use types::{parse_peer_address, PeerAddress};

use crate::content::ContentId;
use crate::network::behaviour::NodeBehaviour;
use crate::network::config::NetworkConfig;
use crate::network::error::NetworkError;
use crate::network::gossipsub::{AcceptancePolicy, SubscriptionHandle, TopicSubscriptionManager};
use commands::NetworkCommand;
use event_loop::NetworkEventLoop;
use futures::future::join_all;
use libp2p::identity::Keypair;
use libp2p::{noise, tcp, yamux, Multiaddr, PeerId, Swarm};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed timeout for connection attempts to discovered peers
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single provider announcement, DHT confirmation included
pub const PROVIDE_TIMEOUT: Duration = Duration::from_secs(120);

/// High-level network manager providing thread-safe access to P2P networking
pub struct NetworkManager {
    /// Our local peer ID
    local_peer_id: PeerId,

    /// Node keypair (needed to build the swarm and sign gossip messages)
    keypair: Keypair,

    /// Channel for sending commands to the event loop
    command_tx: mpsc::UnboundedSender<NetworkCommand>,

    /// Command receiver - taken once during start() and moved to the event loop
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<NetworkCommand>>>,

    /// Handle to the background event loop task
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,

    /// Subscription manager (shared with the event loop)
    subscription_manager: Arc<TopicSubscriptionManager>,

    /// Shared cancellation scope for all background work
    cancel: CancellationToken,
}

impl NetworkManager {
    /// Create a new NetworkManager from a node keypair
    ///
    /// This initializes the manager but does NOT start the swarm.
    /// Call `start()` to begin networking operations.
    pub fn new(keypair: Keypair, cancel: CancellationToken) -> Self {
        let local_peer_id = keypair.public().to_peer_id();
        info!(peer_id = %local_peer_id, "Network PeerId initialized");

        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            local_peer_id,
            keypair,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            event_loop_handle: Mutex::new(None),
            subscription_manager: Arc::new(TopicSubscriptionManager::default()),
            cancel,
        }
    }

    /// Get the local PeerId
    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    /// Build the libp2p Swarm with transport and behaviour
    fn build_swarm(&self, config: &NetworkConfig) -> Result<Swarm<NodeBehaviour>, NetworkError> {
        info!("Building libp2p Swarm");

        let behaviour = NodeBehaviour::new(
            self.local_peer_id,
            &self.keypair,
            if config.mdns.enabled {
                Some(&config.mdns)
            } else {
                None
            },
            Some(&config.gossipsub),
        );

        let swarm = libp2p::SwarmBuilder::with_existing_identity(self.keypair.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| NetworkError::Transport(format!("failed to build TCP transport: {}", e)))?
            .with_quic()
            .with_behaviour(|_| behaviour)
            .map_err(|e| NetworkError::Transport(format!("failed to build behaviour: {}", e)))?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        info!("Swarm built successfully (mDNS: {})", config.mdns.enabled);

        Ok(swarm)
    }

    fn resolve_listen_address(config: &NetworkConfig) -> Result<Multiaddr, NetworkError> {
        let listen_addr = if config.enable_quic {
            format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port)
        } else {
            format!("/ip4/0.0.0.0/tcp/{}", config.listen_port)
        };

        listen_addr.parse().map_err(|e| NetworkError::Parse {
            address: listen_addr,
            reason: format!("{}", e),
        })
    }

    /// Start the network manager
    ///
    /// Spawns the event loop task and begins listening on the configured
    /// port. The event loop runs until `stop()` is called or the shared
    /// cancellation scope fires.
    pub async fn start(&self, config: &NetworkConfig) -> Result<(), NetworkError> {
        let mut handle_guard = self.event_loop_handle.lock().await;
        if handle_guard.is_some() {
            return Err(NetworkError::AlreadyStarted);
        }

        info!("Starting network event loop");

        let mut swarm = self.build_swarm(config)?;
        let listen_addr = Self::resolve_listen_address(config)?;

        swarm
            .listen_on(listen_addr.clone())
            .map_err(|e| NetworkError::Transport(format!("failed to listen: {:?}", e)))?;

        info!("Listening on: {}", listen_addr);

        let command_rx = self
            .command_rx
            .lock()
            .await
            .take()
            .ok_or(NetworkError::AlreadyStarted)?;

        let mut event_loop = NetworkEventLoop {
            swarm,
            command_rx,
            subscription_manager: Arc::clone(&self.subscription_manager),
            cancel: self.cancel.clone(),
            dialing_peers: HashSet::new(),
            last_dial_attempt: HashMap::new(),
            pending_dials: HashMap::new(),
            pending_provider_queries: HashMap::new(),
            pending_announcements: HashMap::new(),
            connect_timeout: config.connect_timeout,
            dial_retry_interval: config.dial_retry_interval,
        };

        *handle_guard = Some(tokio::spawn(async move {
            event_loop.run().await;
        }));

        Ok(())
    }

    /// Stop the network manager
    ///
    /// Sends shutdown command and waits for event loop to terminate
    pub async fn stop(&self) -> Result<(), NetworkError> {
        info!("Stopping network manager");

        let mut handle_guard = self.event_loop_handle.lock().await;

        // If never started, just return success
        if handle_guard.is_none() {
            info!("Network manager was never started, nothing to stop");
            return Ok(());
        }

        if self.command_tx.send(NetworkCommand::Shutdown).is_err() {
            // Channel closed - event loop already stopped
            warn!("Event loop already stopped");
            *handle_guard = None;
            return Ok(());
        }

        if let Some(handle) = handle_guard.take() {
            handle
                .await
                .map_err(|e| NetworkError::Transport(format!("event loop panic: {}", e)))?;
        }

        info!("Network manager stopped");
        Ok(())
    }

    /// Helper to ensure network is started before operations
    async fn ensure_started(&self) -> Result<(), NetworkError> {
        let handle_guard = self.event_loop_handle.lock().await;
        if handle_guard.is_none() {
            return Err(NetworkError::NotStarted);
        }
        Ok(())
    }

    /// Helper to send a command and await its response.
    async fn send_command<T, F>(&self, make_command: F) -> Result<T, NetworkError>
    where
        F: FnOnce(oneshot::Sender<T>) -> NetworkCommand,
    {
        self.ensure_started().await?;
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make_command(tx))
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)
    }

    /// Connect to the network through a set of known peer addresses.
    ///
    /// Addresses are parsed up front; the first unparsable address fails the
    /// whole call before any connection attempt. Peers are then dialed
    /// sequentially, each under `timeout`, and the first unreachable peer
    /// fails the call. Already-connected peers are skipped.
    pub async fn bootstrap(
        &self,
        addresses: &[String],
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        let targets = addresses
            .iter()
            .map(|a| parse_peer_address(a))
            .collect::<Result<Vec<_>, _>>()?;

        self.ensure_started().await?;

        for addr in self.listen_addresses().await? {
            info!("listening: {}/p2p/{}", addr, self.local_peer_id);
        }

        for target in targets {
            if self.is_connected(target.peer_id).await? {
                debug!(peer_id = %target.peer_id, "Bootstrap peer already connected");
                continue;
            }

            self.dial(target.peer_id, vec![target.address.clone()], timeout)
                .await?;

            info!("connected: /p2p/{}", target.peer_id);
        }

        Ok(())
    }

    /// Dial a peer and wait for the connection to be established.
    pub async fn dial(
        &self,
        peer_id: PeerId,
        addresses: Vec<Multiaddr>,
        timeout: Duration,
    ) -> Result<(), NetworkError> {
        self.ensure_started().await?;

        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::DialPeer {
                peer_id,
                addresses,
                response: tx,
            })
            .map_err(|_| NetworkError::ChannelClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(NetworkError::Timeout(timeout)),
            Ok(Err(_)) => Err(NetworkError::ChannelClosed),
            Ok(Ok(Err(reason))) => Err(NetworkError::Dial { peer_id, reason }),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    /// Check whether a peer is currently connected
    pub async fn is_connected(&self, peer_id: PeerId) -> Result<bool, NetworkError> {
        self.send_command(|tx| NetworkCommand::GetConnectedness {
            peer_id,
            response: tx,
        })
        .await
    }

    /// Get the number of connected peers
    pub async fn peer_count(&self) -> Result<usize, NetworkError> {
        self.send_command(NetworkCommand::GetPeerCount).await
    }

    /// Get the addresses this node is listening on
    pub async fn listen_addresses(&self) -> Result<Vec<Multiaddr>, NetworkError> {
        self.send_command(NetworkCommand::GetListenAddresses).await
    }

    /// Get the number of gossip mesh peers for a topic
    pub async fn mesh_peer_count(&self, topic: impl Into<String>) -> Result<usize, NetworkError> {
        let topic = topic.into();
        self.send_command(|tx| NetworkCommand::GetMeshPeerCount {
            topic,
            response: tx,
        })
        .await
    }

    /// Subscribe to a topic with a message acceptance policy.
    ///
    /// The policy is installed as a pre-delivery filter: messages failing it
    /// are dropped before reaching any consumer. Use
    /// [`crate::network::gossipsub::accept_all`] to defer all validation to
    /// the consumer.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        policy: AcceptancePolicy,
    ) -> Result<SubscriptionHandle, NetworkError> {
        let topic = topic.into();

        // First, subscribe at the GossipSub protocol level
        self.send_command(|tx| NetworkCommand::Subscribe {
            topic: topic.clone(),
            response: tx,
        })
        .await?
        .map_err(NetworkError::Gossipsub)?;

        // Then, create a subscription handle for receiving messages
        let handle = self.subscription_manager.subscribe(&topic, policy).await;

        info!(topic = %topic, "Subscribed to topic with message channel");

        Ok(handle)
    }

    /// Unsubscribe from a topic
    pub async fn unsubscribe(&self, topic: impl Into<String>) -> Result<(), NetworkError> {
        let topic = topic.into();

        self.send_command(|tx| NetworkCommand::Unsubscribe {
            topic: topic.clone(),
            response: tx,
        })
        .await?
        .map_err(NetworkError::Gossipsub)?;

        self.subscription_manager.unsubscribe(&topic).await;

        Ok(())
    }

    /// Publish raw bytes to a topic, returning the gossip message id
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<String, NetworkError> {
        let topic = topic.into();
        self.send_command(|tx| NetworkCommand::Publish {
            topic,
            data,
            response: tx,
        })
        .await?
        .map_err(NetworkError::Gossipsub)
    }

    /// Announce this node as a provider for the given content identifier.
    ///
    /// Waits until the DHT confirms the provider record, bounded by
    /// `timeout`.
    pub async fn provide(&self, cid: &ContentId, timeout: Duration) -> Result<(), NetworkError> {
        self.ensure_started().await?;

        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::Provide {
                cid: cid.clone(),
                response: tx,
            })
            .map_err(|_| NetworkError::ChannelClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(NetworkError::Timeout(timeout)),
            Ok(Err(_)) => Err(NetworkError::ChannelClosed),
            Ok(Ok(Err(reason))) => Err(NetworkError::Routing(reason)),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }

    /// Query the DHT for peers providing the given content identifier,
    /// bounded by `max` results and `timeout`.
    pub async fn find_providers(
        &self,
        cid: &ContentId,
        max: usize,
        timeout: Duration,
    ) -> Result<HashSet<PeerId>, NetworkError> {
        self.ensure_started().await?;

        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(NetworkCommand::GetProviders {
                cid: cid.clone(),
                max,
                response: tx,
            })
            .map_err(|_| NetworkError::ChannelClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => Err(NetworkError::Timeout(timeout)),
            Ok(Err(_)) => Err(NetworkError::ChannelClosed),
            Ok(Ok(Err(reason))) => Err(NetworkError::Routing(reason)),
            Ok(Ok(Ok(providers))) => Ok(providers),
        }
    }

    /// Locate peers participating in a gossip topic through the routing
    /// layer's rendezvous mechanism, and connect to each of them.
    ///
    /// Issues a provider lookup for the topic's rendezvous identifier,
    /// bounded by `max` results and `search_timeout`, then attempts a
    /// connection to every discovered provider under the fixed
    /// [`CONNECT_TIMEOUT`]. All connection attempts are awaited before
    /// returning; individual failures are logged and do not fail the call.
    ///
    /// Returns the number of providers successfully connected.
    pub async fn locate_topic_peers(
        &self,
        topic: &str,
        max: usize,
        search_timeout: Duration,
    ) -> Result<usize, NetworkError> {
        let rendezvous = crate::network::gossipsub::rendezvous_content_id(topic);

        debug!(topic = %topic, cid = %rendezvous, "Searching for topic providers");

        let providers = match self.find_providers(&rendezvous, max, search_timeout).await {
            Ok(providers) => providers,
            Err(NetworkError::Timeout(_)) => {
                debug!(topic = %topic, "Provider search timed out");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        if providers.is_empty() {
            debug!(topic = %topic, "No topic providers found");
            return Ok(0);
        }

        let attempts = providers
            .into_iter()
            .filter(|peer_id| peer_id != &self.local_peer_id)
            .map(|peer_id| async move {
                match self.dial(peer_id, Vec::new(), CONNECT_TIMEOUT).await {
                    Ok(()) => {
                        info!(peer_id = %peer_id, topic = %topic, "Connected to topic provider");
                        true
                    }
                    Err(e) => {
                        debug!(peer_id = %peer_id, error = %e, "Topic provider unreachable");
                        false
                    }
                }
            });

        let connected = join_all(attempts)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();

        info!(topic = %topic, connected, "Topic peer search complete");

        Ok(connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NetworkManager {
        NetworkManager::new(Keypair::generate_ed25519(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_bootstrap_parse_error_before_any_dial() {
        let manager = manager();

        // An unparsable address must fail the whole call, before the
        // not-started check (which would be the first dial side effect)
        let result = manager
            .bootstrap(&["bad-address".to_string()], Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(NetworkError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_operations_require_start() {
        let manager = manager();

        assert!(matches!(
            manager.peer_count().await,
            Err(NetworkError::NotStarted)
        ));
        assert!(matches!(
            manager
                .provide(&ContentId::from_bytes(b"x"), Duration::from_secs(1))
                .await,
            Err(NetworkError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_ok() {
        let manager = manager();
        assert!(manager.stop().await.is_ok());
    }

    #[test]
    fn test_local_peer_id_matches_keypair() {
        let keypair = Keypair::generate_ed25519();
        let expected = keypair.public().to_peer_id();
        let manager = NetworkManager::new(keypair, CancellationToken::new());

        assert_eq!(manager.local_peer_id(), &expected);
    }

    fn test_config() -> NetworkConfig {
        let mut config = NetworkConfig::default();
        config.listen_port = 0;
        config.enable_quic = false;
        config.mdns.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_start_subscribe_and_stop() {
        let manager = manager();
        manager.start(&test_config()).await.unwrap();

        // Double start is rejected
        assert!(matches!(
            manager.start(&test_config()).await,
            Err(NetworkError::AlreadyStarted)
        ));

        let _subscription = manager
            .subscribe(
                "/signpost/v1/records",
                crate::network::gossipsub::accept_all(),
            )
            .await
            .unwrap();

        assert_eq!(manager.peer_count().await.unwrap(), 0);
        assert_eq!(
            manager.mesh_peer_count("/signpost/v1/records").await.unwrap(),
            0
        );

        let stranger = Keypair::generate_ed25519().public().to_peer_id();
        assert!(!manager.is_connected(stranger).await.unwrap());

        // The listener address appears once the event loop processes the bind
        let mut listen_addrs = Vec::new();
        for _ in 0..50 {
            listen_addrs = manager.listen_addresses().await.unwrap();
            if !listen_addrs.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!listen_addrs.is_empty());

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dial_unreachable_peer_fails() {
        let manager = manager();
        manager.start(&test_config()).await.unwrap();

        let stranger = Keypair::generate_ed25519().public().to_peer_id();
        let unreachable: Multiaddr = "/ip4/127.0.0.1/tcp/1".parse().unwrap();

        let result = manager
            .dial(stranger, vec![unreachable], Duration::from_secs(5))
            .await;

        assert!(matches!(
            result,
            Err(NetworkError::Dial { .. }) | Err(NetworkError::Timeout(_))
        ));

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_unreachable_peer_is_fatal() {
        let manager = manager();
        manager.start(&test_config()).await.unwrap();

        let stranger = Keypair::generate_ed25519().public().to_peer_id();
        let address = format!("/ip4/127.0.0.1/tcp/1/p2p/{}", stranger);

        let result = manager
            .bootstrap(&[address], Duration::from_secs(5))
            .await;

        assert!(result.is_err(), "unreachable bootstrap peer must be fatal");

        manager.stop().await.unwrap();
    }
}
