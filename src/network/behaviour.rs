use crate::network::config::MdnsConfig;
use crate::network::gossipsub::GossipSubConfig;
use libp2p::PeerId;
use libp2p::gossipsub;
use libp2p::identity::Keypair;
use libp2p::kad;
use libp2p::kad::store::MemoryStore;
use libp2p::mdns;
use libp2p::swarm::NetworkBehaviour;
use libp2p::swarm::behaviour::toggle::Toggle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Kademlia protocol identifier for the naming overlay
const KAD_PROTOCOL: &str = "/signpost/kad/1.0.0";

/// How long mDNS advertisements from this node stay valid
const MDNS_TTL: Duration = Duration::from_secs(6 * 60);

/// Protocol stack of a node: the DHT carries provider records for content
/// and rendezvous identifiers, mDNS surfaces peers on the local network, and
/// gossip floods name records between subscribers. mDNS and gossip can be
/// switched off; the DHT is always on.
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "NodeBehaviourEvent")]
pub struct NodeBehaviour {
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub gossipsub: Toggle<gossipsub::Behaviour>,
}

#[derive(Debug)]
pub enum NodeBehaviourEvent {
    Kademlia(kad::Event),
    Mdns(mdns::Event),
    Gossipsub(gossipsub::Event),
}

impl From<kad::Event> for NodeBehaviourEvent {
    fn from(event: kad::Event) -> Self {
        NodeBehaviourEvent::Kademlia(event)
    }
}

impl From<mdns::Event> for NodeBehaviourEvent {
    fn from(event: mdns::Event) -> Self {
        NodeBehaviourEvent::Mdns(event)
    }
}

impl From<gossipsub::Event> for NodeBehaviourEvent {
    fn from(event: gossipsub::Event) -> Self {
        NodeBehaviourEvent::Gossipsub(event)
    }
}

impl NodeBehaviour {
    pub fn new(
        local_peer_id: PeerId,
        keypair: &Keypair,
        mdns_config: Option<&MdnsConfig>,
        gossipsub_config: Option<&GossipSubConfig>,
    ) -> Self {
        Self {
            kademlia: dht_behaviour(local_peer_id),
            mdns: local_discovery_behaviour(local_peer_id, mdns_config),
            gossipsub: gossip_behaviour(keypair, gossipsub_config),
        }
    }

    /// Record a dialable address for a peer in the DHT routing table.
    pub fn add_peer_address(&mut self, peer_id: PeerId, addr: libp2p::Multiaddr) {
        self.kademlia.add_address(&peer_id, addr);
    }

    /// Announce this node as a provider for a routing key.
    pub fn start_providing(
        &mut self,
        key: kad::RecordKey,
    ) -> Result<kad::QueryId, kad::store::Error> {
        self.kademlia.start_providing(key)
    }

    /// Start a DHT lookup for the providers of a routing key.
    pub fn get_providers(&mut self, key: kad::RecordKey) -> kad::QueryId {
        self.kademlia.get_providers(key)
    }

    /// Register interest in a gossip topic.
    ///
    /// `Ok(false)` means gossip is switched off for this node; with it off
    /// there is nothing to subscribe on, which callers treat as fatal during
    /// startup.
    pub fn subscribe(
        &mut self,
        topic: &gossipsub::IdentTopic,
    ) -> Result<bool, gossipsub::SubscriptionError> {
        match self.gossipsub.as_mut() {
            Some(gossip) => {
                gossip.subscribe(topic)?;
                info!(%topic, "Topic subscription registered");
                Ok(true)
            }
            None => {
                warn!(%topic, "Subscription requested while gossip is disabled");
                Ok(false)
            }
        }
    }

    /// Drop interest in a gossip topic. Returns whether a subscription
    /// actually existed.
    pub fn unsubscribe(&mut self, topic: &gossipsub::IdentTopic) -> bool {
        let Some(gossip) = self.gossipsub.as_mut() else {
            return false;
        };

        let existed = gossip
            .unsubscribe(topic)
            .expect("gossipsub unsubscribe never fails");
        if existed {
            info!(%topic, "Topic subscription dropped");
        }
        existed
    }

    /// Flood raw bytes to a topic's subscribers.
    pub fn publish(
        &mut self,
        topic: gossipsub::IdentTopic,
        data: Vec<u8>,
    ) -> Result<gossipsub::MessageId, gossipsub::PublishError> {
        match self.gossipsub.as_mut() {
            Some(gossip) => gossip.publish(topic, data),
            None => Err(gossipsub::PublishError::InsufficientPeers),
        }
    }

    /// Number of mesh peers currently exchanging messages on a topic.
    pub fn mesh_peer_count(&self, topic: &gossipsub::TopicHash) -> usize {
        self.gossipsub
            .as_ref()
            .map(|gossip| gossip.mesh_peers(topic).count())
            .unwrap_or(0)
    }

    pub fn is_gossipsub_enabled(&self) -> bool {
        self.gossipsub.is_enabled()
    }
}

/// The DHT with an in-memory provider/record store. Discovered records do
/// not survive a restart.
fn dht_behaviour(local_peer_id: PeerId) -> kad::Behaviour<MemoryStore> {
    let config = kad::Config::new(libp2p::StreamProtocol::new(KAD_PROTOCOL));
    kad::Behaviour::with_config(local_peer_id, MemoryStore::new(local_peer_id), config)
}

/// Local-network discovery, if enabled. An mDNS socket failure downgrades
/// the node to DHT-only discovery instead of failing startup.
fn local_discovery_behaviour(
    local_peer_id: PeerId,
    config: Option<&MdnsConfig>,
) -> Toggle<mdns::tokio::Behaviour> {
    let Some(config) = config.filter(|c| c.enabled) else {
        debug!("Local network discovery disabled");
        return Toggle::from(None);
    };

    let mdns_config = mdns::Config {
        ttl: MDNS_TTL,
        query_interval: Duration::from_secs(config.query_interval_secs),
        enable_ipv6: false,
    };

    match mdns::tokio::Behaviour::new(mdns_config, local_peer_id) {
        Ok(behaviour) => {
            info!(
                query_interval_secs = config.query_interval_secs,
                "Local network discovery enabled"
            );
            Toggle::from(Some(behaviour))
        }
        Err(e) => {
            warn!(error = %e, "mDNS unavailable, continuing with DHT discovery only");
            Toggle::from(None)
        }
    }
}

/// The gossip overlay, if enabled.
fn gossip_behaviour(
    keypair: &Keypair,
    config: Option<&GossipSubConfig>,
) -> Toggle<gossipsub::Behaviour> {
    let Some(config) = config.filter(|c| c.enabled) else {
        debug!("Gossip disabled");
        return Toggle::from(None);
    };

    match config.build_behaviour(keypair) {
        Ok(behaviour) => {
            info!(
                mesh_n = config.mesh_n,
                validate_signatures = config.validate_signatures,
                "Gossip overlay enabled"
            );
            Toggle::from(Some(behaviour))
        }
        Err(e) => {
            warn!(error = ?e, "Gossip configuration rejected, continuing without gossip");
            Toggle::from(None)
        }
    }
}
