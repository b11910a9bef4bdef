use crate::network::config::NetworkConfig;
use crate::network::gossipsub::NAME_RECORDS_TOPIC;
use crate::provider::ProviderConfig;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Networking layer configuration
    pub network: NetworkConfig,

    /// Gossip topic carrying name records
    pub records_topic: String,

    /// DNS responder configuration
    pub dns: DnsConfig,

    /// Provider worker pool configuration
    pub provider: ProviderConfig,

    /// Rendezvous announce/search configuration
    pub rendezvous: RendezvousConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            records_topic: NAME_RECORDS_TOPIC.to_string(),
            dns: DnsConfig::default(),
            provider: ProviderConfig::default(),
            rendezvous: RendezvousConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let records_topic =
            env::var("RECORDS_TOPIC").unwrap_or_else(|_| NAME_RECORDS_TOPIC.to_string());

        Self {
            network: NetworkConfig::from_env(),
            records_topic,
            dns: DnsConfig::from_env(),
            provider: ProviderConfig::from_env(),
            rendezvous: RendezvousConfig::from_env(),
        }
    }
}

/// DNS responder configuration
#[derive(Debug, Clone)]
pub struct DnsConfig {
    /// Enable the UDP DNS responder
    pub enabled: bool,

    /// Listen address for the responder
    pub listen: SocketAddr,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "0.0.0.0:4053".parse().expect("valid socket address"),
        }
    }
}

impl DnsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let enabled = env::var("DNS_RESPONDER_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let listen = env::var("DNS_RESPONDER_LISTEN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| DnsConfig::default().listen);

        Self { enabled, listen }
    }
}

/// Rendezvous configuration: how the node announces topic membership in the
/// DHT and searches for other topic members.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    /// Timeout for announcing the rendezvous identifier
    pub announce_timeout: Duration,

    /// Maximum providers to fetch per search
    pub search_max: usize,

    /// Timeout for a provider search
    pub search_timeout: Duration,

    /// Interval between maintenance cycles
    pub maintain_interval: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            announce_timeout: Duration::from_secs(120),
            search_max: 10,
            search_timeout: Duration::from_secs(30),
            maintain_interval: Duration::from_secs(300),
        }
    }
}

impl RendezvousConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let search_max = env::var("RENDEZVOUS_SEARCH_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.search_max);

        let search_timeout = env::var("RENDEZVOUS_SEARCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.search_timeout);

        let maintain_interval = env::var("RENDEZVOUS_MAINTAIN_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.maintain_interval);

        Self {
            announce_timeout: defaults.announce_timeout,
            search_max,
            search_timeout,
            maintain_interval,
        }
    }
}
