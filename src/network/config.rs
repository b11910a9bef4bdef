use super::gossipsub::GossipSubConfig;
use std::env;
use std::time::Duration;

/// Configuration for the networking layer
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Enable QUIC transport (recommended for production)
    pub enable_quic: bool,

    /// Port to listen on (0 = OS assigns random port)
    pub listen_port: u16,

    /// Bootstrap peer addresses, unparsed.
    /// Format: "/ip4/1.2.3.4/tcp/4001/p2p/12D3K..."
    pub bootstrap_addresses: Vec<String>,

    /// Per-peer timeout for bootstrap connection attempts
    pub bootstrap_timeout: Duration,

    /// Timeout for connection attempts to discovered peers
    pub connect_timeout: Duration,

    /// Minimum interval between dial attempts to the same peer
    pub dial_retry_interval: Duration,

    /// mDNS local discovery configuration
    pub mdns: MdnsConfig,

    /// GossipSub configuration
    pub gossipsub: GossipSubConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enable_quic: true,
            listen_port: 0, // Random port
            bootstrap_addresses: Vec::new(),
            bootstrap_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            dial_retry_interval: Duration::from_secs(30),
            mdns: MdnsConfig::default(),
            gossipsub: GossipSubConfig::default(),
        }
    }
}

impl NetworkConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - NETWORK_PORT: Listen port (default: 0)
    /// - NETWORK_BOOTSTRAP: Comma-separated bootstrap peer addresses
    /// - NETWORK_ENABLE_QUIC: "true" or "false" (default: true)
    /// - NETWORK_CONNECT_TIMEOUT_SECS: Dial timeout for discovered peers
    pub fn from_env() -> Self {
        let listen_port = env::var("NETWORK_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        let bootstrap_addresses = env::var("NETWORK_BOOTSTRAP")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|addr| addr.trim().to_string())
                    .filter(|addr| !addr.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let enable_quic = env::var("NETWORK_ENABLE_QUIC")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let connect_timeout = env::var("NETWORK_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Self {
            enable_quic,
            listen_port,
            bootstrap_addresses,
            connect_timeout,
            mdns: MdnsConfig::from_env(),
            gossipsub: GossipSubConfig::from_env(),
            ..Default::default()
        }
    }
}

/// mDNS local network discovery configuration
#[derive(Debug, Clone)]
pub struct MdnsConfig {
    /// Enable mDNS discovery
    pub enabled: bool,

    /// Interval between mDNS queries in seconds
    pub query_interval_secs: u64,
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            query_interval_secs: 5,
        }
    }
}

impl MdnsConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let enabled = env::var("MDNS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let query_interval_secs = env::var("MDNS_QUERY_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Self {
            enabled,
            query_interval_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert!(config.enable_quic);
        assert_eq!(config.listen_port, 0);
        assert!(config.bootstrap_addresses.is_empty());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        unsafe {
            env::remove_var("NETWORK_PORT");
            env::remove_var("NETWORK_BOOTSTRAP");
            env::remove_var("NETWORK_CONNECT_TIMEOUT_SECS");
        }

        let config = NetworkConfig::from_env();
        assert_eq!(config.listen_port, 0);
        assert!(config.bootstrap_addresses.is_empty());
    }

    #[test]
    #[serial]
    fn test_from_env_bootstrap_list() {
        unsafe {
            env::set_var(
                "NETWORK_BOOTSTRAP",
                "/ip4/10.0.0.1/tcp/4001/p2p/12D3KooWA, /ip4/10.0.0.2/tcp/4001/p2p/12D3KooWB",
            );
        }

        let config = NetworkConfig::from_env();
        assert_eq!(config.bootstrap_addresses.len(), 2);
        assert!(config.bootstrap_addresses[1].starts_with("/ip4/10.0.0.2"));

        unsafe { env::remove_var("NETWORK_BOOTSTRAP") };
    }

    #[test]
    fn test_mdns_default() {
        let config = MdnsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.query_interval_secs, 5);
    }
}
