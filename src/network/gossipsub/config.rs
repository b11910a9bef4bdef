use libp2p::gossipsub::{self, MessageAuthenticity, ValidationMode};
use libp2p::identity::Keypair;
use std::env;
use std::time::Duration;
use tracing::{error, info};

/// Tuning knobs for the gossip overlay.
///
/// The mesh sizes bound how many peers this node exchanges full messages
/// with per topic; everything outside the mesh only receives lazy gossip.
#[derive(Debug, Clone)]
pub struct GossipSubConfig {
    pub enabled: bool,

    /// Mesh maintenance heartbeat
    pub heartbeat_interval: Duration,

    /// Target mesh size per topic
    pub mesh_n: usize,

    /// Below this the mesh grafts new peers
    pub mesh_n_low: usize,

    /// Above this the mesh prunes peers
    pub mesh_n_high: usize,

    /// Peers outside the mesh receiving message ids per heartbeat
    pub gossip_lazy: usize,

    /// How long seen message ids are remembered for deduplication
    pub duplicate_cache_time: Duration,

    /// Upper bound on a single gossip frame; name records are small, so the
    /// default leaves generous headroom
    pub max_transmit_size: usize,

    /// Sign outbound messages and require valid signatures on inbound ones
    pub validate_signatures: bool,

    pub validation_mode: ValidationMode,
}

impl Default for GossipSubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval: Duration::from_secs(1),
            mesh_n: 6,
            mesh_n_low: 4,
            mesh_n_high: 12,
            gossip_lazy: 6,
            duplicate_cache_time: Duration::from_secs(60),
            max_transmit_size: 65536,
            validate_signatures: true,
            validation_mode: ValidationMode::Strict,
        }
    }
}

impl GossipSubConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
            env::var(key).ok().and_then(|v| v.parse().ok())
        }

        fn flag(key: &str, default: bool) -> bool {
            env::var(key)
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(default)
        }

        let defaults = Self::default();

        let config = Self {
            enabled: flag("GOSSIPSUB_ENABLED", defaults.enabled),
            heartbeat_interval: parsed("GOSSIPSUB_HEARTBEAT_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.heartbeat_interval),
            mesh_n: parsed("GOSSIPSUB_MESH_N").unwrap_or(defaults.mesh_n),
            mesh_n_low: parsed("GOSSIPSUB_MESH_N_LOW").unwrap_or(defaults.mesh_n_low),
            mesh_n_high: parsed("GOSSIPSUB_MESH_N_HIGH").unwrap_or(defaults.mesh_n_high),
            max_transmit_size: parsed("GOSSIPSUB_MAX_MESSAGE_SIZE")
                .unwrap_or(defaults.max_transmit_size),
            validate_signatures: flag(
                "GOSSIPSUB_VALIDATE_SIGNATURES",
                defaults.validate_signatures,
            ),
            ..defaults
        };

        info!(
            enabled = config.enabled,
            heartbeat_interval_ms = config.heartbeat_interval.as_millis(),
            mesh_n = config.mesh_n,
            max_message_size = config.max_transmit_size,
            validate_signatures = config.validate_signatures,
            "Gossip configuration loaded"
        );

        config
    }

    /// Build a libp2p gossipsub behaviour from this config
    pub fn build_behaviour(
        &self,
        keypair: &Keypair,
    ) -> Result<gossipsub::Behaviour, gossipsub::ConfigBuilderError> {
        let authenticity = if self.validate_signatures {
            MessageAuthenticity::Signed(keypair.clone())
        } else {
            MessageAuthenticity::Anonymous
        };

        let config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(self.heartbeat_interval)
            .mesh_n(self.mesh_n)
            .mesh_n_low(self.mesh_n_low)
            .mesh_n_high(self.mesh_n_high)
            .gossip_lazy(self.gossip_lazy)
            .history_length(12)
            .history_gossip(3)
            .max_transmit_size(self.max_transmit_size)
            .duplicate_cache_time(self.duplicate_cache_time)
            .validation_mode(self.validation_mode.clone())
            .build()?;

        gossipsub::Behaviour::new(authenticity, config).map_err(|e| {
            error!(error = %e, "Gossip behaviour rejected configuration");
            gossipsub::ConfigBuilderError::MeshParametersInvalid
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_mesh_bounds_are_ordered() {
        let config = GossipSubConfig::default();

        assert!(config.enabled);
        assert!(config.mesh_n_low <= config.mesh_n);
        assert!(config.mesh_n <= config.mesh_n_high);
        assert!(config.validate_signatures);
    }

    #[test]
    fn test_default_config_builds_behaviour() {
        let keypair = Keypair::generate_ed25519();
        let result = GossipSubConfig::default().build_behaviour(&keypair);

        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn test_mesh_n_override() {
        unsafe { env::set_var("GOSSIPSUB_MESH_N", "8") };

        let config = GossipSubConfig::from_env();
        assert_eq!(config.mesh_n, 8);

        unsafe { env::remove_var("GOSSIPSUB_MESH_N") };
    }
}
