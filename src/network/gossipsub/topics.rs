use crate::content::ContentId;
use libp2p::gossipsub::IdentTopic;
use std::fmt;

/// Well-known topic prefix for the Signpost network
pub const TOPIC_PREFIX: &str = "/signpost/v1";

/// Topic on which name records are propagated
pub const NAME_RECORDS_TOPIC: &str = "/signpost/v1/records";

/// Pre-defined Signpost topics
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Name record propagation
    NameRecords,

    /// Custom topic
    Custom(String),
}

impl Topic {
    /// Get the full topic string
    pub fn to_topic_string(&self) -> String {
        match self {
            Topic::NameRecords => NAME_RECORDS_TOPIC.to_string(),
            Topic::Custom(name) => format!("{}/custom/{}", TOPIC_PREFIX, name),
        }
    }

    /// Convert to libp2p IdentTopic
    pub fn to_ident_topic(&self) -> IdentTopic {
        IdentTopic::new(self.to_topic_string())
    }

    /// Parse a topic string back to Topic
    pub fn from_topic_string(s: &str) -> Option<Self> {
        if s == NAME_RECORDS_TOPIC {
            return Some(Topic::NameRecords);
        }

        if !s.starts_with(TOPIC_PREFIX) {
            return None;
        }

        let suffix = &s[TOPIC_PREFIX.len()..];
        suffix
            .strip_prefix("/custom/")
            .map(|name| Topic::Custom(name.to_string()))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_topic_string())
    }
}

/// Derive the rendezvous content identifier for a gossip topic.
///
/// Peers announce themselves as providers of this identifier in the DHT so
/// that others can find topic members through the routing layer, without a
/// separate registry. The synthetic `floodsub:` prefix keeps the derived
/// identifier compatible with records produced by other implementations.
pub fn rendezvous_content_id(topic: &str) -> ContentId {
    let mut data = Vec::with_capacity("floodsub:".len() + topic.len());
    data.extend_from_slice(b"floodsub:");
    data.extend_from_slice(topic.as_bytes());
    ContentId::from_bytes(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_strings() {
        assert_eq!(
            Topic::NameRecords.to_topic_string(),
            "/signpost/v1/records"
        );
        assert_eq!(
            Topic::Custom("test".to_string()).to_topic_string(),
            "/signpost/v1/custom/test"
        );
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!(
            Topic::from_topic_string("/signpost/v1/records"),
            Some(Topic::NameRecords)
        );
        assert_eq!(
            Topic::from_topic_string("/signpost/v1/custom/mychannel"),
            Some(Topic::Custom("mychannel".to_string()))
        );
        assert_eq!(Topic::from_topic_string("/invalid"), None);
    }

    #[test]
    fn test_rendezvous_id_deterministic() {
        let id1 = rendezvous_content_id("/signpost/v1/records");
        let id2 = rendezvous_content_id("/signpost/v1/records");

        assert_eq!(id1, id2);
    }

    #[test]
    fn test_rendezvous_id_differs_per_topic() {
        let id1 = rendezvous_content_id("topic-a");
        let id2 = rendezvous_content_id("topic-b");

        assert_ne!(id1, id2);
    }

    #[test]
    fn test_rendezvous_id_uses_floodsub_prefix() {
        // The derived identifier hashes "floodsub:" + topic, not the bare
        // topic name
        let derived = rendezvous_content_id("abc");
        let bare = ContentId::from_bytes(b"abc");
        let prefixed = ContentId::from_bytes(b"floodsub:abc");

        assert_ne!(derived, bare);
        assert_eq!(derived, prefixed);
    }
}
