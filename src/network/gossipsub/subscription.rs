use libp2p::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for subscription manager
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Buffer size for each topic channel
    pub channel_buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
        }
    }
}

/// A raw message received from a gossip topic.
///
/// The payload is left undecoded: correctness validation belongs to the
/// consumer (the naming layer), not to the gossip layer.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    /// Topic this message arrived on
    pub topic: String,

    /// Publishing peer, if the message was signed
    pub source: Option<PeerId>,

    /// Monotonic per-publisher sequence number, if present
    pub sequence_number: Option<u64>,

    /// Raw message payload
    pub data: Vec<u8>,
}

/// Pre-delivery message filter installed at subscribe time.
///
/// Messages failing the policy are dropped before reaching any consumer.
/// This is spam containment only; record validation happens downstream.
pub type AcceptancePolicy = Arc<dyn Fn(&TopicMessage) -> bool + Send + Sync>;

/// The default policy: accept every message.
pub fn accept_all() -> AcceptancePolicy {
    Arc::new(|_| true)
}

/// Errors from receiving on a subscription
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("subscription cancelled")]
    Cancelled,

    #[error("subscription channel closed")]
    Closed,
}

/// Handle for receiving messages from a subscribed topic
pub struct SubscriptionHandle {
    pub topic: String,
    receiver: broadcast::Receiver<TopicMessage>,
}

impl SubscriptionHandle {
    /// Wait for the next message on this topic.
    ///
    /// Blocks until a message arrives or `cancel` fires. A lagged receiver
    /// (slow consumer) skips dropped messages and keeps waiting.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<TopicMessage, SubscriptionError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SubscriptionError::Cancelled),
                result = self.receiver.recv() => match result {
                    Ok(message) => return Ok(message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = %self.topic, skipped, "Subscription lagged, messages dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(SubscriptionError::Closed);
                    }
                },
            }
        }
    }

    /// Try to receive without blocking
    pub fn try_next(&mut self) -> Option<TopicMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "Subscription lagged, messages dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Per-topic subscription channel
struct TopicChannel {
    sender: broadcast::Sender<TopicMessage>,
    policy: AcceptancePolicy,
    subscriber_count: usize,
}

/// Manages per-topic subscription channels and their acceptance policies
pub struct TopicSubscriptionManager {
    /// Per-topic broadcast channels
    channels: Arc<RwLock<HashMap<String, TopicChannel>>>,

    /// Configuration
    config: SubscriptionConfig,
}

impl std::fmt::Debug for TopicSubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicSubscriptionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TopicSubscriptionManager {
    pub fn new(config: SubscriptionConfig) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Subscribe to a topic, returning a handle for receiving messages.
    ///
    /// The acceptance policy of the first subscriber is installed for the
    /// topic; later subscribers share the existing channel and policy.
    pub async fn subscribe(
        &self,
        topic: impl Into<String>,
        policy: AcceptancePolicy,
    ) -> SubscriptionHandle {
        let topic = topic.into();
        let mut channels = self.channels.write().await;

        let receiver = if let Some(channel) = channels.get_mut(&topic) {
            channel.subscriber_count += 1;
            debug!(
                topic = %topic,
                subscribers = channel.subscriber_count,
                "Added subscriber to existing topic channel"
            );
            channel.sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(self.config.channel_buffer_size);
            channels.insert(
                topic.clone(),
                TopicChannel {
                    sender,
                    policy,
                    subscriber_count: 1,
                },
            );
            info!(topic = %topic, "Created new topic channel");
            receiver
        };

        SubscriptionHandle { topic, receiver }
    }

    /// Unsubscribe from a topic
    pub async fn unsubscribe(&self, topic: &str) {
        let mut channels = self.channels.write().await;

        if let Some(channel) = channels.get_mut(topic) {
            channel.subscriber_count = channel.subscriber_count.saturating_sub(1);

            if channel.subscriber_count == 0 {
                channels.remove(topic);
                info!(topic = %topic, "Removed empty topic channel");
            } else {
                debug!(
                    topic = %topic,
                    subscribers = channel.subscriber_count,
                    "Decremented subscriber count"
                );
            }
        }
    }

    /// Route an inbound message to its topic channel, applying the topic's
    /// acceptance policy first.
    ///
    /// Returns true if the message was delivered to at least one subscriber.
    pub async fn route(&self, message: TopicMessage) -> bool {
        let channels = self.channels.read().await;

        let Some(channel) = channels.get(&message.topic) else {
            debug!(topic = %message.topic, "No subscribers for topic");
            return false;
        };

        if !(channel.policy)(&message) {
            debug!(
                topic = %message.topic,
                source = ?message.source,
                "Message rejected by acceptance policy"
            );
            return false;
        }

        match channel.sender.send(message.clone()) {
            Ok(count) => {
                debug!(
                    topic = %message.topic,
                    receivers = count,
                    "Message routed to subscribers"
                );
                true
            }
            Err(_) => {
                // No active receivers (all dropped)
                debug!(topic = %message.topic, "No active receivers for topic");
                false
            }
        }
    }

    /// Check if a topic has subscribers
    pub async fn has_subscribers(&self, topic: &str) -> bool {
        let channels = self.channels.read().await;
        channels.contains_key(topic)
    }

    /// Get subscriber count for a topic
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let channels = self.channels.read().await;
        channels.get(topic).map(|c| c.subscriber_count).unwrap_or(0)
    }

    /// Get all subscribed topics
    pub async fn subscribed_topics(&self) -> Vec<String> {
        let channels = self.channels.read().await;
        channels.keys().cloned().collect()
    }
}

impl Default for TopicSubscriptionManager {
    fn default() -> Self {
        Self::new(SubscriptionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_message(topic: &str, data: &[u8]) -> TopicMessage {
        TopicMessage {
            topic: topic.to_string(),
            source: None,
            sequence_number: Some(1),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_creates_channel() {
        let manager = TopicSubscriptionManager::default();

        let _handle = manager.subscribe("/signpost/v1/records", accept_all()).await;

        assert!(manager.has_subscribers("/signpost/v1/records").await);
        assert_eq!(manager.subscriber_count("/signpost/v1/records").await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let manager = TopicSubscriptionManager::default();
        let topic = "/signpost/v1/records";

        let _h1 = manager.subscribe(topic, accept_all()).await;
        let _h2 = manager.subscribe(topic, accept_all()).await;

        manager.unsubscribe(topic).await;
        assert_eq!(manager.subscriber_count(topic).await, 1);

        manager.unsubscribe(topic).await;
        assert!(!manager.has_subscribers(topic).await);
    }

    #[tokio::test]
    async fn test_route_message() {
        let manager = TopicSubscriptionManager::default();
        let topic = "/signpost/v1/records";

        let mut handle = manager.subscribe(topic, accept_all()).await;

        let routed = manager.route(test_message(topic, b"payload")).await;
        assert!(routed);

        let received = handle.try_next().unwrap();
        assert_eq!(received.data, b"payload");
    }

    #[tokio::test]
    async fn test_route_to_wrong_topic() {
        let manager = TopicSubscriptionManager::default();

        let _handle = manager.subscribe("/signpost/v1/custom/a", accept_all()).await;

        let routed = manager
            .route(test_message("/signpost/v1/custom/b", b"x"))
            .await;
        assert!(!routed);
    }

    #[tokio::test]
    async fn test_policy_drops_before_delivery() {
        let manager = TopicSubscriptionManager::default();
        let topic = "/signpost/v1/records";

        let policy: AcceptancePolicy = Arc::new(|msg| msg.data.starts_with(b"ok"));
        let mut handle = manager.subscribe(topic, policy).await;

        assert!(!manager.route(test_message(topic, b"spam")).await);
        assert!(handle.try_next().is_none());

        assert!(manager.route(test_message(topic, b"ok: fine")).await);
        assert!(handle.try_next().is_some());
    }

    #[tokio::test]
    async fn test_next_blocks_until_message() {
        let manager = Arc::new(TopicSubscriptionManager::default());
        let topic = "/signpost/v1/records";
        let cancel = CancellationToken::new();

        let mut handle = manager.subscribe(topic, accept_all()).await;

        let routing_manager = Arc::clone(&manager);
        let message = test_message(topic, b"later");
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            routing_manager.route(message).await;
        });

        let received = handle.next(&cancel).await.unwrap();
        assert_eq!(received.data, b"later");
    }

    #[tokio::test]
    async fn test_next_returns_on_cancellation() {
        let manager = TopicSubscriptionManager::default();
        let cancel = CancellationToken::new();

        let mut handle = manager.subscribe("/signpost/v1/records", accept_all()).await;

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = handle.next(&cancel).await;
        assert!(matches!(result, Err(SubscriptionError::Cancelled)));
    }
}
