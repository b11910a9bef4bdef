//! Gossipsub event handler - hands inbound messages to the subscription
//! channels without decoding them.

use super::NetworkEventLoop;
use crate::network::gossipsub::TopicMessage;
use libp2p::gossipsub::Event;
use std::sync::Arc;
use tracing::{debug, info};

impl NetworkEventLoop {
    pub(crate) async fn handle_gossipsub_event(&mut self, event: Event) {
        match event {
            Event::Message {
                propagation_source,
                message,
                ..
            } => {
                debug!(
                    forwarder = %propagation_source,
                    topic = %message.topic,
                    bytes = message.data.len(),
                    "Gossip message received"
                );

                // The payload stays raw here. Decoding and record validation
                // belong to the naming layer; the gossip layer only applies
                // the topic's acceptance policy.
                let inbound = TopicMessage {
                    topic: message.topic.into_string(),
                    source: message.source,
                    sequence_number: message.sequence_number,
                    data: message.data,
                };

                let subscriptions = Arc::clone(&self.subscription_manager);
                tokio::spawn(async move {
                    if !subscriptions.route(inbound).await {
                        debug!("Gossip message dropped (no subscribers or policy reject)");
                    }
                });
            }

            Event::Subscribed { peer_id, topic } => {
                info!(%peer_id, %topic, "Peer joined topic");
            }

            Event::Unsubscribed { peer_id, topic } => {
                info!(%peer_id, %topic, "Peer left topic");
            }

            _ => {}
        }
    }
}
