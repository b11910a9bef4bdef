//! GossipSub topic management: subscription channels, acceptance policies,
//! and rendezvous identifier derivation.

mod config;
mod subscription;
mod topics;

pub use config::GossipSubConfig;
pub use subscription::{
    accept_all, AcceptancePolicy, SubscriptionConfig, SubscriptionError, SubscriptionHandle,
    TopicMessage, TopicSubscriptionManager,
};
pub use topics::{rendezvous_content_id, Topic, NAME_RECORDS_TOPIC, TOPIC_PREFIX};
