//! Signpost: a peer-to-peer naming node.
//!
//! Propagates and resolves signed "name → content-path" records over a
//! gossip overlay and a Kademlia DHT, and announces local content
//! availability with a bounded, retrying worker pool.

pub mod config;
pub mod content;
pub mod error;
pub mod naming;
pub mod network;
pub mod provider;
pub mod runner;
