//! Daemon composition: wires the network manager, record ingest, rendezvous
//! maintenance, DNS responder, and provider workers into one cancellable
//! scope.

use crate::config::{NodeConfig, RendezvousConfig};
use crate::error::AppError;
use crate::naming::dns::run_dns_responder;
use crate::naming::resolver::{run_record_ingest, RecordCache};
use crate::network::gossipsub::accept_all;
use crate::network::manager::NetworkManager;
use crate::provider::{ContentProvider, ContentRouting};
use libp2p::identity::Keypair;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Interval for the peer statistics ticker
const STATS_INTERVAL: Duration = Duration::from_secs(10);

pub async fn run() -> Result<(), AppError> {
    init_tracing();

    let config = NodeConfig::from_env();
    info!("Configuration loaded. Initializing node...");

    let keypair = Keypair::generate_ed25519();
    let cancel = CancellationToken::new();

    let manager = Arc::new(NetworkManager::new(keypair, cancel.clone()));
    manager.start(&config.network).await?;

    // Bootstrap and subscription failures are fatal to startup; everything
    // after this point is best-effort background work
    manager
        .bootstrap(
            &config.network.bootstrap_addresses,
            config.network.bootstrap_timeout,
        )
        .await?;
    info!("bootstrapped: ok");

    let subscription = manager
        .subscribe(&config.records_topic, accept_all())
        .await?;

    let cache = Arc::new(RecordCache::default());
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(run_record_ingest(
        subscription,
        Arc::clone(&cache),
        cancel.child_token(),
    )));

    tasks.push(tokio::spawn(run_rendezvous(
        Arc::clone(&manager),
        config.records_topic.clone(),
        config.rendezvous.clone(),
        cancel.child_token(),
    )));

    if config.dns.enabled {
        let listen = config.dns.listen;
        let dns_cancel = cancel.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = run_dns_responder(listen, dns_cancel).await {
                error!(error = %e, "DNS responder failed");
            }
        }));
    }

    let provider = ContentProvider::new(
        Arc::clone(&manager) as Arc<dyn ContentRouting>,
        config.provider.clone(),
        cancel.child_token(),
    );
    let mut worker_handles = provider.run().await?;
    tasks.append(&mut worker_handles);

    tasks.push(tokio::spawn(run_stats_ticker(
        Arc::clone(&manager),
        config.records_topic.clone(),
        cancel.child_token(),
    )));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::Config(format!("failed to listen for shutdown signal: {}", e)))?;

    info!("Shutdown signal received");

    cancel.cancel();
    manager.stop().await?;

    for task in tasks {
        let _ = task.await;
    }

    info!("Node shutdown complete.");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Keep this node findable and connected through the topic's rendezvous
/// identifier: periodically re-announce it in the DHT and connect to other
/// announced providers.
async fn run_rendezvous(
    manager: Arc<NetworkManager>,
    topic: String,
    config: RendezvousConfig,
    cancel: CancellationToken,
) {
    let rendezvous = crate::network::gossipsub::rendezvous_content_id(&topic);
    info!(topic = %topic, cid = %rendezvous, "Rendezvous maintenance started");

    loop {
        match manager.provide(&rendezvous, config.announce_timeout).await {
            Ok(()) => info!(topic = %topic, "Rendezvous announced"),
            Err(e) => warn!(topic = %topic, error = %e, "Rendezvous announce failed"),
        }

        match manager
            .locate_topic_peers(&topic, config.search_max, config.search_timeout)
            .await
        {
            Ok(connected) if connected > 0 => {
                info!(topic = %topic, connected, "Connected to topic providers")
            }
            Ok(_) => {}
            Err(e) => warn!(topic = %topic, error = %e, "Topic peer search failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.maintain_interval) => {}
        }
    }

    info!(topic = %topic, "Rendezvous maintenance stopped");
}

/// Log connection statistics on a fixed interval
async fn run_stats_ticker(manager: Arc<NetworkManager>, topic: String, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    ticker.tick().await; // Skip immediate first tick

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let peers = manager.peer_count().await.unwrap_or(0);
                let topic_peers = manager.mesh_peer_count(&topic).await.unwrap_or(0);
                info!(total_peers = peers, topic_peers, "Node statistics");
            }
        }
    }
}
