//! Content provider - bounded worker pool announcing content identifiers
//! to the routing layer.
//!
//! Producers enqueue identifiers onto a bounded queue; a fixed pool of
//! workers drains it and announces each identifier with exponential backoff
//! retry. A full queue blocks the producer: a node announcing faster than
//! the network absorbs must be slowed, not have announcements dropped.

use crate::content::{ensure_secure, ContentId};
use crate::network::NetworkError;
use async_trait::async_trait;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Routing layer seam used for provider announcements.
///
/// Implemented by the network manager; tests substitute their own.
#[async_trait]
pub trait ContentRouting: Send + Sync {
    /// Announce this node as a provider of `cid` and wait for the routing
    /// layer to confirm, bounded by the implementation's own timeout.
    async fn provide(&self, cid: &ContentId) -> Result<(), NetworkError>;
}

/// Retry policy for failed announcements
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay before the first retry
    pub base_delay_ms: u64,

    /// Retries after the initial attempt before giving up
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_retries: 4,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff duration: base_delay * 2^attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(10); // Cap to prevent overflow
        let multiplier = 1u64 << exponent;
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier))
    }
}

/// Configuration for the provider worker pool
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bounded queue capacity; a full queue blocks producers
    pub queue_capacity: usize,

    /// Number of announcement workers
    pub worker_count: usize,

    /// Retry policy applied per announcement
    pub retry: RetryConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            worker_count: 6,
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let queue_capacity = env::var("PROVIDER_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(100);

        let worker_count = env::var("PROVIDER_WORKER_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(6);

        let base_delay_ms = env::var("PROVIDER_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(500);

        let max_retries = env::var("PROVIDER_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);

        Self {
            queue_capacity,
            worker_count,
            retry: RetryConfig {
                base_delay_ms,
                max_retries,
            },
        }
    }
}

/// Errors from enqueueing an announcement request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("provider cancelled")]
    Cancelled,

    #[error("provider queue closed")]
    Closed,
}

/// Terminal outcome of a failed announcement
#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("providing failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("announcement cancelled")]
    Cancelled,
}

/// Errors from starting the worker pool
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider workers already running")]
    AlreadyRunning,
}

/// Bounded worker pool announcing content identifiers to the routing layer
pub struct ContentProvider {
    queue_tx: mpsc::Sender<ContentId>,

    /// Taken once by run() and shared between workers
    queue_rx: Mutex<Option<mpsc::Receiver<ContentId>>>,

    routing: Arc<dyn ContentRouting>,
    config: ProviderConfig,
    cancel: CancellationToken,
}

impl ContentProvider {
    pub fn new(
        routing: Arc<dyn ContentRouting>,
        config: ProviderConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        Self {
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            routing,
            config,
            cancel,
        }
    }

    /// Queue a content identifier for announcement.
    ///
    /// Blocks while the queue is full; cancellation unblocks with an error.
    pub async fn enqueue(&self, cid: ContentId) -> Result<(), EnqueueError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EnqueueError::Cancelled),
            result = self.queue_tx.send(cid) => result.map_err(|_| EnqueueError::Closed),
        }
    }

    /// Start the announcement workers.
    ///
    /// Each worker pulls one identifier at a time and processes it to
    /// completion before pulling the next, bounding outbound announcement
    /// load to the pool size.
    pub async fn run(&self) -> Result<Vec<JoinHandle<()>>, ProviderError> {
        let queue_rx = self
            .queue_rx
            .lock()
            .await
            .take()
            .ok_or(ProviderError::AlreadyRunning)?;

        let queue = Arc::new(Mutex::new(queue_rx));

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "Starting provider workers"
        );

        let handles = (0..self.config.worker_count)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let routing = Arc::clone(&self.routing);
                let retry = self.config.retry.clone();
                let cancel = self.cancel.clone();

                tokio::spawn(async move {
                    worker(worker_id, queue, routing, retry, cancel).await;
                })
            })
            .collect();

        Ok(handles)
    }
}

#[async_trait]
impl ContentRouting for crate::network::manager::NetworkManager {
    async fn provide(&self, cid: &ContentId) -> Result<(), NetworkError> {
        crate::network::manager::NetworkManager::provide(
            self,
            cid,
            crate::network::manager::PROVIDE_TIMEOUT,
        )
        .await
    }
}

/// Single announcement worker: drain the queue until cancellation
async fn worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<ContentId>>>,
    routing: Arc<dyn ContentRouting>,
    retry: RetryConfig,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Announcement worker started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            cid = async { queue.lock().await.recv().await } => cid,
        };

        let Some(cid) = next else {
            break;
        };

        debug!(worker_id, %cid, "Handling announcement");

        if let Err(e) = announce(routing.as_ref(), &retry, &cancel, &cid).await {
            // Logged and surfaced per item, never fatal to the pool
            warn!(worker_id, %cid, error = %e, "Announcement abandoned");
        }
    }

    debug!(worker_id, "Announcement worker stopped");
}

/// Announce one content identifier, retrying with exponential backoff.
///
/// Identifiers failing the hash security check are rejected without any
/// network I/O; there is nothing retryable about a structurally invalid
/// identifier, so the caller sees success and moves on.
pub(crate) async fn announce(
    routing: &dyn ContentRouting,
    retry: &RetryConfig,
    cancel: &CancellationToken,
    cid: &ContentId,
) -> Result<(), AnnounceError> {
    if let Err(e) = ensure_secure(cid) {
        error!(%cid, error = %e, "Insecure hash in provider announcement");
        return Ok(());
    }

    let mut attempt = 0u32;

    loop {
        match routing.provide(cid).await {
            Ok(()) => {
                debug!(%cid, attempt, "Announced");
                return Ok(());
            }
            Err(e) => {
                if attempt >= retry.max_retries {
                    let attempts = attempt + 1;
                    warn!(%cid, attempts, error = %e, "Providing failed after retries");
                    return Err(AnnounceError::RetriesExhausted {
                        attempts,
                        last: e.to_string(),
                    });
                }

                let delay = retry.backoff_delay(attempt);
                debug!(
                    %cid,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Provide failed, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(AnnounceError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }
}
