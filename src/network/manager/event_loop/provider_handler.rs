//! Provider handler - DHT provider announcement and discovery queries

use super::NetworkEventLoop;
use crate::content::ContentId;
use crate::network::manager::types::{PendingAnnouncement, PendingProviderQuery};
use libp2p::kad::{QueryId, RecordKey};
use libp2p::PeerId;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

impl NetworkEventLoop {
    /// Convert a ContentId to a Kademlia RecordKey.
    ///
    /// Uses the raw CID bytes as the key, ensuring content-addressable
    /// lookups work correctly across the DHT.
    pub(crate) fn cid_to_record_key(cid: &ContentId) -> RecordKey {
        RecordKey::new(&cid.to_bytes())
    }

    /// Handle a provide command - announce and await DHT confirmation
    pub(crate) fn handle_provide(
        &mut self,
        cid: ContentId,
        response: oneshot::Sender<Result<(), String>>,
    ) {
        let key = Self::cid_to_record_key(&cid);
        debug!(%cid, key = ?key, "Starting provider announcement");

        match self.swarm.behaviour_mut().start_providing(key) {
            Ok(query_id) => {
                info!(%cid, ?query_id, "Provider announcement query started");
                self.pending_announcements.insert(
                    query_id,
                    PendingAnnouncement {
                        cid,
                        response_tx: response,
                        created_at: Instant::now(),
                    },
                );
            }
            Err(e) => {
                warn!(%cid, error = ?e, "Failed to start providing");
                let _ = response.send(Err(format!("failed to start providing: {:?}", e)));
            }
        }
    }

    /// Handle a get_providers command - initiate a DHT provider query
    pub(crate) fn handle_get_providers(
        &mut self,
        cid: ContentId,
        max: usize,
        response: oneshot::Sender<Result<HashSet<PeerId>, String>>,
    ) {
        let key = Self::cid_to_record_key(&cid);

        debug!(%cid, key = ?key, max, "Starting provider discovery query");

        let query_id = self.swarm.behaviour_mut().get_providers(key);

        self.pending_provider_queries.insert(
            query_id,
            PendingProviderQuery {
                cid,
                response_tx: response,
                providers: HashSet::new(),
                max,
                created_at: Instant::now(),
            },
        );
    }

    /// Finish a provider query early once enough results have accumulated
    pub(crate) fn finish_provider_query_if_satisfied(&mut self, query_id: QueryId) {
        let satisfied = self
            .pending_provider_queries
            .get(&query_id)
            .map(|p| p.providers.len() >= p.max)
            .unwrap_or(false);

        if !satisfied {
            return;
        }

        if let Some(mut query) = self.swarm.behaviour_mut().kademlia.query_mut(&query_id) {
            query.finish();
        }

        if let Some(pending) = self.pending_provider_queries.remove(&query_id) {
            info!(
                %pending.cid,
                provider_count = pending.providers.len(),
                "Provider discovery reached result bound"
            );
            let _ = pending.response_tx.send(Ok(pending.providers));
        }
    }

    /// Fail pending provider queries and announcements that outlived `timeout`
    pub(crate) fn cleanup_stale_queries(&mut self, now: Instant, timeout: Duration) {
        let stale_queries: Vec<QueryId> = self
            .pending_provider_queries
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.created_at) > timeout)
            .map(|(id, _)| *id)
            .collect();

        for query_id in stale_queries {
            if let Some(pending) = self.pending_provider_queries.remove(&query_id) {
                warn!(
                    ?query_id,
                    %pending.cid,
                    "Cleaning up stale provider query"
                );
                let _ = pending.response_tx.send(Err(format!(
                    "provider query timed out for {}",
                    pending.cid
                )));
            }
        }

        let stale_announcements: Vec<QueryId> = self
            .pending_announcements
            .iter()
            .filter(|(_, pending)| now.duration_since(pending.created_at) > timeout)
            .map(|(id, _)| *id)
            .collect();

        for query_id in stale_announcements {
            if let Some(pending) = self.pending_announcements.remove(&query_id) {
                warn!(
                    ?query_id,
                    %pending.cid,
                    "Cleaning up stale provider announcement"
                );
                let _ = pending.response_tx.send(Err(format!(
                    "provider announcement timed out for {}",
                    pending.cid
                )));
            }
        }
    }
}
