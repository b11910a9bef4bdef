//! Kademlia event handler - completes pending announcements and provider
//! lookups from DHT query progress.

use super::NetworkEventLoop;
use libp2p::kad::{
    AddProviderError, AddProviderOk, Event, GetProvidersError, GetProvidersOk, QueryId,
    QueryResult,
};
use libp2p::PeerId;
use std::collections::HashSet;
use tracing::{debug, info, warn};

impl NetworkEventLoop {
    pub(crate) async fn handle_kad_event(&mut self, event: Event) {
        match event {
            Event::OutboundQueryProgressed { id, result, .. } => {
                self.on_query_progressed(id, result);
            }

            Event::RoutingUpdated { peer, .. } => {
                debug!(source = "dht", %peer, "Routing table updated");
            }

            Event::InboundRequest { request } => {
                debug!(?request, "Inbound DHT request");
            }

            event => {
                debug!(?event, "DHT event");
            }
        }
    }

    fn on_query_progressed(&mut self, id: QueryId, result: QueryResult) {
        match result {
            QueryResult::StartProviding(outcome) => self.on_announce_finished(id, outcome),

            QueryResult::GetProviders(Ok(GetProvidersOk::FoundProviders { providers, .. })) => {
                self.on_providers_found(id, providers);
            }

            QueryResult::GetProviders(Ok(GetProvidersOk::FinishedWithNoAdditionalRecord {
                ..
            })) => {
                self.on_provider_lookup_exhausted(id);
            }

            QueryResult::GetProviders(Err(GetProvidersError::Timeout { .. })) => {
                self.on_provider_lookup_timeout(id);
            }

            other => {
                debug!(query_id = ?id, result = ?other, "DHT query progressed");
            }
        }
    }

    /// A provider announcement reached its terminal state; release the
    /// caller waiting on DHT confirmation.
    fn on_announce_finished(
        &mut self,
        id: QueryId,
        outcome: Result<AddProviderOk, AddProviderError>,
    ) {
        let Some(pending) = self.pending_announcements.remove(&id) else {
            debug!(query_id = ?id, "Announcement finished with no waiter");
            return;
        };

        match outcome {
            Ok(_) => {
                info!(
                    cid = %pending.cid,
                    elapsed_ms = pending.created_at.elapsed().as_millis(),
                    "Announcement confirmed by routing layer"
                );
                let _ = pending.response_tx.send(Ok(()));
            }
            Err(e) => {
                warn!(cid = %pending.cid, error = ?e, "Announcement rejected by routing layer");
                let _ = pending.response_tx.send(Err(format!(
                    "provider announcement failed for {}",
                    pending.cid
                )));
            }
        }
    }

    /// A provider lookup surfaced another batch of results. Accumulate
    /// them, and cut the query short once the caller's bound is met.
    fn on_providers_found(&mut self, id: QueryId, providers: HashSet<PeerId>) {
        let Some(pending) = self.pending_provider_queries.get_mut(&id) else {
            return;
        };

        pending.providers.extend(providers);
        debug!(
            query_id = ?id,
            cid = %pending.cid,
            found = pending.providers.len(),
            "Provider lookup progressed"
        );

        self.finish_provider_query_if_satisfied(id);
    }

    /// The DHT walked all closer peers without further records; whatever
    /// accumulated is the answer.
    fn on_provider_lookup_exhausted(&mut self, id: QueryId) {
        let Some(pending) = self.pending_provider_queries.remove(&id) else {
            return;
        };

        info!(
            cid = %pending.cid,
            provider_count = pending.providers.len(),
            elapsed_ms = pending.created_at.elapsed().as_millis(),
            "Provider lookup complete"
        );
        let _ = pending.response_tx.send(Ok(pending.providers));
    }

    /// A timed-out lookup still succeeds if it found anything at all;
    /// only an empty result is reported as a failure.
    fn on_provider_lookup_timeout(&mut self, id: QueryId) {
        let Some(pending) = self.pending_provider_queries.remove(&id) else {
            return;
        };

        if pending.providers.is_empty() {
            warn!(cid = %pending.cid, "Provider lookup timed out with no results");
            let _ = pending
                .response_tx
                .send(Err(format!("provider query timed out for {}", pending.cid)));
        } else {
            info!(
                cid = %pending.cid,
                provider_count = pending.providers.len(),
                "Provider lookup timed out with partial results"
            );
            let _ = pending.response_tx.send(Ok(pending.providers));
        }
    }
}
