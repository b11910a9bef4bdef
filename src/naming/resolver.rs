use crate::naming::dns::TxtLookup;
use crate::naming::path::ContentPath;
use crate::naming::record::NameRecord;
use crate::naming::validator::validate;
use crate::network::gossipsub::SubscriptionHandle;
use chrono::{DateTime, Utc};
use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Namespace prefix for resolvable names
pub const NAME_PREFIX: &str = "/name/";

/// Errors terminal to a resolution call
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not a valid name: {0}")]
    InvalidName(String),

    #[error("no valid record found")]
    NoValidRecord,

    #[error("record lookup failed: {0}")]
    Lookup(String),

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

/// Parse a name of the form `/name/<peer-id>` into the claimed identity.
pub fn parse_name(name: &str) -> Result<PeerId, ResolveError> {
    let suffix = name
        .strip_prefix(NAME_PREFIX)
        .ok_or_else(|| ResolveError::InvalidName(name.to_string()))?;

    PeerId::from_str(suffix).map_err(|_| ResolveError::InvalidName(name.to_string()))
}

/// Resolves names to content paths from batches of candidate records.
///
/// The multibase encoding used for text-encoded records is an explicit
/// construction parameter rather than a process-wide default, so two
/// resolvers with different encodings can coexist in one process.
pub struct Resolver {
    /// Encoding applied when rendering records as DNS TXT strings
    text_encoding: multibase::Base,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(multibase::Base::Base32Lower)
    }
}

impl Resolver {
    pub fn new(text_encoding: multibase::Base) -> Self {
        Self { text_encoding }
    }

    /// Resolve a name against a finite batch of candidate record encodings.
    ///
    /// The name must carry the `/name/` prefix and a parsable peer id;
    /// otherwise the call fails with `InvalidName` without consulting the
    /// candidate source at all.
    ///
    /// Candidates are drained to exhaustion. Undecodable and invalid
    /// candidates are skipped with a diagnostic log. Among the survivors the
    /// record with the strictly latest validity deadline wins; an exact
    /// deadline tie keeps the earlier candidate. Sequence numbers do not
    /// participate in the comparison: the winner must be re-derivable from
    /// the record set alone by any resolver, regardless of arrival order.
    pub fn resolve(
        &self,
        name: &str,
        candidates: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<ContentPath, ResolveError> {
        let peer_id = parse_name(name)?;
        let now = Utc::now();

        let mut best: Option<(ContentPath, DateTime<Utc>)> = None;

        for (index, bytes) in candidates.into_iter().enumerate() {
            let record = match NameRecord::from_bytes(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    debug!(index, error = %e, "Skipping undecodable candidate");
                    continue;
                }
            };

            let path = match validate(&record, Some(&peer_id), now) {
                Ok(path) => path,
                Err(e) => {
                    debug!(index, error = %e, "Skipping invalid candidate");
                    continue;
                }
            };

            match &best {
                Some((_, best_deadline)) if record.validity_deadline <= *best_deadline => {
                    debug!(
                        index,
                        deadline = %record.validity_deadline,
                        "Candidate does not outlive current best"
                    );
                }
                _ => {
                    debug!(
                        index,
                        deadline = %record.validity_deadline,
                        "New best candidate"
                    );
                    best = Some((path, record.validity_deadline));
                }
            }
        }

        best.map(|(path, _)| path).ok_or(ResolveError::NoValidRecord)
    }

    /// Resolve a name from DNS TXT records published under `domain`.
    ///
    /// Each TXT string is a self-describing multibase encoding of a record;
    /// strings that fail to decode are skipped.
    pub async fn resolve_via_txt(
        &self,
        lookup: &dyn TxtLookup,
        name: &str,
        domain: &str,
    ) -> Result<ContentPath, ResolveError> {
        // Validate the name before any network traffic
        parse_name(name)?;

        let records = lookup
            .lookup_txt(domain)
            .await
            .map_err(ResolveError::Lookup)?;

        let candidates = records.iter().filter_map(|s| match multibase::decode(s) {
            Ok((_, bytes)) => Some(bytes),
            Err(e) => {
                debug!(error = %e, "Skipping TXT record with invalid multibase");
                None
            }
        });

        self.resolve(name, candidates.collect::<Vec<_>>())
    }

    /// Render a record as a self-describing multibase TXT string using this
    /// resolver's configured encoding.
    pub fn encode_txt_record(&self, record: &NameRecord) -> Result<String, ResolveError> {
        let bytes = record
            .to_bytes()
            .map_err(|e| ResolveError::Lookup(e.to_string()))?;
        Ok(multibase::encode(self.text_encoding, bytes))
    }

    /// Publish a binding for the keypair's identity, valid for 24 hours.
    pub async fn publish(
        &self,
        keypair: &Keypair,
        value: &ContentPath,
    ) -> Result<(), ResolveError> {
        self.publish_with_deadline(keypair, value, Utc::now() + chrono::Duration::hours(24))
            .await
    }

    /// Publish a binding with an explicit validity deadline.
    ///
    /// Not yet implemented. Every announcement must either succeed or report
    /// failure, so this fails loudly instead of claiming success.
    pub async fn publish_with_deadline(
        &self,
        _keypair: &Keypair,
        _value: &ContentPath,
        _deadline: DateTime<Utc>,
    ) -> Result<(), ResolveError> {
        Err(ResolveError::Unimplemented("record publication"))
    }
}

/// In-memory cache of the freshest record seen per peer.
///
/// Updated by the gossip receive loop under the same latest-deadline-wins
/// rule the resolver uses. Not persisted across restarts.
#[derive(Default)]
pub struct RecordCache {
    inner: RwLock<HashMap<PeerId, NameRecord>>,
}

impl RecordCache {
    /// Insert a validated record if it outlives the cached one.
    ///
    /// Returns true if the cache was updated.
    pub async fn upsert(&self, peer_id: PeerId, record: NameRecord) -> bool {
        let mut inner = self.inner.write().await;

        match inner.get(&peer_id) {
            Some(existing) if record.validity_deadline <= existing.validity_deadline => false,
            _ => {
                inner.insert(peer_id, record);
                true
            }
        }
    }

    /// The freshest record seen for a peer, if any.
    pub async fn get(&self, peer_id: &PeerId) -> Option<NameRecord> {
        self.inner.read().await.get(peer_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// Collect raw record payloads from a subscription over a bounded window.
///
/// Returns whatever arrived before the window closed or the scope was
/// cancelled; the result is a finite candidate batch for [`Resolver::resolve`].
pub async fn collect_gossip_candidates(
    subscription: &mut SubscriptionHandle,
    window: Duration,
    cancel: &CancellationToken,
) -> Vec<Vec<u8>> {
    let deadline = tokio::time::Instant::now() + window;
    let mut candidates = Vec::new();

    loop {
        let message = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            result = subscription.next(cancel) => match result {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        candidates.push(message.data);
    }

    candidates
}

/// Drain the records topic, validating each record and keeping the cache
/// fresh. Runs until the shared scope is cancelled.
///
/// A bad record never stops the loop: each rejection is logged with the
/// stage that failed and the next message is awaited.
pub async fn run_record_ingest(
    mut subscription: SubscriptionHandle,
    cache: Arc<RecordCache>,
    cancel: CancellationToken,
) {
    info!(topic = %subscription.topic, "Record ingest loop started");

    loop {
        let message = match subscription.next(&cancel).await {
            Ok(message) => message,
            Err(e) => {
                info!(reason = %e, "Record ingest loop stopped");
                break;
            }
        };

        match ingest_record(&message.data) {
            Ok((peer_id, record)) => {
                info!(
                    name = %format!("{}{}", NAME_PREFIX, peer_id),
                    value = %record.value,
                    sequence = record.sequence,
                    "Received name record"
                );

                if !cache.upsert(peer_id, record).await {
                    debug!(peer_id = %peer_id, "Cached record is fresher, keeping it");
                }
            }
            Err(stage) => {
                warn!(error = %stage, "Received invalid record");
            }
        }
    }
}

/// Decode a gossip payload, recover the signer, and validate the record.
///
/// The error names the stage that failed, for the ingest loop's diagnostics.
fn ingest_record(data: &[u8]) -> Result<(PeerId, NameRecord), String> {
    let record = NameRecord::from_bytes(data).map_err(|e| format!("unmarshal: {}", e))?;

    let public_key = PublicKey::try_decode_protobuf(&record.public_key)
        .map_err(|e| format!("pubkey: {}", e))?;
    let peer_id = public_key.to_peer_id();

    validate(&record, Some(&peer_id), Utc::now()).map_err(|e| format!("validate: {}", e))?;

    Ok((peer_id, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentId;
    use crate::naming::dns::TxtLookup;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    fn data_path(tag: &[u8]) -> String {
        format!("/data/{}", ContentId::from_bytes(tag))
    }

    fn record_bytes(keypair: &Keypair, value: &str, deadline: DateTime<Utc>) -> Vec<u8> {
        NameRecord::signed(keypair, value, 1, deadline)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    fn name_for(keypair: &Keypair) -> String {
        format!("{}{}", NAME_PREFIX, keypair.public().to_peer_id())
    }

    #[test]
    fn test_invalid_prefix_fails_without_consulting_source() {
        let resolver = Resolver::default();

        // The candidate source panics if touched
        let candidates = std::iter::from_fn(|| -> Option<Vec<u8>> {
            panic!("candidate source must not be consulted for an invalid name")
        });

        // A content path is not a name
        let result = resolver.resolve("/data/QmWhatever", candidates);
        assert!(matches!(result, Err(ResolveError::InvalidName(_))));
    }

    #[test]
    fn test_name_with_unparsable_peer_id_is_invalid() {
        let resolver = Resolver::default();
        let result = resolver.resolve("/name/not-a-peer-id", Vec::new());
        assert!(matches!(result, Err(ResolveError::InvalidName(_))));
    }

    #[test]
    fn test_no_candidates_is_no_valid_record() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();

        let result = resolver.resolve(&name_for(&keypair), Vec::new());
        assert!(matches!(result, Err(ResolveError::NoValidRecord)));
    }

    #[test]
    fn test_latest_deadline_wins_regardless_of_order() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let now = Utc::now();

        let winner_value = data_path(b"winner");

        // Deadlines t+10s, t+30s, t+5s arriving in that order: the t+30s
        // record must win
        let candidates = vec![
            record_bytes(&keypair, &data_path(b"a"), now + ChronoDuration::seconds(10)),
            record_bytes(&keypair, &winner_value, now + ChronoDuration::seconds(30)),
            record_bytes(&keypair, &data_path(b"c"), now + ChronoDuration::seconds(5)),
        ];

        let path = resolver.resolve(&name_for(&keypair), candidates).unwrap();
        assert_eq!(path.as_str(), winner_value);
    }

    #[test]
    fn test_exact_deadline_tie_keeps_first_seen() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let deadline = Utc::now() + ChronoDuration::seconds(60);

        let first_value = data_path(b"first");
        let candidates = vec![
            record_bytes(&keypair, &first_value, deadline),
            record_bytes(&keypair, &data_path(b"second"), deadline),
        ];

        let path = resolver.resolve(&name_for(&keypair), candidates).unwrap();
        assert_eq!(path.as_str(), first_value);
    }

    #[test]
    fn test_invalid_candidates_are_skipped() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let now = Utc::now();

        let good_value = data_path(b"good");
        let expired = record_bytes(&keypair, &data_path(b"old"), now - ChronoDuration::seconds(1));
        let garbage = b"not a record at all".to_vec();
        let good = record_bytes(&keypair, &good_value, now + ChronoDuration::seconds(30));

        let path = resolver
            .resolve(&name_for(&keypair), vec![expired, garbage, good])
            .unwrap();
        assert_eq!(path.as_str(), good_value);
    }

    #[test]
    fn test_record_signed_by_other_peer_is_skipped() {
        let keypair = Keypair::generate_ed25519();
        let impostor = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let now = Utc::now();

        // The impostor's record has a later deadline but the wrong signer
        let candidates = vec![
            record_bytes(&keypair, &data_path(b"mine"), now + ChronoDuration::seconds(10)),
            record_bytes(
                &impostor,
                &data_path(b"theirs"),
                now + ChronoDuration::seconds(1000),
            ),
        ];

        let path = resolver.resolve(&name_for(&keypair), candidates).unwrap();
        assert_eq!(path.as_str(), data_path(b"mine"));
    }

    struct StaticTxt(Vec<String>);

    #[async_trait]
    impl TxtLookup for StaticTxt {
        async fn lookup_txt(&self, _domain: &str) -> Result<Vec<String>, String> {
            Ok(self.0.clone())
        }
    }

    struct FailingTxt;

    #[async_trait]
    impl TxtLookup for FailingTxt {
        async fn lookup_txt(&self, _domain: &str) -> Result<Vec<String>, String> {
            Err("servfail".to_string())
        }
    }

    #[tokio::test]
    async fn test_resolve_via_txt_decodes_multibase_records() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let value = data_path(b"txt");

        let record =
            NameRecord::signed(&keypair, &value, 1, Utc::now() + ChronoDuration::hours(1)).unwrap();
        let encoded = resolver.encode_txt_record(&record).unwrap();

        let source = StaticTxt(vec!["!!not multibase!!".to_string(), encoded]);

        let path = resolver
            .resolve_via_txt(&source, &name_for(&keypair), "example.name")
            .await
            .unwrap();
        assert_eq!(path.as_str(), value);
    }

    #[tokio::test]
    async fn test_resolve_via_txt_propagates_lookup_failure() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();

        let result = resolver
            .resolve_via_txt(&FailingTxt, &name_for(&keypair), "example.name")
            .await;
        assert!(matches!(result, Err(ResolveError::Lookup(_))));
    }

    #[tokio::test]
    async fn test_publish_reports_unimplemented() {
        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let path = ContentPath::parse(&data_path(b"publish")).unwrap();

        let result = resolver.publish(&keypair, &path).await;
        assert!(matches!(result, Err(ResolveError::Unimplemented(_))));
    }

    #[tokio::test]
    async fn test_record_cache_latest_deadline_wins() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let cache = RecordCache::default();
        let now = Utc::now();

        let older =
            NameRecord::signed(&keypair, data_path(b"a"), 1, now + ChronoDuration::seconds(10))
                .unwrap();
        let newer =
            NameRecord::signed(&keypair, data_path(b"b"), 2, now + ChronoDuration::seconds(30))
                .unwrap();

        assert!(cache.upsert(peer_id, newer.clone()).await);
        assert!(!cache.upsert(peer_id, older).await);

        assert_eq!(cache.get(&peer_id).await.unwrap(), newer);
    }

    #[tokio::test]
    async fn test_collect_gossip_candidates_and_resolve() {
        use crate::network::gossipsub::{accept_all, TopicMessage, TopicSubscriptionManager};

        let keypair = Keypair::generate_ed25519();
        let resolver = Resolver::default();
        let manager = Arc::new(TopicSubscriptionManager::default());
        let cancel = CancellationToken::new();
        let topic = "/signpost/v1/records";

        let mut subscription = manager.subscribe(topic, accept_all()).await;

        let winner_value = data_path(b"gossip winner");
        let now = Utc::now();
        let payloads = vec![
            record_bytes(&keypair, &data_path(b"early"), now + ChronoDuration::seconds(10)),
            record_bytes(&keypair, &winner_value, now + ChronoDuration::seconds(30)),
        ];

        let router = Arc::clone(&manager);
        tokio::spawn(async move {
            for data in payloads {
                router
                    .route(TopicMessage {
                        topic: topic.to_string(),
                        source: None,
                        sequence_number: None,
                        data,
                    })
                    .await;
            }
        });

        let candidates =
            collect_gossip_candidates(&mut subscription, Duration::from_millis(200), &cancel).await;
        assert_eq!(candidates.len(), 2);

        let path = resolver.resolve(&name_for(&keypair), candidates).unwrap();
        assert_eq!(path.as_str(), winner_value);
    }

    #[test]
    fn test_ingest_record_recovers_signer() {
        let keypair = Keypair::generate_ed25519();
        let bytes = record_bytes(
            &keypair,
            &data_path(b"ingest"),
            Utc::now() + ChronoDuration::hours(1),
        );

        let (peer_id, record) = ingest_record(&bytes).unwrap();
        assert_eq!(peer_id, keypair.public().to_peer_id());
        assert_eq!(record.sequence, 1);
    }

    #[test]
    fn test_ingest_rejects_garbage() {
        assert!(ingest_record(b"junk").is_err());
    }
}
