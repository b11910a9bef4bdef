//! DNS integration: TXT record lookup source and a UDP query responder.
//!
//! The lookup side feeds DNS-published records into the resolver. The
//! responder side accepts TXT queries whose first label is a content
//! identifier wrapping a peer identity hash; answer synthesis is not
//! implemented yet, so matched queries are answered with `NOTIMP` rather
//! than a fabricated success.

use crate::content::ContentId;
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::RecordType;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use libp2p::PeerId;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors from the DNS responder
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("failed to bind DNS listener: {0}")]
    Bind(std::io::Error),
}

/// A source of DNS TXT records, each string a self-describing encoded record.
#[async_trait]
pub trait TxtLookup: Send + Sync {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, String>;
}

/// TXT lookup backed by the system's DNS configuration.
pub struct DnsTextSource {
    resolver: TokioAsyncResolver,
}

impl DnsTextSource {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }
}

impl Default for DnsTextSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxtLookup for DnsTextSource {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, String> {
        let lookup = self
            .resolver
            .txt_lookup(domain.to_string())
            .await
            .map_err(|e| e.to_string())?;

        Ok(lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect())
    }
}

/// Serve DNS queries over UDP until the shared scope is cancelled.
pub async fn run_dns_responder(
    listen: SocketAddr,
    cancel: CancellationToken,
) -> Result<(), DnsError> {
    let socket = UdpSocket::bind(listen).await.map_err(DnsError::Bind)?;
    info!(%listen, "DNS responder listening");

    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS responder stopped");
                return Ok(());
            }

            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!(error = %e, "DNS receive error");
                        continue;
                    }
                };

                if let Some(response) = handle_dns_query(&buf[..len]) {
                    if let Err(e) = socket.send_to(&response, peer).await {
                        warn!(error = %e, "DNS send error");
                    }
                }
            }
        }
    }
}

/// Handle one raw DNS message.
///
/// TXT queries whose first label parses as a content identifier carrying a
/// peer identity hash get a `NOTIMP` response; everything else is ignored.
fn handle_dns_query(raw: &[u8]) -> Option<Vec<u8>> {
    let request = Message::from_vec(raw).ok()?;

    debug!(queries = ?request.queries(), "DNS request");

    let mut matched = false;
    for query in request.queries() {
        if query.query_type() != RecordType::TXT {
            continue;
        }

        let Some(label) = query.name().iter().next() else {
            continue;
        };

        let Ok(label) = std::str::from_utf8(label) else {
            continue;
        };

        let Ok(peer_cid) = ContentId::parse(label) else {
            continue;
        };

        let Ok(peer_id) = PeerId::from_multihash(peer_cid.multihash().to_owned()) else {
            continue;
        };

        info!("serve: /name/{}", peer_id);
        matched = true;
    }

    if !matched {
        return None;
    }

    let mut response = Message::new();
    response
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_response_code(ResponseCode::NotImp);
    for query in request.queries() {
        response.add_query(query.clone());
    }

    response.to_vec().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Cid;
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;
    use libp2p::identity::Keypair;
    use multihash::Multihash;

    /// libp2p-key codec for peer identities rendered as CIDs
    const LIBP2P_KEY_CODEC: u64 = 0x72;

    fn peer_cid_label(peer_id: &PeerId) -> String {
        let mh = Multihash::<64>::from_bytes(&peer_id.to_bytes()).unwrap();
        Cid::new_v1(LIBP2P_KEY_CODEC, mh).to_string()
    }

    fn txt_query(name: &str) -> Vec<u8> {
        let mut message = Message::new();
        message
            .set_id(4242)
            .set_message_type(MessageType::Query)
            .add_query(Query::query(
                Name::from_ascii(name).unwrap(),
                RecordType::TXT,
            ));
        message.to_vec().unwrap()
    }

    #[test]
    fn test_txt_query_with_peer_cid_gets_notimp() {
        let peer_id = Keypair::generate_ed25519().public().to_peer_id();
        let label = peer_cid_label(&peer_id);
        let raw = txt_query(&format!("{}.name.", label));

        let response = handle_dns_query(&raw).expect("matched query should get a response");
        let parsed = Message::from_vec(&response).unwrap();

        assert_eq!(parsed.id(), 4242);
        assert_eq!(parsed.message_type(), MessageType::Response);
        assert_eq!(parsed.response_code(), ResponseCode::NotImp);
        assert_eq!(parsed.queries().len(), 1);
    }

    #[test]
    fn test_peer_identity_recoverable_from_label() {
        let peer_id = Keypair::generate_ed25519().public().to_peer_id();
        let label = peer_cid_label(&peer_id);

        let cid = ContentId::parse(&label).unwrap();
        let recovered = PeerId::from_multihash(cid.multihash().to_owned()).unwrap();

        assert_eq!(recovered, peer_id);
    }

    #[test]
    fn test_non_txt_query_ignored() {
        let peer_id = Keypair::generate_ed25519().public().to_peer_id();
        let label = peer_cid_label(&peer_id);

        let mut message = Message::new();
        message
            .set_id(1)
            .set_message_type(MessageType::Query)
            .add_query(Query::query(
                Name::from_ascii(format!("{}.name.", label)).unwrap(),
                RecordType::A,
            ));

        assert!(handle_dns_query(&message.to_vec().unwrap()).is_none());
    }

    #[test]
    fn test_undecodable_label_ignored() {
        let raw = txt_query("definitely-not-a-cid.name.");
        assert!(handle_dns_query(&raw).is_none());
    }

    #[test]
    fn test_garbage_packet_ignored() {
        assert!(handle_dns_query(b"\x00\x01garbage").is_none());
    }
}

