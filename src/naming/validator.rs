use crate::naming::path::{ContentPath, PathError};
use crate::naming::record::NameRecord;
use chrono::{DateTime, Utc};
use libp2p::identity::PublicKey;
use libp2p::PeerId;
use thiserror::Error;

/// Why a record was rejected.
///
/// The four checks are independent; diagnostics and resolution logging rely
/// on knowing which one failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("signature does not verify against the signer's public key")]
    BadSignature,

    #[error("unknown signer: {0}")]
    UnknownSigner(String),

    #[error("record expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("malformed value: {0}")]
    MalformedValue(#[from] PathError),
}

/// Validate a name record against a claimed signer identity and a clock.
///
/// Recovers the signer identity from the embedded public key, verifies the
/// signature over the canonical encoding, checks the validity deadline
/// against `now`, and parses `value` as a content path. On success the
/// parsed path is returned.
///
/// Two records claiming the same identity but carrying different public key
/// bytes cannot both pass: the identity is recomputed from the key, so a
/// mismatching key is rejected as `UnknownSigner`.
pub fn validate(
    record: &NameRecord,
    claimed: Option<&PeerId>,
    now: DateTime<Utc>,
) -> Result<ContentPath, ValidationError> {
    let public_key = PublicKey::try_decode_protobuf(&record.public_key)
        .map_err(|e| ValidationError::UnknownSigner(format!("undecodable public key: {}", e)))?;

    let signer = public_key.to_peer_id();
    if let Some(claimed) = claimed {
        if &signer != claimed {
            return Err(ValidationError::UnknownSigner(format!(
                "public key hashes to {}, record claims {}",
                signer, claimed
            )));
        }
    }

    if !public_key.verify(&record.own_signable_bytes(), &record.signature) {
        return Err(ValidationError::BadSignature);
    }

    if now >= record.validity_deadline {
        return Err(ValidationError::Expired(record.validity_deadline));
    }

    let path = ContentPath::parse(&record.value)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentId;
    use chrono::Duration;
    use libp2p::identity::Keypair;

    fn data_path() -> String {
        format!("/data/{}", ContentId::from_bytes(b"validator test"))
    }

    fn signed_record(keypair: &Keypair, deadline: DateTime<Utc>) -> NameRecord {
        NameRecord::signed(keypair, data_path(), 1, deadline).unwrap()
    }

    #[test]
    fn test_valid_record_passes() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let record = signed_record(&keypair, Utc::now() + Duration::hours(1));

        let path = validate(&record, Some(&peer_id), Utc::now()).unwrap();
        assert_eq!(path.as_str(), data_path());
    }

    #[test]
    fn test_tampered_value_rejected_as_bad_signature() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let mut record = signed_record(&keypair, Utc::now() + Duration::hours(1));

        // Flip the record to a different (still well-formed) value; the
        // signature was computed over the original bytes
        record.value = format!("/data/{}", ContentId::from_bytes(b"other content"));

        let result = validate(&record, Some(&peer_id), Utc::now());
        assert_eq!(result, Err(ValidationError::BadSignature));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let mut record = signed_record(&keypair, Utc::now() + Duration::hours(1));

        record.signature[0] ^= 0x01;

        let result = validate(&record, Some(&peer_id), Utc::now());
        assert_eq!(result, Err(ValidationError::BadSignature));
    }

    #[test]
    fn test_expired_record_rejected() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let deadline = Utc::now() - Duration::seconds(5);
        let record = signed_record(&keypair, deadline);

        let result = validate(&record, Some(&peer_id), Utc::now());
        assert_eq!(result, Err(ValidationError::Expired(deadline)));
    }

    #[test]
    fn test_expiry_uses_supplied_clock() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let deadline = Utc::now() + Duration::hours(1);
        let record = signed_record(&keypair, deadline);

        // With a clock past the deadline, the same record is expired
        let future = deadline + Duration::seconds(1);
        let result = validate(&record, Some(&peer_id), future);
        assert_eq!(result, Err(ValidationError::Expired(deadline)));
    }

    #[test]
    fn test_wrong_claimed_identity_rejected() {
        let keypair = Keypair::generate_ed25519();
        let other = Keypair::generate_ed25519().public().to_peer_id();
        let record = signed_record(&keypair, Utc::now() + Duration::hours(1));

        let result = validate(&record, Some(&other), Utc::now());
        assert!(matches!(result, Err(ValidationError::UnknownSigner(_))));
    }

    #[test]
    fn test_undecodable_public_key_rejected() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let mut record = signed_record(&keypair, Utc::now() + Duration::hours(1));

        record.public_key = vec![0xde, 0xad, 0xbe, 0xef];

        let result = validate(&record, Some(&peer_id), Utc::now());
        assert!(matches!(result, Err(ValidationError::UnknownSigner(_))));
    }

    #[test]
    fn test_malformed_value_rejected() {
        let keypair = Keypair::generate_ed25519();
        let peer_id = keypair.public().to_peer_id();
        let record =
            NameRecord::signed(&keypair, "not a path", 1, Utc::now() + Duration::hours(1)).unwrap();

        let result = validate(&record, Some(&peer_id), Utc::now());
        assert!(matches!(result, Err(ValidationError::MalformedValue(_))));
    }

    #[test]
    fn test_no_claimed_identity_still_checks_signature() {
        let keypair = Keypair::generate_ed25519();
        let mut record = signed_record(&keypair, Utc::now() + Duration::hours(1));
        record.signature[0] ^= 0x01;

        let result = validate(&record, None, Utc::now());
        assert_eq!(result, Err(ValidationError::BadSignature));
    }
}
