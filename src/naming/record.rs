use chrono::{DateTime, SecondsFormat, Utc};
use libp2p::identity::Keypair;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from encoding, decoding, or creating name records
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to decode record: {0}")]
    Decode(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("failed to sign record: {0}")]
    Signing(String),
}

/// A signed statement binding a peer identity to a content path.
///
/// Received copies are immutable; every field is validated before use (see
/// [`crate::naming::validator`]). The signature covers the canonical byte
/// string produced by [`NameRecord::signable_bytes`], so any bit flip in
/// `value`, `validity_deadline`, or `sequence` invalidates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    /// The content path this record binds the signer's name to
    pub value: String,

    /// Publisher-incremented sequence number
    pub sequence: u64,

    /// Instant after which this record is no longer authoritative
    pub validity_deadline: DateTime<Utc>,

    /// Signature over the canonical signable bytes
    pub signature: Vec<u8>,

    /// Protobuf-encoded public key of the signer
    pub public_key: Vec<u8>,
}

impl NameRecord {
    /// Create and sign a record with the given keypair.
    pub fn signed(
        keypair: &Keypair,
        value: impl Into<String>,
        sequence: u64,
        validity_deadline: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        let value = value.into();
        let signable = Self::signable_bytes(&value, &validity_deadline, sequence);

        let signature = keypair
            .sign(&signable)
            .map_err(|e| RecordError::Signing(e.to_string()))?;

        Ok(Self {
            value,
            sequence,
            validity_deadline,
            signature,
            public_key: keypair.public().encode_protobuf(),
        })
    }

    /// The canonical byte string covered by the record signature.
    ///
    /// The deadline is rendered as RFC 3339 with nanosecond precision so
    /// signer and verifier derive identical bytes from the same instant.
    pub fn signable_bytes(
        value: &str,
        validity_deadline: &DateTime<Utc>,
        sequence: u64,
    ) -> Vec<u8> {
        let deadline = validity_deadline.to_rfc3339_opts(SecondsFormat::Nanos, true);

        let mut bytes = Vec::with_capacity(value.len() + deadline.len() + 8);
        bytes.extend_from_slice(value.as_bytes());
        bytes.extend_from_slice(deadline.as_bytes());
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes
    }

    /// The signable bytes for this record's own fields.
    pub fn own_signable_bytes(&self) -> Vec<u8> {
        Self::signable_bytes(&self.value, &self.validity_deadline, self.sequence)
    }

    /// Serialize to the CBOR wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        serde_cbor::to_vec(self).map_err(|e| RecordError::Encode(e.to_string()))
    }

    /// Deserialize from the CBOR wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        serde_cbor::from_slice(bytes).map_err(|e| RecordError::Decode(e.to_string()))
    }
}
