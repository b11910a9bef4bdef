use cid::Cid;
use multihash::Multihash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// SHA2-256 multihash code
const SHA2_256_CODE: u64 = 0x12;

/// Raw codec identifier (0x55) for raw binary data
const RAW_CODEC: u64 = 0x55;

/// Errors from parsing or constructing content identifiers.
#[derive(Debug, Error)]
pub enum CidError {
    #[error("invalid CID: {0}")]
    Invalid(String),
}

/// Compute SHA2-256 multihash from data
fn sha256_multihash(data: &[u8]) -> Multihash<64> {
    let digest = Sha256::digest(data);
    Multihash::wrap(SHA2_256_CODE, &digest).expect("SHA256 digest is always 32 bytes")
}

/// Content identifier wrapping CIDv1 with SHA2-256 multihash.
///
/// This is the primary identifier for all content-addressed data in Signpost.
/// Two identical pieces of data will always produce the same `ContentId`.
#[derive(Clone)]
pub struct ContentId {
    inner: Cid,
}

impl ContentId {
    /// Create a ContentId from raw bytes using SHA2-256 and RAW codec.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = sha256_multihash(data);
        let cid = Cid::new_v1(RAW_CODEC, hash);
        Self { inner: cid }
    }

    /// Create a ContentId from an existing CID.
    pub fn from_cid(cid: Cid) -> Self {
        Self { inner: cid }
    }

    /// Parse a ContentId from a string (base32 or base58 encoded).
    pub fn parse(s: &str) -> Result<Self, CidError> {
        let cid = Cid::from_str(s).map_err(|e| CidError::Invalid(e.to_string()))?;
        Ok(Self { inner: cid })
    }

    /// Get the underlying CID.
    pub fn as_cid(&self) -> &Cid {
        &self.inner
    }

    /// Convert to raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes()
    }

    /// Parse from raw bytes.
    pub fn from_raw_bytes(bytes: &[u8]) -> Result<Self, CidError> {
        let cid = Cid::try_from(bytes).map_err(|e| CidError::Invalid(e.to_string()))?;
        Ok(Self { inner: cid })
    }

    /// The multihash carried by this identifier.
    pub fn multihash(&self) -> &Multihash<64> {
        self.inner.hash()
    }

    /// Multihash function code (e.g. 0x12 for SHA2-256).
    pub fn hash_code(&self) -> u64 {
        self.inner.hash().code()
    }

    /// Get the hash digest bytes (without codec/version prefix).
    pub fn hash_bytes(&self) -> &[u8] {
        self.inner.hash().digest()
    }

    /// Verify that data matches this CID.
    pub fn verify(&self, data: &[u8]) -> bool {
        self == &Self::from_bytes(data)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentId")
            .field("cid", &self.to_string())
            .finish()
    }
}

impl FromStr for ContentId {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for ContentId {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for ContentId {}

impl Hash for ContentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash().digest().hash(state);
    }
}

impl Serialize for ContentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.to_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ContentIdVisitor;

        impl<'de> Visitor<'de> for ContentIdVisitor {
            type Value = ContentId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a CID string or bytes")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                ContentId::parse(v).map_err(de::Error::custom)
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                ContentId::from_raw_bytes(v).map_err(de::Error::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(ContentIdVisitor)
        } else {
            deserializer.deserialize_bytes(ContentIdVisitor)
        }
    }
}
