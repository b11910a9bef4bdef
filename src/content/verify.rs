//! Hash security policy for content identifiers.
//!
//! Identifiers built on weak or length-extendable hash functions must never
//! be announced to the network: a provider record for a forgeable identifier
//! is worse than no record at all. The allowlist below mirrors the hash
//! functions commonly accepted by content-addressed networks.

use super::ContentId;
use thiserror::Error;

/// Minimum digest length accepted for announced identifiers, in bytes.
pub const MINIMUM_DIGEST_LENGTH: usize = 20;

/// Multihash codes considered secure enough to announce.
const ALLOWED_HASH_CODES: &[u64] = &[
    0x12, // sha2-256
    0x13, // sha2-512
    0x14, // sha3-512
    0x15, // sha3-384
    0x16, // sha3-256
    0x17, // sha3-224
    0x56, // dbl-sha2-256
    0xb220, // blake2b-256
    0xb260, // blake2s-256
];

/// Why a content identifier was rejected by the hash security check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InsecureCidError {
    #[error("disallowed hash function (multihash code {0:#x})")]
    DisallowedHash(u64),

    #[error("digest too short: {0} bytes (minimum {MINIMUM_DIGEST_LENGTH})")]
    DigestTooShort(usize),
}

/// Check that an identifier uses an allowed hash function and digest length.
pub fn ensure_secure(cid: &ContentId) -> Result<(), InsecureCidError> {
    let code = cid.hash_code();
    if !ALLOWED_HASH_CODES.contains(&code) {
        return Err(InsecureCidError::DisallowedHash(code));
    }

    let digest_len = cid.hash_bytes().len();
    if digest_len < MINIMUM_DIGEST_LENGTH {
        return Err(InsecureCidError::DigestTooShort(digest_len));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cid::Cid;
    use multihash::Multihash;

    const RAW_CODEC: u64 = 0x55;

    fn cid_with_hash(code: u64, digest: &[u8]) -> ContentId {
        let mh = Multihash::<64>::wrap(code, digest).unwrap();
        ContentId::from_cid(Cid::new_v1(RAW_CODEC, mh))
    }

    #[test]
    fn test_sha2_256_is_secure() {
        let cid = ContentId::from_bytes(b"some content");
        assert!(ensure_secure(&cid).is_ok());
    }

    #[test]
    fn test_identity_hash_rejected() {
        let cid = cid_with_hash(0x00, b"inline data that is long enough here");
        assert_eq!(
            ensure_secure(&cid),
            Err(InsecureCidError::DisallowedHash(0x00))
        );
    }

    #[test]
    fn test_sha1_rejected() {
        let cid = cid_with_hash(0x11, &[0u8; 20]);
        assert_eq!(
            ensure_secure(&cid),
            Err(InsecureCidError::DisallowedHash(0x11))
        );
    }

    #[test]
    fn test_truncated_digest_rejected() {
        let cid = cid_with_hash(0x12, &[0u8; 16]);
        assert_eq!(ensure_secure(&cid), Err(InsecureCidError::DigestTooShort(16)));
    }

    #[test]
    fn test_blake2b_256_accepted() {
        let cid = cid_with_hash(0xb220, &[7u8; 32]);
        assert!(ensure_secure(&cid).is_ok());
    }
}
