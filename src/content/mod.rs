pub mod cid;
pub mod verify;

pub use cid::{CidError, ContentId};
pub use verify::{ensure_secure, InsecureCidError, MINIMUM_DIGEST_LENGTH};
