//! Naming: signed name records, validation, and resolution.
//!
//! A name (`/name/<peer-id>`) binds a peer identity to a content path
//! (`/data/<cid>`). Bindings are carried by signed records propagated over
//! gossip or published as DNS TXT records. Conflicts between records for the
//! same name are resolved by validity deadline: the record that stays valid
//! longest wins.

pub mod dns;
pub mod path;
pub mod record;
pub mod resolver;
pub mod validator;

pub use dns::{DnsError, DnsTextSource, TxtLookup};
pub use path::{ContentPath, PathError, DATA_PREFIX};
pub use record::{NameRecord, RecordError};
pub use resolver::{
    collect_gossip_candidates, parse_name, run_record_ingest, RecordCache, ResolveError, Resolver,
    NAME_PREFIX,
};
pub use validator::{validate, ValidationError};
