use crate::content::ContentId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace prefix for content paths
pub const DATA_PREFIX: &str = "/data/";

/// Errors from parsing a content path
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path must start with {DATA_PREFIX}")]
    MissingPrefix,

    #[error("invalid content id in path: {0}")]
    InvalidCid(String),
}

/// A validated content path: `/data/<cid>` with an optional sub-path.
///
/// This is the target side of a name binding. The content identifier
/// segment is parsed eagerly; the rest of the path is kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentPath {
    raw: String,
    cid: ContentId,
}

impl ContentPath {
    /// Parse and validate a content path string.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let rest = s.strip_prefix(DATA_PREFIX).ok_or(PathError::MissingPrefix)?;

        let cid_segment = rest.split('/').next().filter(|seg| !seg.is_empty());
        let cid_segment = cid_segment.ok_or(PathError::MissingPrefix)?;

        let cid =
            ContentId::parse(cid_segment).map_err(|e| PathError::InvalidCid(e.to_string()))?;

        Ok(Self {
            raw: s.to_string(),
            cid,
        })
    }

    /// Build a path pointing at a bare content identifier.
    pub fn from_cid(cid: &ContentId) -> Self {
        Self {
            raw: format!("{}{}", DATA_PREFIX, cid),
            cid: cid.clone(),
        }
    }

    /// The content identifier this path points into.
    pub fn cid(&self) -> &ContentId {
        &self.cid
    }

    /// The full path string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for ContentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_cid() -> ContentId {
        ContentId::from_bytes(b"path test content")
    }

    #[test]
    fn test_parse_bare_cid_path() {
        let cid = some_cid();
        let path = ContentPath::parse(&format!("/data/{}", cid)).unwrap();

        assert_eq!(path.cid(), &cid);
        assert_eq!(path.as_str(), format!("/data/{}", cid));
    }

    #[test]
    fn test_parse_path_with_suffix() {
        let cid = some_cid();
        let path = ContentPath::parse(&format!("/data/{}/docs/readme.md", cid)).unwrap();

        assert_eq!(path.cid(), &cid);
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let cid = some_cid();
        assert_eq!(
            ContentPath::parse(&format!("/blobs/{}", cid)),
            Err(PathError::MissingPrefix)
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ContentPath::parse(""), Err(PathError::Empty));
        assert_eq!(ContentPath::parse("/data/"), Err(PathError::MissingPrefix));
    }

    #[test]
    fn test_parse_rejects_bad_cid() {
        let result = ContentPath::parse("/data/not-a-cid");
        assert!(matches!(result, Err(PathError::InvalidCid(_))));
    }

    #[test]
    fn test_from_cid_round_trips() {
        let cid = some_cid();
        let path = ContentPath::from_cid(&cid);
        let reparsed = ContentPath::parse(path.as_str()).unwrap();

        assert_eq!(path, reparsed);
    }
}
