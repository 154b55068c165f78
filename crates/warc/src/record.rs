//! WARC record model: header names, record types, parsed header maps.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use warcrepo_core::{ArtifactIdentifier, RepoError};

/// Version line emitted at the head of every record.
pub const WARC_VERSION: &str = "WARC/1.0";

/// Record header names, bit-exact as persisted.
pub mod header {
    /// Unique record id, `<urn:uuid:...>`.
    pub const WARC_RECORD_ID: &str = "WARC-Record-ID";
    /// Record type: `warcinfo`, `response` or `metadata`.
    pub const WARC_TYPE: &str = "WARC-Type";
    /// ISO-8601 UTC creation date.
    pub const WARC_DATE: &str = "WARC-Date";
    /// Payload content type.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// Payload length in bytes.
    pub const CONTENT_LENGTH: &str = "Content-Length";
    /// Repository artifact id.
    pub const X_LOCKSS_ARTIFACT_ID: &str = "X-Lockss-Artifact-Id";
    /// Repository collection.
    pub const X_LOCKSS_COLLECTION: &str = "X-Lockss-Collection";
    /// Archival Unit id.
    pub const X_LOCKSS_AUID: &str = "X-Lockss-Auid";
    /// Captured URL.
    pub const X_LOCKSS_URI: &str = "X-Lockss-Uri";
    /// Artifact version within (collection, auid, uri).
    pub const X_LOCKSS_VERSION: &str = "X-Lockss-Version";
    /// HTTP body length in bytes.
    pub const X_LOCKSS_LENGTH: &str = "X-Lockss-Length";
}

/// Content type of artifact record payloads.
pub const CONTENT_TYPE_HTTP_RESPONSE: &str = "application/http; msgtype=response";

/// Content type of warcinfo and journal record payloads.
pub const CONTENT_TYPE_WARC_FIELDS: &str = "application/warc-fields";

/// WARC record types used by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarcRecordType {
    /// File-head record describing the WARC itself
    Warcinfo,
    /// One captured HTTP response
    Response,
    /// Repository journal record
    Metadata,
}

impl fmt::Display for WarcRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarcRecordType::Warcinfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Metadata => "metadata",
        };
        f.write_str(s)
    }
}

impl FromStr for WarcRecordType {
    type Err = WarcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warcinfo" => Ok(WarcRecordType::Warcinfo),
            "response" => Ok(WarcRecordType::Response),
            "metadata" => Ok(WarcRecordType::Metadata),
            other => Err(WarcError::Malformed(format!(
                "unknown WARC-Type '{}'",
                other
            ))),
        }
    }
}

/// Codec errors.
#[derive(Debug, Error)]
pub enum WarcError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing is broken (headers absent, bad Content-Length, ...)
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Clean EOF in the middle of a record (torn tail after a crash)
    #[error("truncated record at end of file")]
    Truncated,
}

impl WarcError {
    /// Lift into the repository error type, attaching file context.
    pub fn into_repo(self, context: impl Into<String>) -> RepoError {
        match self {
            WarcError::Io(e) => RepoError::Io(e),
            WarcError::Malformed(detail) => RepoError::malformed(context, detail),
            WarcError::Truncated => RepoError::malformed(context, "truncated record"),
        }
    }
}

/// Result alias for codec operations.
pub type WarcResult<T> = Result<T, WarcError>;

/// Parsed record headers.
///
/// Lookup is case-insensitive (names are folded to upper case on insert);
/// writers emit headers from explicit name/value lists instead, so the
/// persisted spelling is exact.
#[derive(Debug, Clone, Default)]
pub struct WarcHeaders {
    map: BTreeMap<String, String>,
}

impl WarcHeaders {
    /// Empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header (name folded for lookup).
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(name.to_ascii_uppercase(), value.into());
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_uppercase()).map(|s| s.as_str())
    }

    /// Required header lookup.
    pub fn require(&self, name: &str) -> WarcResult<&str> {
        self.get(name)
            .ok_or_else(|| WarcError::Malformed(format!("missing {} header", name)))
    }

    /// The record type.
    pub fn record_type(&self) -> WarcResult<WarcRecordType> {
        self.require(header::WARC_TYPE)?.parse()
    }

    /// The declared payload length.
    pub fn content_length(&self) -> WarcResult<u64> {
        self.require(header::CONTENT_LENGTH)?
            .parse::<u64>()
            .map_err(|_| WarcError::Malformed("Content-Length is not a u64".to_string()))
    }

    /// The record date.
    pub fn warc_date(&self) -> WarcResult<DateTime<Utc>> {
        let raw = self.require(header::WARC_DATE)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| WarcError::Malformed(format!("bad WARC-Date '{}': {}", raw, e)))
    }

    /// Reconstruct the artifact identifier from the `X-Lockss-*` headers.
    pub fn artifact_identifier(&self) -> WarcResult<ArtifactIdentifier> {
        let id = Uuid::parse_str(self.require(header::X_LOCKSS_ARTIFACT_ID)?)
            .map_err(|e| WarcError::Malformed(format!("bad artifact id: {}", e)))?;
        let version = self
            .require(header::X_LOCKSS_VERSION)?
            .parse::<u32>()
            .map_err(|_| WarcError::Malformed("bad X-Lockss-Version".to_string()))?;
        Ok(ArtifactIdentifier::with_id(
            id,
            self.require(header::X_LOCKSS_COLLECTION)?,
            self.require(header::X_LOCKSS_AUID)?,
            self.require(header::X_LOCKSS_URI)?,
            version,
        ))
    }

    /// The declared HTTP body length for artifact records.
    pub fn artifact_body_length(&self) -> WarcResult<u64> {
        self.require(header::X_LOCKSS_LENGTH)?
            .parse::<u64>()
            .map_err(|_| WarcError::Malformed("bad X-Lockss-Length".to_string()))
    }

    /// Whether this is an artifact (`response`) record.
    pub fn is_artifact(&self) -> bool {
        matches!(self.record_type(), Ok(WarcRecordType::Response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = WarcHeaders::new();
        headers.insert("Content-Length", "42");
        assert_eq!(headers.get("content-length"), Some("42"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("42"));
        assert_eq!(headers.content_length().unwrap(), 42);
    }

    #[test]
    fn test_missing_header_is_malformed() {
        let headers = WarcHeaders::new();
        assert!(matches!(
            headers.content_length(),
            Err(WarcError::Malformed(_))
        ));
    }

    #[test]
    fn test_record_type_round_trip() {
        for t in [
            WarcRecordType::Warcinfo,
            WarcRecordType::Response,
            WarcRecordType::Metadata,
        ] {
            assert_eq!(t.to_string().parse::<WarcRecordType>().unwrap(), t);
        }
        assert!("request".parse::<WarcRecordType>().is_err());
    }

    #[test]
    fn test_artifact_identifier_from_headers() {
        let id = Uuid::new_v4();
        let mut headers = WarcHeaders::new();
        headers.insert(header::X_LOCKSS_ARTIFACT_ID, id.to_string());
        headers.insert(header::X_LOCKSS_COLLECTION, "c1");
        headers.insert(header::X_LOCKSS_AUID, "a1");
        headers.insert(header::X_LOCKSS_URI, "http://h/p");
        headers.insert(header::X_LOCKSS_VERSION, "3");

        let ident = headers.artifact_identifier().unwrap();
        assert_eq!(ident.id(), id);
        assert_eq!(ident.collection(), "c1");
        assert_eq!(ident.version(), 3);
    }

    #[test]
    fn test_bad_warc_date() {
        let mut headers = WarcHeaders::new();
        headers.insert(header::WARC_DATE, "not-a-date");
        assert!(headers.warc_date().is_err());

        let mut headers = WarcHeaders::new();
        headers.insert(header::WARC_DATE, "2024-03-01T12:00:00Z");
        assert_eq!(
            headers.warc_date().unwrap().to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
    }
}
