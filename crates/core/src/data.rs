//! Ingestible/readable artifact data
//!
//! `ArtifactData` carries one captured HTTP response: the identifier, the
//! response status line and headers, and the payload. The payload is a
//! single-consumption sequence of bytes; taking it twice fails with
//! `StreamAlreadyConsumed`.

use crate::artifact::ArtifactIdentifier;
use crate::error::{RepoError, Result};
use crate::storage_url::StorageUrl;
use chrono::{DateTime, Utc};
use std::io::Read;

/// One-shot artifact payload.
///
/// `Bytes` holds an in-memory body (ingest side); `Stream` holds a bounded
/// reader over an open WARC file (read side). Either way the payload can be
/// taken exactly once.
pub enum Payload {
    /// In-memory body bytes
    Bytes(Vec<u8>),
    /// Length-bounded reader positioned at the body's first byte
    Stream(Box<dyn Read + Send>),
}

impl Payload {
    /// Drain the payload into a byte vector.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Payload::Bytes(b) => Ok(b),
            Payload::Stream(mut r) => {
                let mut out = Vec::new();
                r.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes(b) => write!(f, "Payload::Bytes({} bytes)", b.len()),
            Payload::Stream(_) => write!(f, "Payload::Stream"),
        }
    }
}

/// An artifact on its way into or out of the store.
#[derive(Debug)]
pub struct ArtifactData {
    identifier: ArtifactIdentifier,
    status_line: String,
    headers: Vec<(String, String)>,
    payload: Option<Payload>,
    content_length: Option<u64>,
    content_digest: Option<String>,
    origin_date: DateTime<Utc>,
    storage_url: Option<StorageUrl>,
}

impl ArtifactData {
    /// Build artifact data for ingest. A fresh UUID is assigned; the
    /// version starts unassigned (`0`) and is stamped by the repository.
    pub fn new(
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        status_line: impl Into<String>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            identifier: ArtifactIdentifier::new(collection, auid, uri, 0),
            status_line: status_line.into(),
            headers,
            payload: Some(Payload::Bytes(body)),
            content_length: None,
            content_digest: None,
            origin_date: Utc::now(),
            storage_url: None,
        }
    }

    /// Reassemble artifact data read back from a WARC record.
    #[allow(clippy::too_many_arguments)]
    pub fn from_record(
        identifier: ArtifactIdentifier,
        status_line: impl Into<String>,
        headers: Vec<(String, String)>,
        payload: Payload,
        content_length: u64,
        content_digest: impl Into<String>,
        origin_date: DateTime<Utc>,
        storage_url: StorageUrl,
    ) -> Self {
        Self {
            identifier,
            status_line: status_line.into(),
            headers,
            payload: Some(payload),
            content_length: Some(content_length),
            content_digest: Some(content_digest.into()),
            origin_date,
            storage_url: Some(storage_url),
        }
    }

    /// The identity tuple.
    pub fn identifier(&self) -> &ArtifactIdentifier {
        &self.identifier
    }

    /// Replace the identifier (the facade stamps the assigned version).
    pub fn set_identifier(&mut self, identifier: ArtifactIdentifier) {
        self.identifier = identifier;
    }

    /// HTTP status line, e.g. `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// HTTP response headers, in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Take the payload. Second call fails with `StreamAlreadyConsumed`.
    pub fn take_payload(&mut self) -> Result<Payload> {
        self.payload.take().ok_or(RepoError::StreamAlreadyConsumed)
    }

    /// Whether the payload is still available.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Payload length, known once persisted or parsed.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Record the derived payload length.
    pub fn set_content_length(&mut self, len: u64) {
        self.content_length = Some(len);
    }

    /// Payload digest (`algorithm:hex`), known once persisted or parsed.
    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    /// Record the derived payload digest.
    pub fn set_content_digest(&mut self, digest: impl Into<String>) {
        self.content_digest = Some(digest.into());
    }

    /// Wall-clock time of ingest.
    pub fn origin_date(&self) -> DateTime<Utc> {
        self.origin_date
    }

    /// Override the origin date (used when re-reading persisted records).
    pub fn set_origin_date(&mut self, date: DateTime<Utc>) {
        self.origin_date = date;
    }

    /// Where the artifact was persisted, once it has been.
    pub fn storage_url(&self) -> Option<&StorageUrl> {
        self.storage_url.as_ref()
    }

    /// Record the storage location.
    pub fn set_storage_url(&mut self, url: StorageUrl) {
        self.storage_url = Some(url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArtifactData {
        ArtifactData::new(
            "c1",
            "a1",
            "http://h/p",
            "HTTP/1.1 200 OK",
            vec![("key1".to_string(), "val1".to_string())],
            b"content string 1".to_vec(),
        )
    }

    #[test]
    fn test_new_assigns_fresh_id_without_version() {
        let data = sample();
        assert!(!data.identifier().has_version());
        assert_eq!(data.identifier().collection(), "c1");
        assert!(data.has_payload());
        assert!(data.storage_url().is_none());
    }

    #[test]
    fn test_payload_single_consumption() {
        let mut data = sample();
        let payload = data.take_payload().unwrap();
        assert_eq!(payload.into_bytes().unwrap(), b"content string 1");

        let second = data.take_payload();
        assert!(matches!(second, Err(RepoError::StreamAlreadyConsumed)));
        assert!(!data.has_payload());
    }

    #[test]
    fn test_stream_payload_drains_reader() {
        let reader: Box<dyn Read + Send> = Box::new(std::io::Cursor::new(b"xyz".to_vec()));
        let payload = Payload::Stream(reader);
        assert_eq!(payload.into_bytes().unwrap(), b"xyz");
    }

    #[test]
    fn test_derived_fields() {
        let mut data = sample();
        data.set_content_length(16);
        data.set_content_digest("sha256:aa");
        assert_eq!(data.content_length(), Some(16));
        assert_eq!(data.content_digest(), Some("sha256:aa"));
    }
}
