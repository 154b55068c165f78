//! Artifact identity and descriptor types
//!
//! - `ArtifactIdentifier`: the identity tuple (id, collection, auid, uri,
//!   version). The `id` is a UUID assigned on first ingest and immutable
//!   afterwards; the naming tuple is (collection, auid, uri, version).
//! - `Artifact`: the index-side record returned by lookups, carrying the
//!   committed flag, storage URL, content length/digest and collection date.

use crate::error::{RepoError, Result};
use crate::storage_url::StorageUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity tuple for one artifact: `(id, collection, auid, uri, version)`.
///
/// `version` is a strictly positive integer assigned by the repository
/// facade; `0` means "not yet assigned" and is rejected by the data store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactIdentifier {
    id: Uuid,
    collection: String,
    auid: String,
    uri: String,
    version: u32,
}

impl ArtifactIdentifier {
    /// Create an identifier with a fresh UUID.
    pub fn new(
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        version: u32,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), collection, auid, uri, version)
    }

    /// Create an identifier with a caller-supplied UUID (used when
    /// reconstructing identifiers from WARC record headers).
    pub fn with_id(
        id: Uuid,
        collection: impl Into<String>,
        auid: impl Into<String>,
        uri: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            id,
            collection: collection.into(),
            auid: auid.into(),
            uri: uri.into(),
            version,
        }
    }

    /// The immutable artifact id; primary index key.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Top-level namespace this artifact belongs to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Archival Unit identifier.
    pub fn auid(&self) -> &str {
        &self.auid
    }

    /// The captured URL.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Version within `(collection, auid, uri)`; `0` if unassigned.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether a version has been assigned yet.
    pub fn has_version(&self) -> bool {
        self.version > 0
    }

    /// Return a copy with the version stamped on.
    pub fn with_version(&self, version: u32) -> Self {
        let mut out = self.clone();
        out.version = version;
        out
    }

    /// Validate the identifier for ingest: every component of the naming
    /// tuple must be present and the version assigned.
    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(RepoError::invalid_argument("empty collection id"));
        }
        if self.auid.is_empty() {
            return Err(RepoError::invalid_argument("empty AU id"));
        }
        if self.uri.is_empty() {
            return Err(RepoError::invalid_argument("empty URI"));
        }
        if self.version == 0 {
            return Err(RepoError::invalid_argument(
                "artifact version has not been assigned",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, v{}]",
            self.id, self.collection, self.auid, self.uri, self.version
        )
    }
}

/// The index-side artifact descriptor.
///
/// This is the object the index stores and returns: identity plus the
/// committed flag, the storage URL pointing into a WARC file, the payload
/// length and digest, and the wall-clock ingest date.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    identifier: ArtifactIdentifier,
    committed: bool,
    storage_url: StorageUrl,
    content_length: u64,
    content_digest: String,
    collection_date: DateTime<Utc>,
}

impl Artifact {
    /// Build a descriptor.
    pub fn new(
        identifier: ArtifactIdentifier,
        committed: bool,
        storage_url: StorageUrl,
        content_length: u64,
        content_digest: impl Into<String>,
        collection_date: DateTime<Utc>,
    ) -> Self {
        Self {
            identifier,
            committed,
            storage_url,
            content_length,
            content_digest: content_digest.into(),
            collection_date,
        }
    }

    /// The identity tuple.
    pub fn identifier(&self) -> &ArtifactIdentifier {
        &self.identifier
    }

    /// Shorthand for `identifier().id()`.
    pub fn id(&self) -> Uuid {
        self.identifier.id()
    }

    /// Shorthand for `identifier().collection()`.
    pub fn collection(&self) -> &str {
        self.identifier.collection()
    }

    /// Shorthand for `identifier().auid()`.
    pub fn auid(&self) -> &str {
        self.identifier.auid()
    }

    /// Shorthand for `identifier().uri()`.
    pub fn uri(&self) -> &str {
        self.identifier.uri()
    }

    /// Shorthand for `identifier().version()`.
    pub fn version(&self) -> u32 {
        self.identifier.version()
    }

    /// Whether the artifact has been committed.
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Set the committed flag.
    pub fn set_committed(&mut self, committed: bool) {
        self.committed = committed;
    }

    /// Where the artifact's WARC record lives.
    pub fn storage_url(&self) -> &StorageUrl {
        &self.storage_url
    }

    /// Repoint the descriptor at a new WARC location (temp → permanent).
    pub fn set_storage_url(&mut self, url: StorageUrl) {
        self.storage_url = url;
    }

    /// Payload length in bytes.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Payload digest, `algorithm:hex`.
    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    /// Wall-clock time of ingest.
    pub fn collection_date(&self) -> DateTime<Utc> {
        self.collection_date
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Artifact{} committed={} at {}",
            self.identifier, self.committed, self.storage_url
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identifier() -> ArtifactIdentifier {
        ArtifactIdentifier::new("coll", "au1", "http://h/p", 1)
    }

    #[test]
    fn test_identifier_accessors() {
        let id = test_identifier();
        assert_eq!(id.collection(), "coll");
        assert_eq!(id.auid(), "au1");
        assert_eq!(id.uri(), "http://h/p");
        assert_eq!(id.version(), 1);
        assert!(id.has_version());
    }

    #[test]
    fn test_with_version_keeps_id() {
        let id = ArtifactIdentifier::new("c", "a", "u", 0);
        assert!(!id.has_version());
        let stamped = id.with_version(3);
        assert_eq!(stamped.version(), 3);
        assert_eq!(stamped.id(), id.id());
    }

    #[test]
    fn test_validate_rejects_empty_components() {
        assert!(ArtifactIdentifier::new("", "a", "u", 1).validate().is_err());
        assert!(ArtifactIdentifier::new("c", "", "u", 1).validate().is_err());
        assert!(ArtifactIdentifier::new("c", "a", "", 1).validate().is_err());
        assert!(ArtifactIdentifier::new("c", "a", "u", 0).validate().is_err());
        assert!(ArtifactIdentifier::new("c", "a", "u", 1).validate().is_ok());
    }

    #[test]
    fn test_artifact_mutators() {
        let url = StorageUrl::parse("file:///tmp/a.warc?offset=0&length=10").unwrap();
        let mut artifact = Artifact::new(
            test_identifier(),
            false,
            url,
            10,
            "sha256:00",
            Utc::now(),
        );
        assert!(!artifact.committed());

        artifact.set_committed(true);
        assert!(artifact.committed());

        let permanent =
            StorageUrl::parse("file:///data/collections/c/au-x/artifacts.warc?offset=42&length=10")
                .unwrap();
        artifact.set_storage_url(permanent.clone());
        assert_eq!(artifact.storage_url(), &permanent);
    }

    #[test]
    fn test_identifier_display_contains_tuple() {
        let id = test_identifier();
        let s = id.to_string();
        assert!(s.contains("coll"));
        assert!(s.contains("au1"));
        assert!(s.contains("http://h/p"));
        assert!(s.contains("v1"));
    }
}
