//! Artifact index contract and the in-memory implementation
//!
//! The index gives name→artifact resolution, AU enumeration, URL-prefix
//! scans and per-(collection, auid, uri) version ordering over artifact
//! descriptors. Implementations may be a volatile map (provided here), an
//! inverted-index search engine, or a B-tree file; the repository facade
//! consumes the trait only.

pub mod volatile;

pub use volatile::VolatileArtifactIndex;

use uuid::Uuid;
use warcrepo_core::{Artifact, ArtifactData, Result, StorageUrl};

/// Lazy, finite, non-restartable enumeration of artifacts.
pub type ArtifactIter = Box<dyn Iterator<Item = Artifact> + Send>;

/// Lazy, finite, non-restartable enumeration of identifiers.
pub type StringIter = Box<dyn Iterator<Item = String> + Send>;

/// Lookup and enumeration over artifact descriptors.
///
/// Implementations must offer linearizable single-key operations and
/// snapshot-consistent enumeration; the facade relies on this.
///
/// Ordering contract for enumerations: within an AU, results are sorted by
/// URL ascending, then version descending. Across all AUs of a collection,
/// results are sorted by URL ascending, then origin date ascending, then
/// AU id ascending, then version descending. Enumerations skip uncommitted
/// entries unless stated otherwise.
pub trait ArtifactIndex: Send + Sync {
    /// Insert an uncommitted descriptor built from persisted artifact data.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the data has not been persisted yet (no
    /// storage URL / content length / digest).
    fn index_artifact(&self, data: &ArtifactData) -> Result<Artifact>;

    /// Re-insert a descriptor wholesale (rebuild path).
    fn restore_artifact(&self, artifact: Artifact) -> Result<()>;

    /// Resolve an artifact by id.
    fn get_artifact(&self, id: Uuid) -> Option<Artifact>;

    /// Mark an artifact committed; returns the updated descriptor.
    fn commit_artifact(&self, id: Uuid) -> Option<Artifact>;

    /// Remove an artifact. Returns whether it was present.
    fn delete_artifact(&self, id: Uuid) -> bool;

    /// Repoint an artifact at a new storage location.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is not indexed.
    fn update_storage_url(&self, id: Uuid, url: &StorageUrl) -> Result<Artifact>;

    /// Collection ids having at least one committed artifact.
    fn collection_ids(&self) -> StringIter;

    /// AU ids within a collection having at least one committed artifact.
    fn au_ids(&self, collection: &str) -> StringIter;

    /// Latest committed version of every URL in an AU.
    fn latest_artifacts(&self, collection: &str, auid: &str) -> ArtifactIter;

    /// All committed versions of one URL in an AU, newest first.
    fn artifact_versions(&self, collection: &str, auid: &str, uri: &str) -> ArtifactIter;

    /// Latest committed version of every URL matching a prefix in an AU.
    fn latest_artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter;

    /// All committed versions of every URL matching a prefix in an AU.
    fn artifact_versions_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter;

    /// All committed versions matching a prefix across every AU of a
    /// collection (all-AUs ordering).
    fn artifact_versions_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> ArtifactIter;

    /// Latest committed version of one URL, or latest of any commit state
    /// when `include_uncommitted` is set.
    fn latest_artifact(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
        include_uncommitted: bool,
    ) -> Option<Artifact>;

    /// A specific version of one URL.
    fn artifact_version(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Option<Artifact>;

    /// Highest version ever assigned for a URL, deleted versions included.
    /// Backs the facade's version assignment.
    fn max_version(&self, collection: &str, auid: &str, uri: &str) -> Option<u32>;

    /// Sum of `content_length` over the latest committed version of each
    /// URL in the AU.
    fn au_size(&self, collection: &str, auid: &str) -> u64;

    /// Whether the index is ready to serve.
    fn is_ready(&self) -> bool {
        true
    }
}
