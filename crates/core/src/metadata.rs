//! Repository metadata and the artifact state machine
//!
//! Every artifact has exactly one authoritative `{committed, deleted}`
//! state, derived by replaying the per-AU journal (last entry for a given
//! id wins). The lifecycle is
//!
//! `NOT_INDEXED → UNCOMMITTED → COMMITTED → COPIED`
//!
//! with the orthogonal terminal states `EXPIRED` (uncommitted past TTL) and
//! `DELETED` (tombstoned in the journal).

use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// One journaled state record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryArtifactMetadata {
    artifact_id: Uuid,
    committed: bool,
    deleted: bool,
    /// Permanent location confirmation written after the commit copy
    storage_url: Option<String>,
}

impl RepositoryArtifactMetadata {
    /// Build an arbitrary state record.
    pub fn new(artifact_id: Uuid, committed: bool, deleted: bool) -> Self {
        Self {
            artifact_id,
            committed,
            deleted,
            storage_url: None,
        }
    }

    /// Record for a freshly committed artifact (copy not yet durable).
    pub fn committed(artifact_id: Uuid) -> Self {
        Self::new(artifact_id, true, false)
    }

    /// Record confirming the permanent location after the copy.
    pub fn copied(artifact_id: Uuid, storage_url: impl Into<String>) -> Self {
        Self {
            artifact_id,
            committed: true,
            deleted: false,
            storage_url: Some(storage_url.into()),
        }
    }

    /// Tombstone record.
    pub fn deleted(artifact_id: Uuid) -> Self {
        Self::new(artifact_id, false, true)
    }

    /// The artifact this record describes.
    pub fn artifact_id(&self) -> Uuid {
        self.artifact_id
    }

    /// Whether the artifact is committed.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Whether the artifact is tombstoned.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Confirmed permanent storage URL, if the copy completed.
    pub fn storage_url(&self) -> Option<&str> {
        self.storage_url.as_deref()
    }
}

/// Fold journal records in file order into the authoritative per-id state.
///
/// Last record wins outright; a later record without a storage URL
/// supersedes an earlier confirmation.
pub fn fold_journal<I>(records: I) -> HashMap<Uuid, RepositoryArtifactMetadata>
where
    I: IntoIterator<Item = RepositoryArtifactMetadata>,
{
    let mut out = HashMap::new();
    for record in records {
        out.insert(record.artifact_id(), record);
    }
    out
}

/// Where an artifact is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    /// Record exists on disk but the index has never seen it
    NotIndexed,
    /// Indexed, not yet committed
    Uncommitted,
    /// Uncommitted past the configured TTL
    Expired,
    /// Committed, record still only in temporary storage
    Committed,
    /// Committed and durable in permanent storage
    Copied,
    /// Tombstoned in the journal
    Deleted,
}

impl ArtifactState {
    /// Whether a temp WARC containing only records in this state may be
    /// reclaimed.
    pub fn is_reclaimable(self) -> bool {
        matches!(
            self,
            ArtifactState::Copied | ArtifactState::Expired | ArtifactState::Deleted
        )
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactState::NotIndexed => "NOT_INDEXED",
            ArtifactState::Uncommitted => "UNCOMMITTED",
            ArtifactState::Expired => "EXPIRED",
            ArtifactState::Committed => "COMMITTED",
            ArtifactState::Copied => "COPIED",
            ArtifactState::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let id = Uuid::new_v4();

        let committed = RepositoryArtifactMetadata::committed(id);
        assert!(committed.is_committed());
        assert!(!committed.is_deleted());
        assert!(committed.storage_url().is_none());

        let copied = RepositoryArtifactMetadata::copied(id, "file:///x.warc?offset=0&length=1");
        assert!(copied.is_committed());
        assert_eq!(
            copied.storage_url(),
            Some("file:///x.warc?offset=0&length=1")
        );

        let deleted = RepositoryArtifactMetadata::deleted(id);
        assert!(deleted.is_deleted());
        assert!(!deleted.is_committed());
    }

    #[test]
    fn test_fold_last_entry_wins() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        let folded = fold_journal(vec![
            RepositoryArtifactMetadata::committed(id),
            RepositoryArtifactMetadata::committed(other),
            RepositoryArtifactMetadata::deleted(id),
        ]);

        assert_eq!(folded.len(), 2);
        assert!(folded[&id].is_deleted());
        assert!(folded[&other].is_committed());
    }

    #[test]
    fn test_reclaimable_states() {
        assert!(ArtifactState::Copied.is_reclaimable());
        assert!(ArtifactState::Expired.is_reclaimable());
        assert!(ArtifactState::Deleted.is_reclaimable());
        assert!(!ArtifactState::Uncommitted.is_reclaimable());
        assert!(!ArtifactState::Committed.is_reclaimable());
        assert!(!ArtifactState::NotIndexed.is_reclaimable());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ArtifactState::NotIndexed.to_string(), "NOT_INDEXED");
        assert_eq!(ArtifactState::Copied.to_string(), "COPIED");
    }
}
