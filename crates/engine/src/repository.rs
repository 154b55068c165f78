//! Repository facade
//!
//! Thin coordinator keeping the artifact index and the WARC data store
//! mutually consistent under the add / commit / delete protocols. The
//! facade assigns version numbers, enforces operation ordering, and exposes
//! the enumeration surface of the index.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;
use warcrepo_core::{Artifact, ArtifactData, RepoConfig, RepoError, Result};
use warcrepo_index::{ArtifactIndex, ArtifactIter, StringIter, VolatileArtifactIndex};
use warcrepo_store::{ArtifactDataStore, CommitFuture, StorageInfo, WarcDataStore};

type NameKey = (String, String, String);

/// Versioned web-archival repository over a pluggable index and a
/// pluggable artifact data store.
pub struct WarcRepository {
    index: Arc<dyn ArtifactIndex>,
    store: Arc<dyn ArtifactDataStore>,
    /// Serializes version assignment per (collection, auid, uri) so
    /// concurrent adds of one URL get contiguous versions
    name_locks: Mutex<HashMap<NameKey, Arc<Mutex<()>>>>,
}

impl WarcRepository {
    /// Wire an index and a store together and initialize the store.
    pub fn new(index: Arc<dyn ArtifactIndex>, store: Arc<dyn ArtifactDataStore>) -> Result<Self> {
        store.set_artifact_index(Arc::clone(&index));
        store.init()?;
        Ok(Self {
            index,
            store,
            name_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Open a repository with a volatile index over the WARC data store:
    /// rebuild the index from the WARCs and journals on disk, then
    /// initialize the store.
    pub fn open(config: RepoConfig) -> Result<Self> {
        let store = WarcDataStore::new(config)?;
        let index: Arc<dyn ArtifactIndex> = Arc::new(VolatileArtifactIndex::new());
        store.rebuild_index(&index)?;
        store.init()?;
        let store: Arc<dyn ArtifactDataStore> = store;
        Ok(Self {
            index,
            store,
            name_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying index.
    pub fn index(&self) -> &Arc<dyn ArtifactIndex> {
        &self.index
    }

    /// The underlying data store.
    pub fn store(&self) -> &Arc<dyn ArtifactDataStore> {
        &self.store
    }

    /// Whether both the store and the index are ready to serve.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready() && self.index.is_ready()
    }

    /// Wait for readiness with a deadline, retrying with exponential
    /// backoff capped at one second. Returns whether readiness was reached.
    pub fn wait_until_ready(&self, deadline: Duration) -> bool {
        let start = Instant::now();
        let mut backoff = Duration::from_millis(10);
        loop {
            if self.is_ready() {
                return true;
            }
            if start.elapsed() >= deadline {
                return false;
            }
            std::thread::sleep(backoff.min(deadline.saturating_sub(start.elapsed())));
            backoff = (backoff * 2).min(Duration::from_secs(1));
        }
    }

    /// Stop background machinery (commit workers, GC). Idempotent.
    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    /// Block until every scheduled commit copy has completed.
    pub fn drain_commits(&self) {
        self.store.drain_commits();
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Ingest an artifact: assign the next version for its
    /// `(collection, auid, uri)`, persist it uncommitted into temp storage,
    /// and index it.
    pub fn add_artifact(&self, mut data: ArtifactData) -> Result<Artifact> {
        let identifier = data.identifier().clone();

        let name_lock = {
            let mut locks = self.name_locks.lock();
            locks
                .entry((
                    identifier.collection().to_string(),
                    identifier.auid().to_string(),
                    identifier.uri().to_string(),
                ))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _name_guard = name_lock.lock();

        let version = 1 + self
            .index
            .max_version(
                identifier.collection(),
                identifier.auid(),
                identifier.uri(),
            )
            .unwrap_or(0);
        data.set_identifier(identifier.with_version(version));

        let artifact = self.store.add_artifact_data(&mut data)?;

        if let Err(e) = self.index.index_artifact(&data) {
            // The bytes are unreferenced; GC reclaims them. Do not retry.
            error!(
                target: "warcrepo::repo",
                id = %artifact.id(),
                error = %e,
                "index insert failed after store write; artifact left for GC"
            );
            return Err(e);
        }
        debug!(target: "warcrepo::repo", id = %artifact.id(), version, "artifact added");
        Ok(artifact)
    }

    /// Commit an artifact. Marks it committed in the index and schedules
    /// the copy to permanent storage; the returned future resolves with the
    /// relocated descriptor (`None` when a deletion won the race).
    pub fn commit_artifact(&self, collection: &str, id: Uuid) -> Result<CommitFuture> {
        let artifact = self.lookup(collection, id)?;
        if !artifact.committed() {
            self.index.commit_artifact(id);
        }
        self.store.commit_artifact_data(&artifact)
    }

    /// Delete an artifact: journal the tombstone, then drop it from the
    /// index. Idempotent on repeat.
    pub fn delete_artifact(&self, collection: &str, id: Uuid) -> Result<()> {
        let artifact = self.lookup(collection, id)?;
        self.store.delete_artifact_data(&artifact)?;
        self.index.delete_artifact(id);
        debug!(target: "warcrepo::repo", id = %id, "artifact deleted");
        Ok(())
    }

    fn lookup(&self, collection: &str, id: Uuid) -> Result<Artifact> {
        let artifact = self
            .index
            .get_artifact(id)
            .ok_or_else(|| RepoError::not_found(format!("artifact {}", id)))?;
        if artifact.collection() != collection {
            return Err(RepoError::not_found(format!(
                "artifact {} in collection {}",
                id, collection
            )));
        }
        Ok(artifact)
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// Latest committed version of a URL, if any.
    pub fn get_artifact(&self, collection: &str, auid: &str, uri: &str) -> Option<Artifact> {
        self.index.latest_artifact(collection, auid, uri, false)
    }

    /// A specific version of a URL.
    pub fn get_artifact_version(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Option<Artifact> {
        self.index
            .artifact_version(collection, auid, uri, version, include_uncommitted)
    }

    /// Open an artifact's content (single-consumption payload stream).
    pub fn get_artifact_data(&self, collection: &str, id: Uuid) -> Result<ArtifactData> {
        let artifact = self.lookup(collection, id)?;
        self.store.get_artifact_data(&artifact)
    }

    // ------------------------------------------------------------------
    // Enumeration (delegated to the index)
    // ------------------------------------------------------------------

    /// Collection ids with at least one committed artifact.
    pub fn collection_ids(&self) -> StringIter {
        self.index.collection_ids()
    }

    /// AU ids of a collection with at least one committed artifact.
    pub fn au_ids(&self, collection: &str) -> StringIter {
        self.index.au_ids(collection)
    }

    /// Latest committed version of every URL in an AU.
    pub fn get_artifacts(&self, collection: &str, auid: &str) -> ArtifactIter {
        self.index.latest_artifacts(collection, auid)
    }

    /// All committed versions of one URL in an AU, newest first.
    pub fn get_artifact_all_versions(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
    ) -> ArtifactIter {
        self.index.artifact_versions(collection, auid, uri)
    }

    /// Latest committed version of every URL matching a prefix in an AU.
    pub fn get_artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter {
        self.index
            .latest_artifacts_with_prefix(collection, auid, prefix)
    }

    /// All committed versions of URLs matching a prefix in an AU.
    pub fn get_artifacts_with_prefix_all_versions(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter {
        self.index
            .artifact_versions_with_prefix(collection, auid, prefix)
    }

    /// All committed versions matching a prefix across every AU of a
    /// collection.
    pub fn get_artifacts_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> ArtifactIter {
        self.index
            .artifact_versions_with_prefix_all_aus(collection, prefix)
    }

    /// Sum of content lengths over the latest committed version of each
    /// URL in an AU.
    pub fn au_size(&self, collection: &str, auid: &str) -> u64 {
        self.index.au_size(collection, auid)
    }

    /// Disk usage over the configured base paths.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        self.store.storage_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> WarcRepository {
        let mut config = RepoConfig::new(dir.path());
        config.gc_interval_ms = 3_600_000;
        WarcRepository::open(config).unwrap()
    }

    fn data(uri: &str, body: &[u8]) -> ArtifactData {
        ArtifactData::new(
            "c1",
            "a1",
            uri,
            "HTTP/1.1 200 OK",
            vec![("key1".to_string(), "val1".to_string())],
            body.to_vec(),
        )
    }

    #[test]
    fn test_versions_assigned_sequentially() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);

        let v1 = repo.add_artifact(data("http://h/p", b"one")).unwrap();
        let v2 = repo.add_artifact(data("http://h/p", b"two")).unwrap();
        let v3 = repo.add_artifact(data("http://h/p", b"three")).unwrap();
        assert_eq!(
            (v1.version(), v2.version(), v3.version()),
            (1, 2, 3)
        );
        repo.shutdown();
    }

    #[test]
    fn test_commit_of_unknown_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        let err = repo.commit_artifact("c1", Uuid::new_v4()).unwrap_err();
        assert!(err.is_not_found());
        repo.shutdown();
    }

    #[test]
    fn test_collection_mismatch_is_not_found() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);

        let artifact = repo.add_artifact(data("http://h/p", b"one")).unwrap();
        let err = repo.commit_artifact("other", artifact.id()).unwrap_err();
        assert!(err.is_not_found());
        repo.shutdown();
    }

    #[test]
    fn test_delete_then_re_add_advances_version() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);

        let v1 = repo.add_artifact(data("http://h/p", b"one")).unwrap();
        repo.commit_artifact("c1", v1.id())
            .unwrap()
            .wait()
            .unwrap()
            .unwrap();
        repo.delete_artifact("c1", v1.id()).unwrap();

        let v2 = repo.add_artifact(data("http://h/p", b"xyz")).unwrap();
        assert_eq!(v2.version(), 2);
        repo.shutdown();
    }

    #[test]
    fn test_is_ready_and_wait() {
        let dir = TempDir::new().unwrap();
        let repo = open(&dir);
        assert!(repo.is_ready());
        assert!(repo.wait_until_ready(Duration::from_millis(100)));
        repo.shutdown();
    }
}
