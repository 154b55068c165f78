//! In-memory artifact index.
//!
//! Two structures back the contract:
//! - a sharded id map (`DashMap` + FxHash) for lock-free descriptor reads,
//! - a `BTreeMap` over the naming tuple, ordered (collection, auid, uri,
//!   version descending), which makes every enumeration a range scan.
//!
//! A per-(collection, auid, uri) high-water mark survives deletes so a
//! re-added URL continues its version sequence instead of reusing numbers.

use crate::{ArtifactIndex, ArtifactIter, StringIter};
use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::BuildHasherDefault;
use tracing::debug;
use uuid::Uuid;
use warcrepo_core::{Artifact, ArtifactData, RepoError, Result, StorageUrl};

/// Naming-tuple key: (collection, auid, uri, version descending).
type NamingKey = (String, String, String, Reverse<u32>);

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Volatile, process-local artifact index.
#[derive(Default)]
pub struct VolatileArtifactIndex {
    by_id: FxDashMap<Uuid, Artifact>,
    naming: RwLock<BTreeMap<NamingKey, Uuid>>,
    high_water: RwLock<FxHashMap<(String, String, String), u32>>,
}

impl VolatileArtifactIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed artifacts.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn naming_key(artifact: &Artifact) -> NamingKey {
        (
            artifact.collection().to_string(),
            artifact.auid().to_string(),
            artifact.uri().to_string(),
            Reverse(artifact.version()),
        )
    }

    fn bump_high_water(&self, artifact: &Artifact) {
        let mut marks = self.high_water.write();
        let entry = marks
            .entry((
                artifact.collection().to_string(),
                artifact.auid().to_string(),
                artifact.uri().to_string(),
            ))
            .or_insert(0);
        *entry = (*entry).max(artifact.version());
    }

    fn insert(&self, artifact: Artifact) -> Result<()> {
        let key = Self::naming_key(&artifact);
        {
            let mut naming = self.naming.write();
            if naming.contains_key(&key) {
                return Err(RepoError::invalid_argument(format!(
                    "version {} of {} already indexed",
                    artifact.version(),
                    artifact.uri()
                )));
            }
            naming.insert(key, artifact.id());
        }
        self.bump_high_water(&artifact);
        self.by_id.insert(artifact.id(), artifact);
        Ok(())
    }

    /// Snapshot the naming entries of one AU, optionally bounded to a URI
    /// prefix, in naming order (URL asc, version desc).
    fn au_snapshot(&self, collection: &str, auid: &str, prefix: &str) -> Vec<Uuid> {
        let start: NamingKey = (
            collection.to_string(),
            auid.to_string(),
            prefix.to_string(),
            Reverse(u32::MAX),
        );
        self.naming
            .read()
            .range(start..)
            .take_while(|((c, a, u, _), _)| {
                c == collection && a == auid && u.starts_with(prefix)
            })
            .map(|(_, id)| *id)
            .collect()
    }

    /// Fetch descriptors for ids, dropping entries that vanished between
    /// the snapshot and the fetch.
    fn fetch(&self, ids: Vec<Uuid>) -> Vec<Artifact> {
        ids.into_iter()
            .filter_map(|id| self.by_id.get(&id).map(|a| a.clone()))
            .collect()
    }

    /// Latest committed artifact per URL from a naming-ordered list.
    fn latest_per_uri(artifacts: Vec<Artifact>) -> Vec<Artifact> {
        let mut out: Vec<Artifact> = Vec::new();
        for artifact in artifacts {
            if !artifact.committed() {
                continue;
            }
            if out.last().map(|prev| prev.uri()) == Some(artifact.uri()) {
                // Already have a higher committed version of this URL
                continue;
            }
            out.push(artifact);
        }
        out
    }
}

impl ArtifactIndex for VolatileArtifactIndex {
    fn index_artifact(&self, data: &ArtifactData) -> Result<Artifact> {
        data.identifier().validate()?;
        let storage_url = data
            .storage_url()
            .ok_or_else(|| RepoError::invalid_argument("artifact data has no storage URL"))?
            .clone();
        let content_length = data
            .content_length()
            .ok_or_else(|| RepoError::invalid_argument("artifact data has no content length"))?;
        let content_digest = data
            .content_digest()
            .ok_or_else(|| RepoError::invalid_argument("artifact data has no content digest"))?
            .to_string();

        let artifact = Artifact::new(
            data.identifier().clone(),
            false,
            storage_url,
            content_length,
            content_digest,
            data.origin_date(),
        );
        self.insert(artifact.clone())?;
        debug!(target: "warcrepo::index", id = %artifact.id(), uri = artifact.uri(), "indexed artifact");
        Ok(artifact)
    }

    fn restore_artifact(&self, artifact: Artifact) -> Result<()> {
        self.insert(artifact)
    }

    fn get_artifact(&self, id: Uuid) -> Option<Artifact> {
        self.by_id.get(&id).map(|a| a.clone())
    }

    fn commit_artifact(&self, id: Uuid) -> Option<Artifact> {
        let mut entry = self.by_id.get_mut(&id)?;
        entry.set_committed(true);
        Some(entry.clone())
    }

    fn delete_artifact(&self, id: Uuid) -> bool {
        let Some((_, artifact)) = self.by_id.remove(&id) else {
            return false;
        };
        self.naming.write().remove(&Self::naming_key(&artifact));
        true
    }

    fn update_storage_url(&self, id: Uuid, url: &StorageUrl) -> Result<Artifact> {
        let mut entry = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| RepoError::not_found(format!("artifact {}", id)))?;
        entry.set_storage_url(url.clone());
        Ok(entry.clone())
    }

    fn collection_ids(&self) -> StringIter {
        let ids: Vec<Uuid> = self.naming.read().values().copied().collect();
        let collections: BTreeSet<String> = self
            .fetch(ids)
            .into_iter()
            .filter(|a| a.committed())
            .map(|a| a.collection().to_string())
            .collect();
        Box::new(collections.into_iter())
    }

    fn au_ids(&self, collection: &str) -> StringIter {
        let collection = collection.to_string();
        let ids: Vec<Uuid> = self.naming.read().values().copied().collect();
        let aus: BTreeSet<String> = self
            .fetch(ids)
            .into_iter()
            .filter(|a| a.committed() && a.collection() == collection)
            .map(|a| a.auid().to_string())
            .collect();
        Box::new(aus.into_iter())
    }

    fn latest_artifacts(&self, collection: &str, auid: &str) -> ArtifactIter {
        let artifacts = self.fetch(self.au_snapshot(collection, auid, ""));
        Box::new(Self::latest_per_uri(artifacts).into_iter())
    }

    fn artifact_versions(&self, collection: &str, auid: &str, uri: &str) -> ArtifactIter {
        let uri = uri.to_string();
        let artifacts = self.fetch(self.au_snapshot(collection, auid, &uri));
        Box::new(
            artifacts
                .into_iter()
                .filter(move |a| a.uri() == uri && a.committed()),
        )
    }

    fn latest_artifacts_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter {
        let artifacts = self.fetch(self.au_snapshot(collection, auid, prefix));
        Box::new(Self::latest_per_uri(artifacts).into_iter())
    }

    fn artifact_versions_with_prefix(
        &self,
        collection: &str,
        auid: &str,
        prefix: &str,
    ) -> ArtifactIter {
        let artifacts = self.fetch(self.au_snapshot(collection, auid, prefix));
        Box::new(artifacts.into_iter().filter(|a| a.committed()))
    }

    fn artifact_versions_with_prefix_all_aus(
        &self,
        collection: &str,
        prefix: &str,
    ) -> ArtifactIter {
        let collection = collection.to_string();
        let prefix = prefix.to_string();
        let ids: Vec<Uuid> = self.naming.read().values().copied().collect();
        let mut artifacts: Vec<Artifact> = self
            .fetch(ids)
            .into_iter()
            .filter(|a| {
                a.committed() && a.collection() == collection && a.uri().starts_with(&prefix)
            })
            .collect();
        // URL asc, origin date asc, AU id asc, version desc
        artifacts.sort_by(|x, y| {
            x.uri()
                .cmp(y.uri())
                .then(x.collection_date().cmp(&y.collection_date()))
                .then(x.auid().cmp(y.auid()))
                .then(y.version().cmp(&x.version()))
        });
        Box::new(artifacts.into_iter())
    }

    fn latest_artifact(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
        include_uncommitted: bool,
    ) -> Option<Artifact> {
        let artifacts = self.fetch(self.au_snapshot(collection, auid, uri));
        artifacts
            .into_iter()
            .find(|a| a.uri() == uri && (include_uncommitted || a.committed()))
    }

    fn artifact_version(
        &self,
        collection: &str,
        auid: &str,
        uri: &str,
        version: u32,
        include_uncommitted: bool,
    ) -> Option<Artifact> {
        let key: NamingKey = (
            collection.to_string(),
            auid.to_string(),
            uri.to_string(),
            Reverse(version),
        );
        let id = *self.naming.read().get(&key)?;
        self.get_artifact(id)
            .filter(|a| include_uncommitted || a.committed())
    }

    fn max_version(&self, collection: &str, auid: &str, uri: &str) -> Option<u32> {
        self.high_water
            .read()
            .get(&(
                collection.to_string(),
                auid.to_string(),
                uri.to_string(),
            ))
            .copied()
    }

    fn au_size(&self, collection: &str, auid: &str) -> u64 {
        let artifacts = self.fetch(self.au_snapshot(collection, auid, ""));
        Self::latest_per_uri(artifacts)
            .iter()
            .map(|a| a.content_length())
            .sum()
    }
}
