//! # warcrepo
//!
//! A versioned web-archival repository for preserving crawled web
//! resources. Artifacts (captured HTTP responses) are ingested into
//! append-only WARC container files, promoted from temporary to permanent
//! storage on commit, and indexed for lookup by collection, Archival Unit,
//! URL and version.
//!
//! # Quick Start
//!
//! ```no_run
//! use warcrepo::{ArtifactData, RepoConfig, WarcRepository};
//!
//! fn main() -> warcrepo::Result<()> {
//!     let repo = WarcRepository::open(RepoConfig::new("./repo-data"))?;
//!
//!     let data = ArtifactData::new(
//!         "collection",
//!         "auid",
//!         "http://example.com/page",
//!         "HTTP/1.1 200 OK",
//!         vec![("Content-Type".to_string(), "text/html".to_string())],
//!         b"<html>...</html>".to_vec(),
//!     );
//!
//!     let artifact = repo.add_artifact(data)?;
//!     let committed = repo.commit_artifact("collection", artifact.id())?.wait()?;
//!     assert!(committed.unwrap().committed());
//!
//!     let latest = repo.get_artifact("collection", "auid", "http://example.com/page");
//!     assert!(latest.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! [`WarcRepository`] is the entry point; it coordinates an
//! [`ArtifactIndex`] (pluggable; a volatile in-memory implementation is
//! provided) with the [`WarcDataStore`] (append-only WARC storage, commit
//! copy pool, restart recovery, temp-WARC garbage collection).

pub use warcrepo_core::{
    Artifact, ArtifactData, ArtifactIdentifier, ArtifactState, Payload, RepoConfig, RepoError,
    RepositoryArtifactMetadata, Result, StorageUrl,
};
pub use warcrepo_engine::WarcRepository;
pub use warcrepo_index::{ArtifactIndex, ArtifactIter, StringIter, VolatileArtifactIndex};
pub use warcrepo_store::{ArtifactDataStore, CommitFuture, StorageInfo, WarcDataStore};
