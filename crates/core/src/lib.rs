//! Core types for the warcrepo repository
//!
//! This crate defines the foundational types used throughout the system:
//! - ArtifactIdentifier: identity tuple (id, collection, auid, uri, version)
//! - Artifact: the index-side descriptor of a stored artifact
//! - ArtifactData: an ingestible/readable artifact with a single-use payload
//! - RepositoryArtifactMetadata: the journaled committed/deleted state
//! - StorageUrl: opaque pointer to a record within a WARC file
//! - RepoError: error type hierarchy
//! - RepoConfig: repository configuration (`warcrepo.toml`)

pub mod artifact;
pub mod config;
pub mod data;
pub mod digest;
pub mod error;
pub mod metadata;
pub mod storage_url;

pub use artifact::{Artifact, ArtifactIdentifier};
pub use config::{RepoConfig, CONFIG_FILE_NAME};
pub use data::{ArtifactData, Payload};
pub use digest::{sha256_hex, DigestComputer, DIGEST_ALGORITHM};
pub use error::{RepoError, Result};
pub use metadata::{fold_journal, ArtifactState, RepositoryArtifactMetadata};
pub use storage_url::StorageUrl;
