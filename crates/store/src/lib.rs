//! WARC artifact data store
//!
//! The append-only storage layer of the repository: pooled temp WARC files
//! for ingest, per-AU active/sealed permanent WARCs for committed
//! artifacts, a per-AU metadata journal, an asynchronous commit copy pool,
//! restart recovery, and temp-WARC garbage collection.

pub mod data_store;
pub mod gc;
pub mod journal;
pub mod layout;
pub mod scheduler;
pub mod tmp_pool;

pub use data_store::{ArtifactDataStore, StorageInfo, WarcDataStore};
pub use gc::TempWarcGc;
pub use journal::RepositoryJournal;
pub use layout::{StorageLayout, JOURNAL_FILE_NAME};
pub use scheduler::{CommitFuture, CommitResult, CommitScheduler};
pub use tmp_pool::{TmpWarcPool, WarcFile};
