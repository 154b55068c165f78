//! Repository metadata journal
//!
//! Each AU carries an append-only `lockss-repo.warc` of WARC `metadata`
//! records whose `application/warc-fields` payload maps `artifact-id`,
//! `committed`, `deleted` and (after a commit copy) `storage-url`. The last
//! record for a given id is authoritative.
//!
//! Replay folds the file in order; a torn tail is truncated back to the
//! last complete record, and a record whose flags cannot be parsed reverts
//! that artifact to uncommitted/not-deleted rather than trusting a
//! half-written state.

use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use warcrepo_core::{fold_journal, RepoError, RepositoryArtifactMetadata, Result};
use warcrepo_warc::fields::{encode_fields, field, parse_fields};
use warcrepo_warc::reader::{ScanOutcome, WarcScanner};
use warcrepo_warc::record::WarcRecordType;
use warcrepo_warc::writer::{fields_record_headers, warcinfo_record, write_record};

const FIELD_ARTIFACT_ID: &str = "artifact-id";
const FIELD_COMMITTED: &str = "committed";
const FIELD_DELETED: &str = "deleted";
const FIELD_STORAGE_URL: &str = "storage-url";

/// Per-AU journal files, appended under per-file locks.
///
/// Journals are always written uncompressed, independent of the artifact
/// WARC compression flag.
#[derive(Default)]
pub struct RepositoryJournal {
    locks: Mutex<FxHashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RepositoryJournal {
    /// New journal manager.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Append one state record, creating the journal (and its AU
    /// directory) on first write. The write is fsynced before return.
    pub fn append(&self, path: &Path, entry: &RepositoryArtifactMetadata) -> Result<()> {
        let lock = self.lock_for(path);
        let _guard = lock.lock();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            let head = warcinfo_record(
                &path.file_name().unwrap_or_default().to_string_lossy(),
                Utc::now(),
            );
            use std::io::Write;
            file.write_all(&head)?;
        }

        let payload = encode_fields(&entry_fields(entry));
        let headers = fields_record_headers("metadata", Utc::now(), payload.len() as u64);
        write_record(&mut file, &headers, &payload, false)?;
        file.sync_data()?;

        debug!(
            target: "warcrepo::journal",
            path = %path.display(),
            artifact = %entry.artifact_id(),
            committed = entry.is_committed(),
            deleted = entry.is_deleted(),
            "journal entry appended"
        );
        Ok(())
    }

    /// Replay a journal into the authoritative per-id state map.
    ///
    /// A missing file is an empty journal. A torn tail is truncated back to
    /// the last good record boundary before the fold returns.
    pub fn replay(&self, path: &Path) -> Result<HashMap<Uuid, RepositoryArtifactMetadata>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let lock = self.lock_for(path);
        let _guard = lock.lock();

        let scanner = WarcScanner::open(path)?;
        let (records, outcome) = scanner.collect();

        match outcome {
            ScanOutcome::Clean => {}
            ScanOutcome::Truncated { valid_end } => {
                warn!(
                    target: "warcrepo::journal",
                    path = %path.display(),
                    valid_end,
                    "truncating torn journal tail"
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(valid_end)?;
            }
            ScanOutcome::Malformed { offset, detail } => {
                return Err(RepoError::malformed(
                    format!("{}@{}", path.display(), offset),
                    detail,
                ));
            }
        }

        let mut entries = Vec::new();
        for record in records {
            if !matches!(
                record.headers.record_type(),
                Ok(WarcRecordType::Metadata)
            ) {
                continue;
            }
            match parse_entry(&record.payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        target: "warcrepo::journal",
                        path = %path.display(),
                        offset = record.offset,
                        error = %e,
                        "skipping unreadable journal record"
                    );
                }
            }
        }
        Ok(fold_journal(entries))
    }
}

fn entry_fields(entry: &RepositoryArtifactMetadata) -> Vec<(String, String)> {
    let mut fields = vec![
        (
            FIELD_ARTIFACT_ID.to_string(),
            entry.artifact_id().to_string(),
        ),
        (FIELD_COMMITTED.to_string(), entry.is_committed().to_string()),
        (FIELD_DELETED.to_string(), entry.is_deleted().to_string()),
    ];
    if let Some(url) = entry.storage_url() {
        fields.push((FIELD_STORAGE_URL.to_string(), url.to_string()));
    }
    fields
}

fn parse_entry(payload: &[u8]) -> Result<RepositoryArtifactMetadata> {
    let fields =
        parse_fields(payload).map_err(|e| e.into_repo("journal record payload"))?;

    let id_raw = field(&fields, FIELD_ARTIFACT_ID)
        .ok_or_else(|| RepoError::malformed("journal record", "missing artifact-id field"))?;
    let id = Uuid::parse_str(id_raw).map_err(|e| {
        RepoError::malformed("journal record", format!("bad artifact-id '{}': {}", id_raw, e))
    })?;

    // Half-written flags revert to the safe defaults: re-driving a commit
    // is cheaper than trusting an unverified state.
    let committed = parse_flag(field(&fields, FIELD_COMMITTED), FIELD_COMMITTED, id);
    let deleted = parse_flag(field(&fields, FIELD_DELETED), FIELD_DELETED, id);

    let entry = match field(&fields, FIELD_STORAGE_URL) {
        Some(url) if committed && !deleted => RepositoryArtifactMetadata::copied(id, url),
        _ => RepositoryArtifactMetadata::new(id, committed, deleted),
    };
    Ok(entry)
}

fn parse_flag(raw: Option<&str>, name: &str, id: Uuid) -> bool {
    match raw {
        Some("true") => true,
        Some("false") | None => false,
        Some(other) => {
            warn!(
                target: "warcrepo::journal",
                artifact = %id,
                field = name,
                value = other,
                "unparsable journal flag, reverting to false"
            );
            false
        }
    }
}
