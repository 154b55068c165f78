//! WARC artifact data store
//!
//! The append-only storage engine. Artifacts are written into pooled temp
//! WARC files on add; commit journals the intent and schedules an
//! asynchronous copy into the AU's active permanent WARC; delete writes a
//! journal tombstone. On restart the temp WARCs are reloaded through the
//! artifact state machine, and `rebuild_index` restores a fresh index from
//! the permanent WARCs plus the per-AU journals. A background garbage
//! collector reclaims temp WARCs whose artifacts have all been copied,
//! expired or deleted.
//!
//! Locking: the temp pool serializes writers per temp file; a per-AU mutex
//! serializes appends to that AU's active WARC; journals carry their own
//! per-file locks. An AU's active-WARC lock may be held while appending to
//! its journal, never the other way around.

use crate::gc::TempWarcGc;
use crate::journal::RepositoryJournal;
use crate::layout::{StorageLayout, JOURNAL_FILE_NAME};
use crate::scheduler::{CommitFuture, CommitScheduler};
use crate::tmp_pool::{TmpWarcPool, WarcFile};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warcrepo_core::{
    sha256_hex, Artifact, ArtifactData, ArtifactState, DigestComputer, Payload, RepoConfig,
    RepoError, RepositoryArtifactMetadata, Result, StorageUrl,
};
use warcrepo_index::ArtifactIndex;
use warcrepo_warc::http::{parse_response_head, write_response_head};
use warcrepo_warc::reader::{read_record_at, ScanOutcome, ScannedRecord, WarcScanner};
use warcrepo_warc::record::WarcError;
use warcrepo_warc::writer::{artifact_headers, build_record, warcinfo_record, write_framed};
use warcrepo_warc::is_compressed_path;

/// Disk usage over the configured base paths.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageInfo {
    /// Total capacity in bytes
    pub total: u64,
    /// Bytes in use
    pub used: u64,
    /// Bytes available
    pub available: u64,
    /// `used / total` as a percentage
    pub percent_used: f64,
}

type AuKey = (String, String);

/// Per-AU active permanent WARC state, guarded by the AU's writer lock.
struct ActiveWarc {
    /// `None` until the first commit copy (or after a seal)
    path: Option<PathBuf>,
    /// Current on-disk length
    length: u64,
    /// Length of the warcinfo head; a file at this length is empty
    head_len: u64,
}

impl ActiveWarc {
    fn empty() -> Self {
        Self {
            path: None,
            length: 0,
            head_len: 0,
        }
    }

    fn has_content(&self) -> bool {
        self.path.is_some() && self.length > self.head_len
    }
}

/// Capability set the repository facade consumes; `WarcDataStore` is the
/// on-disk implementation. A host may substitute another backend (for
/// instance an in-memory store addressing `volatile://` URLs) behind the
/// same seam.
pub trait ArtifactDataStore: Send + Sync {
    /// Attach the index this store keeps consistent with its records.
    fn set_artifact_index(&self, index: Arc<dyn ArtifactIndex>);
    /// Create scaffolding, reload temp state, start background machinery.
    fn init(&self) -> Result<()>;
    /// Whether the store (and its index) is ready to serve.
    fn is_ready(&self) -> bool;
    /// Stop background machinery. Idempotent.
    fn shutdown(&self);
    /// Block until every scheduled commit copy has finished.
    fn drain_commits(&self);
    /// Persist an uncommitted artifact; see [`WarcDataStore::add_artifact_data`].
    fn add_artifact_data(&self, data: &mut ArtifactData) -> Result<Artifact>;
    /// Open an artifact's record; see [`WarcDataStore::get_artifact_data`].
    fn get_artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData>;
    /// Journal and schedule a commit; see [`WarcDataStore::commit_artifact_data`].
    fn commit_artifact_data(&self, artifact: &Artifact) -> Result<CommitFuture>;
    /// Journal a tombstone; see [`WarcDataStore::delete_artifact_data`].
    fn delete_artifact_data(&self, artifact: &Artifact) -> Result<()>;
    /// One garbage-collection pass over reclaimable temp storage.
    fn garbage_collect_temp_warcs(&self) -> Result<()>;
    /// Disk usage over the configured base paths.
    fn storage_info(&self) -> Result<StorageInfo>;
}

/// The WARC artifact data store.
pub struct WarcDataStore {
    config: RepoConfig,
    layout: StorageLayout,
    pool: TmpWarcPool,
    journal: RepositoryJournal,
    scheduler: CommitScheduler,
    index: RwLock<Option<Arc<dyn ArtifactIndex>>>,
    active: Mutex<FxHashMap<AuKey, Arc<Mutex<ActiveWarc>>>>,
    gc: Mutex<Option<TempWarcGc>>,
    ready: AtomicBool,
    /// Handle to ourselves for background tasks that outlive a borrow
    self_ref: RwLock<Weak<WarcDataStore>>,
}

impl WarcDataStore {
    /// Build a store over the configured base paths. No I/O happens until
    /// `init`.
    pub fn new(config: RepoConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let layout = StorageLayout::new(config.base_paths.clone());
        let pool = TmpWarcPool::new(
            config.block_size,
            config.threshold_warc_size,
            config.use_warc_compression,
        );
        let scheduler = CommitScheduler::new(config.commit_worker_count, 8192);
        let store = Arc::new(Self {
            config,
            layout,
            pool,
            journal: RepositoryJournal::new(),
            scheduler,
            index: RwLock::new(None),
            active: Mutex::new(FxHashMap::default()),
            gc: Mutex::new(None),
            ready: AtomicBool::new(false),
            self_ref: RwLock::new(Weak::new()),
        });
        *store.self_ref.write() = Arc::downgrade(&store);
        Ok(store)
    }

    fn self_arc(&self) -> Arc<WarcDataStore> {
        self.self_ref
            .read()
            .upgrade()
            .expect("store is alive while its methods run")
    }

    /// The configuration this store runs with.
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// The path layout this store uses.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Attach the index this store keeps consistent with its WARCs.
    pub fn set_artifact_index(&self, index: Arc<dyn ArtifactIndex>) {
        *self.index.write() = Some(index);
    }

    fn artifact_index(&self) -> Result<Arc<dyn ArtifactIndex>> {
        self.index
            .read()
            .clone()
            .ok_or_else(|| RepoError::illegal_state("no artifact index attached"))
    }

    /// Discover base paths, create scaffolding, reload temp WARCs and start
    /// the garbage collector.
    ///
    /// # Errors
    ///
    /// `IllegalState` when no index has been attached.
    pub fn init(&self) -> Result<()> {
        self.artifact_index()?;
        self.layout.create_scaffolding()?;
        self.reload_tmp_warcs()?;

        let mut gc = self.gc.lock();
        if gc.is_none() {
            *gc = Some(TempWarcGc::start(
                self.self_arc(),
                self.config.gc_interval(),
            ));
        }
        drop(gc);

        self.ready.store(true, Ordering::Release);
        info!(target: "warcrepo::store", bases = self.layout.base_paths().len(), "data store initialized");
        Ok(())
    }

    /// Whether init has completed and the index reports ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
            && self
                .index
                .read()
                .as_ref()
                .map(|i| i.is_ready())
                .unwrap_or(false)
    }

    /// Stop the garbage collector and drain the commit workers. Idempotent.
    pub fn shutdown(&self) {
        if let Some(gc) = self.gc.lock().take() {
            gc.shutdown();
        }
        self.scheduler.drain();
        self.scheduler.shutdown();
        self.ready.store(false, Ordering::Release);
    }

    /// Block until every scheduled commit copy has finished (test support
    /// and orderly shutdown).
    pub fn drain_commits(&self) {
        self.scheduler.drain();
    }

    // ------------------------------------------------------------------
    // Path selection
    // ------------------------------------------------------------------

    /// First base path with room for `bytes_expected`, falling back to the
    /// first base when none reports enough space.
    fn write_base(&self, bytes_expected: u64) -> PathBuf {
        for base in self.layout.base_paths() {
            match fs2::available_space(base) {
                Ok(free) if free > bytes_expected => return base.clone(),
                Ok(_) => continue,
                // Unprobeable (not yet created, exotic fs): assume it fits
                Err(_) => return base.clone(),
            }
        }
        self.layout.base_paths()[0].clone()
    }

    /// Base path owning an AU's directory: the first base where it already
    /// exists, else the first base.
    fn au_base(&self, collection: &str, auid: &str) -> PathBuf {
        for base in self.layout.base_paths() {
            if self.layout.au_dir(base, collection, auid).is_dir() {
                return base.clone();
            }
        }
        self.layout.base_paths()[0].clone()
    }

    /// The AU's journal path (public so recovery tooling and tests can
    /// reach the journal without the store).
    pub fn journal_path(&self, collection: &str, auid: &str) -> PathBuf {
        let base = self.au_base(collection, auid);
        self.layout.journal_path(&base, collection, auid)
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Write an uncommitted WARC record into a pooled temp file.
    ///
    /// Fills in the data's content length, digest and storage URL, and
    /// returns the descriptor. The assigned version must already be
    /// stamped on the identifier by the repository facade.
    pub fn add_artifact_data(&self, data: &mut ArtifactData) -> Result<Artifact> {
        data.identifier().validate()?;
        let identifier = data.identifier().clone();

        let body = data.take_payload()?.into_bytes()?;
        let mut digest = DigestComputer::new();
        digest.update(&body);
        let (content_digest, body_len) = digest.finish();

        let mut http = Vec::with_capacity(body.len() + 256);
        write_response_head(&mut http, data.status_line(), data.headers());
        http.extend_from_slice(&body);

        let headers = artifact_headers(&identifier, data.origin_date(), http.len() as u64, body_len);
        let framed = build_record(&headers, &http);

        let base = self.write_base(framed.len() as u64);
        let tmp_dir = self.layout.tmp_warcs_dir(&base);
        let mut warc_file = self.pool.find_warc(&tmp_dir, framed.len() as u64);

        let appended = self.append_temp_record(&warc_file, &framed);
        // Refresh the pool's view of the file whatever happened; partial
        // bytes from a failed write stay behind as GC-able garbage.
        warc_file.length = std::fs::metadata(&warc_file.path)
            .map(|m| m.len())
            .unwrap_or(warc_file.length);
        let path = warc_file.path.clone();
        self.pool.return_warc(warc_file);

        let (offset, written) = appended?;
        let url = StorageUrl::file(&path, offset, written);

        data.set_content_length(body_len);
        data.set_content_digest(content_digest.clone());
        data.set_storage_url(url.clone());

        debug!(
            target: "warcrepo::store",
            id = %identifier.id(),
            uri = identifier.uri(),
            offset,
            length = written,
            "artifact added to temp storage"
        );
        Ok(Artifact::new(
            identifier,
            false,
            url,
            body_len,
            content_digest,
            data.origin_date(),
        ))
    }

    /// Append one framed record to a temp WARC, writing the warcinfo head
    /// first on a fresh file. Returns `(offset, stored_length)`.
    fn append_temp_record(&self, warc_file: &WarcFile, framed: &[u8]) -> Result<(u64, u64)> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&warc_file.path)?;

        let mut offset = file.metadata()?.len();
        if offset == 0 {
            let name = warc_file
                .path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned();
            let head = warcinfo_record(&name, Utc::now());
            offset = write_framed(&mut file, &head, warc_file.compressed)?;
        }

        let written = write_framed(&mut file, framed, warc_file.compressed)?;
        Ok((offset, written))
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Open the artifact's WARC record and expose its HTTP response with a
    /// single-consumption payload stream.
    pub fn get_artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData> {
        let url = artifact.storage_url();
        if url.scheme() != "file" {
            return Err(RepoError::invalid_argument(format!(
                "unsupported storage URL scheme '{}'",
                url.scheme()
            )));
        }
        let path = url.to_path();
        let offset = url.offset().unwrap_or(0);
        let context = format!("{}@{}", path.display(), offset);

        let slice = read_record_at(&path, offset, url.length(), is_compressed_path(&path))
            .map_err(|e| match e {
                WarcError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
                    RepoError::not_found(format!("storage URL {}", url))
                }
                other => other.into_repo(context.clone()),
            })?;

        if !slice.headers.is_artifact() {
            return Err(RepoError::malformed(context, "not an artifact record"));
        }

        let identifier = slice
            .headers
            .artifact_identifier()
            .map_err(|e| e.into_repo(context.clone()))?;
        let body_len = slice
            .headers
            .artifact_body_length()
            .map_err(|e| e.into_repo(context.clone()))?;
        let origin_date = slice
            .headers
            .warc_date()
            .unwrap_or_else(|_| artifact.collection_date());

        let mut payload = BufReader::new(slice.payload);
        let (status_line, http_headers) =
            parse_response_head(&mut payload).map_err(|e| e.into_repo(context))?;

        Ok(ArtifactData::from_record(
            identifier,
            status_line,
            http_headers,
            Payload::Stream(Box::new(payload)),
            body_len,
            artifact.content_digest(),
            origin_date,
            url.clone(),
        ))
    }

    // ------------------------------------------------------------------
    // Commit path
    // ------------------------------------------------------------------

    /// Journal `committed = true` and schedule the temp→permanent copy.
    ///
    /// The returned future resolves with the relocated descriptor once the
    /// copy is durable; with `None` when the artifact was deleted first
    /// (deletion wins); immediately with the current descriptor when the
    /// artifact already lives in permanent storage (commit is idempotent).
    pub fn commit_artifact_data(&self, artifact: &Artifact) -> Result<CommitFuture> {
        let index = self.artifact_index()?;

        let current = match index.get_artifact(artifact.id()) {
            Some(a) => a,
            None => {
                debug!(target: "warcrepo::store", id = %artifact.id(), "commit of deleted artifact resolves to none");
                return Ok(CommitFuture::ready(Ok(None)));
            }
        };
        if current.committed() && !self.layout.is_tmp(&current.storage_url().to_path()) {
            return Ok(CommitFuture::ready(Ok(Some(current))));
        }

        let journal_path = self.journal_path(artifact.collection(), artifact.auid());
        self.journal.append(
            &journal_path,
            &RepositoryArtifactMetadata::committed(artifact.id()),
        )?;

        let (future, completer) = CommitFuture::pair();
        let store = self.self_arc();
        self.scheduler.submit(move || {
            let result = store.move_to_permanent_storage(&current);
            if let Err(ref e) = result {
                error!(target: "warcrepo::store", id = %current.id(), error = %e, "commit copy failed");
            }
            completer.complete(result);
        })?;
        Ok(future)
    }

    /// Journal `deleted = true`. The on-disk record is not erased; it
    /// becomes unreachable and its temp WARC a GC candidate.
    pub fn delete_artifact_data(&self, artifact: &Artifact) -> Result<()> {
        let journal_path = self.journal_path(artifact.collection(), artifact.auid());
        self.journal.append(
            &journal_path,
            &RepositoryArtifactMetadata::deleted(artifact.id()),
        )?;
        debug!(target: "warcrepo::store", id = %artifact.id(), "artifact tombstoned");
        Ok(())
    }

    /// Copy one record from temp storage into the AU's active permanent
    /// WARC, sealing first when the threshold would be crossed. Safe to
    /// invoke repeatedly: a record already in permanent storage is left
    /// where it is, and `None` comes back when the artifact was deleted
    /// while the copy was queued (deletion wins).
    pub fn move_to_permanent_storage(&self, artifact: &Artifact) -> Result<Option<Artifact>> {
        let index = self.artifact_index()?;
        let collection = artifact.collection().to_string();
        let auid = artifact.auid().to_string();

        let handle = self.au_active_handle(&collection, &auid);
        let mut active = handle.lock();

        // Re-read under the AU lock: racing copies for the same artifact
        // must not append the record twice, and a deletion that won the
        // race must stay won.
        let current = match index.get_artifact(artifact.id()) {
            Some(c) => c,
            None => {
                debug!(target: "warcrepo::store", id = %artifact.id(), "copy skipped, artifact deleted while queued");
                return Ok(None);
            }
        };
        let src_url = current.storage_url().clone();
        if !self.layout.is_tmp(&src_url.to_path()) {
            return Ok(Some(current));
        }

        let src_offset = src_url
            .offset()
            .ok_or_else(|| RepoError::invalid_argument("storage URL has no offset"))?;
        let src_len = src_url
            .length()
            .ok_or_else(|| RepoError::invalid_argument("storage URL has no length"))?;

        let mut record = vec![0u8; src_len as usize];
        {
            let mut src = File::open(src_url.to_path())?;
            src.seek(SeekFrom::Start(src_offset))?;
            src.read_exact(&mut record)?;
        }

        self.ensure_active(&collection, &auid, &mut active)?;
        if self.config.threshold_warc_size > 0
            && active.length + src_len > self.config.threshold_warc_size
            && active.has_content()
        {
            self.seal_locked(&collection, &auid, &mut active, &index)?;
            self.ensure_active(&collection, &auid, &mut active)?;
        }

        let dest_path = active.path.clone().expect("active WARC ensured");
        let offset = active.length;
        {
            let mut dest = OpenOptions::new().append(true).open(&dest_path)?;
            dest.write_all(&record)?;
            dest.sync_all()?;
        }
        active.length += src_len;

        let new_url = StorageUrl::file(&dest_path, offset, src_len);
        if let Err(e) = index.update_storage_url(artifact.id(), &new_url) {
            // The journal and WARCs stay authoritative; a rebuild recovers
            error!(target: "warcrepo::store", id = %artifact.id(), error = %e, "index storage URL update failed");
        }
        let journal_path = self.journal_path(&collection, &auid);
        self.journal.append(
            &journal_path,
            &RepositoryArtifactMetadata::copied(artifact.id(), new_url.to_string()),
        )?;
        drop(active);

        let mut updated = current;
        updated.set_committed(true);
        updated.set_storage_url(new_url);
        info!(
            target: "warcrepo::store",
            id = %artifact.id(),
            dest = %dest_path.display(),
            offset,
            "artifact copied to permanent storage"
        );
        Ok(Some(updated))
    }

    /// Seal the AU's active WARC if it has content. Idempotent when the
    /// active WARC is empty or absent.
    pub fn seal_active_warc(&self, collection: &str, auid: &str) -> Result<()> {
        let index = self.artifact_index()?;
        let handle = self.au_active_handle(collection, auid);
        let mut active = handle.lock();
        self.seal_locked(collection, auid, &mut active, &index)?;
        Ok(())
    }

    fn au_active_handle(&self, collection: &str, auid: &str) -> Arc<Mutex<ActiveWarc>> {
        let mut map = self.active.lock();
        map.entry((collection.to_string(), auid.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(ActiveWarc::empty())))
            .clone()
    }

    /// Open (or resume) the AU's active WARC under its writer lock.
    fn ensure_active(&self, collection: &str, auid: &str, active: &mut ActiveWarc) -> Result<()> {
        if active.path.is_some() {
            return Ok(());
        }
        let compressed = self.config.use_warc_compression;
        let base = self.au_base(collection, auid);
        let au_dir = self.layout.au_dir(&base, collection, auid);
        std::fs::create_dir_all(&au_dir)?;

        // Resume the newest existing active WARC after a restart
        let ext = if compressed { ".warc.gz" } else { ".warc" };
        let mut existing: Vec<PathBuf> = std::fs::read_dir(&au_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let n = n.to_string_lossy();
                        n.starts_with("artifacts_") && n.ends_with(ext)
                    })
                    .unwrap_or(false)
            })
            .collect();
        existing.sort();
        if let Some(path) = existing.pop() {
            if let Ok(mut scanner) = WarcScanner::open(&path) {
                if let Ok(Some(head)) = scanner.next_record() {
                    active.head_len = head.stored_length;
                    active.length = std::fs::metadata(&path)?.len();
                    active.path = Some(path);
                    return Ok(());
                }
            }
            warn!(target: "warcrepo::store", path = %path.display(), "unreadable active WARC left in place, opening a fresh one");
        }

        let name = StorageLayout::active_warc_name(Utc::now(), compressed);
        let path = au_dir.join(&name);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let head = warcinfo_record(&name, Utc::now());
        let written = write_framed(&mut file, &head, compressed)?;
        file.sync_all()?;

        active.path = Some(path);
        active.length = written;
        active.head_len = written;
        Ok(())
    }

    /// Rename the active WARC into the sealed directory, repoint the index
    /// entries it contains, and journal the new locations for rebuild.
    fn seal_locked(
        &self,
        collection: &str,
        auid: &str,
        active: &mut ActiveWarc,
        index: &Arc<dyn ArtifactIndex>,
    ) -> Result<Option<PathBuf>> {
        if !active.has_content() {
            return Ok(None);
        }
        let path = active.path.take().expect("has_content checked path");
        active.length = 0;
        active.head_len = 0;

        let base = self
            .layout
            .base_of(&path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.base_paths()[0].clone());
        let sealed_dir = self.layout.sealed_dir(&base);
        std::fs::create_dir_all(&sealed_dir)?;
        let dest = sealed_dir.join(StorageLayout::sealed_warc_name(
            collection,
            auid,
            Utc::now(),
            self.config.use_warc_compression,
        ));
        std::fs::rename(&path, &dest)?;
        info!(
            target: "warcrepo::store",
            from = %path.display(),
            to = %dest.display(),
            "active WARC sealed"
        );

        // Every record in the file moved with it; repoint and re-journal
        let journal_path = self.journal_path(collection, auid);
        let scanner = WarcScanner::open(&dest)?;
        let (records, _) = scanner.collect();
        for record in records {
            if !record.headers.is_artifact() {
                continue;
            }
            let Ok(identifier) = record.headers.artifact_identifier() else {
                continue;
            };
            let url = StorageUrl::file(&dest, record.offset, record.stored_length);
            if let Err(e) = index.update_storage_url(identifier.id(), &url) {
                if !e.is_not_found() {
                    error!(target: "warcrepo::store", id = %identifier.id(), error = %e, "seal repoint failed");
                }
            }
            self.journal.append(
                &journal_path,
                &RepositoryArtifactMetadata::copied(identifier.id(), url.to_string()),
            )?;
        }
        Ok(Some(dest))
    }

    // ------------------------------------------------------------------
    // Reload, rebuild, GC
    // ------------------------------------------------------------------

    fn expired(&self, ingested: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.config.uncommitted_artifact_expiration()) {
            Ok(ttl) => now.signed_duration_since(ingested) >= ttl,
            Err(_) => false,
        }
    }

    /// Classify one temp-WARC record against the journal and the index.
    fn classify(
        &self,
        index: &dyn ArtifactIndex,
        meta: Option<&RepositoryArtifactMetadata>,
        id: Uuid,
        ingested: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ArtifactState {
        if let Some(m) = meta {
            if m.is_deleted() {
                return ArtifactState::Deleted;
            }
            if m.is_committed() {
                if let Some(url) = m.storage_url() {
                    if let Ok(parsed) = StorageUrl::parse(url) {
                        if !self.layout.is_tmp(&parsed.to_path()) {
                            return ArtifactState::Copied;
                        }
                    }
                }
                if let Some(entry) = index.get_artifact(id) {
                    if !self.layout.is_tmp(&entry.storage_url().to_path()) {
                        return ArtifactState::Copied;
                    }
                }
                return ArtifactState::Committed;
            }
        }

        match index.get_artifact(id) {
            Some(entry) if entry.committed() => ArtifactState::Committed,
            Some(_) => {
                if self.expired(ingested, now) {
                    ArtifactState::Expired
                } else {
                    ArtifactState::Uncommitted
                }
            }
            None => {
                if self.expired(ingested, now) {
                    ArtifactState::Expired
                } else {
                    ArtifactState::NotIndexed
                }
            }
        }
    }

    fn load_au_journal<'c>(
        &self,
        cache: &'c mut HashMap<AuKey, HashMap<Uuid, RepositoryArtifactMetadata>>,
        collection: &str,
        auid: &str,
    ) -> &'c HashMap<Uuid, RepositoryArtifactMetadata> {
        let key = (collection.to_string(), auid.to_string());
        if !cache.contains_key(&key) {
            let folded = self
                .journal
                .replay(&self.journal_path(collection, auid))
                .unwrap_or_else(|e| {
                    warn!(target: "warcrepo::store", collection, auid, error = %e, "journal replay failed");
                    HashMap::new()
                });
            cache.insert(key.clone(), folded);
        }
        &cache[&key]
    }

    /// Build a descriptor from a scanned record (reload/rebuild path).
    fn descriptor_from_record(
        &self,
        path: &Path,
        record: &ScannedRecord,
        committed: bool,
    ) -> Result<Artifact> {
        let context = format!("{}@{}", path.display(), record.offset);
        let identifier = record
            .headers
            .artifact_identifier()
            .map_err(|e| e.into_repo(context.clone()))?;

        let mut cursor = Cursor::new(record.payload.as_slice());
        parse_response_head(&mut cursor).map_err(|e| e.into_repo(context))?;
        let mut body = Vec::new();
        cursor.read_to_end(&mut body)?;

        let origin_date = record.headers.warc_date().unwrap_or_else(|_| Utc::now());
        Ok(Artifact::new(
            identifier,
            committed,
            StorageUrl::file(path, record.offset, record.stored_length),
            body.len() as u64,
            sha256_hex(&body),
            origin_date,
        ))
    }

    /// Reload partial temporary state after a restart (§temp classification
    /// table): recover uncommitted artifacts into the index, re-drive
    /// committed-but-uncopied artifacts, and mark the rest for GC.
    ///
    /// # Errors
    ///
    /// `IllegalState` when invoked before an index is attached.
    pub fn reload_tmp_warcs(&self) -> Result<()> {
        let index = self.artifact_index()?;
        let now = Utc::now();
        let mut journal_cache = HashMap::new();

        for base in self.layout.base_paths() {
            let tmp_dir = self.layout.tmp_warcs_dir(base);
            if !tmp_dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&tmp_dir)? {
                let path = entry?.path();
                if !path.is_file() || !path.to_string_lossy().contains(".warc") {
                    continue;
                }
                self.reload_one_tmp_warc(&path, &index, &mut journal_cache, now)?;
            }
        }
        Ok(())
    }

    fn reload_one_tmp_warc(
        &self,
        path: &Path,
        index: &Arc<dyn ArtifactIndex>,
        journal_cache: &mut HashMap<AuKey, HashMap<Uuid, RepositoryArtifactMetadata>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let scanner = match WarcScanner::open(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "warcrepo::store", path = %path.display(), error = %e, "cannot open temp WARC");
                return Ok(());
            }
        };
        let (records, outcome) = scanner.collect();
        match outcome {
            ScanOutcome::Clean => {}
            ScanOutcome::Truncated { valid_end } => {
                warn!(target: "warcrepo::store", path = %path.display(), valid_end, "truncating torn temp WARC tail");
                OpenOptions::new().write(true).open(path)?.set_len(valid_end)?;
            }
            ScanOutcome::Malformed { offset, detail } => {
                warn!(target: "warcrepo::store", path = %path.display(), offset, detail, "corrupt temp WARC; using readable prefix");
            }
        }

        let length = std::fs::metadata(path)?.len();
        self.pool
            .seed(WarcFile::new(path.to_path_buf(), length, is_compressed_path(path)));

        for record in records {
            if !record.headers.is_artifact() {
                continue;
            }
            let Ok(identifier) = record.headers.artifact_identifier() else {
                warn!(target: "warcrepo::store", path = %path.display(), offset = record.offset, "artifact record without identity headers");
                continue;
            };
            let ingested = record.headers.warc_date().unwrap_or(now);
            let meta = self
                .load_au_journal(journal_cache, identifier.collection(), identifier.auid())
                .get(&identifier.id())
                .cloned();
            let state = self.classify(&**index, meta.as_ref(), identifier.id(), ingested, now);
            debug!(
                target: "warcrepo::store",
                id = %identifier.id(),
                state = %state,
                path = %path.display(),
                "temp record classified"
            );

            match state {
                ArtifactState::NotIndexed => {
                    match self.descriptor_from_record(path, &record, false) {
                        Ok(artifact) => {
                            if let Err(e) = index.restore_artifact(artifact) {
                                debug!(target: "warcrepo::store", error = %e, "reload insert skipped");
                            }
                        }
                        Err(e) => {
                            warn!(target: "warcrepo::store", error = %e, "unreadable temp record skipped")
                        }
                    }
                }
                ArtifactState::Uncommitted => {}
                ArtifactState::Expired => {
                    index.delete_artifact(identifier.id());
                }
                ArtifactState::Committed => {
                    let descriptor = match index.get_artifact(identifier.id()) {
                        Some(existing) => {
                            index.commit_artifact(identifier.id());
                            existing
                        }
                        None => match self.descriptor_from_record(path, &record, true) {
                            Ok(artifact) => {
                                if let Err(e) = index.restore_artifact(artifact.clone()) {
                                    debug!(target: "warcrepo::store", error = %e, "reload insert skipped");
                                }
                                artifact
                            }
                            Err(e) => {
                                warn!(target: "warcrepo::store", error = %e, "unreadable committed record skipped");
                                continue;
                            }
                        },
                    };
                    let store = self.self_arc();
                    if let Err(e) = self.scheduler.submit(move || {
                        if let Err(e) = store.move_to_permanent_storage(&descriptor) {
                            error!(target: "warcrepo::store", id = %descriptor.id(), error = %e, "re-driven commit copy failed");
                        }
                    }) {
                        warn!(target: "warcrepo::store", error = %e, "could not re-drive commit copy");
                    }
                }
                ArtifactState::Copied | ArtifactState::Deleted => {}
            }
        }
        Ok(())
    }

    /// Restore a fresh index from every permanent WARC and per-AU journal,
    /// then recover temp state.
    pub fn rebuild_index(&self, index: &Arc<dyn ArtifactIndex>) -> Result<()> {
        self.set_artifact_index(Arc::clone(index));

        // 1. Permanent WARCs (AU directories, then the sealed directory)
        for base in self.layout.base_paths() {
            let collections = self.layout.collections_dir(base);
            if collections.is_dir() {
                for au_dir in walk_au_dirs(&collections)? {
                    for path in warc_files_in(&au_dir)? {
                        if path.file_name().map(|n| n == JOURNAL_FILE_NAME).unwrap_or(false) {
                            continue;
                        }
                        self.rebuild_from_warc(&path, index, true);
                    }
                }
            }
            let sealed = self.layout.sealed_dir(base);
            if sealed.is_dir() {
                for path in warc_files_in(&sealed)? {
                    self.rebuild_from_warc(&path, index, false);
                }
            }
        }

        // 2. Journals: committed/deleted flags and storage URL overrides
        for base in self.layout.base_paths() {
            let collections = self.layout.collections_dir(base);
            if !collections.is_dir() {
                continue;
            }
            for au_dir in walk_au_dirs(&collections)? {
                let journal_path = au_dir.join(JOURNAL_FILE_NAME);
                if !journal_path.is_file() {
                    continue;
                }
                let folded = match self.journal.replay(&journal_path) {
                    Ok(folded) => folded,
                    Err(e) => {
                        warn!(target: "warcrepo::store", path = %journal_path.display(), error = %e, "journal unreadable, skipped in rebuild");
                        continue;
                    }
                };
                for (id, meta) in folded {
                    if meta.is_deleted() {
                        index.delete_artifact(id);
                        continue;
                    }
                    if meta.is_committed() {
                        index.commit_artifact(id);
                    }
                    if let Some(url) = meta.storage_url() {
                        if let Ok(parsed) = StorageUrl::parse(url) {
                            // A seal may have moved the file since this entry
                            if parsed.to_path().is_file() {
                                let _ = index.update_storage_url(id, &parsed);
                            }
                        }
                    }
                }
            }
        }

        // 3. Temp WARCs, so uncommitted artifacts are recovered
        self.reload_tmp_warcs()?;
        info!(target: "warcrepo::store", "index rebuild complete");
        Ok(())
    }

    /// Scan one permanent WARC into the index. A torn tail on an active
    /// (AU-directory) WARC is truncated back to the last good record; any
    /// other damage is reported per file and the readable prefix is kept.
    fn rebuild_from_warc(
        &self,
        path: &Path,
        index: &Arc<dyn ArtifactIndex>,
        truncate_on_torn: bool,
    ) {
        let scanner = match WarcScanner::open(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "warcrepo::store", path = %path.display(), error = %e, "cannot open WARC for rebuild");
                return;
            }
        };
        let (records, outcome) = scanner.collect();
        match outcome {
            ScanOutcome::Clean => {}
            ScanOutcome::Truncated { valid_end } if truncate_on_torn => {
                warn!(target: "warcrepo::store", path = %path.display(), valid_end, "truncating torn active WARC tail");
                if let Err(e) = OpenOptions::new()
                    .write(true)
                    .open(path)
                    .and_then(|f| f.set_len(valid_end))
                {
                    warn!(target: "warcrepo::store", path = %path.display(), error = %e, "truncation failed");
                }
            }
            ScanOutcome::Truncated { valid_end } => {
                warn!(target: "warcrepo::store", path = %path.display(), valid_end, "torn tail in sealed WARC; using readable prefix");
            }
            ScanOutcome::Malformed { offset, detail } => {
                warn!(target: "warcrepo::store", path = %path.display(), offset, detail, "malformed record; using readable prefix");
            }
        }

        for record in records {
            if !record.headers.is_artifact() {
                continue;
            }
            match self.descriptor_from_record(path, &record, true) {
                Ok(artifact) => {
                    if index.get_artifact(artifact.id()).is_none() {
                        if let Err(e) = index.restore_artifact(artifact) {
                            debug!(target: "warcrepo::store", error = %e, "rebuild insert skipped");
                        }
                    }
                }
                Err(e) => {
                    warn!(target: "warcrepo::store", path = %path.display(), offset = record.offset, error = %e, "unreadable record skipped")
                }
            }
        }
    }

    /// One garbage-collection pass: unlink every temp WARC whose artifacts
    /// are all in `{COPIED, EXPIRED, DELETED}` and that no writer holds.
    pub fn garbage_collect_temp_warcs(&self) -> Result<()> {
        let index = match self.artifact_index() {
            Ok(i) => i,
            Err(_) => return Ok(()),
        };
        let now = Utc::now();
        let mut journal_cache = HashMap::new();

        for base in self.layout.base_paths() {
            let tmp_dir = self.layout.tmp_warcs_dir(base);
            if !tmp_dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&tmp_dir)? {
                let path = entry?.path();
                if !path.is_file() || !path.to_string_lossy().contains(".warc") {
                    continue;
                }
                if self.pool.is_in_use(&path) {
                    continue;
                }
                self.gc_one_tmp_warc(&path, &index, &mut journal_cache, now);
            }
        }
        Ok(())
    }

    fn gc_one_tmp_warc(
        &self,
        path: &Path,
        index: &Arc<dyn ArtifactIndex>,
        journal_cache: &mut HashMap<AuKey, HashMap<Uuid, RepositoryArtifactMetadata>>,
        now: DateTime<Utc>,
    ) {
        let scanned_len = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return,
        };
        let scanner = match WarcScanner::open(path) {
            Ok(s) => s,
            Err(_) => return,
        };
        let (records, _outcome) = scanner.collect();

        let artifact_records: Vec<&ScannedRecord> =
            records.iter().filter(|r| r.headers.is_artifact()).collect();

        let reclaimable = if artifact_records.is_empty() {
            // Writer-less garbage (failed adds) and idle empty pool files
            // age out on the same TTL as uncommitted artifacts
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age >= self.config.uncommitted_artifact_expiration())
                .unwrap_or(false)
        } else {
            artifact_records.iter().all(|record| {
                let Ok(identifier) = record.headers.artifact_identifier() else {
                    return false;
                };
                let ingested = record.headers.warc_date().unwrap_or(now);
                let meta = self
                    .load_au_journal(journal_cache, identifier.collection(), identifier.auid())
                    .get(&identifier.id())
                    .cloned();
                self.classify(&**index, meta.as_ref(), identifier.id(), ingested, now)
                    .is_reclaimable()
            })
        };
        if !reclaimable {
            return;
        }

        // The pool is the authority on live writers; a file it refuses to
        // release is being written right now.
        let known = self.pool.snapshot().iter().any(|f| f.path == path);
        if known && self.pool.remove_warc(path).is_none() {
            return;
        }
        // A writer may have appended between our scan and now
        if std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) != scanned_len {
            if let Ok(m) = std::fs::metadata(path) {
                self.pool
                    .seed(WarcFile::new(path.to_path_buf(), m.len(), is_compressed_path(path)));
            }
            return;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(target: "warcrepo::gc", path = %path.display(), "temp WARC reclaimed")
            }
            Err(e) => {
                warn!(target: "warcrepo::gc", path = %path.display(), error = %e, "unlink failed")
            }
        }
    }

    /// Disk usage over the configured base paths.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        let mut total = 0u64;
        let mut available = 0u64;
        for base in self.layout.base_paths() {
            total += fs2::total_space(base)?;
            available += fs2::available_space(base)?;
        }
        let used = total.saturating_sub(available);
        let percent_used = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(StorageInfo {
            total,
            used,
            available,
            percent_used,
        })
    }
}

impl ArtifactDataStore for WarcDataStore {
    fn set_artifact_index(&self, index: Arc<dyn ArtifactIndex>) {
        WarcDataStore::set_artifact_index(self, index)
    }

    fn init(&self) -> Result<()> {
        WarcDataStore::init(self)
    }

    fn is_ready(&self) -> bool {
        WarcDataStore::is_ready(self)
    }

    fn shutdown(&self) {
        WarcDataStore::shutdown(self)
    }

    fn drain_commits(&self) {
        WarcDataStore::drain_commits(self)
    }

    fn add_artifact_data(&self, data: &mut ArtifactData) -> Result<Artifact> {
        WarcDataStore::add_artifact_data(self, data)
    }

    fn get_artifact_data(&self, artifact: &Artifact) -> Result<ArtifactData> {
        WarcDataStore::get_artifact_data(self, artifact)
    }

    fn commit_artifact_data(&self, artifact: &Artifact) -> Result<CommitFuture> {
        WarcDataStore::commit_artifact_data(self, artifact)
    }

    fn delete_artifact_data(&self, artifact: &Artifact) -> Result<()> {
        WarcDataStore::delete_artifact_data(self, artifact)
    }

    fn garbage_collect_temp_warcs(&self) -> Result<()> {
        WarcDataStore::garbage_collect_temp_warcs(self)
    }

    fn storage_info(&self) -> Result<StorageInfo> {
        WarcDataStore::storage_info(self)
    }
}

fn walk_au_dirs(collections_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for coll in std::fs::read_dir(collections_dir)? {
        let coll = coll?.path();
        if !coll.is_dir() {
            continue;
        }
        for au in std::fs::read_dir(&coll)? {
            let au = au?.path();
            if au.is_dir() {
                out.push(au);
            }
        }
    }
    Ok(out)
}

fn warc_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.to_string_lossy().contains(".warc"))
        .collect();
    out.sort();
    Ok(out)
}
