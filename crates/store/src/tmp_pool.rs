//! Temporary WARC pool
//!
//! Maintains the set of partially-filled temp WARC files under a data
//! store's temp base path and lends one with enough free capacity to hold a
//! pending artifact without crossing the per-file size threshold. The
//! selection policy best-fits the trailing filesystem block: among
//! candidates it maximizes `((length + expected - 1) mod block_size) + 1`.
//!
//! The in-use registry is owned by the pool instance; two stores in one
//! process get independent registries. Writers never share a temp WARC.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Pool entry for one temp WARC file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcFile {
    /// Location under `<base>/tmp/warcs/`
    pub path: PathBuf,
    /// Current on-disk size
    pub length: u64,
    /// Per-file invariant gzip mode
    pub compressed: bool,
}

impl WarcFile {
    /// New pool entry.
    pub fn new(path: PathBuf, length: u64, compressed: bool) -> Self {
        Self {
            path,
            length,
            compressed,
        }
    }
}

#[derive(Default)]
struct PoolState {
    files: FxHashMap<PathBuf, WarcFile>,
    in_use: HashSet<PathBuf>,
}

/// Pool of temp WARC files with best-fit-last-block selection.
pub struct TmpWarcPool {
    block_size: u64,
    /// Per-file size ceiling; `0` means unlimited
    threshold: u64,
    compression: bool,
    state: Mutex<PoolState>,
}

impl TmpWarcPool {
    /// Create an empty pool.
    pub fn new(block_size: u64, threshold: u64, compression: bool) -> Self {
        Self {
            block_size,
            threshold,
            compression,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Bytes used in the trailing disk block if `expected` more bytes were
    /// appended to a file of size `length`.
    fn trailing_block_fill(&self, length: u64, expected: u64) -> u64 {
        match length + expected {
            0 => 0,
            total => ((total - 1) % self.block_size) + 1,
        }
    }

    /// Borrow a temp WARC under `tmp_dir` that can absorb `bytes_expected`
    /// more bytes, creating a fresh UUID-named entry when none fits. The
    /// returned file is marked in use until `return_warc`.
    pub fn find_warc(&self, tmp_dir: &Path, bytes_expected: u64) -> WarcFile {
        let mut state = self.state.lock();

        let candidate = state
            .files
            .values()
            .filter(|f| !state.in_use.contains(&f.path))
            .filter(|f| f.compressed == self.compression)
            .filter(|f| f.path.starts_with(tmp_dir))
            .filter(|f| self.threshold == 0 || f.length + bytes_expected <= self.threshold)
            .max_by_key(|f| self.trailing_block_fill(f.length, bytes_expected))
            .cloned();

        let file = match candidate {
            Some(file) => file,
            None => {
                let name = format!(
                    "{}.{}",
                    Uuid::new_v4(),
                    if self.compression { "warc.gz" } else { "warc" }
                );
                let file = WarcFile::new(tmp_dir.join(name), 0, self.compression);
                debug!(target: "warcrepo::pool", path = %file.path.display(), "created temp WARC");
                state.files.insert(file.path.clone(), file.clone());
                file
            }
        };

        state.in_use.insert(file.path.clone());
        file
    }

    /// Return a borrowed file, recording its new length.
    pub fn return_warc(&self, file: WarcFile) {
        let mut state = self.state.lock();
        state.in_use.remove(&file.path);
        state.files.insert(file.path.clone(), file);
    }

    /// Drop a file from the pool (it was unlinked or promoted away).
    ///
    /// A file still lent to a writer is left alone with a warning; the pool
    /// never force-releases a live writer.
    pub fn remove_warc(&self, path: &Path) -> Option<WarcFile> {
        let mut state = self.state.lock();
        if state.in_use.contains(path) {
            warn!(target: "warcrepo::pool", path = %path.display(), "refusing to remove in-use temp WARC");
            return None;
        }
        state.files.remove(path)
    }

    /// Seed the pool with a file discovered on disk during reload.
    pub fn seed(&self, file: WarcFile) {
        let mut state = self.state.lock();
        state.files.entry(file.path.clone()).or_insert(file);
    }

    /// Whether a file is currently lent to a writer.
    pub fn is_in_use(&self, path: &Path) -> bool {
        self.state.lock().in_use.contains(path)
    }

    /// Snapshot of pooled files.
    pub fn snapshot(&self) -> Vec<WarcFile> {
        self.state.lock().files.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> TmpWarcPool {
        TmpWarcPool::new(4096, 100_000, false)
    }

    fn tmp_dir() -> PathBuf {
        PathBuf::from("/base/tmp/warcs")
    }

    #[test]
    fn test_fresh_pool_creates_uuid_file() {
        let p = pool();
        let f = p.find_warc(&tmp_dir(), 100);
        assert!(f.path.starts_with(tmp_dir()));
        assert!(f.path.to_string_lossy().ends_with(".warc"));
        assert_eq!(f.length, 0);
        assert!(p.is_in_use(&f.path));
    }

    #[test]
    fn test_in_use_file_not_lent_twice() {
        let p = pool();
        let a = p.find_warc(&tmp_dir(), 100);
        let b = p.find_warc(&tmp_dir(), 100);
        assert_ne!(a.path, b.path);
    }

    #[test]
    fn test_returned_file_is_reused() {
        let p = pool();
        let mut a = p.find_warc(&tmp_dir(), 100);
        a.length = 100;
        let path = a.path.clone();
        p.return_warc(a);

        let again = p.find_warc(&tmp_dir(), 100);
        assert_eq!(again.path, path);
        assert_eq!(again.length, 100);
    }

    #[test]
    fn test_threshold_excludes_full_files() {
        let p = TmpWarcPool::new(4096, 1000, false);
        let mut a = p.find_warc(&tmp_dir(), 100);
        a.length = 950;
        let full_path = a.path.clone();
        p.return_warc(a);

        // 950 + 100 > 1000, so a fresh file is created
        let b = p.find_warc(&tmp_dir(), 100);
        assert_ne!(b.path, full_path);
    }

    #[test]
    fn test_zero_threshold_means_unlimited() {
        let p = TmpWarcPool::new(4096, 0, false);
        let mut a = p.find_warc(&tmp_dir(), 100);
        a.length = u64::MAX / 4;
        let path = a.path.clone();
        p.return_warc(a);

        let b = p.find_warc(&tmp_dir(), 100);
        assert_eq!(b.path, path);
    }

    #[test]
    fn test_best_fit_maximizes_trailing_block_fill() {
        let p = TmpWarcPool::new(1000, 1_000_000, false);
        // Candidate A: length 100 → fill of (100+500-1)%1000+1 = 600
        // Candidate B: length 450 → fill of (450+500-1)%1000+1 = 950
        let mut a = p.find_warc(&tmp_dir(), 1);
        a.length = 100;
        let mut b = p.find_warc(&tmp_dir(), 1);
        b.length = 450;
        let b_path = b.path.clone();
        p.return_warc(a);
        p.return_warc(b);

        let chosen = p.find_warc(&tmp_dir(), 500);
        assert_eq!(chosen.path, b_path);
    }

    #[test]
    fn test_compression_mode_must_match() {
        let p = TmpWarcPool::new(4096, 100_000, true);
        p.seed(WarcFile::new(tmp_dir().join("plain.warc"), 10, false));

        let f = p.find_warc(&tmp_dir(), 100);
        assert!(f.compressed);
        assert!(f.path.to_string_lossy().ends_with(".warc.gz"));
    }

    #[test]
    fn test_remove_warc_respects_in_use() {
        let p = pool();
        let f = p.find_warc(&tmp_dir(), 100);
        assert!(p.remove_warc(&f.path).is_none());
        let path = f.path.clone();
        p.return_warc(f);
        assert!(p.remove_warc(&path).is_some());
        assert!(p.snapshot().is_empty());
    }

    #[test]
    fn test_seed_does_not_clobber_known_file() {
        let p = pool();
        let mut f = p.find_warc(&tmp_dir(), 100);
        f.length = 77;
        let path = f.path.clone();
        p.return_warc(f);

        p.seed(WarcFile::new(path.clone(), 0, false));
        let snapshot = p.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].length, 77);
    }
}
