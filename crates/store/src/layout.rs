//! Storage paths and naming
//!
//! Canonical layout beneath each configured base path:
//!
//! ```text
//! <base>/tmp/warcs/<uuid>.warc[.gz]
//! <base>/collections/<coll>/au-<md5(auid)>/artifacts_<timestamp>.warc
//! <base>/collections/<coll>/au-<md5(auid)>/lockss-repo.warc      # journal
//! <base>/sealed/<coll>_au-<md5(auid)>_<timestamp>artifacts.warc
//! ```
//!
//! `<timestamp>` is `yyyyMMddHHmmssSSS` in UTC; `md5(auid)` is the
//! lowercase hex MD5 of the AU identifier.

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// File name of the per-AU repository metadata journal.
pub const JOURNAL_FILE_NAME: &str = "lockss-repo.warc";

/// Deterministic path construction over an ordered list of base paths.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_paths: Vec<PathBuf>,
}

impl StorageLayout {
    /// Layout over the given base paths (preference order).
    pub fn new(base_paths: Vec<PathBuf>) -> Self {
        Self { base_paths }
    }

    /// The configured base paths.
    pub fn base_paths(&self) -> &[PathBuf] {
        &self.base_paths
    }

    /// Lowercase hex MD5 of an AU identifier.
    pub fn au_hash(auid: &str) -> String {
        hex::encode(md5::compute(auid.as_bytes()).0)
    }

    /// `yyyyMMddHHmmssSSS` UTC timestamp.
    pub fn timestamp(at: DateTime<Utc>) -> String {
        at.format("%Y%m%d%H%M%S%3f").to_string()
    }

    /// Temp WARC directory under one base path.
    pub fn tmp_warcs_dir(&self, base: &Path) -> PathBuf {
        base.join("tmp").join("warcs")
    }

    /// Collections directory under one base path.
    pub fn collections_dir(&self, base: &Path) -> PathBuf {
        base.join("collections")
    }

    /// AU directory under one base path.
    pub fn au_dir(&self, base: &Path, collection: &str, auid: &str) -> PathBuf {
        self.collections_dir(base)
            .join(collection)
            .join(format!("au-{}", Self::au_hash(auid)))
    }

    /// Per-AU journal path under one base path.
    pub fn journal_path(&self, base: &Path, collection: &str, auid: &str) -> PathBuf {
        self.au_dir(base, collection, auid).join(JOURNAL_FILE_NAME)
    }

    /// Active-WARC file name for an AU at a point in time.
    pub fn active_warc_name(at: DateTime<Utc>, compressed: bool) -> String {
        format!(
            "artifacts_{}.{}",
            Self::timestamp(at),
            if compressed { "warc.gz" } else { "warc" }
        )
    }

    /// Sealed directory under one base path.
    pub fn sealed_dir(&self, base: &Path) -> PathBuf {
        base.join("sealed")
    }

    /// Sealed-WARC file name for an AU at a point in time.
    pub fn sealed_warc_name(
        collection: &str,
        auid: &str,
        at: DateTime<Utc>,
        compressed: bool,
    ) -> String {
        format!(
            "{}_au-{}_{}artifacts.{}",
            collection,
            Self::au_hash(auid),
            Self::timestamp(at),
            if compressed { "warc.gz" } else { "warc" }
        )
    }

    /// Create the directory scaffolding on every base path.
    pub fn create_scaffolding(&self) -> io::Result<()> {
        for base in &self.base_paths {
            std::fs::create_dir_all(self.tmp_warcs_dir(base))?;
            std::fs::create_dir_all(self.collections_dir(base))?;
            std::fs::create_dir_all(self.sealed_dir(base))?;
        }
        Ok(())
    }

    /// Whether `path` lies under any base's temp WARC directory.
    pub fn is_tmp(&self, path: &Path) -> bool {
        self.base_paths
            .iter()
            .any(|base| path.starts_with(self.tmp_warcs_dir(base)))
    }

    /// The base path containing `path`, if any.
    pub fn base_of(&self, path: &Path) -> Option<&Path> {
        self.base_paths
            .iter()
            .find(|base| path.starts_with(base))
            .map(|b| b.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn layout() -> StorageLayout {
        StorageLayout::new(vec![PathBuf::from("/data/repo")])
    }

    #[test]
    fn test_au_hash_is_lowercase_md5() {
        // md5("auid1")
        assert_eq!(StorageLayout::au_hash("auid1"), "116cf2bbfdcfbe0c9ad94987b00101cd");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(789);
        assert_eq!(StorageLayout::timestamp(at), "20240301123456789");
    }

    #[test]
    fn test_au_paths() {
        let l = layout();
        let base = Path::new("/data/repo");
        let au_dir = l.au_dir(base, "coll1", "auid1");
        assert_eq!(
            au_dir,
            PathBuf::from("/data/repo/collections/coll1/au-116cf2bbfdcfbe0c9ad94987b00101cd")
        );
        assert_eq!(
            l.journal_path(base, "coll1", "auid1"),
            au_dir.join("lockss-repo.warc")
        );
    }

    #[test]
    fn test_file_names() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            StorageLayout::active_warc_name(at, false),
            "artifacts_20240301000000000.warc"
        );
        assert_eq!(
            StorageLayout::sealed_warc_name("coll1", "auid1", at, false),
            "coll1_au-116cf2bbfdcfbe0c9ad94987b00101cd_20240301000000000artifacts.warc"
        );
        assert!(StorageLayout::active_warc_name(at, true).ends_with(".warc.gz"));
    }

    #[test]
    fn test_is_tmp() {
        let l = layout();
        assert!(l.is_tmp(Path::new("/data/repo/tmp/warcs/x.warc")));
        assert!(!l.is_tmp(Path::new("/data/repo/collections/c/au-1/a.warc")));
        assert!(!l.is_tmp(Path::new("/elsewhere/tmp/warcs/x.warc")));
    }

    #[test]
    fn test_scaffolding_created() {
        let dir = tempfile::TempDir::new().unwrap();
        let l = StorageLayout::new(vec![dir.path().to_path_buf()]);
        l.create_scaffolding().unwrap();
        assert!(l.tmp_warcs_dir(dir.path()).is_dir());
        assert!(l.collections_dir(dir.path()).is_dir());
        assert!(l.sealed_dir(dir.path()).is_dir());
    }
}
