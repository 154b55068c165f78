//! Storage URLs
//!
//! A storage URL is an opaque pointer to a record inside a WARC file:
//! `scheme://path?offset=O&length=L`. Missing offset/length means
//! "whole file" (used for warcinfo records). The `file` scheme addresses
//! on-disk WARCs; `volatile` is reserved for in-memory stores.

use crate::error::{RepoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Parsed storage URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageUrl {
    scheme: String,
    path: String,
    offset: Option<u64>,
    length: Option<u64>,
}

impl StorageUrl {
    /// Build a `file` URL addressing one record.
    pub fn file(path: &Path, offset: u64, length: u64) -> Self {
        Self {
            scheme: "file".to_string(),
            path: path.to_string_lossy().into_owned(),
            offset: Some(offset),
            length: Some(length),
        }
    }

    /// Build a `file` URL addressing a whole file.
    pub fn whole_file(path: &Path) -> Self {
        Self {
            scheme: "file".to_string(),
            path: path.to_string_lossy().into_owned(),
            offset: None,
            length: None,
        }
    }

    /// Build a `volatile` URL for in-memory stores.
    pub fn volatile(name: &str, offset: u64, length: u64) -> Self {
        Self {
            scheme: "volatile".to_string(),
            path: name.to_string(),
            offset: Some(offset),
            length: Some(length),
        }
    }

    /// Parse a storage URL string.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on anything that does not match the grammar,
    /// including non-numeric offset/length values.
    pub fn parse(s: &str) -> Result<Self> {
        let url = Url::parse(s)
            .map_err(|e| RepoError::invalid_argument(format!("bad storage URL '{}': {}", s, e)))?;

        let mut offset = None;
        let mut length = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "offset" => {
                    offset = Some(value.parse::<u64>().map_err(|_| {
                        RepoError::invalid_argument(format!(
                            "bad storage URL '{}': offset is not a u64",
                            s
                        ))
                    })?)
                }
                "length" => {
                    length = Some(value.parse::<u64>().map_err(|_| {
                        RepoError::invalid_argument(format!(
                            "bad storage URL '{}': length is not a u64",
                            s
                        ))
                    })?)
                }
                other => {
                    return Err(RepoError::invalid_argument(format!(
                        "bad storage URL '{}': unknown query key '{}'",
                        s, other
                    )))
                }
            }
        }

        // `file:///a/b` parses with an empty host and path `/a/b`;
        // `volatile://name` parses with host `name` and an empty path.
        let path = format!("{}{}", url.host_str().unwrap_or(""), url.path());
        if path.is_empty() {
            return Err(RepoError::invalid_argument(format!(
                "bad storage URL '{}': empty path",
                s
            )));
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            path,
            offset,
            length,
        })
    }

    /// URL scheme (`file`, `volatile`, ...).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The opaque path component.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path as a filesystem path.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    /// Record byte offset, if this URL addresses a single record.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Record byte length, if this URL addresses a single record.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Whether this URL points at a file underneath `dir`.
    pub fn is_under(&self, dir: &Path) -> bool {
        Path::new(&self.path).starts_with(dir)
    }
}

impl fmt::Display for StorageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)?;
        match (self.offset, self.length) {
            (Some(o), Some(l)) => write!(f, "?offset={}&length={}", o, l),
            (Some(o), None) => write!(f, "?offset={}", o),
            (None, Some(l)) => write!(f, "?length={}", l),
            (None, None) => Ok(()),
        }
    }
}
