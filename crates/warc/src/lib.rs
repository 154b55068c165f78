//! WARC record codec
//!
//! Frames and parses WARC/1.0 records:
//!
//! ```text
//! WARC/1.0\r\n
//! <named headers>\r\n
//! \r\n
//! <payload>\r\n
//! \r\n
//! ```
//!
//! Artifact records carry the HTTP response on the wire as their payload
//! plus the repository's `X-Lockss-*` headers. Files may be gzipped with
//! one gzip member per record (per-file invariant), which keeps records
//! independently addressable by byte offset and copyable between files of
//! the same compression mode.

pub mod fields;
pub mod http;
pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{read_record_at, RecordSlice, ScanOutcome, ScannedRecord, WarcScanner};
pub use record::{WarcError, WarcHeaders, WarcRecordType, WarcResult};
pub use writer::{
    artifact_headers, build_record, fields_record_headers, warcinfo_record, write_framed,
    write_record,
};

/// File extension for an uncompressed WARC.
pub const WARC_EXTENSION: &str = "warc";

/// File extension for a per-record-gzipped WARC.
pub const WARC_GZ_EXTENSION: &str = "warc.gz";

/// Whether a WARC at this path uses per-record gzip framing.
pub fn is_compressed_path(path: &std::path::Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}
