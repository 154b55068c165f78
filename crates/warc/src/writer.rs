//! WARC record emission.
//!
//! Records are built in memory and appended to the target file, optionally
//! as one gzip member per record. The returned on-disk length is what goes
//! into storage URLs, so a record can later be copied verbatim between
//! files of the same compression mode.

use crate::fields::encode_fields;
use crate::record::{
    header, CONTENT_TYPE_HTTP_RESPONSE, CONTENT_TYPE_WARC_FIELDS, WARC_VERSION,
};
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Write};
use uuid::Uuid;
use warcrepo_core::ArtifactIdentifier;

/// Render a `WARC-Record-ID` value.
fn record_id_value(id: Uuid) -> String {
    format!("<urn:uuid:{}>", id)
}

/// Render a `WARC-Date` value (ISO-8601 UTC).
fn warc_date_value(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Headers for one artifact (`response`) record.
///
/// `http_length` is the full HTTP response byte count (the record's
/// `Content-Length`); `body_length` is the body alone (`X-Lockss-Length`).
pub fn artifact_headers(
    identifier: &ArtifactIdentifier,
    date: DateTime<Utc>,
    http_length: u64,
    body_length: u64,
) -> Vec<(String, String)> {
    vec![
        (
            header::WARC_RECORD_ID.to_string(),
            record_id_value(Uuid::new_v4()),
        ),
        (header::WARC_TYPE.to_string(), "response".to_string()),
        (header::WARC_DATE.to_string(), warc_date_value(date)),
        (
            header::CONTENT_TYPE.to_string(),
            CONTENT_TYPE_HTTP_RESPONSE.to_string(),
        ),
        (header::CONTENT_LENGTH.to_string(), http_length.to_string()),
        (
            header::X_LOCKSS_ARTIFACT_ID.to_string(),
            identifier.id().to_string(),
        ),
        (
            header::X_LOCKSS_COLLECTION.to_string(),
            identifier.collection().to_string(),
        ),
        (
            header::X_LOCKSS_AUID.to_string(),
            identifier.auid().to_string(),
        ),
        (
            header::X_LOCKSS_URI.to_string(),
            identifier.uri().to_string(),
        ),
        (
            header::X_LOCKSS_VERSION.to_string(),
            identifier.version().to_string(),
        ),
        (
            header::X_LOCKSS_LENGTH.to_string(),
            body_length.to_string(),
        ),
    ]
}

/// Headers for a `warcinfo` or `metadata` (journal) record carrying a
/// warc-fields payload.
pub fn fields_record_headers(
    record_type: &str,
    date: DateTime<Utc>,
    payload_length: u64,
) -> Vec<(String, String)> {
    vec![
        (
            header::WARC_RECORD_ID.to_string(),
            record_id_value(Uuid::new_v4()),
        ),
        (header::WARC_TYPE.to_string(), record_type.to_string()),
        (header::WARC_DATE.to_string(), warc_date_value(date)),
        (
            header::CONTENT_TYPE.to_string(),
            CONTENT_TYPE_WARC_FIELDS.to_string(),
        ),
        (
            header::CONTENT_LENGTH.to_string(),
            payload_length.to_string(),
        ),
    ]
}

/// Build the `warcinfo` head record for a newly created WARC file.
///
/// Returns the fully framed (uncompressed) record bytes.
pub fn warcinfo_record(filename: &str, date: DateTime<Utc>) -> Vec<u8> {
    let fields = vec![
        (
            "software".to_string(),
            format!("warcrepo/{}", env!("CARGO_PKG_VERSION")),
        ),
        ("format".to_string(), "WARC File Format 1.0".to_string()),
        ("filename".to_string(), filename.to_string()),
    ];
    let payload = encode_fields(&fields);
    let headers = fields_record_headers("warcinfo", date, payload.len() as u64);
    build_record(&headers, &payload)
}

/// Frame one record: version line, headers, blank line, payload, trailer.
pub fn build_record(headers: &[(String, String)], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 256);
    out.extend_from_slice(WARC_VERSION.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// Append a framed record to `w`, gzipping it as a single member when
/// `compress` is set. Returns the number of bytes written to `w`.
pub fn write_record(
    w: &mut impl Write,
    headers: &[(String, String)],
    payload: &[u8],
    compress: bool,
) -> io::Result<u64> {
    let framed = build_record(headers, payload);
    write_framed(w, &framed, compress)
}

/// Append already-framed record bytes, compressing when asked.
pub fn write_framed(w: &mut impl Write, framed: &[u8], compress: bool) -> io::Result<u64> {
    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(framed)?;
        let member = encoder.finish()?;
        w.write_all(&member)?;
        Ok(member.len() as u64)
    } else {
        w.write_all(framed)?;
        Ok(framed.len() as u64)
    }
}
