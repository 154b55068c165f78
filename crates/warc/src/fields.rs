//! `application/warc-fields` payloads: CRLF-separated `name: value` lines.
//! Used for warcinfo heads and repository journal records.

use crate::record::{WarcError, WarcResult};

/// Encode name/value pairs as a warc-fields payload.
pub fn encode_fields(pairs: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in pairs {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Parse a warc-fields payload back into name/value pairs.
///
/// Tolerates bare-LF line endings; blank lines are skipped. A line without
/// a colon is malformed.
pub fn parse_fields(payload: &[u8]) -> WarcResult<Vec<(String, String)>> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| WarcError::Malformed("warc-fields payload is not UTF-8".to_string()))?;

    let mut out = Vec::new();
    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| WarcError::Malformed(format!("field line without colon: '{}'", line)))?;
        out.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(out)
}

/// First value for a field name, case-insensitive.
pub fn field<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
