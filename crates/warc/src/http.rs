//! HTTP response framing inside artifact record payloads.
//!
//! An artifact record's payload is the HTTP response on the wire:
//! status line, headers, CRLF CRLF, body. Only the head is parsed here;
//! the body stays a byte stream.

use crate::record::{WarcError, WarcResult};
use std::io::BufRead;

/// Serialize the response head: status line + headers + blank line.
pub fn write_response_head(
    out: &mut Vec<u8>,
    status_line: &str,
    headers: &[(String, String)],
) {
    out.extend_from_slice(status_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Size in bytes of the serialized response head.
pub fn response_head_len(status_line: &str, headers: &[(String, String)]) -> u64 {
    let mut head = Vec::new();
    write_response_head(&mut head, status_line, headers);
    head.len() as u64
}

/// Parse the response head, leaving the reader positioned at the body's
/// first byte.
pub fn parse_response_head(r: &mut impl BufRead) -> WarcResult<(String, Vec<(String, String)>)> {
    let mut status_line = String::new();
    if r.read_line(&mut status_line)? == 0 {
        return Err(WarcError::Truncated);
    }
    let status_line = status_line.trim_end().to_string();
    if !status_line.starts_with("HTTP/") {
        return Err(WarcError::Malformed(format!(
            "bad HTTP status line '{}'",
            status_line
        )));
    }

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if r.read_line(&mut line)? == 0 {
            return Err(WarcError::Truncated);
        }
        let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n');
        if trimmed.is_empty() {
            break;
        }
        let (name, value) = trimmed.split_once(':').ok_or_else(|| {
            WarcError::Malformed(format!("HTTP header line without colon: '{}'", trimmed))
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok((status_line, headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test]
    fn test_head_round_trip() {
        let headers = vec![
            ("key1".to_string(), "val1".to_string()),
            ("key2".to_string(), "val2".to_string()),
        ];
        let mut wire = Vec::new();
        write_response_head(&mut wire, "HTTP/1.1 200 OK", &headers);
        wire.extend_from_slice(b"body bytes");

        let mut cursor = Cursor::new(wire);
        let (status, parsed) = parse_response_head(&mut cursor).unwrap();
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert_eq!(parsed, headers);

        let mut body = Vec::new();
        cursor.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"body bytes");
    }

    #[test]
    fn test_head_len_matches_serialization() {
        let headers = vec![("a".to_string(), "b".to_string())];
        let mut wire = Vec::new();
        write_response_head(&mut wire, "HTTP/1.1 404 Not Found", &headers);
        assert_eq!(
            response_head_len("HTTP/1.1 404 Not Found", &headers),
            wire.len() as u64
        );
    }

    #[test]
    fn test_non_http_status_line_rejected() {
        let mut cursor = Cursor::new(b"FTP/1.0 200\r\n\r\n".to_vec());
        assert!(parse_response_head(&mut cursor).is_err());
    }

    #[test]
    fn test_truncated_head() {
        let mut cursor = Cursor::new(b"HTTP/1.1 200 OK\r\nkey: v".to_vec());
        assert!(matches!(
            parse_response_head(&mut cursor),
            Err(WarcError::Truncated) | Err(WarcError::Malformed(_))
        ));
    }
}
