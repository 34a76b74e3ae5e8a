//! CGI response framing
//!
//! A CGI program answers with a header block, a blank line, then the raw body.
//! `git http-backend` ends header lines with either `\n` or `\r\n` depending on
//! the platform, so both are accepted. The body is never touched.

use crate::{Error, Result};
use tracing::warn;

/// Status used when the backend sends no usable `Status` header
pub const DEFAULT_STATUS: u16 = 200;

/// Parsed backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub status: u16,
    /// Response headers in backend order, `Status` excluded
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CgiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Locate the blank line ending the header block.
/// Returns (end of headers, start of body).
fn find_header_end(output: &[u8]) -> Option<(usize, usize)> {
    if output.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if output.starts_with(b"\n") {
        return Some((0, 1));
    }

    let crlf = find(output, b"\r\n\r\n").map(|i| (i, i + 4));
    let lf = find(output, b"\n\n").map(|i| (i, i + 2));

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse the leading numeric token of a `Status` value, e.g. `404 Not Found`.
fn parse_status(value: &str) -> Option<u16> {
    value
        .split_whitespace()
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
}

/// Split raw backend output into status, headers and body.
pub fn parse_cgi_response(output: &[u8]) -> Result<CgiResponse> {
    let (header_end, body_start) = find_header_end(output).ok_or_else(|| {
        Error::MalformedResponse(format!(
            "no header terminator in {} bytes of output",
            output.len()
        ))
    })?;

    let header_block = std::str::from_utf8(&output[..header_end])
        .map_err(|_| Error::MalformedResponse("header block is not valid UTF-8".into()))?;

    let mut status = None;
    let mut headers = Vec::new();

    for line in header_block.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            warn!("Ignoring malformed CGI header line: {:?}", line);
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("Status") {
            status = parse_status(value);
        } else {
            headers.push((key.to_string(), value.to_string()));
        }
    }

    Ok(CgiResponse {
        status: status.unwrap_or(DEFAULT_STATUS),
        headers,
        body: output[body_start..].to_vec(),
    })
}
