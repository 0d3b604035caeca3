//! HTTP response: status line and header parsing, body framing selection,
//! and body storage.
//!
//! Header parsing tolerates only CRLF line endings and requires a
//! well-formed status line. HTTP/2 and HTTP/3 status lines are accepted
//! for compatibility but recorded as 1.1, since this is an HTTP/1.1 client and
//! all framing decisions are 1.1 framing. HTTP/0.9 and unknown 1.x minor
//! versions are rejected.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::chunked::ChunkedDecoder;
use crate::error::HttpError;
use crate::headers::HeaderMap;

/// How a response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// `Content-Length` was present and parsed.
    FixedLength(usize),
    /// `Transfer-Encoding` contained the `chunked` token.
    Chunked,
    /// `Content-Type: text/event-stream` without chunked framing.
    Sse,
    /// No framing information; the body runs to connection close.
    ReadUntilClose,
}

/// A parsed HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    reason: String,
    version: (u8, u8),
    headers: HeaderMap,
    body: Option<Bytes>,
    transfer_mode: TransferMode,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// An empty response awaiting `parse_headers`.
    pub fn new() -> Self {
        Response {
            status: 0,
            reason: String::new(),
            version: (1, 1),
            headers: HeaderMap::new(),
            body: None,
            transfer_mode: TransferMode::ReadUntilClose,
        }
    }

    /// Parse the status line and header block from `bytes`, which must
    /// contain the `\r\n\r\n` terminator. Returns the offset of the first
    /// byte past the terminator; anything beyond it belongs to the body.
    pub fn parse_headers(&mut self, bytes: &[u8]) -> Result<usize, HttpError> {
        if bytes.is_empty() {
            return Err(HttpError::EmptyResponse);
        }
        let head_end = find_header_end(bytes).ok_or(HttpError::MalformedResponse)?;
        let head = std::str::from_utf8(&bytes[..head_end]).map_err(|_| HttpError::MalformedResponse)?;

        let mut lines = head.split("\r\n");
        let status_line = lines.next().ok_or(HttpError::MalformedResponse)?;
        self.parse_status_line(status_line)?;

        for line in lines {
            let (name, value) = line.split_once(':').ok_or(HttpError::MalformedResponse)?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                return Err(HttpError::MalformedResponse);
            }
            self.headers.set(name, value);
        }

        self.transfer_mode = derive_transfer_mode(&self.headers);
        Ok(head_end + 4)
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), HttpError> {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().ok_or(HttpError::MalformedResponse)?;
        let code = parts.next().ok_or(HttpError::MalformedResponse)?;
        let reason = parts.next().unwrap_or("");

        let version = version
            .strip_prefix("HTTP/")
            .ok_or(HttpError::MalformedResponse)?;
        self.version = match version {
            "1.1" => (1, 1),
            "1.0" => (1, 0),
            // accepted for compatibility, framed as 1.1
            "2" | "2.0" | "3" | "3.0" => (1, 1),
            _ => return Err(HttpError::HttpVersionNotSupported),
        };

        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HttpError::MalformedResponse);
        }
        self.status = code.parse().map_err(|_| HttpError::MalformedResponse)?;
        self.reason = reason.to_string();
        Ok(())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Parsed protocol version; 1.0 is kept as parsed, everything newer
    /// is recorded as 1.1.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// The parsed `Content-Length`, if present and valid.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length").and_then(|v| v.parse().ok())
    }

    /// True for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 3xx status codes.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }

    /// The `Location` header, if present.
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location")
    }

    /// Whether the peer asked for the connection to be closed.
    pub(crate) fn wants_close(&self) -> bool {
        self.headers
            .get("connection")
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")))
    }

    /// Store `bytes` as the body, replacing any prior body.
    pub fn parse_body(&mut self, bytes: &[u8]) {
        self.body = Some(Bytes::copy_from_slice(bytes));
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = Some(body);
    }

    /// Decode a complete chunked transfer from `bytes` and store the
    /// result as the body, replacing any prior body.
    pub fn parse_chunked_body(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        let mut decoder = ChunkedDecoder::new();
        let mut out = Vec::new();
        decoder.parse(bytes, &mut out)?;
        if !decoder.is_complete() {
            return Err(HttpError::UnexpectedEof);
        }
        self.body = Some(Bytes::from(out));
        Ok(())
    }

    /// The materialized body, if one was read.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Body as text, lossily decoded.
    pub fn text(&self) -> String {
        match &self.body {
            Some(b) => String::from_utf8_lossy(b).into_owned(),
            None => String::new(),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let body = self.body.as_deref().unwrap_or(&[]);
        Ok(serde_json::from_slice(body)?)
    }
}

/// Index of the first `\r` of `\r\n\r\n`, if present.
pub(crate) fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

fn derive_transfer_mode(headers: &HeaderMap) -> TransferMode {
    if let Some(te) = headers.get("transfer-encoding")
        && te.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked"))
    {
        return TransferMode::Chunked;
    }
    if let Some(ct) = headers.get("content-type")
        && ct.len() >= 17
        && ct[..17].eq_ignore_ascii_case("text/event-stream")
    {
        return TransferMode::Sse;
    }
    if let Some(n) = headers.get("content-length").and_then(|v| v.parse().ok()) {
        return TransferMode::FixedLength(n);
    }
    TransferMode::ReadUntilClose
}
