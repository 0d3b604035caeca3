//! HTTP request model and wire serializer.
//!
//! A [`Request`] carries the method, parsed URL, an insertion-ordered
//! header map, and an optional body. The `Host` header is synthesized at
//! construction (omitting the port when it is the scheme default) and
//! `Content-Length` at serialization when a body is present and the
//! caller did not set one. An explicit `Content-Length` is emitted
//! verbatim, even if it mismatches the body.

use bytes::Bytes;
use serde::Serialize;

use crate::error::HttpError;
use crate::headers::HeaderMap;
use crate::method::Method;
use crate::url::{TargetForm, Url};

/// An HTTP request ready for serialization.
///
/// The body is an optional [`Bytes`] payload: `Bytes` covers
/// borrowed-static, shared, and owned data under one type, so JSON
/// bodies the request encodes itself and caller-supplied buffers travel
/// the same way. A request with no body is `None`, never an empty
/// buffer; only a present body triggers `Content-Length` synthesis.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
    /// Per-request timeout override in milliseconds.
    pub(crate) timeout_ms: Option<u64>,
    /// Per-request redirect-following override.
    pub(crate) follow_redirects: Option<bool>,
}

impl Request {
    /// Parse `url` and construct a request with a synthesized `Host`.
    pub fn new(method: Method, url: &str) -> Result<Self, HttpError> {
        let url = Url::parse(url)?;
        Ok(Self::from_url(method, url))
    }

    pub(crate) fn from_url(method: Method, url: Url) -> Self {
        let mut headers = HeaderMap::new();
        headers.set("Host", host_header(&url));
        Request {
            method,
            url,
            headers,
            body: None,
            timeout_ms: None,
            follow_redirects: None,
        }
    }

    pub fn get(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Get, url)
    }

    pub fn head(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Head, url)
    }

    pub fn post(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Post, url)
    }

    pub fn put(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Put, url)
    }

    pub fn patch(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Patch, url)
    }

    pub fn delete(url: &str) -> Result<Self, HttpError> {
        Self::new(Method::Delete, url)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Set a header, replacing any prior value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Attach a body. An empty payload clears it.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        let bytes = body.into();
        self.body = if bytes.is_empty() { None } else { Some(bytes) };
    }

    /// Serialize `value` as JSON, own the buffer, and ensure
    /// `Content-Type: application/json`.
    pub fn set_json<T: Serialize>(&mut self, value: &T) -> Result<(), HttpError> {
        let encoded = serde_json::to_vec(value)?;
        self.set_body(encoded);
        self.headers.set("Content-Type", "application/json");
        Ok(())
    }

    /// Override the client's default timeout for this request.
    pub fn set_timeout_ms(&mut self, ms: u64) {
        self.timeout_ms = Some(ms);
    }

    /// Override the client's redirect policy for this request.
    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.follow_redirects = Some(follow);
    }

    /// Serialize the request head and body to `out`, origin-form target,
    /// headers in insertion order.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.push(b' ');
        let mut target = String::new();
        self.url.write_request_target(&mut target, TargetForm::Origin);
        out.extend_from_slice(target.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if let Some(body) = &self.body
            && !self.headers.contains("content-length")
        {
            out.extend_from_slice(b"Content-Length: ");
            out.extend_from_slice(body.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        out.extend_from_slice(b"\r\n");
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
    }
}

/// `host` alone when the port is absent or the scheme default,
/// `host:port` otherwise.
fn host_header(url: &Url) -> String {
    let default = match url.scheme() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    };
    match url.port() {
        None => url.host_raw().to_string(),
        Some(p) if default == Some(p) => url.host_raw().to_string(),
        Some(p) => format!("{}:{p}", url.host_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_serialization_exact_bytes() {
        let mut req = Request::get("http://example.com/api/users?page=1").unwrap();
        req.set_header("User-Agent", "x/1.0");
        req.set_header("Accept", "application/json");

        let mut out = Vec::new();
        req.write_to(&mut out);
        assert_eq!(
            out,
            b"GET /api/users?page=1 HTTP/1.1\r\nHost: example.com\r\nUser-Agent: x/1.0\r\nAccept: application/json\r\n\r\n"
        );
    }

    #[test]
    fn host_omits_default_ports() {
        for (url, want) in [
            ("http://h/", "h"),
            ("http://h:80/", "h"),
            ("http://h:8080/", "h:8080"),
            ("https://h/", "h"),
            ("https://h:443/", "h"),
            ("https://h:80/", "h:80"),
            ("http://[::1]:8080/", "[::1]:8080"),
        ] {
            let req = Request::get(url).unwrap();
            assert_eq!(req.headers().get("host"), Some(want), "{url}");
        }
    }

    #[test]
    fn content_length_synthesized() {
        let mut req = Request::post("http://h/upload").unwrap();
        req.set_body("hello world");
        let mut out = Vec::new();
        req.write_to(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\nhello world"));
    }

    #[test]
    fn explicit_content_length_honored_verbatim() {
        let mut req = Request::post("http://h/upload").unwrap();
        req.set_header("Content-Length", "999");
        req.set_body("abc");
        let mut out = Vec::new();
        req.write_to(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 999\r\n"));
        assert!(!text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn empty_body_has_no_content_length() {
        let mut req = Request::post("http://h/x").unwrap();
        req.set_body(&b""[..]);
        let mut out = Vec::new();
        req.write_to(&mut out);
        assert!(!String::from_utf8(out).unwrap().contains("Content-Length"));
    }

    #[test]
    fn set_json_owns_body_and_sets_content_type() {
        #[derive(Serialize)]
        struct Payload {
            name: &'static str,
            count: u32,
        }
        let mut req = Request::post("http://h/api").unwrap();
        req.set_json(&Payload { name: "a", count: 2 }).unwrap();
        assert_eq!(req.headers().get("content-type"), Some("application/json"));
        assert_eq!(req.body().unwrap().as_ref(), br#"{"name":"a","count":2}"#);
    }

    #[test]
    fn header_replacement_keeps_wire_position() {
        let mut req = Request::get("http://h/").unwrap();
        req.set_header("Accept", "text/html");
        req.set_header("X-Trace", "1");
        req.set_header("accept", "application/json");
        let mut out = Vec::new();
        req.write_to(&mut out);
        let text = String::from_utf8(out).unwrap();
        let accept_at = text.find("Accept: application/json").unwrap();
        let trace_at = text.find("X-Trace: 1").unwrap();
        assert!(accept_at < trace_at);
    }

    #[test]
    fn empty_path_serializes_as_slash() {
        let req = Request::get("http://h").unwrap();
        let mut out = Vec::new();
        req.write_to(&mut out);
        assert!(out.starts_with(b"GET / HTTP/1.1\r\n"));
    }
}
