//! Top-level HTTP client: request dispatch, header-phase read, body
//! framing, keep-alive pooling, and the redirect loop.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut client = HttpClient::new();
//! let resp = client.get("http://example.com/api/data")
//!     .header("accept", "application/json")
//!     .send()
//!     .await?;
//! assert_eq!(resp.status(), 200);
//! ```
//!
//! Streaming entry points perform only the header phase, then hand the
//! connection to a [`StreamingResponse`]; they never follow redirects.
//! A 3xx is surfaced for the caller to decide.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::debug;
use serde::Serialize;

use crate::chunked::ChunkedDecoder;
use crate::config::{ClientConfig, StreamConfig};
use crate::connection::Connection;
use crate::error::HttpError;
use crate::headers::HeaderMap;
use crate::method::Method;
use crate::metrics;
use crate::pool::{ConnectionPool, PoolStats};
use crate::redirect;
use crate::request::Request;
use crate::response::{Response, TransferMode, find_header_end};
use crate::streaming::StreamingResponse;
use crate::url::PortPolicy;

/// Response head larger than this fails with `HeadersTooLarge`.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// HTTP/1.1 client with keep-alive pooling, redirects, and streaming.
pub struct HttpClient {
    config: ClientConfig,
    stream_config: StreamConfig,
    default_headers: HeaderMap,
    pool: ConnectionPool,
    tls_config: Arc<rustls::ClientConfig>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Client with default configuration and webpki root trust.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let pool = ConnectionPool::new(
            config.max_connections_per_host,
            config.max_idle_time_ms,
            config.max_keepalive_requests,
        );
        HttpClient {
            config,
            stream_config: StreamConfig::default(),
            default_headers: HeaderMap::new(),
            pool,
            tls_config: default_tls_config(),
        }
    }

    /// Replace the TLS configuration (root store, ALPN, etc.).
    pub fn set_tls_config(&mut self, config: Arc<rustls::ClientConfig>) {
        self.tls_config = config;
    }

    /// Header applied to every request that does not already carry it.
    pub fn set_default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers.set(name, value);
    }

    pub fn set_default_timeout_ms(&mut self, ms: u64) {
        self.config.default_timeout_ms = ms;
    }

    pub fn set_follow_redirects(&mut self, follow: bool) {
        self.config.follow_redirects = follow;
    }

    pub fn set_max_redirects(&mut self, max: u32) {
        self.config.max_redirects = max;
    }

    pub fn set_use_connection_pool(&mut self, use_pool: bool) {
        self.config.use_connection_pool = use_pool;
    }

    pub fn set_max_connections_per_host(&mut self, max: usize) {
        self.config.max_connections_per_host = max;
        self.pool.set_max_per_host(max);
    }

    pub fn set_max_idle_time_ms(&mut self, ms: u64) {
        self.config.max_idle_time_ms = ms;
        self.pool.set_max_idle_ms(ms);
    }

    pub fn set_max_keepalive_requests(&mut self, max: u32) {
        self.config.max_keepalive_requests = max;
        self.pool.set_max_keepalive_requests(max);
    }

    pub fn set_stream_config(&mut self, config: StreamConfig) {
        self.stream_config = config;
    }

    /// Destroy idle pooled connections past the idle threshold.
    pub fn cleanup_idle_connections(&mut self) {
        self.pool.cleanup_idle();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn get(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Get, url)
    }

    pub fn head(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Head, url)
    }

    pub fn post(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Post, url)
    }

    pub fn put(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Put, url)
    }

    pub fn patch(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Patch, url)
    }

    pub fn delete(&mut self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Delete, url)
    }

    /// Dispatch `req` and read the complete response, following
    /// redirects per configuration.
    pub async fn send(&mut self, req: &Request) -> Result<Response, HttpError> {
        let mut current = req.clone();
        self.merge_default_headers(&mut current);
        let follow = current.follow_redirects.unwrap_or(self.config.follow_redirects);
        let timeout_ms = current.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        let mut hops = 0u32;
        loop {
            let resp = self.dispatch_one(&current, timeout_ms).await?;
            if follow && resp.is_redirect() {
                hops += 1;
                if hops > self.config.max_redirects {
                    return Err(HttpError::TooManyRedirects);
                }
                metrics::REDIRECTS_FOLLOWED.increment();
                current = redirect::next_request(&current, &resp)?;
                continue;
            }
            return Ok(resp);
        }
    }

    /// Dispatch `req` on a dedicated connection and hand it to a
    /// [`StreamingResponse`] after the header phase. Never follows
    /// redirects and never touches the pool.
    pub async fn send_streaming(&mut self, req: &Request) -> Result<StreamingResponse, HttpError> {
        let mut current = req.clone();
        self.merge_default_headers(&mut current);
        let timeout_ms = current.timeout_ms.unwrap_or(self.config.default_timeout_ms);

        let (host, port, tls) = endpoint_of(&current)?;
        let mut conn = Connection::new(host, port, tls);
        deadline(timeout_ms, conn.connect(&self.tls_config)).await?;
        conn.activate();
        metrics::REQUESTS_SENT.increment();

        let mut wire = Vec::with_capacity(256);
        current.write_to(&mut wire);
        if let Err(e) = deadline(timeout_ms, conn.send_all(&wire)).await {
            conn.close();
            return Err(e);
        }

        let (resp, leftover) = match read_head(&mut conn, timeout_ms).await {
            Ok(parts) => parts,
            Err(e) => {
                conn.close();
                return Err(e);
            }
        };

        Ok(StreamingResponse::new(conn, resp, leftover, &self.stream_config))
    }

    /// One request/response exchange, no redirect handling.
    async fn dispatch_one(&mut self, req: &Request, timeout_ms: u64) -> Result<Response, HttpError> {
        let (host, port, tls) = endpoint_of(req)?;
        let pooled = self.config.use_connection_pool;

        let mut conn = if pooled {
            deadline(
                timeout_ms,
                self.pool.get_connection(&host, port, tls, &self.tls_config),
            )
            .await?
        } else {
            let mut c = Connection::new(host.as_str(), port, tls);
            deadline(timeout_ms, c.connect(&self.tls_config)).await?;
            c.activate();
            c
        };
        metrics::REQUESTS_SENT.increment();

        match run_exchange(&mut conn, req, timeout_ms).await {
            Ok((resp, reusable)) => {
                if pooled {
                    self.pool.return_connection(conn, reusable);
                } else {
                    conn.close();
                }
                Ok(resp)
            }
            Err(e) => {
                // the connection is not returned on failure
                if pooled {
                    self.pool.forget_connection(&conn);
                }
                conn.close();
                Err(e)
            }
        }
    }

    fn merge_default_headers(&self, req: &mut Request) {
        for (name, value) in self.default_headers.iter() {
            if !req.headers.contains(name) {
                req.headers.set(name, value);
            }
        }
    }
}

/// Fluent request builder bound to a client.
///
/// URL parse failures are deferred and surface from `send`.
pub struct RequestBuilder<'a> {
    client: &'a mut HttpClient,
    request: Result<Request, HttpError>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a mut HttpClient, method: Method, url: &str) -> Self {
        RequestBuilder { client, request: Request::new(method, url) }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(req) = &mut self.request {
            req.set_header(name, value);
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        if let Ok(req) = &mut self.request {
            req.set_body(body);
        }
        self
    }

    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        if let Ok(req) = &mut self.request
            && let Err(e) = req.set_json(value)
        {
            self.request = Err(e);
        }
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        if let Ok(req) = &mut self.request {
            req.set_timeout_ms(ms);
        }
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        if let Ok(req) = &mut self.request {
            req.set_follow_redirects(follow);
        }
        self
    }

    pub async fn send(self) -> Result<Response, HttpError> {
        let req = self.request?;
        self.client.send(&req).await
    }

    pub async fn send_streaming(self) -> Result<StreamingResponse, HttpError> {
        let req = self.request?;
        self.client.send_streaming(&req).await
    }
}

/// `(decoded host, effective port, tls)` for a request URL.
fn endpoint_of(req: &Request) -> Result<(String, u16, bool), HttpError> {
    let url = req.url();
    let tls = url.is_secure();
    let port = url.port_with(PortPolicy::DefaultForKnownSchemes)?;
    let host = url.host()?.into_owned();
    Ok((host, port, tls))
}

/// Run `fut` under a millisecond deadline; 0 disables it.
async fn deadline<T>(
    ms: u64,
    fut: impl Future<Output = Result<T, HttpError>>,
) -> Result<T, HttpError> {
    if ms == 0 {
        return fut.await;
    }
    match tokio::time::timeout(Duration::from_millis(ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(HttpError::Timeout),
    }
}

/// Send the serialized request, read the head, read the body per the
/// detected framing. Returns the response and whether the connection may
/// be reused.
async fn run_exchange(
    conn: &mut Connection,
    req: &Request,
    timeout_ms: u64,
) -> Result<(Response, bool), HttpError> {
    let mut wire = Vec::with_capacity(256);
    req.write_to(&mut wire);
    deadline(timeout_ms, conn.send_all(&wire)).await?;

    let (mut resp, leftover) = read_head(conn, timeout_ms).await?;

    // HEAD and bodyless statuses carry no payload regardless of framing
    let status = resp.status();
    let bodyless =
        req.method() == Method::Head || status == 204 || status == 304 || (100..200).contains(&status);
    if bodyless {
        let reuse = !resp.wants_close();
        return Ok((resp, reuse));
    }

    let reusable = match resp.transfer_mode() {
        TransferMode::Chunked => {
            let body = read_chunked_body(conn, leftover, timeout_ms).await?;
            resp.set_body(body);
            true
        }
        TransferMode::FixedLength(n) => {
            let body = read_fixed_body(conn, leftover, n, timeout_ms).await?;
            resp.set_body(body);
            true
        }
        // non-streaming consumption of an event stream or unframed body
        // drains to connection close; the connection cannot be reused
        TransferMode::Sse | TransferMode::ReadUntilClose => {
            let body = read_until_close(conn, leftover, timeout_ms).await?;
            resp.set_body(body);
            false
        }
    };

    let reuse = reusable && !resp.wants_close();
    Ok((resp, reuse))
}

/// Incrementally read until `\r\n\r\n`, parse the head, and return it
/// with any body bytes that followed the terminator.
async fn read_head(
    conn: &mut Connection,
    timeout_ms: u64,
) -> Result<(Response, Vec<u8>), HttpError> {
    let mut buf = BytesMut::with_capacity(4096);
    let mut scratch = [0u8; 4096];

    let head_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(HttpError::HeadersTooLarge);
        }
        let n = deadline(timeout_ms, conn.recv_some(&mut scratch)).await?;
        if n == 0 {
            return Err(if buf.is_empty() {
                HttpError::EmptyResponse
            } else {
                HttpError::UnexpectedEof
            });
        }
        buf.extend_from_slice(&scratch[..n]);
    };

    let mut resp = Response::new();
    let body_start = resp.parse_headers(&buf)?;
    debug!("response {} {} ({} header bytes)", resp.status(), resp.reason(), head_end + 4);
    Ok((resp, buf[body_start..].to_vec()))
}

async fn read_chunked_body(
    conn: &mut Connection,
    leftover: Vec<u8>,
    timeout_ms: u64,
) -> Result<Bytes, HttpError> {
    let mut decoder = ChunkedDecoder::new();
    let mut out = Vec::new();
    decoder.parse(&leftover, &mut out)?;

    let mut scratch = [0u8; 8192];
    while !decoder.is_complete() {
        let n = deadline(timeout_ms, conn.recv_some(&mut scratch)).await?;
        if n == 0 {
            return Err(HttpError::UnexpectedEof);
        }
        decoder.parse(&scratch[..n], &mut out)?;
    }
    Ok(Bytes::from(out))
}

async fn read_fixed_body(
    conn: &mut Connection,
    leftover: Vec<u8>,
    len: usize,
    timeout_ms: u64,
) -> Result<Bytes, HttpError> {
    let mut body = leftover;
    body.truncate(len);
    let mut scratch = [0u8; 8192];
    while body.len() < len {
        let n = deadline(timeout_ms, conn.recv_some(&mut scratch)).await?;
        if n == 0 {
            return Err(HttpError::UnexpectedEndOfStream);
        }
        body.extend_from_slice(&scratch[..n]);
    }
    body.truncate(len);
    Ok(Bytes::from(body))
}

async fn read_until_close(
    conn: &mut Connection,
    leftover: Vec<u8>,
    timeout_ms: u64,
) -> Result<Bytes, HttpError> {
    let mut body = leftover;
    let mut scratch = [0u8; 8192];
    loop {
        let n = deadline(timeout_ms, conn.recv_some(&mut scratch)).await?;
        if n == 0 {
            return Ok(Bytes::from(body));
        }
        body.extend_from_slice(&scratch[..n]);
    }
}

fn default_tls_config() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_defers_url_errors_to_send() {
        let mut client = HttpClient::new();
        let err = client.get("not a url").send().await.unwrap_err();
        assert!(matches!(err, HttpError::MalformedUrl(_)));
    }

    #[tokio::test]
    async fn unknown_scheme_rejected() {
        let mut client = HttpClient::new();
        let req = Request::new(Method::Get, "gopher://h/x").unwrap();
        let err = client.send(&req).await.unwrap_err();
        assert!(matches!(err, HttpError::UnknownSchemeNoDefault(_)));
    }

    #[test]
    fn default_headers_merge_only_when_absent() {
        let mut client = HttpClient::new();
        client.set_default_header("User-Agent", "wireline/0.1");
        client.set_default_header("Accept", "*/*");

        let mut req = Request::get("http://h/").unwrap();
        req.set_header("Accept", "application/json");
        client.merge_default_headers(&mut req);

        assert_eq!(req.headers().get("user-agent"), Some("wireline/0.1"));
        assert_eq!(req.headers().get("accept"), Some("application/json"));
    }

    #[test]
    fn endpoint_extraction() {
        let req = Request::get("https://example.com/x").unwrap();
        assert_eq!(endpoint_of(&req).unwrap(), ("example.com".to_string(), 443, true));

        let req = Request::get("http://example.com:8080/x").unwrap();
        assert_eq!(endpoint_of(&req).unwrap(), ("example.com".to_string(), 8080, false));
    }
}
