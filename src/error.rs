use std::io;

/// Errors produced by the HTTP client stack.
///
/// Parsing and framing errors are fatal to the current exchange; the
/// connection they occurred on is destroyed, never returned to the pool.
/// Policy errors (redirect caps, pool exhaustion, event size limits) are
/// raised to the caller without touching the connection lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    // -- input --
    /// The URL could not be parsed.
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    /// The URL has no host component.
    #[error("no host in url")]
    NoHostInUrl,

    /// The URL scheme has no default port.
    #[error("unknown scheme: {0}")]
    UnknownSchemeNoDefault(String),

    /// The URL has no port and the resolution policy requires one.
    #[error("port missing")]
    PortMissing,

    /// A 3xx response carried no `Location` header.
    #[error("missing location header")]
    MissingLocationHeader,

    // -- framing --
    /// The response status line or a header line was malformed.
    #[error("malformed response")]
    MalformedResponse,

    /// The response declared an HTTP version this client does not speak.
    #[error("http version not supported")]
    HttpVersionNotSupported,

    /// A chunk size line was not valid hex.
    #[error("invalid chunk size")]
    InvalidChunkSize,

    /// Chunk framing was violated (bad data trailer).
    #[error("malformed chunk")]
    MalformedChunk,

    /// The response header section exceeded the size cap.
    #[error("headers too large")]
    HeadersTooLarge,

    /// The peer closed the connection mid-frame.
    #[error("unexpected eof")]
    UnexpectedEof,

    /// The peer closed before delivering the declared body length.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The peer closed without sending any response bytes.
    #[error("empty response")]
    EmptyResponse,

    // -- transport --
    /// I/O was attempted on a connection that is not connected.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on an already-connected connection.
    #[error("already connected")]
    AlreadyConnected,

    /// Host resolution produced no usable address.
    #[error("no address found for {0}")]
    NoAddressFound(String),

    /// TLS handshake or server-name validation failed.
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),

    /// The connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The operation exceeded its deadline.
    #[error("timeout")]
    Timeout,

    // -- policy --
    /// The redirect chain exceeded the configured hop limit.
    #[error("too many redirects")]
    TooManyRedirects,

    /// Every slot for this host is in use by an in-flight exchange.
    #[error("connection pool exhausted")]
    ConnectionPoolExhausted,

    /// An SSE event outgrew the configured size cap.
    #[error("event too large")]
    EventTooLarge,

    /// The stream has already terminated.
    #[error("stream closed")]
    StreamClosed,

    /// SSE consumption was requested on a non-`text/event-stream` response.
    #[error("not an sse response")]
    NotSseResponse,

    /// JSON encode/decode error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// Returns true if the error indicates the connection itself is dead
    /// and must not be reused.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            HttpError::ConnectionClosed
                | HttpError::UnexpectedEof
                | HttpError::UnexpectedEndOfStream
                | HttpError::Io(_)
                | HttpError::Timeout
                | HttpError::TlsHandshake(_)
        )
    }
}
