//! Client and streaming configuration.

use crate::sse::OverflowPolicy;

/// Configuration for [`HttpClient`](crate::client::HttpClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds, applied to each socket
    /// operation. 0 disables the deadline.
    pub default_timeout_ms: u64,
    /// Follow 3xx responses automatically.
    pub follow_redirects: bool,
    /// Redirect hop cap.
    pub max_redirects: u32,
    /// Reuse connections through the keep-alive pool. When false, every
    /// request dials a fresh connection and destroys it afterwards.
    pub use_connection_pool: bool,
    /// Pool cap per `(host, port, tls)` key.
    pub max_connections_per_host: usize,
    /// Idle eviction threshold in milliseconds.
    pub max_idle_time_ms: u64,
    /// Exchanges served per connection before it is retired.
    pub max_keepalive_requests: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            default_timeout_ms: 30_000,
            follow_redirects: true,
            max_redirects: 10,
            use_connection_pool: true,
            max_connections_per_host: 10,
            max_idle_time_ms: 60_000,
            max_keepalive_requests: 100,
        }
    }
}

/// Configuration for [`StreamingResponse`](crate::streaming::StreamingResponse).
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Receive buffer size for each socket read.
    pub chunk_buffer_size: usize,
    /// Per-read timeout in milliseconds. 0 disables the deadline.
    pub timeout_ms: u64,
    /// Run the SSE tokenizer when the response is `text/event-stream`.
    pub parse_sse: bool,
    /// Size cap for a single SSE event, enforced per `overflow_policy`.
    pub max_event_size: usize,
    /// What to do when an SSE event outgrows `max_event_size`.
    pub overflow_policy: OverflowPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            chunk_buffer_size: 8192,
            timeout_ms: 30_000,
            parse_sse: true,
            max_event_size: 64 * 1024,
            overflow_policy: OverflowPolicy::ReturnError,
        }
    }
}
