//! Asynchronous HTTP/1.1 client stack.
//!
//! Provides URL handling, plaintext and TLS connections, a per-host
//! keep-alive connection pool, request/response serialization, an
//! RFC-aware redirect follower, and a streaming response layer with
//! incremental chunked-transfer and Server-Sent Events decoding.
//!
//! # Architecture
//!
//! [`HttpClient`] orchestrates one exchange: it resolves the request URL,
//! obtains a [`Connection`] (from the [`pool`] or dialed directly),
//! serializes the [`Request`], reads the head incrementally, then frames
//! the body by `Content-Length`, chunked transfer, or read-until-close
//! into a [`Response`]. 3xx responses loop through the redirect
//! controller. Streaming entry points stop after the header phase and
//! hand the connection to a [`StreamingResponse`], which drives the
//! [`chunked`] decoder or the [`sse`] tokenizer, both pure state
//! machines fed by the streamer, never reading the socket themselves.
//!
//! The client targets a single-threaded cooperative runtime: suspension
//! happens only at connect, DNS resolution, and socket reads/writes, and
//! the pool is `&mut`-owned with no locks.
//!
//! # Example
//!
//! ```rust,ignore
//! use wireline::HttpClient;
//!
//! async fn example() -> Result<(), wireline::HttpError> {
//!     let mut client = HttpClient::new();
//!
//!     let resp = client.get("http://example.com/api/data")
//!         .header("accept", "application/json")
//!         .send()
//!         .await?;
//!     assert_eq!(resp.status(), 200);
//!
//!     let mut stream = client.get("http://example.com/events").send_streaming().await?;
//!     while let Some(event) = stream.next_event().await? {
//!         // process each SSE event as it arrives
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunked;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod headers;
pub mod method;
pub mod metrics;
pub mod pool;
mod redirect;
pub mod request;
pub mod response;
pub mod sse;
pub mod streaming;
pub mod url;

pub use client::{HttpClient, RequestBuilder};
pub use config::{ClientConfig, StreamConfig};
pub use connection::{ConnState, Connection};
pub use error::HttpError;
pub use headers::HeaderMap;
pub use method::Method;
pub use pool::{ConnectionPool, PoolStats};
pub use request::Request;
pub use response::{Response, TransferMode};
pub use sse::{OverflowPolicy, SseEvent, SseParser};
pub use streaming::StreamingResponse;
pub use url::{PortPolicy, TargetForm, Url};
