//! Client metrics.
//!
//! Process-wide counters for connection lifecycle, traffic volume, and
//! policy events. Exposed through the `metriken` registry for whatever
//! exporter the embedding application runs.

use metriken::{Counter, metric};

#[metric(
    name = "wireline/connections/opened",
    description = "Connections dialed (TCP established, TLS done when applicable)"
)]
pub static CONNECTIONS_OPENED: Counter = Counter::new();

#[metric(
    name = "wireline/connections/closed",
    description = "Connections torn down"
)]
pub static CONNECTIONS_CLOSED: Counter = Counter::new();

#[metric(
    name = "wireline/connections/reused",
    description = "Exchanges served by a pooled keep-alive connection"
)]
pub static CONNECTIONS_REUSED: Counter = Counter::new();

#[metric(
    name = "wireline/pool/idle_evicted",
    description = "Idle connections destroyed by validation or stale sweep"
)]
pub static IDLE_EVICTED: Counter = Counter::new();

#[metric(
    name = "wireline/pool/exhausted",
    description = "Acquisitions that failed because every slot was in flight"
)]
pub static POOL_EXHAUSTED: Counter = Counter::new();

#[metric(name = "wireline/bytes/sent", description = "Request bytes written")]
pub static BYTES_SENT: Counter = Counter::new();

#[metric(name = "wireline/bytes/received", description = "Response bytes read")]
pub static BYTES_RECEIVED: Counter = Counter::new();

#[metric(name = "wireline/requests", description = "Requests dispatched")]
pub static REQUESTS_SENT: Counter = Counter::new();

#[metric(
    name = "wireline/redirects",
    description = "Redirect hops followed"
)]
pub static REDIRECTS_FOLLOWED: Counter = Counter::new();

#[metric(
    name = "wireline/streams",
    description = "Streaming responses opened"
)]
pub static STREAMS_OPENED: Counter = Counter::new();
