//! Keep-alive connection pool keyed by `(host, port, tls)`.
//!
//! Each key maps to a list of parked idle connections plus a count of
//! connections checked out for in-flight exchanges; a connection is
//! owned by exactly one place at a time. Distinct schemes never share
//! connections. Single-threaded by design (`&mut` methods, no locks),
//! for use within one cooperative worker.
//!
//! Acquisition pops the most recently parked idle connection, validates
//! liveness and the keep-alive budget, and falls back to dialing a new
//! connection. There is no waiting on exhaustion:
//! [`HttpError::ConnectionPoolExhausted`] is a first-class error.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::connection::Connection;
use crate::error::HttpError;
use crate::metrics;

/// Identity of interchangeable connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    host: String,
    port: u16,
    tls: bool,
}

#[derive(Default)]
struct ConnectionList {
    /// Parked connections, most recently used last (LIFO reuse).
    idle: Vec<Connection>,
    /// Connections checked out for in-flight exchanges.
    active: usize,
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_idle: usize,
    pub total_active: usize,
    pub total_pools: usize,
}

/// Per-host keep-alive connection pool.
pub struct ConnectionPool {
    lists: HashMap<PoolKey, ConnectionList>,
    max_per_host: usize,
    max_idle_ms: u64,
    max_keepalive_requests: u32,
}

impl ConnectionPool {
    pub fn new(max_per_host: usize, max_idle_ms: u64, max_keepalive_requests: u32) -> Self {
        ConnectionPool {
            lists: HashMap::new(),
            max_per_host,
            max_idle_ms,
            max_keepalive_requests,
        }
    }

    pub fn set_max_per_host(&mut self, max: usize) {
        self.max_per_host = max;
    }

    pub fn set_max_idle_ms(&mut self, ms: u64) {
        self.max_idle_ms = ms;
    }

    pub fn set_max_keepalive_requests(&mut self, max: u32) {
        self.max_keepalive_requests = max;
    }

    /// Check out a connection for `(host, port, tls)`, reusing a live
    /// idle one when possible, dialing otherwise.
    ///
    /// Dead or keep-alive-exhausted idle connections are silently
    /// destroyed and skipped. At the per-host cap, all idle connections
    /// for the key are evicted first; if every slot is then still in
    /// flight, the call fails without blocking.
    pub async fn get_connection(
        &mut self,
        host: &str,
        port: u16,
        tls: bool,
        tls_config: &Arc<rustls::ClientConfig>,
    ) -> Result<Connection, HttpError> {
        let key = PoolKey { host: host.to_string(), port, tls };
        let list = self.lists.entry(key.clone()).or_default();

        while let Some(mut conn) = list.idle.pop() {
            if conn.is_alive() && conn.keepalive_count() < self.max_keepalive_requests {
                conn.activate();
                list.active += 1;
                metrics::CONNECTIONS_REUSED.increment();
                trace!("reusing connection to {host}:{port} (uses={})", conn.keepalive_count());
                return Ok(conn);
            }
            trace!("discarding stale idle connection to {host}:{port}");
            metrics::IDLE_EVICTED.increment();
            // conn dropped here
        }

        if list.idle.len() + list.active >= self.max_per_host {
            self.evict_idle(0);
            let list = self.lists.get_mut(&key).expect("list exists");
            if list.active >= self.max_per_host {
                metrics::POOL_EXHAUSTED.increment();
                return Err(HttpError::ConnectionPoolExhausted);
            }
        }

        let mut conn = Connection::new(host, port, tls);
        conn.connect(tls_config).await?;
        conn.activate();
        let list = self.lists.get_mut(&key).expect("list exists");
        list.active += 1;
        debug!("pool opened connection to {host}:{port} (tls={tls})");
        Ok(conn)
    }

    /// Return a checked-out connection. `reusable` reflects the response
    /// that rode on it (`Connection: close` makes it false); the pool
    /// additionally requires liveness and remaining keep-alive budget
    /// before parking, otherwise the connection is destroyed.
    pub fn return_connection(&mut self, mut conn: Connection, reusable: bool) {
        let key = PoolKey {
            host: conn.host().to_string(),
            port: conn.port(),
            tls: conn.is_tls(),
        };
        let Some(list) = self.lists.get_mut(&key) else {
            return; // connection the pool never issued
        };
        list.active = list.active.saturating_sub(1);

        if reusable && conn.is_alive() && conn.keepalive_count() < self.max_keepalive_requests {
            conn.park();
            list.idle.push(conn);
        } else {
            trace!("destroying returned connection to {}:{}", conn.host(), conn.port());
            conn.close();
        }
    }

    /// Record that a checked-out connection died or was handed off and
    /// will never be returned.
    pub fn forget_connection(&mut self, conn: &Connection) {
        let key = PoolKey {
            host: conn.host().to_string(),
            port: conn.port(),
            tls: conn.is_tls(),
        };
        if let Some(list) = self.lists.get_mut(&key) {
            list.active = list.active.saturating_sub(1);
        }
    }

    /// Destroy idle connections that exceeded the idle threshold or died.
    pub fn cleanup_idle(&mut self) {
        self.evict_idle(self.max_idle_ms);
    }

    fn evict_idle(&mut self, threshold_ms: u64) {
        for (key, list) in self.lists.iter_mut() {
            let before = list.idle.len();
            // threshold 0 evicts everything idle
            list.idle
                .retain(|c| threshold_ms > 0 && c.is_alive() && c.idle_ms() <= threshold_ms);
            let evicted = before - list.idle.len();
            if evicted > 0 {
                metrics::IDLE_EVICTED.add(evicted as u64);
                debug!("evicted {evicted} idle connection(s) to {}:{}", key.host, key.port);
            }
        }
    }

    /// Occupancy across all keys.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats { total_idle: 0, total_active: 0, total_pools: self.lists.len() };
        for list in self.lists.values() {
            stats.total_idle += list.idle.len();
            stats.total_active += list.active;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::net::TcpListener;

    fn tls_config() -> Arc<rustls::ClientConfig> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth(),
        )
    }

    /// Accepts `n` connections and holds them open until the guard drops.
    fn holding_listener(n: usize) -> (u16, std::thread::JoinHandle<Vec<std::net::TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            (0..n).map(|_| listener.accept().unwrap().0).collect()
        });
        (port, handle)
    }

    #[tokio::test]
    async fn reuse_returns_same_connection() {
        let (port, server) = holding_listener(1);
        let mut pool = ConnectionPool::new(10, 60_000, 100);
        let tls = tls_config();

        let conn = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        assert_eq!(conn.keepalive_count(), 1);
        assert_eq!(pool.stats(), PoolStats { total_idle: 0, total_active: 1, total_pools: 1 });

        pool.return_connection(conn, true);
        assert_eq!(pool.stats(), PoolStats { total_idle: 1, total_active: 0, total_pools: 1 });

        let conn = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        assert_eq!(conn.keepalive_count(), 2);
        pool.return_connection(conn, true);
        assert_eq!(pool.stats(), PoolStats { total_idle: 1, total_active: 0, total_pools: 1 });
        drop(pool);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn non_reusable_connection_destroyed() {
        let (port, server) = holding_listener(1);
        let mut pool = ConnectionPool::new(10, 60_000, 100);
        let conn = pool.get_connection("127.0.0.1", port, false, &tls_config()).await.unwrap();

        pool.return_connection(conn, false);
        assert_eq!(pool.stats(), PoolStats { total_idle: 0, total_active: 0, total_pools: 1 });
        server.join().unwrap();
    }

    #[tokio::test]
    async fn keepalive_budget_exhaustion_discards() {
        let (port, server) = holding_listener(2);
        let mut pool = ConnectionPool::new(10, 60_000, 2);
        let tls = tls_config();

        let conn = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        pool.return_connection(conn, true);
        let conn = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        assert_eq!(conn.keepalive_count(), 2);
        // budget spent: not parked again
        pool.return_connection(conn, true);
        assert_eq!(pool.stats().total_idle, 0);

        // next acquire dials fresh
        let conn = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        assert_eq!(conn.keepalive_count(), 1);
        drop(conn);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn exhaustion_is_an_error_not_a_wait() {
        let (port, server) = holding_listener(2);
        let mut pool = ConnectionPool::new(2, 60_000, 100);
        let tls = tls_config();

        let c1 = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        let c2 = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        let err = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap_err();
        assert!(matches!(err, HttpError::ConnectionPoolExhausted));

        pool.return_connection(c1, true);
        pool.return_connection(c2, true);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn at_cap_idle_is_evicted_before_dialing() {
        let (port, server) = holding_listener(2);
        let mut pool = ConnectionPool::new(2, 60_000, 100);
        let tls = tls_config();

        let c1 = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        let c2 = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        pool.return_connection(c2, true);
        assert_eq!(pool.stats(), PoolStats { total_idle: 1, total_active: 1, total_pools: 1 });

        // reuse path still preferred at cap
        let c2 = pool.get_connection("127.0.0.1", port, false, &tls).await.unwrap();
        assert_eq!(c2.keepalive_count(), 2);
        pool.return_connection(c1, true);
        pool.return_connection(c2, true);
        server.join().unwrap();
    }

    #[tokio::test]
    async fn distinct_ports_get_distinct_lists() {
        let (port_a, server_a) = holding_listener(1);
        let (port_b, server_b) = holding_listener(1);
        let mut pool = ConnectionPool::new(10, 60_000, 100);
        let tls = tls_config();

        let a = pool.get_connection("127.0.0.1", port_a, false, &tls).await.unwrap();
        let b = pool.get_connection("127.0.0.1", port_b, false, &tls).await.unwrap();
        assert_eq!(pool.stats().total_pools, 2);
        pool.return_connection(a, true);
        pool.return_connection(b, true);
        assert_eq!(pool.stats(), PoolStats { total_idle: 2, total_active: 0, total_pools: 2 });
        server_a.join().unwrap();
        server_b.join().unwrap();
    }

    #[tokio::test]
    async fn cleanup_evicts_closed_peers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1];
            let _ = s.read(&mut buf); // wait for close
        });

        let mut pool = ConnectionPool::new(10, 0, 100);
        let conn = pool.get_connection("127.0.0.1", port, false, &tls_config()).await.unwrap();
        pool.return_connection(conn, true);
        assert_eq!(pool.stats().total_idle, 1);

        // max_idle_ms = 0: everything idle is stale
        std::thread::sleep(std::time::Duration::from_millis(5));
        pool.cleanup_idle();
        assert_eq!(pool.stats().total_idle, 0);
        server.join().unwrap();
    }
}
