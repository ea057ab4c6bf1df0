use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::connection::{Connection, ConnectionSettings};
use crate::errors::PushError;

// -----------------------------------------------------------------------------
// ----- ConnectionPool --------------------------------------------------------

/// Fixed set of gateway connections. At most `capacity` are checked out at a
/// time; further acquirers wait for a release.
#[derive(Debug)]
pub struct ConnectionPool {
    idle: Mutex<VecDeque<Connection>>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Static ------------------------------------------------

impl ConnectionPool {
    /// Connections start disconnected and connect on first use.
    pub fn with_settings(capacity: usize, settings: Arc<ConnectionSettings>) -> Self {
        let capacity = capacity.max(1);
        let idle = (0..capacity)
            .map(|_| Connection::new(settings.clone()))
            .collect::<VecDeque<_>>();

        Self {
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Public ------------------------------------------------

impl ConnectionPool {
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self.idle.lock().len();
        PoolStats {
            capacity: self.capacity,
            idle,
            in_use: self.capacity.saturating_sub(idle),
        }
    }

    /// Waits until a connection is free.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PushError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PushError::PoolClosed)?;

        // A permit guarantees an idle connection.
        let conn = self.idle.lock().pop_front().ok_or(PushError::PoolClosed)?;

        Ok(PooledConnection::new(self.clone(), conn, permit))
    }

    /// Pending and future acquires fail with `PoolClosed`. Idle connections
    /// are shut down now; checked out ones stay usable and are shut down when
    /// their guard drops.
    pub async fn close(&self) {
        self.permits.close();

        let drained = self.idle.lock().drain(..).collect::<Vec<_>>();
        debug!(connections = drained.len(), "closing connection pool");

        for mut conn in drained {
            conn.close().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionPool: Private -----------------------------------------------

impl ConnectionPool {
    fn push_idle(&self, mut conn: Connection) {
        if !self.is_closed() {
            self.idle.lock().push_back(conn);
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { conn.close().await });
            }
            Err(_) => drop(conn),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PooledConnection ------------------------------------------------------

/// Exclusive use of one pool connection. Dropping it returns the connection,
/// connected or not, unless the pool was closed meanwhile.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConnection {
    fn new(pool: Arc<ConnectionPool>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        Self {
            pool,
            conn: Some(conn),
            permit: Some(permit),
        }
    }

    pub fn connection(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection missing gateway connection")
    }

    pub fn release(self) {}
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.push_idle(conn);
        }
        // Released after the connection is back so the next waiter finds it.
        drop(self.permit.take());
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::connection::{Dialer, GatewayStream};
    use crate::gateway::tls::Passthrough;
    use async_trait::async_trait;
    use std::io;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream, duplex};

    #[derive(Debug)]
    struct NeverDialer;

    #[async_trait]
    impl Dialer for NeverDialer {
        async fn dial(&self, _address: &str) -> io::Result<GatewayStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    #[derive(Debug, Default)]
    struct PeerDialer {
        peers: Mutex<Vec<DuplexStream>>,
    }

    #[async_trait]
    impl Dialer for PeerDialer {
        async fn dial(&self, _address: &str) -> io::Result<GatewayStream> {
            let (client, server) = duplex(1024);
            self.peers.lock().push(server);
            Ok(Box::new(client))
        }
    }

    fn duplex_settings(dialer: Arc<dyn Dialer>) -> Arc<ConnectionSettings> {
        Arc::new(ConnectionSettings {
            address: "gateway.test:2195".into(),
            read_timeout: Duration::from_millis(10),
            idle_timeout: None,
            dialer,
            handshake: Arc::new(Passthrough),
        })
    }

    fn settings() -> Arc<ConnectionSettings> {
        duplex_settings(Arc::new(NeverDialer))
    }

    /// Bytes read by the peer, or `None` if it is still waiting.
    async fn read_eof(peer: &mut DuplexStream) -> Option<usize> {
        let mut buf = [0u8; 16];
        tokio::time::timeout(Duration::from_millis(200), peer.read(&mut buf))
            .await
            .ok()
            .map(|read| read.unwrap())
    }

    #[test]
    fn capacity_is_at_least_one() {
        let pool = ConnectionPool::with_settings(0, settings());
        assert_eq!(pool.capacity(), 1);
        assert_eq!(
            pool.stats(),
            PoolStats {
                capacity: 1,
                idle: 1,
                in_use: 0
            }
        );
    }

    #[test]
    fn connections_start_disconnected() {
        let pool = Arc::new(ConnectionPool::with_settings(3, settings()));
        let idle = pool.idle.lock();
        assert_eq!(idle.len(), 3);
        assert!(idle.iter().all(|conn| !conn.is_connected()));
    }

    #[tokio::test]
    async fn release_returns_connection() {
        let pool = Arc::new(ConnectionPool::with_settings(2, settings()));

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().in_use, 2);

        a.release();
        assert_eq!(pool.stats().idle, 1);
        drop(b);
        assert_eq!(pool.stats().idle, 2);
    }

    #[tokio::test]
    async fn single_connection_serializes_acquirers() {
        let pool = Arc::new(ConnectionPool::with_settings(1, settings()));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn closed_pool_rejects_acquire() {
        let pool = Arc::new(ConnectionPool::with_settings(1, settings()));
        pool.close().await;
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(PushError::PoolClosed)));
    }

    #[tokio::test]
    async fn close_shuts_down_idle_and_checked_out_connections() {
        let dialer = Arc::new(PeerDialer::default());
        let settings = duplex_settings(dialer.clone());
        let pool = Arc::new(ConnectionPool::with_settings(2, settings));

        let mut idle = pool.acquire().await.unwrap();
        idle.connection().connect().await.unwrap();
        idle.release();

        let mut held = pool.acquire().await.unwrap();
        held.connection().connect().await.unwrap();

        pool.close().await;
        assert_eq!(pool.stats().idle, 0);

        let mut peers = dialer.peers.lock().drain(..).collect::<Vec<_>>();
        assert_eq!(peers.len(), 2);

        assert_eq!(read_eof(&mut peers[0]).await, Some(0));
        assert_eq!(read_eof(&mut peers[1]).await, None);

        drop(held);
        assert_eq!(read_eof(&mut peers[1]).await, Some(0));
        assert_eq!(pool.stats().idle, 0);
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
