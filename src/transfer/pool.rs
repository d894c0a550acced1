use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::RemoteFault;
use crate::transfer::remote_fs::Connector;

/// Bounded set of live connections shared by every caller of the endpoint.
///
/// A permit bucket (bounded channel pre-filled with `max_connections` tokens)
/// caps how many connections exist at once; checkout blocks while all permits
/// are out. Idle connections are kept for reuse when `keep_alive` is set.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    idle: Mutex<Vec<C::Conn>>,
    permit_tx: Sender<()>,
    permit_rx: Receiver<()>,
    max_connections: usize,
    keep_alive: bool,
}

impl<C: Connector> ConnectionPool<C> {
    /// A `max_connections` of 0 falls back to 1.
    pub fn new(connector: C, max_connections: usize, keep_alive: bool) -> Self {
        let capacity = max_connections.max(1);
        let (permit_tx, permit_rx) = bounded::<()>(capacity);
        for _ in 0..capacity {
            let _ = permit_tx.send(());
        }
        Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            permit_tx,
            permit_rx,
            max_connections: capacity,
            keep_alive,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Number of cached connections not currently checked out.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Borrow a connection, opening one if none is idle. Blocks while the
    /// connection ceiling is reached.
    pub fn checkout(&self) -> Result<PooledConn<'_, C>, RemoteFault> {
        self.permit_rx
            .recv()
            .map_err(|_| RemoteFault::Connection("connection pool closed".into()))?;
        let cached = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let conn = match cached {
            Some(c) => c,
            None => match self.connector.connect() {
                Ok(c) => {
                    tracing::debug!("pool: opened connection to {}", self.connector.describe());
                    c
                }
                Err(e) => {
                    let _ = self.permit_tx.send(());
                    return Err(e);
                }
            },
        };
        Ok(PooledConn { pool: self, conn: Some(conn), broken: false })
    }

    fn release(&self, conn: C::Conn, broken: bool) {
        if self.keep_alive && !broken {
            self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(conn);
        } else {
            drop(conn);
        }
        let _ = self.permit_tx.send(());
    }
}

/// RAII guard returned by `ConnectionPool::checkout`; gives the permit back on drop.
pub struct PooledConn<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C::Conn>,
    broken: bool,
}

impl<C: Connector> PooledConn<'_, C> {
    /// Discard the connection instead of returning it to the idle list.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Inspect a fault and mark the connection broken when it was transport-level.
    pub fn observe<T>(&mut self, res: Result<T, RemoteFault>) -> Result<T, RemoteFault> {
        if let Err(ref e) = res
            && e.is_connection_fault()
        {
            tracing::debug!("pool: dropping connection after fault: {}", e);
            self.broken = true;
        }
        res
    }

    /// Run one primitive on the connection and observe its outcome.
    pub fn run<T>(
        &mut self,
        f: impl FnOnce(&C::Conn) -> Result<T, RemoteFault>,
    ) -> Result<T, RemoteFault> {
        // conn 只在 drop 时被取走
        let Some(conn) = self.conn.as_ref() else {
            return Err(RemoteFault::Connection("pooled connection already released".into()));
        };
        let res = f(conn);
        self.observe(res)
    }
}

impl<C: Connector> Drop for PooledConn<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.broken);
        }
    }
}
