//! Connection pool keyed by logical connection name.
//!
//! The pool never waits: asking for a connection beyond the cap is an
//! error. Bookkeeping happens under one mutex that is never held while a
//! connection is being opened or used.

use crate::backend::{Backend, BackendConnection};
use crate::error::{DbError, DbResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Name of the connection used outside node execution (hooks, metadata)
pub const DEFAULT_CONNECTION: &str = "master";

/// Connections reserved beyond the worker count for hooks and metadata
pub const RESERVED_CONNECTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Open,
    Closed,
    Failed,
}

/// The physical session behind one pooled slot
struct Session {
    name: String,
    state: ConnectionState,
    transaction_open: bool,
    handle: Option<Box<dyn BackendConnection>>,
}

impl Session {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ConnectionState::Init,
            transaction_open: false,
            handle: None,
        }
    }

    fn handle(&mut self) -> DbResult<&mut (dyn BackendConnection + 'static)> {
        match (self.state, self.handle.as_mut()) {
            (ConnectionState::Open, Some(handle)) => Ok(&mut **handle),
            _ => Err(DbError::Internal(format!(
                "connection '{}' is not open ({:?})",
                self.name, self.state
            ))),
        }
    }

    fn transaction_error(&self, action: &str, reason: &str) -> DbError {
        DbError::TransactionState {
            name: self.name.clone(),
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }

    fn begin(&mut self) -> DbResult<()> {
        if self.transaction_open {
            return Err(self.transaction_error("begin", "but a transaction is already open"));
        }
        self.handle()?.execute_batch("begin")?;
        self.transaction_open = true;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        if !self.transaction_open {
            return Err(self.transaction_error("commit", "but no transaction is open"));
        }
        self.transaction_open = false;
        self.handle()?.execute_batch("commit")
    }

    fn rollback(&mut self) -> DbResult<()> {
        if !self.transaction_open {
            return Err(self.transaction_error("rollback", "but no transaction is open"));
        }
        self.transaction_open = false;
        self.handle()?.execute_batch("rollback")
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                log::debug!("Error closing connection '{}': {}", self.name, e);
            }
        }
        self.state = ConnectionState::Closed;
    }
}

type SharedSession = Arc<Mutex<Session>>;

fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

/// A pooled connection lent out under a logical name.
///
/// Every holder of the same name shares one session, so a transaction
/// opened through one handle is visible to the others.
pub struct Connection {
    name: String,
    session: SharedSession,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = lock(&self.session);
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("state", &session.state)
            .field("transaction_open", &session.transaction_open)
            .finish()
    }
}

impl Connection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.session).state
    }

    pub fn transaction_open(&self) -> bool {
        lock(&self.session).transaction_open
    }

    /// Whether both handles are lent out over the same session
    pub fn shares_session_with(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }

    pub fn begin(&mut self) -> DbResult<()> {
        lock(&self.session).begin()
    }

    pub fn commit(&mut self) -> DbResult<()> {
        lock(&self.session).commit()
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        lock(&self.session).rollback()
    }

    /// Run statements, opening a transaction first if none is open
    pub fn execute(&mut self, sql: &str) -> DbResult<()> {
        let mut session = lock(&self.session);
        if !session.transaction_open {
            session.begin()?;
        }
        session.handle()?.execute_batch(sql)
    }

    /// Run a query, opening a transaction first if none is open
    pub fn query(&mut self, sql: &str) -> DbResult<crate::backend::QueryResult> {
        let mut session = lock(&self.session);
        if !session.transaction_open {
            session.begin()?;
        }
        session.handle()?.query(sql)
    }
}

/// A session lent out under one name, with the number of live handles
struct Lease {
    session: SharedSession,
    holders: usize,
}

#[derive(Default)]
struct PoolState {
    in_use: BTreeMap<String, Lease>,
    available: Vec<SharedSession>,
    allocated: usize,
}

/// Pool capped at `threads + 2` simultaneous connections
pub struct ConnectionPool {
    backend: Arc<dyn Backend>,
    max_connections: usize,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(backend: Arc<dyn Backend>, threads: usize) -> Self {
        Self {
            backend,
            max_connections: threads + RESERVED_CONNECTIONS,
            state: Mutex::new(PoolState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Physical connections currently allocated, lent out or idle
    pub fn allocated(&self) -> usize {
        self.state().allocated
    }

    /// Names of connections currently lent out
    pub fn in_use(&self) -> Vec<String> {
        self.state().in_use.keys().cloned().collect()
    }

    /// Lend a connection under `name`. A name that is already checked out
    /// gets the same session back; otherwise an idle one is reused when
    /// possible.
    pub fn acquire(&self, name: &str) -> DbResult<Connection> {
        let reused = {
            let mut state = self.state();
            if let Some(lease) = state.in_use.get_mut(name) {
                lease.holders += 1;
                log::debug!("Connection '{}' is already checked out, sharing it", name);
                return Ok(Connection {
                    name: name.to_string(),
                    session: Arc::clone(&lease.session),
                });
            }
            let reused = state.available.pop();
            if reused.is_none() {
                if state.allocated >= self.max_connections {
                    return Err(DbError::PoolExhausted {
                        name: name.to_string(),
                        max: self.max_connections,
                    });
                }
                state.allocated += 1;
            }
            reused
        };

        let session = match reused {
            Some(session) => {
                log::debug!("Re-using an available connection as '{}'", name);
                lock(&session).name = name.to_string();
                session
            }
            None => {
                log::debug!("Opening a new connection '{}'", name);
                let mut session = Session::new(name);
                match self.backend.connect() {
                    Ok(handle) => {
                        session.handle = Some(handle);
                        session.state = ConnectionState::Open;
                        Arc::new(Mutex::new(session))
                    }
                    Err(e) => {
                        self.state().allocated -= 1;
                        return Err(e);
                    }
                }
            }
        };

        self.state().in_use.insert(
            name.to_string(),
            Lease {
                session: Arc::clone(&session),
                holders: 1,
            },
        );
        Ok(Connection {
            name: name.to_string(),
            session,
        })
    }

    /// Return a connection. Once the last holder of a name lets go, an
    /// open transaction is rolled back and a session that is no longer
    /// open is closed instead of reused.
    pub fn release(&self, conn: Connection) {
        let mut state = self.state();
        let still_held = match state.in_use.get_mut(&conn.name) {
            Some(lease) if Arc::ptr_eq(&lease.session, &conn.session) => {
                lease.holders -= 1;
                lease.holders > 0
            }
            _ => false,
        };
        if still_held {
            return;
        }
        let owns_lease = state
            .in_use
            .get(&conn.name)
            .is_some_and(|lease| Arc::ptr_eq(&lease.session, &conn.session));
        if owns_lease {
            state.in_use.remove(&conn.name);
        }
        drop(state);

        let mut session = lock(&conn.session);
        if session.transaction_open {
            if let Err(e) = session.rollback() {
                log::warn!("Rollback failed while releasing '{}': {}", conn.name, e);
                session.state = ConnectionState::Failed;
            }
        }
        let reusable = session.state == ConnectionState::Open;
        if !reusable {
            session.close();
        }
        drop(session);

        let mut state = self.state();
        if reusable {
            state.available.push(conn.session);
        } else {
            state.allocated = state.allocated.saturating_sub(1);
        }
    }

    /// Close idle connections and report any still lent out. Lent-out
    /// connections are left alone since their holders may still use them.
    pub fn cleanup(&self) -> Vec<String> {
        let (left_open, idle) = {
            let mut state = self.state();
            let idle = std::mem::take(&mut state.available);
            state.allocated = state.allocated.saturating_sub(idle.len());
            (state.in_use.keys().cloned().collect::<Vec<_>>(), idle)
        };
        for name in &left_open {
            log::warn!("Connection '{}' was left open", name);
        }
        for session in idle {
            lock(&session).close();
        }
        left_open
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
