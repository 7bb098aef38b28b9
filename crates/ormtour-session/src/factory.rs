//! Session factories: a connection plus a configuration.

use crate::session::{Session, SessionConfig};
use ormtour_core::{Connection, Result};
use std::sync::Arc;

/// Produces sessions that share one connection and configuration.
#[derive(Clone)]
pub struct SessionFactory {
    conn: Arc<dyn Connection>,
    config: SessionConfig,
}

impl SessionFactory {
    pub fn new(conn: Arc<dyn Connection>, config: SessionConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a long-lived session. The caller is responsible for closing it.
    pub fn open(&self) -> Session {
        Session::with_config(Arc::clone(&self.conn), self.config)
    }

    /// Run `f` with a fresh session and close it afterwards, whatever `f`
    /// returned. Nothing is committed unless `f` commits.
    pub fn scope<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut session = self.open();
        let result = f(&mut session);
        let closed = session.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
