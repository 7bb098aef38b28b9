//! Database connection trait and transaction guard.
//!
//! All operations are blocking. A driver owns one database handle and
//! tracks whether a transaction is open on it.

use crate::Result;
use crate::error::{Error, TransactionError, TransactionErrorKind};
use crate::row::{Row, Rows};
use crate::value::Value;

/// A database connection.
///
/// The trait is object safe so sessions and transaction guards can work
/// with `&dyn Connection`.
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Rows>;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement and return the number of rows affected.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the new rowid.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Execute one or more parameterless statements separated by `;`.
    fn execute_script(&self, sql: &str) -> Result<()>;

    /// Execute several statements in order, stopping at the first error.
    fn batch(&self, statements: &[(String, Vec<Value>)]) -> Result<Vec<u64>> {
        statements
            .iter()
            .map(|(sql, params)| self.execute(sql, params))
            .collect()
    }

    /// Open a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<()>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;
}

/// A transaction scope over a borrowed connection.
///
/// If dropped without committing, the transaction is rolled back.
pub struct Transaction<'conn> {
    conn: &'conn dyn Connection,
    finalized: bool,
}

impl<'conn> Transaction<'conn> {
    /// Issue BEGIN and return the guard.
    pub fn begin(conn: &'conn dyn Connection) -> Result<Self> {
        if conn.in_transaction() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "A transaction is already open on this connection".to_string(),
            }));
        }
        conn.begin()?;
        Ok(Self {
            conn,
            finalized: false,
        })
    }

    /// The connection the transaction runs on.
    pub fn connection(&self) -> &'conn dyn Connection {
        self.conn
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.conn.query(sql, params)
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.execute(sql, params)
    }

    pub fn commit(mut self) -> Result<()> {
        self.finalized = true;
        self.conn.commit()
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finalized = true;
        self.conn.rollback()
    }

    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finalized && self.conn.in_transaction() {
            if let Err(e) = self.conn.rollback() {
                tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
            }
        }
    }
}

/// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
pub fn transaction<T>(
    conn: &dyn Connection,
    f: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = Transaction::begin(conn)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rolling back transaction");
            tx.rollback()?;
            Err(e)
        }
    }
}
