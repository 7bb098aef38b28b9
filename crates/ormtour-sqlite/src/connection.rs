//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection`
//! trait from ormtour-core. One handle per connection, guarded by a
//! mutex so the connection can be shared behind an `Arc`.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi::{self, sqlite3, sqlite3_stmt};
use crate::types;
use libsqlite3_sys as sys;
use ormtour_core::error::{
    ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
    TransactionErrorKind,
};
use ormtour_core::row::ColumnInfo;
use ormtour_core::{Connection, Error, Result, Row, Rows, Value};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Path SQLite interprets as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Run `PRAGMA foreign_keys = ON` after opening.
    pub foreign_keys: bool,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Read-write access; the database must already exist.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Read-write access, creating the database if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= sys::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= sys::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= sys::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= sys::SQLITE_OPEN_URI;
        }

        // Default to read-write if no mode specified
        if flags & (sys::SQLITE_OPEN_READONLY | sys::SQLITE_OPEN_READWRITE) == 0 {
            flags |= sys::SQLITE_OPEN_READWRITE | sys::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

struct SqliteInner {
    db: *mut sqlite3,
}

// SAFETY: the handle is only touched while the owning Mutex is held.
unsafe impl Send for SqliteInner {}

/// A connection to a SQLite database.
pub struct SqliteConnection {
    inner: Mutex<SqliteInner>,
    path: String,
}

/// A prepared statement, finalized on drop.
struct Stmt(*mut sqlite3_stmt);

impl Drop for Stmt {
    fn drop(&mut self) {
        // SAFETY: the statement came from sqlite3_prepare_v2 and is finalized once
        unsafe {
            sys::sqlite3_finalize(self.0);
        }
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { sys::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != sys::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is a handle returned by open, closed exactly once here
                unsafe {
                    let msg = ffi::errmsg(db);
                    sys::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database '{}': {}", config.path, msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let timeout = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                sys::sqlite3_busy_timeout(db, timeout);
            }
        }

        let conn = Self {
            inner: Mutex::new(SqliteInner { db }),
            path: config.path.clone(),
        };

        if config.foreign_keys {
            conn.execute_raw("PRAGMA foreign_keys = ON")?;
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");
        Ok(conn)
    }

    /// Open an in-memory database with default settings.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database with default settings.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, SqliteInner> {
        // A panic while holding the lock leaves the handle itself intact.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute SQL directly without preparing; may contain several statements.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.lock();
        let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;

        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: All pointers are valid
        let rc = unsafe {
            sys::sqlite3_exec(inner.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };

        if rc != sys::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by SQLite and is freed once
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    sys::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(rc, sql, msg));
        }

        Ok(())
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        // SAFETY: db is valid
        unsafe { sys::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Number of rows changed by the most recent statement.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        // SAFETY: db is valid
        let n = unsafe { sys::sqlite3_changes(inner.db) };
        u64::try_from(n).unwrap_or(0)
    }

    fn query_sync(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        let inner = self.lock();
        let stmt = prepare_stmt(inner.db, sql)?;
        bind_params(inner.db, &stmt, sql, params)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { sys::sqlite3_column_count(stmt.0) };
        let col_names: Vec<String> = (0..col_count)
            // SAFETY: stmt is valid and i is in range
            .map(|i| unsafe { types::column_name(stmt.0, i) }.unwrap_or_else(|| format!("col{i}")))
            .collect();
        let columns = Arc::new(ColumnInfo::new(col_names));

        let mut rows = Vec::new();
        loop {
            // SAFETY: stmt is valid
            match unsafe { sys::sqlite3_step(stmt.0) } {
                sys::SQLITE_ROW => {
                    let values = (0..col_count)
                        // SAFETY: we just got SQLITE_ROW
                        .map(|i| unsafe { types::read_column(stmt.0, i) })
                        .collect();
                    rows.push(Row::with_columns(Arc::clone(&columns), values));
                }
                sys::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }

        tracing::trace!(sql, rows = rows.len(), "Query complete");
        Ok(Rows::new(columns, rows))
    }

    fn execute_sync(inner: &SqliteInner, sql: &str, params: &[Value]) -> Result<u64> {
        let stmt = prepare_stmt(inner.db, sql)?;
        bind_params(inner.db, &stmt, sql, params)?;

        // Step until done so statements with RETURNING still run to completion.
        loop {
            // SAFETY: stmt is valid
            match unsafe { sys::sqlite3_step(stmt.0) } {
                sys::SQLITE_ROW => {}
                sys::SQLITE_DONE => break,
                _ => return Err(step_error(inner.db, sql)),
            }
        }
        drop(stmt);

        // SAFETY: db is valid
        let changes = unsafe { sys::sqlite3_changes(inner.db) };
        tracing::trace!(sql, changes, "Statement complete");
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    fn is_autocommit(inner: &SqliteInner) -> bool {
        // SAFETY: db is valid
        unsafe { sys::sqlite3_get_autocommit(inner.db) != 0 }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let inner = self.lock();
        if !inner.db.is_null() {
            // SAFETY: db is valid and closed exactly once
            unsafe {
                ffi::sqlite3_close_v2(inner.db);
            }
        }
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.query_sync(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.lock();
        Self::execute_sync(&inner, sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        // Hold the lock so the rowid belongs to this statement.
        let inner = self.lock();
        Self::execute_sync(&inner, sql, params)?;
        // SAFETY: db is valid
        Ok(unsafe { sys::sqlite3_last_insert_rowid(inner.db) })
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        self.execute_raw(sql)
    }

    fn begin(&self) -> Result<()> {
        if self.in_transaction() {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "Already in a transaction".to_string(),
            }));
        }
        self.execute_raw("BEGIN")?;
        tracing::trace!("BEGIN");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if !self.in_transaction() {
            return Err(not_in_transaction());
        }
        self.execute_raw("COMMIT")?;
        tracing::trace!("COMMIT");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        if !self.in_transaction() {
            return Err(not_in_transaction());
        }
        self.execute_raw("ROLLBACK")?;
        tracing::trace!("ROLLBACK");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !Self::is_autocommit(&self.lock())
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

// Helper functions

fn prepare_stmt(db: *mut sqlite3, sql: &str) -> Result<Stmt> {
    let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;
    let len = c_int::try_from(c_sql.as_bytes().len())
        .map_err(|_| query_error(sys::SQLITE_TOOBIG, sql, "SQL text too long".into()))?;

    let mut stmt: *mut sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { sys::sqlite3_prepare_v2(db, c_sql.as_ptr(), len, &mut stmt, ptr::null_mut()) };

    if rc != sys::SQLITE_OK {
        return Err(step_error(db, sql));
    }
    if stmt.is_null() {
        // Empty or comment-only SQL compiles to no statement.
        return Err(query_error(
            sys::SQLITE_MISUSE,
            sql,
            "SQL contains no statement".to_string(),
        ));
    }

    Ok(Stmt(stmt))
}

fn bind_params(db: *mut sqlite3, stmt: &Stmt, sql: &str, params: &[Value]) -> Result<()> {
    // SAFETY: stmt is valid
    let expected = unsafe { sys::sqlite3_bind_parameter_count(stmt.0) };
    if usize::try_from(expected).unwrap_or(0) != params.len() {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: format!(
                "Statement expects {expected} parameters but {} were supplied",
                params.len()
            ),
            source: None,
        }));
    }

    for (i, param) in params.iter().enumerate() {
        let index = c_int::try_from(i + 1).unwrap_or(c_int::MAX);
        // SAFETY: stmt is valid, index is 1-based and within the count
        let rc = unsafe { types::bind_value(stmt.0, index, param) };
        if rc != sys::SQLITE_OK {
            // SAFETY: db is valid
            let msg = unsafe { ffi::errmsg(db) };
            return Err(query_error(
                rc,
                sql,
                format!("Failed to bind parameter {}: {}", i + 1, msg),
            ));
        }
    }
    Ok(())
}

fn step_error(db: *mut sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let (msg, code) = unsafe { (ffi::errmsg(db), sys::sqlite3_errcode(db)) };
    query_error(code, sql, msg)
}

fn query_error(code: c_int, sql: &str, message: String) -> Error {
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message,
        source: None,
    })
}

fn nul_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
        source: None,
    })
}

fn not_in_transaction() -> Error {
    Error::Transaction(TransactionError {
        kind: TransactionErrorKind::NotActive,
        message: "Not in a transaction".to_string(),
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    // Extended codes carry the primary code in the low byte.
    match code & 0xff {
        sys::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        sys::SQLITE_BUSY | sys::SQLITE_LOCKED => QueryErrorKind::Deadlock,
        sys::SQLITE_PERM | sys::SQLITE_AUTH => QueryErrorKind::Permission,
        sys::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        sys::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        sys::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        sys::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
