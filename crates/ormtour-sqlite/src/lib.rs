//! SQLite driver for ormtour.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the `Connection` trait from ormtour-core over
//! the `libsqlite3-sys` bindings, with SQLite compiled in (`bundled`).
//!
//! # Features
//!
//! - Synchronous `Connection` implementation
//! - Type-safe parameter binding
//! - In-memory and file-based databases
//! - Configurable open flags, busy timeout and foreign key enforcement
//!
//! # Example
//!
//! ```rust,ignore
//! use ormtour_core::{Connection, Value};
//! use ormtour_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//! let id = conn.insert("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")])?;
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER (read back as `BigInt`) |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Json` | TEXT |
//! | `Null` | NULL |
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send + Sync`; the handle sits behind a mutex.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{MEMORY_PATH, OpenFlags, SqliteConfig, SqliteConnection};

/// The linked SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// The linked SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}
