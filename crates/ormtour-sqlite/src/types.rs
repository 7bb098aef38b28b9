//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL).
//! Booleans bind as 0/1, JSON binds as text, and every INTEGER reads
//! back as `Value::BigInt` so key values compare uniformly.

use crate::ffi::sqlite3_stmt;
use libsqlite3_sys as sys;
use ormtour_core::Value;
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees stmt and index; text and blob are copied
    // by SQLite because of SQLITE_TRANSIENT
    unsafe {
        match value {
            Value::Null => sys::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => sys::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::Int(v) => sys::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => sys::sqlite3_bind_int64(stmt, index, *v),
            Value::Double(v) => sys::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) => bind_text(stmt, index, s),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
            Value::Bytes(b) => {
                let Ok(len) = c_int::try_from(b.len()) else {
                    return sys::SQLITE_TOOBIG;
                };
                sys::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast(),
                    len,
                    sys::SQLITE_TRANSIENT(),
                )
            }
        }
    }
}

unsafe fn bind_text(stmt: *mut sqlite3_stmt, index: c_int, s: &str) -> c_int {
    let Ok(len) = c_int::try_from(s.len()) else {
        return sys::SQLITE_TOOBIG;
    };
    // SAFETY: the pointer is valid for len bytes; SQLite copies them
    unsafe { sys::sqlite3_bind_text(stmt, index, s.as_ptr().cast(), len, sys::SQLITE_TRANSIENT()) }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees stmt is positioned on a row
    unsafe {
        match sys::sqlite3_column_type(stmt, index) {
            sys::SQLITE_INTEGER => Value::BigInt(sys::sqlite3_column_int64(stmt, index)),
            sys::SQLITE_FLOAT => Value::Double(sys::sqlite3_column_double(stmt, index)),
            sys::SQLITE_TEXT => {
                let ptr = sys::sqlite3_column_text(stmt, index);
                let len = sys::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice =
                        std::slice::from_raw_parts(ptr, usize::try_from(len).unwrap_or(0));
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }
            sys::SQLITE_BLOB => {
                let ptr = sys::sqlite3_column_blob(stmt, index);
                let len = usize::try_from(sys::sqlite3_column_bytes(stmt, index)).unwrap_or(0);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt and index
    unsafe {
        let ptr = sys::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}
