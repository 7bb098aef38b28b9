//! Small safe helpers over the `libsqlite3-sys` bindings.

use libsqlite3_sys as sys;
use std::ffi::{CStr, c_int};

pub use sys::{sqlite3, sqlite3_stmt};

// `libsqlite3-sys` omits `sqlite3_close_v2` from its generated bindings, but
// the symbol is present in the bundled SQLite library.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// The SQLite library version string, e.g. "3.49.1".
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sys::sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// The SQLite library version number, e.g. 3049001.
pub fn version_number() -> i32 {
    // SAFETY: sqlite3_libversion_number is always safe to call
    unsafe { sys::sqlite3_libversion_number() }
}

/// Convert an SQLite result code to a human-readable string.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string
    unsafe {
        let ptr = sys::sqlite3_errstr(code);
        if ptr.is_null() {
            return "unknown error";
        }
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// The most recent error message on `db`.
///
/// # Safety
/// `db` must be a valid, open database handle.
pub unsafe fn errmsg(db: *mut sqlite3) -> String {
    // SAFETY: caller guarantees db is valid; errmsg never returns dangling
    unsafe {
        let ptr = sys::sqlite3_errmsg(db);
        if ptr.is_null() {
            return "unknown error".to_string();
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_string() {
        assert_eq!(error_string(sys::SQLITE_OK), "not an error");
        assert_eq!(error_string(sys::SQLITE_CONSTRAINT), "constraint failed");
    }

    #[test]
    fn test_version_supports_returning() {
        assert!(version().starts_with('3'));
        // RETURNING arrived in 3.35.0
        assert!(version_number() >= 3_035_000);
    }
}
