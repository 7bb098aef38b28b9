//! Core types and traits for ormtour.
//!
//! - `Value` and `Row` for dynamically typed results
//! - `Model` and `FieldInfo` for table metadata
//! - `Connection` for blocking database access
//! - `Error` shared by every crate in the workspace

pub mod connection;
pub mod error;
pub mod field;
pub mod model;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Transaction, transaction};
pub use error::{Error, Result};
pub use field::{Column, FieldInfo};
pub use model::Model;
pub use row::{ColumnInfo, FromValue, Row, Rows};
pub use types::SqlType;
pub use value::Value;
