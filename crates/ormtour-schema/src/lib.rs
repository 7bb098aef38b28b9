//! Table DDL for ormtour models.
//!
//! [`create_table`] renders one model's CREATE TABLE statement and
//! [`Metadata`] collects several models so they can be created or
//! dropped together in foreign key order.

pub mod create;
pub mod metadata;

pub use create::{CreateTable, drop_table_sql};
pub use metadata::{Metadata, TableDef};

use ormtour_core::Model;

/// Create a table for a model type.
///
/// # Example
///
/// ```ignore
/// let sql = create_table::<User>().if_not_exists().build();
/// conn.execute(&sql, &[])?;
/// ```
pub fn create_table<M: Model>() -> CreateTable<M> {
    CreateTable::new()
}
