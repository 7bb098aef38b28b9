//! Model trait for ORM-style struct mapping.

use crate::Result;
use crate::field::{Column, FieldInfo};
use crate::row::Row;
use crate::value::Value;

/// Trait for types that map to database tables.
///
/// Usually implemented with `#[derive(Model)]`:
///
/// ```ignore
/// #[derive(Model, Debug, Clone)]
/// #[orm(table = "user_account")]
/// struct User {
///     #[orm(primary_key, auto_increment)]
///     id: Option<i64>,
///     name: String,
///     fullname: Option<String>,
/// }
/// ```
pub trait Model: Sized + Send + Sync + 'static {
    /// The name of the database table.
    const TABLE_NAME: &'static str;

    /// The primary key column name(s).
    const PRIMARY_KEY: &'static [&'static str];

    /// Get field metadata for all columns.
    fn fields() -> &'static [FieldInfo];

    /// Convert this model instance to (column, value) pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Construct a model instance from a database row.
    fn from_row(row: &Row) -> Result<Self>;

    /// Get the value of the primary key field(s).
    fn primary_key_value(&self) -> Vec<Value>;

    /// Whether the database has yet to assign this instance's key.
    fn is_new(&self) -> bool;

    /// Forget a database-assigned key, e.g. after the insert was rolled back.
    fn clear_primary_key(&mut self);

    /// Column references for every field, in declaration order.
    fn columns() -> Vec<Column> {
        Self::fields()
            .iter()
            .map(|f| Column::new(Self::TABLE_NAME, f.column_name))
            .collect()
    }

    /// The primary key values, or `None` while any of them is still NULL.
    fn identity(&self) -> Option<Vec<Value>> {
        let pk = self.primary_key_value();
        if pk.is_empty() || pk.iter().any(Value::is_null) {
            None
        } else {
            Some(pk)
        }
    }
}
