//! Field and column definitions.

use crate::types::SqlType;

/// Metadata about a model field/column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust field name
    pub name: &'static str,
    /// Database column name (may differ from field name)
    pub column_name: &'static str,
    /// SQL type for this field
    pub sql_type: SqlType,
    /// Whether this field is nullable
    pub nullable: bool,
    /// Whether this is a primary key
    pub primary_key: bool,
    /// Whether the database assigns this value on insert
    pub auto_increment: bool,
    /// Whether this field has a unique constraint
    pub unique: bool,
    /// Server-side default expression, e.g. `CURRENT_TIMESTAMP`
    pub server_default: Option<&'static str>,
    /// Foreign key reference (`table.column`)
    pub foreign_key: Option<&'static str>,
}

impl FieldInfo {
    /// Create a new field info with minimal required data.
    pub const fn new(name: &'static str, column_name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name,
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            unique: false,
            server_default: None,
            foreign_key: None,
        }
    }

    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    pub const fn server_default(mut self, expr: Option<&'static str>) -> Self {
        self.server_default = expr;
        self
    }

    pub const fn foreign_key(mut self, reference: Option<&'static str>) -> Self {
        self.foreign_key = reference;
        self
    }

    /// Whether the column may be left out of an INSERT and filled by the database.
    pub const fn is_generated(&self) -> bool {
        self.auto_increment || self.server_default.is_some()
    }

    /// Split the foreign key reference into `(table, column)`.
    pub fn references(&self) -> Option<(&'static str, &'static str)> {
        let fk = self.foreign_key?;
        let (table, column) = fk.split_once('.')?;
        if table.is_empty() || column.is_empty() {
            return None;
        }
        Some((table, column))
    }
}

/// A reference to one column of a table, usable in query expressions.
///
/// `#[derive(Model)]` emits one associated constant per field
/// (`User::NAME`, `Address::USER_ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub table: &'static str,
    pub name: &'static str,
}

impl Column {
    pub const fn new(table: &'static str, name: &'static str) -> Self {
        Self { table, name }
    }

    /// Look up a column of `M` by name, failing for unknown columns.
    pub fn of<M: crate::Model>(name: &str) -> crate::Result<Self> {
        M::fields()
            .iter()
            .find(|f| f.column_name == name)
            .map(|f| Column::new(M::TABLE_NAME, f.column_name))
            .ok_or_else(|| {
                crate::Error::build(format!(
                    "Table '{}' has no column named '{}'",
                    M::TABLE_NAME,
                    name
                ))
            })
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        const FIELD: FieldInfo = FieldInfo::new("user_id", "user_id", SqlType::Integer)
            .foreign_key(Some("user_account.id"));
        assert!(!FIELD.nullable);
        assert_eq!(FIELD.references(), Some(("user_account", "id")));
        assert!(!FIELD.is_generated());
    }

    #[test]
    fn test_references_rejects_malformed() {
        let field = FieldInfo::new("x", "x", SqlType::Integer).foreign_key(Some("nodot"));
        assert_eq!(field.references(), None);
        let field = FieldInfo::new("x", "x", SqlType::Integer).foreign_key(Some(".id"));
        assert_eq!(field.references(), None);
    }

    #[test]
    fn test_generated_columns() {
        let id = FieldInfo::new("id", "id", SqlType::Integer)
            .primary_key(true)
            .auto_increment(true);
        let created = FieldInfo::new("created_at", "created_at", SqlType::Timestamp)
            .server_default(Some("CURRENT_TIMESTAMP"));
        assert!(id.is_generated());
        assert!(created.is_generated());
    }

    #[test]
    fn test_column_display() {
        assert_eq!(Column::new("address", "email_address").to_string(), "address.email_address");
    }
}
