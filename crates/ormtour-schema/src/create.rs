//! CREATE TABLE statement builder.

use ormtour_core::{FieldInfo, Model};
use ormtour_query::Dialect;
use std::marker::PhantomData;

/// Builder for CREATE TABLE statements.
#[derive(Debug)]
pub struct CreateTable<M: Model> {
    if_not_exists: bool,
    _marker: PhantomData<M>,
}

impl<M: Model> CreateTable<M> {
    pub fn new() -> Self {
        Self {
            if_not_exists: false,
            _marker: PhantomData,
        }
    }

    /// Add IF NOT EXISTS clause.
    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    /// Build the CREATE TABLE SQL.
    ///
    /// A lone integer primary key is declared inline as
    /// `INTEGER PRIMARY KEY` so it aliases the rowid; with
    /// `auto_increment` it also gets `AUTOINCREMENT`. Other keys become a
    /// table-level `PRIMARY KEY (..)` constraint.
    pub fn build(&self) -> String {
        let dialect = Dialect::Sqlite;
        let mut sql = String::from("CREATE TABLE ");

        if self.if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }

        sql.push_str(&dialect.quote_identifier(M::TABLE_NAME));
        sql.push_str(" (\n  ");

        let inline_pk = inline_primary_key::<M>();
        let mut parts = Vec::new();
        let mut constraints = Vec::new();

        for field in M::fields() {
            parts.push(column_definition(dialect, field, inline_pk));

            if field.unique && !field.primary_key {
                constraints.push(format!(
                    "UNIQUE ({})",
                    dialect.quote_identifier(field.column_name)
                ));
            }

            if let Some((table, column)) = field.references() {
                constraints.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    dialect.quote_identifier(field.column_name),
                    dialect.quote_identifier(table),
                    dialect.quote_identifier(column)
                ));
            }
        }

        if inline_pk.is_none() && !M::PRIMARY_KEY.is_empty() {
            let pk: Vec<_> = M::PRIMARY_KEY
                .iter()
                .map(|c| dialect.quote_identifier(c))
                .collect();
            constraints.insert(0, format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        parts.extend(constraints);
        sql.push_str(&parts.join(",\n  "));
        sql.push_str("\n)");

        sql
    }
}

impl<M: Model> Default for CreateTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// The single integer key column that can be declared inline, if any.
fn inline_primary_key<M: Model>() -> Option<&'static str> {
    let [pk] = M::PRIMARY_KEY else {
        return None;
    };
    M::fields()
        .iter()
        .find(|f| f.column_name == *pk && f.sql_type.is_integer())
        .map(|f| f.column_name)
}

fn column_definition(dialect: Dialect, field: &FieldInfo, inline_pk: Option<&str>) -> String {
    let name = dialect.quote_identifier(field.column_name);

    if inline_pk == Some(field.column_name) {
        // AUTOINCREMENT is only accepted on exactly `INTEGER PRIMARY KEY`.
        return if field.auto_increment {
            format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT")
        } else {
            format!("{name} INTEGER PRIMARY KEY")
        };
    }

    let mut def = format!("{name} {}", field.sql_type.sql_name());

    if !field.nullable {
        def.push_str(" NOT NULL");
    }

    if let Some(default) = field.server_default {
        def.push_str(" DEFAULT ");
        // Bare function-like keywords need no parentheses; expressions do.
        if is_bare_default(default) {
            def.push_str(default);
        } else {
            def.push_str(&format!("({default})"));
        }
    }

    def
}

fn is_bare_default(expr: &str) -> bool {
    let upper = expr.trim().to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME" | "NULL" | "TRUE" | "FALSE"
    ) || expr.parse::<f64>().is_ok()
        || (expr.starts_with('\'') && expr.ends_with('\'') && expr.len() >= 2)
}

/// DROP TABLE SQL for `table_name`.
pub fn drop_table_sql(table_name: &str, if_exists: bool) -> String {
    let name = Dialect::Sqlite.quote_identifier(table_name);
    if if_exists {
        format!("DROP TABLE IF EXISTS {name}")
    } else {
        format!("DROP TABLE {name}")
    }
}
