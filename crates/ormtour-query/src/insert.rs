//! INSERT and UPDATE builders.

use crate::clause::Where;
use crate::compile::Statement;
use crate::expr::{Dialect, Expr};
use ormtour_core::{Model, Value};

/// Columns of `row` worth sending: generated columns left NULL are
/// omitted so the database fills them in.
fn insertable<M: Model>(row: Vec<(&'static str, Value)>) -> Vec<(&'static str, Value)> {
    let fields = M::fields();
    row.into_iter()
        .filter(|(column, value)| {
            !(value.is_null()
                && fields
                    .iter()
                    .any(|f| f.column_name == *column && f.is_generated()))
        })
        .collect()
}

fn render_insert(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    rows: &[Vec<Value>],
    returning: bool,
) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut sql = format!("INSERT INTO {}", dialect.quote_identifier(table));

    if columns.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        let cols: Vec<_> = columns.iter().map(|c| dialect.quote_identifier(c)).collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| {
                let slots: Vec<_> = row
                    .iter()
                    .map(|v| {
                        params.push(v.clone());
                        dialect.placeholder(params.len())
                    })
                    .collect();
                format!("({})", slots.join(", "))
            })
            .collect();
        sql.push_str(&format!(" ({}) VALUES {}", cols.join(", "), tuples.join(", ")));
    }

    if returning {
        sql.push_str(" RETURNING *");
    }
    (sql, params)
}

/// INSERT of a single model instance.
#[derive(Debug)]
pub struct InsertBuilder<'a, M: Model> {
    model: &'a M,
    returning: bool,
}

impl<'a, M: Model> InsertBuilder<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            returning: false,
        }
    }

    /// Append `RETURNING *` so keys and server defaults come back.
    pub fn returning(mut self) -> Self {
        self.returning = true;
        self
    }
}

impl<M: Model> Statement for InsertBuilder<'_, M> {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let row = insertable::<M>(self.model.to_row());
        let columns: Vec<&str> = row.iter().map(|(c, _)| *c).collect();
        let values: Vec<Value> = row.into_iter().map(|(_, v)| v).collect();
        render_insert(dialect, M::TABLE_NAME, &columns, &[values], self.returning)
    }
}

/// Multi-row `INSERT INTO t (..) VALUES (..), (..)`.
///
/// A generated column is sent only when every row supplies a value for
/// it; otherwise it is left to the database for all rows.
#[derive(Debug)]
pub struct InsertManyBuilder<'a, M: Model> {
    models: &'a [M],
}

impl<'a, M: Model> InsertManyBuilder<'a, M> {
    pub fn new(models: &'a [M]) -> Self {
        Self { models }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl<M: Model> Statement for InsertManyBuilder<'_, M> {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let rows: Vec<Vec<(&'static str, Value)>> = self.models.iter().map(M::to_row).collect();

        let columns: Vec<&str> = M::fields()
            .iter()
            .filter(|f| {
                !f.is_generated()
                    || rows.iter().all(|row| {
                        row.iter()
                            .any(|(c, v)| *c == f.column_name && !v.is_null())
                    })
            })
            .map(|f| f.column_name)
            .collect();

        let values: Vec<Vec<Value>> = rows
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| {
                        row.iter()
                            .find(|(c, _)| c == col)
                            .map_or(Value::Null, |(_, v)| v.clone())
                    })
                    .collect()
            })
            .collect();

        render_insert(dialect, M::TABLE_NAME, &columns, &values, false)
    }
}

/// Single-row INSERT from a column/value mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    table: String,
    values: Vec<(String, Value)>,
}

/// Start an INSERT into `table`.
pub fn insert(table: impl Into<String>) -> Insert {
    Insert {
        table: table.into(),
        values: Vec::new(),
    }
}

impl Insert {
    pub fn value(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn values<'v>(mut self, mapping: impl IntoIterator<Item = &'v (&'v str, Value)>) -> Self {
        self.values
            .extend(mapping.into_iter().map(|(c, v)| ((*c).to_string(), v.clone())));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Statement for Insert {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let columns: Vec<&str> = self.values.iter().map(|(c, _)| c.as_str()).collect();
        let values: Vec<Value> = self.values.iter().map(|(_, v)| v.clone()).collect();
        render_insert(dialect, &self.table, &columns, &[values], false)
    }
}

/// `UPDATE t SET .. WHERE ..`.
#[derive(Debug, Clone)]
pub struct Update {
    table: String,
    sets: Vec<(String, Value)>,
    where_clause: Option<Where>,
}

/// Start an UPDATE of `table`.
pub fn update(table: impl Into<String>) -> Update {
    Update {
        table: table.into(),
        sets: Vec::new(),
        where_clause: None,
    }
}

impl Update {
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Restrict to the row whose primary key matches `M`'s key values.
    pub fn by_primary_key<M: Model>(self, pk: &[Value]) -> Self {
        M::PRIMARY_KEY
            .iter()
            .zip(pk)
            .fold(self, |update, (column, value)| {
                update.filter(Expr::col(*column).eq(value.clone()))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl Statement for Update {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sets: Vec<String> = self
            .sets
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!(
                    "{} = {}",
                    dialect.quote_identifier(column),
                    dialect.placeholder(params.len())
                )
            })
            .collect();
        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            sets.join(", ")
        );
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build(dialect, &mut params));
        }
        (sql, params)
    }
}
