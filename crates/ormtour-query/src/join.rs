//! JOIN clause types.

use crate::expr::{Dialect, Expr};
use crate::select::SelectQuery;
use crate::subquery::Subquery;
use ormtour_core::{Error, Model, Result, Value};

/// What a FROM or JOIN clause names: a table or an aliased subquery.
#[derive(Debug, Clone)]
pub enum TableRef {
    Table(String),
    Subquery {
        query: Box<SelectQuery>,
        alias: String,
    },
}

impl TableRef {
    /// The name other clauses use to qualify this source's columns.
    pub fn name(&self) -> &str {
        match self {
            TableRef::Table(name) => name,
            TableRef::Subquery { alias, .. } => alias,
        }
    }

    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            TableRef::Table(name) => dialect.quote_identifier(name),
            TableRef::Subquery { query, alias } => {
                let inner = query.build_into(dialect, params);
                format!("({inner}) AS {}", dialect.quote_identifier(alias))
            }
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: JoinType,
    pub target: TableRef,
    pub on: Expr,
}

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

impl Join {
    /// Create an INNER JOIN.
    pub fn inner(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Inner,
            target: TableRef::Table(table.into()),
            on,
        }
    }

    /// Create a LEFT JOIN.
    pub fn left(table: impl Into<String>, on: Expr) -> Self {
        Self {
            join_type: JoinType::Left,
            target: TableRef::Table(table.into()),
            on,
        }
    }

    /// Join an aliased subquery.
    pub fn subquery(join_type: JoinType, subquery: &Subquery, on: Expr) -> Self {
        Self {
            join_type,
            target: TableRef::Subquery {
                query: Box::new(subquery.query().clone()),
                alias: subquery.alias().to_string(),
            },
            on,
        }
    }

    /// Join `R` onto `L`, deriving the ON clause from foreign key metadata.
    ///
    /// Fails when no foreign key links the two tables, or when more than
    /// one does and the choice would be ambiguous.
    pub fn inferred<L: Model, R: Model>(join_type: JoinType) -> Result<Self> {
        Ok(Self {
            join_type,
            target: TableRef::Table(R::TABLE_NAME.to_string()),
            on: foreign_key_condition::<L, R>()?,
        })
    }

    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let target = self.target.build(dialect, params);
        let on = self.on.build_condition(dialect, params);
        format!(" {} {target} ON {on}", self.join_type.as_str())
    }
}

/// Equality condition between the two tables along their single foreign key.
///
/// The referenced side is written first: `parent.pk = child.fk`.
pub fn foreign_key_condition<L: Model, R: Model>() -> Result<Expr> {
    let mut candidates = Vec::new();

    for field in R::fields() {
        if let Some((table, column)) = field.references() {
            if table == L::TABLE_NAME {
                candidates.push(
                    Expr::qualified(L::TABLE_NAME, column)
                        .eq(Expr::qualified(R::TABLE_NAME, field.column_name)),
                );
            }
        }
    }
    for field in L::fields() {
        if let Some((table, column)) = field.references() {
            if table == R::TABLE_NAME {
                candidates.push(
                    Expr::qualified(R::TABLE_NAME, column)
                        .eq(Expr::qualified(L::TABLE_NAME, field.column_name)),
                );
            }
        }
    }

    match candidates.len() {
        0 => Err(Error::build(format!(
            "Can't find any foreign key relationships between '{}' and '{}'",
            L::TABLE_NAME,
            R::TABLE_NAME
        ))),
        1 => Ok(candidates.remove(0)),
        n => Err(Error::build(format!(
            "Can't determine join between '{}' and '{}'; found {n} foreign keys, specify the ON clause explicitly",
            L::TABLE_NAME,
            R::TABLE_NAME
        ))),
    }
}
