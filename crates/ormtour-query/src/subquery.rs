//! Aliased subqueries usable as join targets.

use crate::expr::Expr;
use crate::select::SelectQuery;
use ormtour_core::{Error, Result};

/// A SELECT wrapped under an alias, e.g. `(SELECT ...) AS anon_1`.
///
/// Its exported columns are the output names of the inner column list.
#[derive(Debug, Clone)]
pub struct Subquery {
    query: SelectQuery,
    alias: String,
}

impl Subquery {
    pub fn new(query: SelectQuery, alias: impl Into<String>) -> Self {
        Self {
            query,
            alias: alias.into(),
        }
    }

    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Names of the columns this subquery exports.
    pub fn column_names(&self) -> Vec<&str> {
        self.query
            .column_exprs()
            .iter()
            .filter_map(Expr::output_name)
            .collect()
    }

    /// Reference an exported column as `alias.name`.
    pub fn c(&self, name: &str) -> Result<Expr> {
        if self.column_names().contains(&name) {
            Ok(Expr::qualified(self.alias.clone(), name))
        } else {
            Err(Error::build(format!(
                "Subquery '{}' has no column named '{}'",
                self.alias, name
            )))
        }
    }
}
