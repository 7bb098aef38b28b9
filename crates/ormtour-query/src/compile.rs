//! Statement rendering.
//!
//! Every builder implements [`Statement`]. [`compile`] captures the
//! rendered SQL together with its parameters for printing, and
//! [`Compiled::render_literal`] inlines those parameters for display.

use crate::expr::Dialect;
use ormtour_core::Value;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::LazyLock;

/// Anything that renders to SQL plus bound parameters.
pub trait Statement {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>);

    /// Render with the default (SQLite) dialect.
    fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }
}

impl<S: Statement + ?Sized> Statement for &S {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        (**self).build_with_dialect(dialect)
    }
}

/// A rendered statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<Value>,
    pub dialect: Dialect,
}

/// Render `stmt` for `dialect`.
pub fn compile(stmt: &impl Statement, dialect: Dialect) -> Compiled {
    let (sql, params) = stmt.build_with_dialect(dialect);
    Compiled {
        sql,
        params,
        dialect,
    }
}

// Quoted strings are matched first so placeholders inside them are left alone.
static SQLITE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'|\?(\d*)").expect("valid regex"));
static POSTGRES_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'|\$(\d+)").expect("valid regex"));

impl Compiled {
    /// The SQL with every parameter inlined as a literal.
    ///
    /// Numbered placeholders pick their parameter by index; bare `?`
    /// takes the next one in order. Placeholders without a matching
    /// parameter are kept as written.
    pub fn render_literal(&self) -> String {
        let pattern = match self.dialect {
            Dialect::Sqlite => &*SQLITE_PARAM,
            Dialect::Postgres => &*POSTGRES_PARAM,
        };
        let mut next = 0usize;
        pattern
            .replace_all(&self.sql, |caps: &Captures<'_>| {
                let whole = &caps[0];
                let Some(index) = caps.get(1) else {
                    return whole.to_string();
                };
                let position = if index.as_str().is_empty() {
                    next += 1;
                    next
                } else {
                    index.as_str().parse::<usize>().unwrap_or(0)
                };
                position
                    .checked_sub(1)
                    .and_then(|i| self.params.get(i))
                    .map_or_else(|| whole.to_string(), Value::to_sql_literal)
            })
            .into_owned()
    }
}

impl fmt::Display for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::text;

    fn compiled(sql: &str, params: Vec<Value>) -> Compiled {
        Compiled {
            sql: sql.to_string(),
            params,
            dialect: Dialect::Sqlite,
        }
    }

    #[test]
    fn test_render_literal_numbered() {
        let c = compiled(
            "INSERT INTO t (name, fullname) VALUES (?1, ?2)",
            vec!["user1".into(), Value::Null],
        );
        assert_eq!(
            c.render_literal(),
            "INSERT INTO t (name, fullname) VALUES ('user1', NULL)"
        );
    }

    #[test]
    fn test_render_literal_escapes_quotes() {
        let c = compiled("SELECT ?1", vec!["O'Brien".into()]);
        assert_eq!(c.render_literal(), "SELECT 'O''Brien'");
    }

    #[test]
    fn test_render_literal_skips_string_literals() {
        let c = compiled("SELECT '?1', ?1", vec![7_i64.into()]);
        assert_eq!(c.render_literal(), "SELECT '?1', 7");
    }

    #[test]
    fn test_render_literal_bare_placeholders() {
        let c = compile(&text("SELECT ? + ?").bind(1).bind(2), Dialect::Sqlite);
        assert_eq!(c.render_literal(), "SELECT 1 + 2");
    }

    #[test]
    fn test_render_literal_postgres() {
        let c = Compiled {
            sql: "SELECT $2, $1".into(),
            params: vec![1.into(), "a".into()],
            dialect: Dialect::Postgres,
        };
        assert_eq!(c.render_literal(), "SELECT 'a', 1");
    }

    #[test]
    fn test_missing_param_left_in_place() {
        let c = compiled("SELECT ?3", vec![]);
        assert_eq!(c.render_literal(), "SELECT ?3");
        assert_eq!(c.to_string(), "SELECT ?3");
    }
}
