//! Textual SQL with positional parameters.

use crate::compile::Statement;
use crate::expr::Dialect;
use ormtour_core::Value;

/// A SQL string executed as written.
///
/// Parameters bind positionally to `?` / `?N` placeholders; the text is
/// never parsed here, so malformed SQL only fails when executed.
#[derive(Debug, Clone, PartialEq)]
pub struct TextQuery {
    sql: String,
    params: Vec<Value>,
}

/// Wrap raw SQL text.
pub fn text(sql: impl Into<String>) -> TextQuery {
    TextQuery {
        sql: sql.into(),
        params: Vec::new(),
    }
}

impl TextQuery {
    /// Bind the next positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

impl Statement for TextQuery {
    fn build_with_dialect(&self, _dialect: Dialect) -> (String, Vec<Value>) {
        (self.sql.clone(), self.params.clone())
    }
}
