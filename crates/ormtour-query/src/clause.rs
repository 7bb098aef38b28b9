//! SQL clause types (WHERE, ORDER BY, LIMIT, OFFSET).

use crate::expr::{Dialect, Expr};
use ormtour_core::{Column, Value};

/// WHERE or HAVING condition; successive filters are ANDed together.
#[derive(Debug, Clone)]
pub struct Where {
    expr: Expr,
}

impl Where {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }

    /// Add an AND condition.
    pub fn and(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.and(expr),
        }
    }

    /// Add an OR condition.
    pub fn or(self, expr: Expr) -> Self {
        Self {
            expr: self.expr.or(expr),
        }
    }

    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        self.expr.build_condition(dialect, params)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// ORDER BY term.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(expr: impl Into<Expr>) -> Self {
        Self {
            expr: expr.into(),
            direction: OrderDirection::Desc,
        }
    }

    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        // Ordering by a labelled column refers to it by its alias.
        let expr_sql = match &self.expr {
            Expr::Label { alias, .. } => dialect.quote_identifier(alias),
            other => other.build(dialect, params),
        };
        match self.direction {
            OrderDirection::Asc => format!("{expr_sql} ASC"),
            OrderDirection::Desc => format!("{expr_sql} DESC"),
        }
    }
}

impl From<Column> for OrderBy {
    fn from(column: Column) -> Self {
        OrderBy::asc(column)
    }
}

impl From<Expr> for OrderBy {
    fn from(expr: Expr) -> Self {
        OrderBy::asc(expr)
    }
}

/// LIMIT clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(pub u64);

/// OFFSET clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_chains_with_and() {
        let clause = Where::new(Expr::col("a").eq(1)).and(Expr::col("b").eq(2));
        let mut params = Vec::new();
        assert_eq!(
            clause.build(Dialect::Sqlite, &mut params),
            "\"a\" = ?1 AND \"b\" = ?2"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_order_by_column_defaults_ascending() {
        let order = OrderBy::from(Column::new("user_account", "id"));
        let mut params = Vec::new();
        assert_eq!(
            order.build(Dialect::Sqlite, &mut params),
            "\"user_account\".\"id\" ASC"
        );
    }

    #[test]
    fn test_order_by_label_uses_alias() {
        let order = OrderBy::desc(Expr::count_star().label("n"));
        let mut params = Vec::new();
        assert_eq!(order.build(Dialect::Sqlite, &mut params), "\"n\" DESC");
    }
}
