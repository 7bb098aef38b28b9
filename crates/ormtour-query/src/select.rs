//! SELECT query builders.
//!
//! `SelectQuery` is the untyped builder behind every SELECT: any column
//! list, joins (including subqueries), grouping and ordering. `Select<M>`
//! wraps it for queries whose rows load into a model.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::compile::Statement;
use crate::expr::{Dialect, Expr};
use crate::join::{Join, JoinType, TableRef};
use crate::subquery::Subquery;
use ormtour_core::{Model, Result, Value};
use std::marker::PhantomData;

/// A SELECT statement over arbitrary columns.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    columns: Vec<Expr>,
    from: Option<String>,
    joins: Vec<Join>,
    where_clause: Option<Where>,
    group_by: Vec<Expr>,
    having: Option<Where>,
    order_by: Vec<OrderBy>,
    limit: Option<Limit>,
    offset: Option<Offset>,
    distinct: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one column or expression to the select list.
    pub fn column(mut self, expr: impl Into<Expr>) -> Self {
        self.columns.push(expr.into());
        self
    }

    pub fn columns<I, E>(mut self, exprs: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        self.columns.extend(exprs.into_iter().map(Into::into));
        self
    }

    /// Set the FROM table explicitly.
    ///
    /// Without it, FROM is the first table named by the column list that
    /// is not also a join target.
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.from = Some(table.into());
        self
    }

    pub fn from_model<M: Model>(self) -> Self {
        self.from(M::TABLE_NAME)
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// `FROM L JOIN R ON <foreign key>`.
    pub fn join_from<L: Model, R: Model>(self) -> Result<Self> {
        let join = Join::inferred::<L, R>(JoinType::Inner)?;
        Ok(self.from_model::<L>().join(join))
    }

    /// `JOIN (subquery) AS alias ON <on>`.
    pub fn join_subquery(self, subquery: &Subquery, on: Expr) -> Self {
        self.join(Join::subquery(JoinType::Inner, subquery, on))
    }

    /// Add a WHERE condition, ANDed with any previous one.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    pub fn group_by(mut self, expr: impl Into<Expr>) -> Self {
        self.group_by.push(expr.into());
        self
    }

    /// Add a HAVING condition, ANDed with any previous one.
    pub fn having(mut self, expr: Expr) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by.push(order.into());
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Wrap this query under an alias for use as a join target.
    pub fn subquery(self, alias: impl Into<String>) -> Subquery {
        Subquery::new(self, alias)
    }

    pub fn column_exprs(&self) -> &[Expr] {
        &self.columns
    }

    fn from_table(&self) -> Option<&str> {
        if let Some(table) = &self.from {
            return Some(table);
        }
        let joined: Vec<&str> = self.joins.iter().map(|j| j.target.name()).collect();
        self.columns
            .iter()
            .filter_map(Expr::table)
            .find(|t| !joined.contains(t))
    }

    /// Render into a shared parameter list; used when nesting.
    pub fn build_into(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<_> = self.columns.iter().map(|c| c.build(dialect, params)).collect();
            sql.push_str(&cols.join(", "));
        }

        if let Some(table) = self.from_table() {
            sql.push_str(" FROM ");
            sql.push_str(&TableRef::Table(table.to_string()).build(dialect, params));
        }

        for join in &self.joins {
            sql.push_str(&join.build(dialect, params));
        }

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build(dialect, params));
        }

        if !self.group_by.is_empty() {
            let groups: Vec<_> = self
                .group_by
                .iter()
                .map(|g| g.build_condition(dialect, params))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(&having.build(dialect, params));
        }

        if !self.order_by.is_empty() {
            let orders: Vec<_> = self.order_by.iter().map(|o| o.build(dialect, params)).collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(Limit(n)) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        if let Some(Offset(n)) = self.offset {
            if self.limit.is_none() {
                // SQLite requires LIMIT before OFFSET
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {n}"));
        }

        sql
    }
}

impl Statement for SelectQuery {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = self.build_into(dialect, &mut params);
        (sql, params)
    }
}

/// A SELECT of every column of `M`, loadable with `M::from_row`.
#[derive(Debug, Clone)]
pub struct Select<M: Model> {
    query: SelectQuery,
    _marker: PhantomData<M>,
}

/// Start a `Select` over model `M`.
pub fn select<M: Model>() -> Select<M> {
    Select::new()
}

impl<M: Model> Select<M> {
    pub fn new() -> Self {
        Self {
            query: SelectQuery::new().columns(M::columns()).from_model::<M>(),
            _marker: PhantomData,
        }
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.query = self.query.filter(expr);
        self
    }

    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.query = self.query.order_by(order);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.query = self.query.limit(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.query = self.query.offset(n);
        self
    }

    pub fn query(&self) -> &SelectQuery {
        &self.query
    }

    pub fn into_query(self) -> SelectQuery {
        self.query
    }
}

impl<M: Model> Default for Select<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Statement for Select<M> {
    fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        self.query.build_with_dialect(dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExt;
    use crate::tests_support::{Address, Tag, User};

    #[test]
    fn test_select_model_lists_every_column() {
        let (sql, params) = select::<User>().build();
        assert_eq!(
            sql,
            "SELECT \"user_account\".\"id\", \"user_account\".\"name\", \
             \"user_account\".\"fullname\", \"user_account\".\"created_at\" \
             FROM \"user_account\""
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_select_with_filter_order_limit() {
        let (sql, params) = select::<User>()
            .filter(User::NAME.eq("user1"))
            .order_by(User::ID.desc())
            .limit(1)
            .build();
        assert!(sql.ends_with(
            "WHERE \"user_account\".\"name\" = ?1 ORDER BY \"user_account\".\"id\" DESC LIMIT 1"
        ));
        assert_eq!(params, vec![Value::Text("user1".into())]);
    }

    #[test]
    fn test_from_inferred_from_columns() {
        let (sql, _) = SelectQuery::new()
            .column(User::NAME)
            .column(User::ID)
            .build();
        assert_eq!(
            sql,
            "SELECT \"user_account\".\"name\", \"user_account\".\"id\" FROM \"user_account\""
        );
    }

    #[test]
    fn test_select_without_table() {
        let (sql, params) = SelectQuery::new().column(Expr::lit("hello").label("greeting")).build();
        assert_eq!(sql, "SELECT ?1 AS \"greeting\"");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_join_from_infers_on_clause() {
        let (sql, _) = SelectQuery::new()
            .column(User::NAME)
            .column(Address::EMAIL_ADDRESS)
            .join_from::<User, Address>()
            .unwrap()
            .build();
        assert_eq!(
            sql,
            "SELECT \"user_account\".\"name\", \"address\".\"email_address\" \
             FROM \"user_account\" INNER JOIN \"address\" \
             ON \"user_account\".\"id\" = \"address\".\"user_id\""
        );
    }

    #[test]
    fn test_join_from_unrelated_models_fails() {
        assert!(SelectQuery::new().join_from::<User, Tag>().is_err());
    }

    #[test]
    fn test_grouped_subquery_join() {
        let subq = SelectQuery::new()
            .column(Address::USER_ID)
            .column(Address::EMAIL_ADDRESS.count().label("email_count"))
            .group_by(Address::USER_ID)
            .having(Address::EMAIL_ADDRESS.count().gt(1))
            .subquery("anon_1");

        let query = SelectQuery::new()
            .column(User::NAME)
            .column(subq.c("email_count").unwrap())
            .join_subquery(&subq, User::ID.eq(subq.c("user_id").unwrap()))
            .filter(User::NAME.ne("nobody"));
        let (sql, params) = query.build();

        assert_eq!(
            sql,
            "SELECT \"user_account\".\"name\", \"anon_1\".\"email_count\" \
             FROM \"user_account\" INNER JOIN (SELECT \"address\".\"user_id\", \
             COUNT(\"address\".\"email_address\") AS \"email_count\" FROM \"address\" \
             GROUP BY \"address\".\"user_id\" HAVING COUNT(\"address\".\"email_address\") > ?1) \
             AS \"anon_1\" ON \"user_account\".\"id\" = \"anon_1\".\"user_id\" \
             WHERE \"user_account\".\"name\" <> ?2"
        );
        assert_eq!(params, vec![Value::Int(1), Value::Text("nobody".into())]);
    }

    #[test]
    fn test_offset_without_limit() {
        let (sql, _) = select::<Tag>().offset(5).build();
        assert!(sql.ends_with("LIMIT -1 OFFSET 5"));
    }
}
