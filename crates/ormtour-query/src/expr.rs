//! SQL expressions for query building.
//!
//! `Expr` covers what the statement builders need in column lists,
//! WHERE/HAVING conditions, join conditions and ORDER BY: column
//! references, bound literals, comparisons, boolean connectives,
//! aggregate calls and labels.

use crate::clause::OrderBy;
use ormtour_core::{Column, Value};

/// SQL dialect for generating dialect-specific SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite dialect (uses ?1, ?2 placeholders)
    #[default]
    Sqlite,
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    Postgres,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Postgres => format!("${index}"),
        }
    }

    /// Quote an identifier, doubling any embedded `"`.
    pub fn quote_identifier(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// A SQL expression that can be used in column lists, WHERE, HAVING, etc.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Column reference with optional table qualifier
    Column {
        table: Option<String>,
        name: String,
    },

    /// Literal value, always sent as a bound parameter
    Literal(Value),

    /// Binary operation (e.g., a = b, a AND b)
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// NOT expr
    Not(Box<Expr>),

    /// Function call (e.g., UPPER(name))
    Function { name: String, args: Vec<Expr> },

    /// COUNT(*)
    CountStar,

    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },

    /// IN (list)
    In {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },

    /// LIKE pattern
    Like { expr: Box<Expr>, pattern: String },

    /// `expr AS alias`
    Label { expr: Box<Expr>, alias: String },

    /// Raw SQL fragment, emitted verbatim
    Raw(String),

    /// Parenthesized expression
    Paren(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Concat,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Concat => "||",
        }
    }
}

impl Expr {
    // ==================== Constructors ====================

    /// Unqualified column reference.
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    /// Table-qualified column reference.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Column {
            table: Some(table.into()),
            name: column.into(),
        }
    }

    /// Bound literal value.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    // ==================== Comparisons ====================

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Ge, other)
    }

    // ==================== Logical ====================

    pub fn and(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// OR; the result is parenthesized so it nests safely inside AND.
    pub fn or(self, other: impl Into<Expr>) -> Self {
        Expr::Paren(Box::new(self.binary(BinaryOp::Or, other)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list(self, values: Vec<impl Into<Expr>>) -> Self {
        Expr::In {
            expr: Box::new(self),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: pattern.into(),
        }
    }

    // ==================== Arithmetic / String ====================

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn concat(self, other: impl Into<Expr>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    // ==================== Functions ====================

    /// `COUNT(expr)`.
    pub fn count(expr: impl Into<Expr>) -> Self {
        Self::function("COUNT", vec![expr.into()])
    }

    /// `COUNT(*)`.
    pub fn count_star() -> Self {
        Expr::CountStar
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    /// Name this expression in a column list (`expr AS alias`).
    pub fn label(self, alias: impl Into<String>) -> Self {
        Expr::Label {
            expr: Box::new(self),
            alias: alias.into(),
        }
    }

    // ==================== Ordering ====================

    pub fn asc(self) -> OrderBy {
        OrderBy::asc(self)
    }

    pub fn desc(self) -> OrderBy {
        OrderBy::desc(self)
    }

    // ==================== Introspection ====================

    /// The name this expression exports from a column list.
    ///
    /// Labels export their alias, columns their own name; anything else
    /// is anonymous.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Expr::Label { alias, .. } => Some(alias),
            Expr::Column { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The first table qualifier referenced by this expression.
    pub fn table(&self) -> Option<&str> {
        match self {
            Expr::Column { table, .. } => table.as_deref(),
            Expr::Binary { left, right, .. } => left.table().or_else(|| right.table()),
            Expr::Not(inner) | Expr::Paren(inner) => inner.table(),
            Expr::IsNull { expr, .. }
            | Expr::In { expr, .. }
            | Expr::Like { expr, .. }
            | Expr::Label { expr, .. } => expr.table(),
            Expr::Function { args, .. } => args.iter().find_map(Expr::table),
            Expr::Literal(_) | Expr::CountStar | Expr::Raw(_) => None,
        }
    }

    fn binary(self, op: BinaryOp, other: impl Into<Expr>) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other.into()),
        }
    }

    // ==================== SQL Generation ====================

    /// Render this expression, appending bound values to `params`.
    ///
    /// Placeholders are numbered by their position in `params`, so one
    /// vector threaded through a whole statement keeps them consistent.
    pub fn build(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    dialect.quote_identifier(t),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },

            Expr::Literal(value) => {
                params.push(value.clone());
                dialect.placeholder(params.len())
            }

            Expr::Binary { left, op, right } => {
                let left_sql = left.build(dialect, params);
                let right_sql = right.build(dialect, params);
                format!("{left_sql} {} {right_sql}", op.as_str())
            }

            Expr::Not(inner) => format!("NOT {}", inner.build(dialect, params)),

            Expr::Function { name, args } => {
                let arg_sqls: Vec<_> = args.iter().map(|a| a.build(dialect, params)).collect();
                format!("{name}({})", arg_sqls.join(", "))
            }

            Expr::CountStar => "COUNT(*)".to_string(),

            Expr::IsNull { expr, negated } => {
                let expr_sql = expr.build(dialect, params);
                let not_str = if *negated { " NOT" } else { "" };
                format!("{expr_sql} IS{not_str} NULL")
            }

            Expr::In {
                expr,
                values,
                negated,
            } => {
                let expr_sql = expr.build(dialect, params);
                let value_sqls: Vec<_> = values.iter().map(|v| v.build(dialect, params)).collect();
                let not_str = if *negated { "NOT " } else { "" };
                format!("{expr_sql} {not_str}IN ({})", value_sqls.join(", "))
            }

            Expr::Like { expr, pattern } => {
                let expr_sql = expr.build(dialect, params);
                params.push(Value::Text(pattern.clone()));
                format!("{expr_sql} LIKE {}", dialect.placeholder(params.len()))
            }

            Expr::Label { expr, alias } => {
                let expr_sql = expr.build(dialect, params);
                format!("{expr_sql} AS {}", dialect.quote_identifier(alias))
            }

            Expr::Raw(sql) => sql.clone(),

            Expr::Paren(inner) => format!("({})", inner.build(dialect, params)),
        }
    }

    /// Render as a condition, dropping any label.
    pub(crate) fn build_condition(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        match self {
            Expr::Label { expr, .. } => expr.build_condition(dialect, params),
            other => other.build(dialect, params),
        }
    }
}

/// Expression builders on model column constants.
///
/// ```ignore
/// let filter = User::NAME.eq("spongebob");
/// let email_count = Address::EMAIL_ADDRESS.count().label("email_count");
/// ```
pub trait ColumnExt {
    fn expr(self) -> Expr;

    fn eq(self, other: impl Into<Expr>) -> Expr
    where
        Self: Sized,
    {
        self.expr().eq(other)
    }

    fn ne(self, other: impl Into<Expr>) -> Expr
    where
        Self: Sized,
    {
        self.expr().ne(other)
    }

    fn gt(self, other: impl Into<Expr>) -> Expr
    where
        Self: Sized,
    {
        self.expr().gt(other)
    }

    fn lt(self, other: impl Into<Expr>) -> Expr
    where
        Self: Sized,
    {
        self.expr().lt(other)
    }

    fn is_null(self) -> Expr
    where
        Self: Sized,
    {
        self.expr().is_null()
    }

    fn count(self) -> Expr
    where
        Self: Sized,
    {
        Expr::count(self.expr())
    }

    fn label(self, alias: impl Into<String>) -> Expr
    where
        Self: Sized,
    {
        self.expr().label(alias)
    }

    fn asc(self) -> OrderBy
    where
        Self: Sized,
    {
        self.expr().asc()
    }

    fn desc(self) -> OrderBy
    where
        Self: Sized,
    {
        self.expr().desc()
    }
}

impl ColumnExt for Column {
    fn expr(self) -> Expr {
        Expr::from(self)
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Expr::qualified(column.table, column.name)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Literal(Value::Text(s.to_string()))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Literal(Value::Text(s))
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Expr::Literal(Value::Int(n))
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Expr::Literal(Value::BigInt(n))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Literal(Value::Bool(b))
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::Literal(Value::Double(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: Column = Column::new("user_account", "name");
    const EMAIL: Column = Column::new("address", "email_address");

    fn sql_of(expr: &Expr) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let sql = expr.build(Dialect::Sqlite, &mut params);
        (sql, params)
    }

    #[test]
    fn test_column_reference_is_qualified() {
        let (sql, params) = sql_of(&Expr::from(NAME));
        assert_eq!(sql, "\"user_account\".\"name\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_literal_binds_parameter() {
        let (sql, params) = sql_of(&NAME.eq("user1"));
        assert_eq!(sql, "\"user_account\".\"name\" = ?1");
        assert_eq!(params, vec![Value::Text("user1".into())]);
    }

    #[test]
    fn test_postgres_placeholders() {
        let expr = Expr::col("a").eq(1).and(Expr::col("b").gt(2_i64));
        let mut params = Vec::new();
        let sql = expr.build(Dialect::Postgres, &mut params);
        assert_eq!(sql, "\"a\" = $1 AND \"b\" > $2");
        assert_eq!(params, vec![Value::Int(1), Value::BigInt(2)]);
    }

    #[test]
    fn test_or_is_parenthesized() {
        let expr = Expr::col("a")
            .eq(1)
            .or(Expr::col("b").eq(2))
            .and(Expr::col("c").is_null());
        let (sql, _) = sql_of(&expr);
        assert_eq!(sql, "(\"a\" = ?1 OR \"b\" = ?2) AND \"c\" IS NULL");
    }

    #[test]
    fn test_count_with_label() {
        let (sql, params) = sql_of(&EMAIL.count().label("email_count"));
        assert_eq!(sql, "COUNT(\"address\".\"email_address\") AS \"email_count\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_label_dropped_in_condition() {
        let expr = EMAIL.count().label("n");
        let mut params = Vec::new();
        let sql = expr.build_condition(Dialect::Sqlite, &mut params);
        assert_eq!(sql, "COUNT(\"address\".\"email_address\")");
    }

    #[test]
    fn test_in_list_and_like() {
        let (sql, params) = sql_of(&Expr::col("id").in_list(vec![1, 2, 3]));
        assert_eq!(sql, "\"id\" IN (?1, ?2, ?3)");
        assert_eq!(params.len(), 3);

        let (sql, params) = sql_of(&Expr::col("email").like("%@gmail.com"));
        assert_eq!(sql, "\"email\" LIKE ?1");
        assert_eq!(params, vec![Value::Text("%@gmail.com".into())]);
    }

    #[test]
    fn test_output_name_and_table() {
        let labelled = EMAIL.count().label("email_count");
        assert_eq!(labelled.output_name(), Some("email_count"));
        assert_eq!(labelled.table(), Some("address"));
        assert_eq!(Expr::from(NAME).output_name(), Some("name"));
        assert_eq!(Expr::count_star().output_name(), None);
        assert_eq!(Expr::lit(1).table(), None);
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(Dialect::Sqlite.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
