//! Error types for ormtour operations.

use std::fmt;

/// The primary error type for all ormtour operations.
#[derive(Debug)]
pub enum Error {
    /// Opening or using the database handle failed
    Connection(ConnectionError),
    /// Statement preparation or execution failed
    Query(QueryError),
    /// A value could not be converted to the requested Rust type
    Type(TypeError),
    /// Transaction bookkeeping errors (double begin, commit without begin)
    Transaction(TransactionError),
    /// Unit-of-work and identity map errors
    Session(SessionError),
    /// DDL generation or table registration errors
    Schema(SchemaError),
    /// Invalid engine or driver configuration
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to open the database
    Connect,
    /// The handle was already closed
    Closed,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL, or a statement that cannot be built
    Syntax,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Table, column or row not found
    NotFound,
    /// Permission denied
    Permission,
    /// Data too large for column
    DataTruncation,
    /// Database busy or locked
    Deadlock,
    /// Interrupted
    Cancelled,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN issued while a transaction is open
    AlreadyActive,
    /// COMMIT or ROLLBACK issued without an open transaction
    NotActive,
}

#[derive(Debug)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// A previous flush failed; `rollback()` must be called first
    NeedsRollback,
    /// Another instance already holds this identity in the session
    IdentityConflict,
    /// The instance is not tracked by this session
    NotTracked,
    /// A query expected to return a single object returned a different count
    ResultCount,
    /// The object is borrowed and cannot be refreshed
    InstanceLocked,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub table: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// Table registered twice
    DuplicateTable,
    /// Foreign key cycle between registered tables
    DependencyCycle,
    /// Invalid model metadata (bad foreign key reference, missing column)
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub key: Option<String>,
    pub message: String,
}

impl Error {
    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }

    /// Is this a constraint violation raised by the database?
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Query(q) if q.kind == QueryErrorKind::Constraint)
    }

    /// Does the session refuse further work until rollback?
    pub fn needs_rollback(&self) -> bool {
        matches!(self, Error::Session(s) if s.kind == SessionErrorKind::NeedsRollback)
    }

    /// Build a query error for a statement that could not be constructed.
    pub fn build(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: None,
            message: message.into(),
            source: None,
        })
    }

    pub(crate) fn missing_column(column: &str) -> Self {
        Error::Type(TypeError {
            expected: "column",
            actual: format!("column '{}' not found", column),
            column: Some(column.to_string()),
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Session(e) => write!(f, "Session error: {}", e.message),
            Error::Schema(e) => match &e.table {
                Some(table) => write!(f, "Schema error on '{}': {}", table, e.message),
                None => write!(f, "Schema error: {}", e.message),
            },
            Error::Config(e) => match &e.key {
                Some(key) => write!(f, "Configuration error ({}): {}", key, e.message),
                None => write!(f, "Configuration error: {}", e.message),
            },
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} [SQL: {}]", self.message, sql),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        Error::Session(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for ormtour operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_includes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("INSERT INTO address (user_id) VALUES (?1)".to_string()),
            message: "FOREIGN KEY constraint failed".to_string(),
            source: None,
        });
        let text = err.to_string();
        assert!(text.contains("FOREIGN KEY constraint failed"));
        assert!(text.contains("INSERT INTO address"));
        assert!(err.is_constraint_violation());
        assert_eq!(err.sql(), Some("INSERT INTO address (user_id) VALUES (?1)"));
    }

    #[test]
    fn test_type_error_display_names_column() {
        let err = Error::Type(TypeError {
            expected: "i64",
            actual: "TEXT".to_string(),
            column: Some("id".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "Type error in column 'id': expected i64, found TEXT"
        );
    }

    #[test]
    fn test_needs_rollback() {
        let err: Error = SessionError {
            kind: SessionErrorKind::NeedsRollback,
            message: "flush failed".to_string(),
        }
        .into();
        assert!(err.needs_rollback());
        assert!(!Error::Custom("x".into()).needs_rollback());
    }

    #[test]
    fn test_build_error_is_syntax_kind() {
        match Error::build("no FROM clause") {
            Error::Query(q) => {
                assert_eq!(q.kind, QueryErrorKind::Syntax);
                assert!(q.sql.is_none());
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }
}
