//! The engine: one configured database connection and the entry points
//! that use it.

use ormtour_core::error::ConfigError;
use ormtour_core::{Connection, Error, Model, Result, Row, Rows, Value, transaction};
use ormtour_query::{InsertManyBuilder, Statement, insert};
use ormtour_schema::Metadata;
use ormtour_session::{Session, SessionConfig, SessionFactory};
use ormtour_sqlite::{SqliteConfig, SqliteConnection};
use regex::Regex;
use std::sync::{Arc, LazyLock};

/// Target for statement logging.
pub const ENGINE_TARGET: &str = "ormtour::engine";

static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*):(?P<rest>.*)$").expect("valid regex")
});
static SQLITE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?::memory:|//(?:/(?P<path>.+))?)$").expect("valid regex")
});

/// Where a database URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Memory,
    File(String),
}

/// Engine settings.
///
/// `url` accepts `sqlite::memory:`, `sqlite://` (also in-memory),
/// `sqlite:///relative.db`, `sqlite:////absolute/path.db` or a bare path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub url: String,
    /// Log every statement at INFO instead of DEBUG.
    pub echo: bool,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl EngineConfig {
    /// A configuration for `url`, validated up front.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let config = Self {
            url: url.into(),
            ..Self::memory()
        };
        config.target()?;
        Ok(config)
    }

    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            echo: false,
            foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    /// Parse the URL.
    pub fn target(&self) -> Result<DatabaseTarget> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(config_error("Database URL is empty"));
        }

        let Some(caps) = URL_SCHEME.captures(url) else {
            return Ok(DatabaseTarget::File(url.to_string()));
        };
        let scheme = &caps["scheme"];
        if !scheme.eq_ignore_ascii_case("sqlite") {
            return Err(config_error(format!(
                "Unsupported database URL scheme '{}'; only sqlite is available",
                scheme
            )));
        }

        let rest = &caps["rest"];
        let location = SQLITE_LOCATION
            .captures(rest)
            .ok_or_else(|| config_error(format!("Malformed sqlite URL '{}'", url)))?;
        match location.name("path").map(|m| m.as_str()) {
            None | Some(":memory:") => Ok(DatabaseTarget::Memory),
            Some(path) => Ok(DatabaseTarget::File(path.to_string())),
        }
    }

    fn sqlite_config(&self) -> Result<SqliteConfig> {
        let base = match self.target()? {
            DatabaseTarget::Memory => SqliteConfig::memory(),
            DatabaseTarget::File(path) => SqliteConfig::file(path),
        };
        Ok(base
            .busy_timeout(self.busy_timeout_ms)
            .foreign_keys(self.foreign_keys))
    }
}

fn config_error(message: impl Into<String>) -> Error {
    Error::Config(ConfigError {
        key: Some("url".to_string()),
        message: message.into(),
    })
}

/// The engine's connection: SQLite plus statement logging.
struct EngineConnection {
    inner: SqliteConnection,
    echo: bool,
}

impl EngineConnection {
    fn log(&self, sql: &str, params: &[Value]) {
        if self.echo {
            tracing::info!(target: ENGINE_TARGET, params = ?params, "{}", sql);
        } else {
            tracing::debug!(target: ENGINE_TARGET, params = ?params, "{}", sql);
        }
    }
}

impl Connection for EngineConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Rows> {
        self.log(sql, params);
        self.inner.query(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        self.log(sql, params);
        self.inner.query_one(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.log(sql, params);
        self.inner.execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.log(sql, params);
        self.inner.insert(sql, params)
    }

    fn execute_script(&self, sql: &str) -> Result<()> {
        self.log(sql, &[]);
        self.inner.execute_script(sql)
    }

    fn begin(&self) -> Result<()> {
        self.log("BEGIN", &[]);
        self.inner.begin()
    }

    fn commit(&self) -> Result<()> {
        self.log("COMMIT", &[]);
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.log("ROLLBACK", &[]);
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

/// A configured database.
///
/// There is no global engine: create one with [`Engine::connect`], pass
/// it where it is needed and [`close`](Engine::close) it at the end.
///
/// ```ignore
/// let engine = Engine::connect(EngineConfig::memory().echo(true))?;
/// engine.create_all(&metadata)?;
/// engine.with_session(|session| {
///     let ids = session.execute(&SelectQuery::new().column(User::ID))?;
///     Ok(ids.len())
/// })?;
/// engine.close()?;
/// ```
pub struct Engine {
    config: EngineConfig,
    conn: Arc<EngineConnection>,
}

impl Engine {
    /// Open the configured database.
    pub fn connect(config: EngineConfig) -> Result<Self> {
        let sqlite = config.sqlite_config()?;
        let inner = SqliteConnection::open(&sqlite)?;
        tracing::info!(url = %config.url, echo = config.echo, "Engine connected");
        Ok(Self {
            conn: Arc::new(EngineConnection {
                inner,
                echo: config.echo,
            }),
            config,
        })
    }

    /// An engine over a fresh in-memory database.
    pub fn memory() -> Result<Self> {
        Self::connect(EngineConfig::memory())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared connection.
    pub fn connection(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.conn) as Arc<dyn Connection>
    }

    /// Run a statement and return its rows.
    pub fn execute(&self, stmt: &impl Statement) -> Result<Rows> {
        let (sql, params) = stmt.build();
        self.conn.query(&sql, &params)
    }

    /// Run a statement and return the number of rows it changed.
    pub fn execute_update(&self, stmt: &impl Statement) -> Result<u64> {
        let (sql, params) = stmt.build();
        self.conn.execute(&sql, &params)
    }

    /// Run `f` in a transaction: committed on `Ok`, rolled back on `Err`.
    pub fn begin<T>(&self, f: impl FnOnce(&dyn Connection) -> Result<T>) -> Result<T> {
        transaction(self.conn.as_ref(), |tx| f(tx.connection()))
    }

    /// Insert one row per mapping, all in one transaction.
    ///
    /// Returns the number of rows inserted. If any row fails, none remain.
    pub fn insert_many<'a, R>(&self, table: &str, rows: &[R]) -> Result<u64>
    where
        R: AsRef<[(&'a str, Value)]>,
    {
        let statements: Vec<(String, Vec<Value>)> = rows
            .iter()
            .map(|row| insert(table).values(row.as_ref()).build())
            .collect();
        self.begin(|conn| {
            let inserted: u64 = conn.batch(&statements)?.into_iter().sum();
            tracing::debug!(table, rows = inserted, "Bulk insert complete");
            Ok(inserted)
        })
    }

    /// Insert model objects with a single multi-row INSERT.
    pub fn insert_models<M: Model>(&self, models: &[M]) -> Result<u64> {
        let builder = InsertManyBuilder::new(models);
        if builder.is_empty() {
            return Ok(0);
        }
        let (sql, params) = builder.build();
        self.begin(|conn| conn.execute(&sql, &params))
    }

    /// Create every table in `metadata`.
    pub fn create_all(&self, metadata: &Metadata) -> Result<()> {
        metadata.create_all(self.conn.as_ref())
    }

    /// Drop every table in `metadata`.
    pub fn drop_all(&self, metadata: &Metadata) -> Result<()> {
        metadata.drop_all(self.conn.as_ref())
    }

    /// A new session with the default configuration.
    pub fn session(&self) -> Session {
        Session::new(self.connection())
    }

    /// A factory for sessions with `config`.
    pub fn sessionmaker(&self, config: SessionConfig) -> SessionFactory {
        SessionFactory::new(self.connection(), config)
    }

    /// Run `f` with a fresh session that is closed afterwards.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        self.sessionmaker(SessionConfig::default()).scope(f)
    }

    /// End the engine's lifecycle.
    ///
    /// An open transaction is rolled back. Sessions that still hold the
    /// connection keep it alive until they are dropped.
    pub fn close(self) -> Result<()> {
        let result = if self.conn.in_transaction() {
            self.conn.rollback()
        } else {
            Ok(())
        };
        let holders = Arc::strong_count(&self.conn) - 1;
        if holders > 0 {
            tracing::warn!(holders, "Engine closed while sessions still hold its connection");
        }
        tracing::info!(url = %self.config.url, "Engine closed");
        result
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
