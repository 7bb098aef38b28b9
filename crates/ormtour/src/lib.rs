//! ormtour - a small ORM over SQLite.
//!
//! This crate bundles the workspace crates behind one dependency:
//!
//! - Model mapping with `#[derive(Model)]`
//! - Query construction: text SQL, selects, joins, subqueries, inserts
//! - Sessions with an identity map and a unit of work
//! - An [`Engine`] that owns the configured connection
//!
//! # Quick Start
//!
//! ```ignore
//! use ormtour::prelude::*;
//!
//! #[derive(Model, Debug, Clone)]
//! #[orm(table = "user_account")]
//! struct User {
//!     #[orm(primary_key, auto_increment)]
//!     id: Option<i64>,
//!     name: String,
//!     fullname: Option<String>,
//! }
//!
//! let engine = Engine::connect(EngineConfig::from_url("sqlite::memory:")?)?;
//! engine.create_all(&Metadata::new().register::<User>()?)?;
//! engine.insert_many("user_account", &[[("name", Value::from("sandy"))]])?;
//!
//! engine.with_session(|session| {
//!     let sandy = session
//!         .scalars(&select::<User>().filter(User::NAME.eq("sandy")))?
//!         .one()?;
//!     println!("{:?}", sandy.read());
//!     Ok(())
//! })?;
//! engine.close()?;
//! ```

pub mod engine;

pub use engine::{DatabaseTarget, ENGINE_TARGET, Engine, EngineConfig};

pub use ormtour_core::{
    Column, ColumnInfo, Connection, Error, FieldInfo, FromValue, Model, Result, Row, Rows, SqlType,
    Transaction, Value, transaction,
};

pub use ormtour_macros::Model;

pub use ormtour_query::{
    BinaryOp, ColumnExt, Compiled, Dialect, Expr, Insert, InsertBuilder, InsertManyBuilder, Join,
    JoinType, OrderBy, Select, SelectQuery, Statement, Subquery, TextQuery, Update, compile,
    insert, select, text, update,
};

pub use ormtour_schema::{CreateTable, Metadata, create_table};

pub use ormtour_session::{
    IdentityKey, Instance, ObjectState, ScalarResult, Session, SessionConfig, SessionFactory,
};

pub use ormtour_sqlite::{SqliteConfig, SqliteConnection};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ormtour::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Core traits and types (Model is both the trait and the derive)
        ColumnExt,
        Connection,
        // Engine
        Engine,
        EngineConfig,
        Error,
        // Query building
        Expr,
        Instance,
        JoinType,
        Metadata,
        Model,
        ObjectState,
        Result,
        Row,
        Rows,
        Select,
        SelectQuery,
        // Session
        Session,
        SessionConfig,
        SessionFactory,
        Statement,
        Subquery,
        Value,
        compile,
        insert,
        select,
        text,
    };
}
