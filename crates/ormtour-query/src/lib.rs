//! SQL statement builders for ormtour.
//!
//! `ormtour-query` is the **query construction layer**. It turns `Model`
//! metadata and column constants into SQL text plus bound parameters:
//!
//! - **Expressions**: [`Expr`] and the [`ColumnExt`] methods on model
//!   column constants build conditions, aggregates and labels.
//! - **Statements**: [`text`], [`SelectQuery`], [`select`], [`insert`],
//!   [`InsertBuilder`], [`InsertManyBuilder`] and [`update`] all implement
//!   [`Statement`].
//! - **Rendering**: [`compile`] captures a statement for display and
//!   [`Compiled::render_literal`] inlines its parameters.
//!
//! Nothing here talks to a database; statements execute through the
//! `Connection` trait from `ormtour-core`.

pub mod clause;
pub mod compile;
pub mod expr;
pub mod insert;
pub mod join;
pub mod select;
pub mod subquery;
pub mod text;

pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use compile::{Compiled, Statement, compile};
pub use expr::{BinaryOp, ColumnExt, Dialect, Expr};
pub use insert::{Insert, InsertBuilder, InsertManyBuilder, Update, insert, update};
pub use join::{Join, JoinType, TableRef, foreign_key_condition};
pub use select::{Select, SelectQuery, select};
pub use subquery::Subquery;
pub use text::{TextQuery, text};
