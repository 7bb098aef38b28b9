//! A guided tour of ormtour.
//!
//! The tour opens one engine and walks through it in order: a text
//! query, table creation, core inserts, structural queries, a scoped
//! session and a session kept open across several operations.
//!
//! ```ignore
//! let engine = Engine::connect(EngineConfig::memory().echo(true))?;
//! let report = ormtour_tour::run(&engine)?;
//! engine.close()?;
//! ```

pub mod models;
pub mod steps;

pub use models::{Address, User, metadata};
pub use steps::{
    EmailCount, Greeting, InsertReport, QueryReport, SchemaReport, SessionReport, TourReport,
    UserEmail, run,
};
