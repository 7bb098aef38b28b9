//! Session and unit of work for ormtour.
//!
//! `ormtour-session` is the **unit-of-work layer**. It coordinates object
//! identity, change tracking and transactional persistence:
//!
//! - **Identity map**: one [`Instance`] per `(table, primary key)`; every
//!   query through the session hands back the tracked instance.
//! - **Unit of work**: `add` makes objects pending, `flush` inserts them
//!   with `RETURNING *` and updates changed persistent objects.
//! - **Transactions**: begun lazily, ended by `commit`, `rollback` or
//!   `close`. A failed flush rolls back and blocks the session until
//!   `rollback()`.
//!
//! # Example
//!
//! ```ignore
//! let factory = SessionFactory::new(conn, SessionConfig::default());
//! factory.scope(|session| {
//!     let user = Instance::new(User::new("user3"));
//!     session.add(&user)?;
//!     session.commit()?;
//!     assert!(user.read().id.is_some());
//!     Ok(())
//! })?;
//! ```

pub mod factory;
pub mod identity_map;
pub mod instance;
pub mod result;
pub mod session;

pub use factory::SessionFactory;
pub use identity_map::IdentityKey;
pub use instance::{Instance, ObjectState};
pub use result::ScalarResult;
pub use session::{Session, SessionConfig};
