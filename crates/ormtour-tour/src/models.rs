//! The two mapped tables used throughout the tour.

use ormtour::{Metadata, Model, Result};
use serde::Serialize;

/// A row of `user_account`.
#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[orm(table = "user_account")]
pub struct User {
    #[orm(primary_key, auto_increment)]
    pub id: Option<i64>,
    pub name: String,
    pub fullname: Option<String>,
    /// Filled in by the database on insert.
    #[orm(server_default = "CURRENT_TIMESTAMP", sql_type = "TIMESTAMP")]
    pub created_at: Option<String>,
}

impl User {
    /// A transient user with no key yet.
    pub fn new(name: impl Into<String>, fullname: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            fullname: Some(fullname.into()),
            created_at: None,
        }
    }
}

/// A row of `address`, owned by one user.
#[derive(Model, Debug, Clone, PartialEq, Serialize)]
#[orm(table = "address")]
pub struct Address {
    #[orm(primary_key, auto_increment)]
    pub id: Option<i64>,
    pub email_address: String,
    #[orm(foreign_key = "user_account.id")]
    pub user_id: i64,
}

/// Table metadata for [`User`] and [`Address`].
pub fn metadata() -> Result<Metadata> {
    Metadata::new().register::<User>()?.register::<Address>()
}
