//! The walkthrough, one function per step.
//!
//! Every step takes the engine it runs against and returns what it
//! observed, so the binary can print it and tests can check it.

use crate::models::{self, Address, User};
use ormtour::{
    ColumnExt, Dialect, Engine, IdentityKey, Insert, Instance, Model, Result, SelectQuery, Session,
    Value, compile, insert, select, text,
};
use serde::Serialize;

/// The first query of the tour.
pub const GREETING_SQL: &str = "select 'hello world' as greeting";

/// Users inserted in bulk after `user1`, as `(name, fullname)`.
pub const BULK_USERS: [(&str, &str); 3] = [
    ("user2", "user2 fullname"),
    ("sandy", "Sandy Cheeks"),
    ("gary", "Gary the Snail"),
];

/// Addresses as `(email_address, user_id)`.
pub const ADDRESSES: [(&str, i64); 6] = [
    ("user1@gamil.com", 1),
    ("user2@gamil.com", 2),
    ("sandy@gmail.com", 3),
    ("sandy_spare@gmail.com", 3),
    ("gary@gamil.com", 4),
    ("gary_spare@gamil.com", 4),
];

/// Result of the hello-world text query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Greeting {
    pub greeting: String,
    pub mapping: serde_json::Value,
    pub rows: usize,
}

/// Run a text query and read its single row by name.
pub fn hello_world(engine: &Engine) -> Result<Greeting> {
    let rows = engine.execute(&text(GREETING_SQL))?;
    let row = rows.one()?;
    Ok(Greeting {
        greeting: row.get_named("greeting")?,
        mapping: row.to_json(),
        rows: rows.len(),
    })
}

/// What the schema step created and rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaReport {
    /// Tables in creation order.
    pub tables: Vec<&'static str>,
    /// An example object, never persisted.
    pub example: User,
    /// INSERT over every column, before any value is given.
    pub bare_insert_sql: String,
    pub insert_sql: String,
    pub insert_literal: String,
}

/// An INSERT naming every `user_account` column, one placeholder each.
fn bare_user_insert() -> Insert {
    User::fields()
        .iter()
        .fold(insert(User::TABLE_NAME), |stmt, field| {
            stmt.value(field.column_name, Value::Null)
        })
}

fn first_user_insert() -> Insert {
    insert(User::TABLE_NAME)
        .value("name", "user1")
        .value("fullname", "first user fullname")
}

/// Create both tables and render the first INSERT without running it.
pub fn create_schema(engine: &Engine) -> Result<SchemaReport> {
    let metadata = models::metadata()?;
    engine.create_all(&metadata)?;
    let tables = metadata
        .sorted_tables()?
        .into_iter()
        .map(|table| table.name)
        .collect();

    let compiled = compile(&first_user_insert(), Dialect::Sqlite);
    Ok(SchemaReport {
        tables,
        example: User::new("Dima", "didoogan"),
        bare_insert_sql: compile(&bare_user_insert(), Dialect::Sqlite).to_string(),
        insert_sql: compiled.to_string(),
        insert_literal: compiled.render_literal(),
    })
}

/// Row counts written by the insert step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertReport {
    pub first_user: u64,
    pub users: u64,
    pub addresses: u64,
}

/// Insert `user1`, then the other users and the addresses in bulk.
pub fn insert_rows(engine: &Engine) -> Result<InsertReport> {
    let first_user = engine.execute_update(&first_user_insert())?;

    let users: Vec<[(&str, Value); 2]> = BULK_USERS
        .iter()
        .map(|&(name, fullname)| {
            [
                ("name", Value::from(name)),
                ("fullname", Value::from(fullname)),
            ]
        })
        .collect();
    let users = engine.insert_many(User::TABLE_NAME, &users)?;

    let addresses: Vec<[(&str, Value); 2]> = ADDRESSES
        .iter()
        .map(|&(email, user_id)| {
            [
                ("email_address", Value::from(email)),
                ("user_id", Value::from(user_id)),
            ]
        })
        .collect();
    let addresses = engine.insert_many(Address::TABLE_NAME, &addresses)?;

    tracing::info!(first_user, users, addresses, "Rows inserted");
    Ok(InsertReport {
        first_user,
        users,
        addresses,
    })
}

/// User names through a text query.
pub fn text_names(engine: &Engine) -> Result<Vec<String>> {
    engine
        .execute(&text("SELECT name FROM user_account ORDER BY id"))?
        .scalars()
}

/// `(name, id)` pairs through a structural query.
pub fn names_and_ids(engine: &Engine) -> Result<Vec<(String, i64)>> {
    let rows = engine.execute(
        &SelectQuery::new()
            .column(User::NAME)
            .column(User::ID)
            .order_by(User::ID),
    )?;
    rows.iter()
        .map(|row| Ok((row.get_as(0)?, row.get_as(1)?)))
        .collect()
}

/// One row of the user/address join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEmail {
    pub name: String,
    pub fullname: Option<String>,
    pub email_address: String,
}

/// Every address with its owner, joined along the foreign key.
pub fn users_with_addresses(engine: &Engine) -> Result<Vec<UserEmail>> {
    let query = SelectQuery::new()
        .column(User::NAME)
        .column(User::FULLNAME)
        .column(Address::EMAIL_ADDRESS)
        .join_from::<User, Address>()?
        .order_by(Address::ID);
    engine
        .execute(&query)?
        .iter()
        .map(|row| {
            Ok(UserEmail {
                name: row.get_named("name")?,
                fullname: row.get_named("fullname")?,
                email_address: row.get_named("email_address")?,
            })
        })
        .collect()
}

/// A user owning more than one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailCount {
    pub name: String,
    pub email_count: i64,
}

/// Users with more than one address, counted in a grouped subquery.
pub fn users_with_several_addresses(engine: &Engine) -> Result<Vec<EmailCount>> {
    let counts = SelectQuery::new()
        .column(Address::USER_ID)
        .column(Address::EMAIL_ADDRESS.count().label("email_count"))
        .group_by(Address::USER_ID)
        .having(Address::EMAIL_ADDRESS.count().gt(1))
        .subquery("email_address_count");

    let query = SelectQuery::new()
        .column(User::NAME)
        .column(counts.c("email_count")?)
        .join_subquery(&counts, User::ID.eq(counts.c("user_id")?))
        .order_by(User::ID);
    engine
        .execute(&query)?
        .iter()
        .map(|row| {
            Ok(EmailCount {
                name: row.get_named("name")?,
                email_count: row.get_named("email_count")?,
            })
        })
        .collect()
}

/// Results of the query step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub names: Vec<String>,
    pub names_and_ids: Vec<(String, i64)>,
    pub users_with_addresses: Vec<UserEmail>,
    pub email_counts: Vec<EmailCount>,
}

pub fn query_rows(engine: &Engine) -> Result<QueryReport> {
    Ok(QueryReport {
        names: text_names(engine)?,
        names_and_ids: names_and_ids(engine)?,
        users_with_addresses: users_with_addresses(engine)?,
        email_counts: users_with_several_addresses(engine)?,
    })
}

/// User ids read through a session that is closed before returning.
pub fn scoped_user_ids(engine: &Engine) -> Result<Vec<i64>> {
    engine.with_session(|session| {
        session
            .execute(&SelectQuery::new().column(User::ID).order_by(User::ID))?
            .scalars()
    })
}

/// What a session kept open across several operations observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Objects waiting for the next flush after `user3` was added.
    pub pending: Vec<User>,
    /// Whether the query for `user3` returned the added instance itself.
    pub same_instance: bool,
    pub identity_keys: Vec<IdentityKey>,
    pub first_match: Option<User>,
    /// `user3`, `user4` and `user5` after the final commit.
    pub committed: Vec<User>,
}

/// Keep one session open for several steps, then commit and close it.
pub fn long_lived_session(engine: &Engine) -> Result<SessionReport> {
    let mut session = engine.session();
    let report = use_session(&mut session);
    let closed = session.close();
    let report = report?;
    closed?;
    Ok(report)
}

fn use_session(session: &mut Session) -> Result<SessionReport> {
    let user3 = Instance::new(User::new("user3", "user3 fullname"));
    session.add(&user3)?;
    let pending: Vec<User> = session
        .new_objects::<User>()
        .iter()
        .map(Instance::get)
        .collect();
    tracing::info!(pending = pending.len(), "user3 is pending");

    // Autoflush writes user3 before the query runs.
    let by_name = select::<User>().filter(User::NAME.eq("user3"));
    let found = session.scalars(&by_name)?.one()?;
    let same_instance = found.ptr_eq(&user3);
    let identity_keys = session.identity_keys();
    for key in &identity_keys {
        tracing::debug!(%key, "Identity map entry");
    }

    let first_match = session.scalars(&by_name)?.first().map(|user| user.get());

    let more = [
        Instance::new(User::new("user4", "user4 fullname")),
        Instance::new(User::new("user5", "user5 fullname")),
    ];
    session.add_all(&more)?;
    session.commit()?;

    let committed = std::iter::once(&user3)
        .chain(&more)
        .map(Instance::get)
        .collect();
    Ok(SessionReport {
        pending,
        same_instance,
        identity_keys,
        first_match,
        committed,
    })
}

/// Everything the tour printed, step by step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourReport {
    pub greeting: Greeting,
    pub schema: SchemaReport,
    pub inserted: InsertReport,
    pub queries: QueryReport,
    pub scoped_user_ids: Vec<i64>,
    pub session: SessionReport,
}

/// Run every step in order against a fresh database.
pub fn run(engine: &Engine) -> Result<TourReport> {
    Ok(TourReport {
        greeting: hello_world(engine)?,
        schema: create_schema(engine)?,
        inserted: insert_rows(engine)?,
        queries: query_rows(engine)?,
        scoped_user_ids: scoped_user_ids(engine)?,
        session: long_lived_session(engine)?,
    })
}
