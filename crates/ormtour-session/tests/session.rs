//! Session behavior against an in-memory SQLite database.

use ormtour_core::error::{SessionErrorKind, TransactionErrorKind};
use ormtour_core::{Connection, Error, Value};
use ormtour_macros::Model;
use ormtour_query::{ColumnExt, select};
use ormtour_schema::Metadata;
use ormtour_session::{IdentityKey, Instance, ObjectState, Session, SessionConfig, SessionFactory};
use ormtour_sqlite::SqliteConnection;
use std::sync::Arc;

#[derive(Model, Debug, Clone, PartialEq)]
#[orm(table = "user_account")]
struct User {
    #[orm(primary_key, auto_increment)]
    id: Option<i64>,
    name: String,
    fullname: Option<String>,
    #[orm(server_default = "CURRENT_TIMESTAMP", sql_type = "TIMESTAMP")]
    created_at: Option<String>,
}

impl User {
    fn new(name: &str, fullname: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            fullname: Some(fullname.to_string()),
            created_at: None,
        }
    }
}

#[derive(Model, Debug, Clone)]
struct Address {
    #[orm(primary_key, auto_increment)]
    id: Option<i64>,
    email_address: String,
    #[orm(foreign_key = "user_account.id")]
    user_id: i64,
}

fn setup() -> Arc<dyn Connection> {
    let conn = SqliteConnection::open_memory().unwrap();
    Metadata::new()
        .register::<User>()
        .unwrap()
        .register::<Address>()
        .unwrap()
        .create_all(&conn)
        .unwrap();
    Arc::new(conn)
}

fn count(conn: &Arc<dyn Connection>, table: &str) -> i64 {
    conn.query(&format!("SELECT count(*) FROM \"{}\"", table), &[])
        .unwrap()
        .scalars::<i64>()
        .unwrap()[0]
}

#[test]
fn query_returns_the_added_instance() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("user3", "third user"));

    session.add(&user).unwrap();
    assert_eq!(user.state(), ObjectState::Pending);
    assert_eq!(session.pending_count(), 1);

    // Autoflush writes the pending object before the query runs.
    let found = session
        .scalars(&select::<User>().filter(User::NAME.eq("user3")))
        .unwrap()
        .one()
        .unwrap();
    assert!(found.ptr_eq(&user));
    assert_eq!(user.state(), ObjectState::Persistent);
    assert_eq!(session.pending_count(), 0);

    let by_pk = session.get::<User>(user.read().id.unwrap()).unwrap().unwrap();
    assert!(by_pk.ptr_eq(&user));
    session.close().unwrap();
}

#[test]
fn commit_populates_key_and_server_default() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let users: Vec<_> = ["user4", "user5"]
        .into_iter()
        .map(|name| Instance::new(User::new(name, "x")))
        .collect();

    session.add_all(&users).unwrap();
    assert!(users.iter().all(|u| u.read().id.is_none()));
    session.commit().unwrap();

    for user in &users {
        let user = user.read();
        assert!(user.id.is_some());
        assert!(user.created_at.as_deref().is_some_and(|ts| !ts.is_empty()));
    }
    assert!(!session.in_transaction());
    assert_eq!(count(&conn, "user_account"), 2);
    session.close().unwrap();
}

#[test]
fn without_autoflush_pending_objects_are_not_queried() {
    let conn = setup();
    let mut session = Session::with_config(conn, SessionConfig::default().autoflush(false));
    let user = Instance::new(User::new("user3", "third user"));
    session.add(&user).unwrap();

    let found = session.scalars(&select::<User>()).unwrap();
    assert!(found.is_empty());
    assert_eq!(session.new_objects::<User>().len(), 1);
    assert!(session.new_objects::<User>()[0].ptr_eq(&user));
    assert!(session.new_objects::<Address>().is_empty());
}

#[test]
fn failed_flush_requires_rollback() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));

    let user = Instance::new(User::new("user1", "first"));
    session.add(&user).unwrap();
    session.flush().unwrap();
    let user_id = user.read().id;
    assert!(user_id.is_some());

    let orphan = Instance::new(Address {
        id: None,
        email_address: "nobody@example.com".into(),
        user_id: 999,
    });
    session.add(&orphan).unwrap();

    let err = session.commit().unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert!(session.needs_rollback());
    assert_eq!(orphan.state(), ObjectState::Pending);
    assert!(orphan.read().id.is_none());

    let blocked = session.scalars(&select::<User>()).unwrap_err();
    assert!(blocked.needs_rollback());
    assert!(matches!(session.add(&Instance::new(User::new("u", "u"))), Err(Error::Session(_))));

    session.rollback().unwrap();
    assert!(!session.needs_rollback());
    // The user was inserted in the rolled-back transaction.
    assert_eq!(user.state(), ObjectState::Transient);
    assert!(user.read().id.is_none());
    assert!(!session.contains(&user));
    // The orphan never reached the database and stays pending.
    assert!(session.contains(&orphan));
    assert_eq!(count(&conn, "user_account"), 0);

    session.expunge(&orphan).unwrap();
    assert_eq!(orphan.state(), ObjectState::Transient);
    session.commit().unwrap();
}

#[test]
fn expired_objects_refresh_in_place() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("sandy", "Sandy Cheeks"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    let id = user.read().id.unwrap();
    conn.execute(
        "UPDATE user_account SET fullname = ?1 WHERE id = ?2",
        &[Value::Text("Sandy C.".into()), Value::BigInt(id)],
    )
    .unwrap();

    let again = session.get::<User>(id).unwrap().unwrap();
    assert!(again.ptr_eq(&user));
    assert_eq!(user.read().fullname.as_deref(), Some("Sandy C."));
    session.close().unwrap();
}

#[test]
fn unexpired_objects_are_not_overwritten() {
    let conn = setup();
    let mut session = Session::with_config(
        Arc::clone(&conn),
        SessionConfig::default().expire_on_commit(false),
    );
    let user = Instance::new(User::new("sandy", "Sandy Cheeks"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    conn.execute("UPDATE user_account SET fullname = 'changed'", &[])
        .unwrap();
    let loaded = session.scalars(&select::<User>()).unwrap().one().unwrap();
    assert!(loaded.ptr_eq(&user));
    assert_eq!(user.read().fullname.as_deref(), Some("Sandy Cheeks"));
    session.close().unwrap();
}

#[test]
fn get_consults_identity_map_first() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("gary", "Gary"));
    session.add(&user).unwrap();
    session.flush().unwrap();
    let id = user.read().id.unwrap();

    // Same transaction, so the session still sees its own object.
    conn.execute("DELETE FROM user_account", &[]).unwrap();
    let cached = session.get::<User>(id).unwrap().unwrap();
    assert!(cached.ptr_eq(&user));
    assert!(session.get::<User>(id + 1).unwrap().is_none());
    session.rollback().unwrap();
}

#[test]
fn dirty_objects_are_updated_on_flush() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("patrick", "Patrick"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    let loaded = session.scalars(&select::<User>()).unwrap().one().unwrap();
    assert_eq!(session.dirty_count(), 0);
    loaded.write().fullname = Some("Patrick Star".into());
    assert_eq!(session.dirty_count(), 1);
    session.commit().unwrap();
    assert_eq!(session.dirty_count(), 0);

    let stored: Vec<String> = conn
        .query("SELECT fullname FROM user_account", &[])
        .unwrap()
        .scalars()
        .unwrap();
    assert_eq!(stored, vec!["Patrick Star".to_string()]);
    session.close().unwrap();
}

#[test]
fn identity_keys_list_persistent_objects() {
    let conn = setup();
    let mut session = Session::new(conn);
    let users: Vec<_> = (1..=3)
        .map(|i| Instance::new(User::new(&format!("user{i}"), "x")))
        .collect();
    session.add_all(&users).unwrap();
    assert!(session.identity_keys().is_empty());

    session.flush().unwrap();
    let keys = session.identity_keys();
    assert_eq!(keys.len(), 3);
    assert_eq!(keys[0], IdentityKey::new("user_account", vec![Value::BigInt(1)]));
    assert_eq!(session.tracked_count(), 3);
    session.close().unwrap();
}

#[test]
fn scoped_session_detaches_on_exit() {
    let conn = setup();
    let factory = SessionFactory::new(Arc::clone(&conn), SessionConfig::default());

    let user = factory
        .scope(|session| {
            let user = Instance::new(User::new("spongebob", "Spongebob Squarepants"));
            session.add(&user)?;
            session.commit()?;
            Ok(user)
        })
        .unwrap();
    assert_eq!(user.state(), ObjectState::Detached);
    assert!(user.read().id.is_some());

    // Uncommitted work is discarded when the scope ends.
    factory
        .scope(|session| session.add(&Instance::new(User::new("squidward", "Squidward"))))
        .unwrap();
    assert_eq!(count(&conn, "user_account"), 1);

    // Errors from the closure are returned after the session closes.
    let err = factory
        .scope(|_| -> ormtour_core::Result<()> { Err(Error::Custom("boom".into())) })
        .unwrap_err();
    assert_eq!(err.to_string(), "boom");
    assert!(!conn.in_transaction());
}

#[test]
fn detached_instances_can_be_reattached() {
    let conn = setup();
    let factory = SessionFactory::new(conn, SessionConfig::default());
    let user = factory
        .scope(|session| {
            let user = Instance::new(User::new("sandy", "Sandy"));
            session.add(&user)?;
            session.commit()?;
            Ok(user)
        })
        .unwrap();

    // A session that loaded its own copy of the row refuses the old instance.
    let mut session = factory.open();
    let loaded = session.scalars(&select::<User>()).unwrap().one().unwrap();
    assert!(!loaded.ptr_eq(&user));
    let err = session.add(&user).unwrap_err();
    assert!(err.to_string().contains("already present"));
    session.close().unwrap();

    let mut again = factory.open();
    again.add(&user).unwrap();
    assert_eq!(user.state(), ObjectState::Persistent);
    let reloaded = again.scalars(&select::<User>()).unwrap().one().unwrap();
    assert!(reloaded.ptr_eq(&user));
    again.close().unwrap();
}

#[test]
fn objects_belong_to_one_session() {
    let conn = setup();
    let mut first = Session::new(Arc::clone(&conn));
    let mut second = Session::new(conn);
    let user = Instance::new(User::new("user1", "x"));

    first.add(&user).unwrap();
    first.add(&user).unwrap();
    assert_eq!(first.pending_count(), 1);
    assert!(second.add(&user).is_err());

    first.expunge(&user).unwrap();
    assert!(first.expunge(&user).is_err());
    second.add(&user).unwrap();
    assert!(second.contains(&user));
}

#[test]
fn dropping_a_session_rolls_back() {
    let conn = setup();
    let user = Instance::new(User::new("user1", "x"));
    {
        let mut session = Session::new(Arc::clone(&conn));
        session.add(&user).unwrap();
        session.flush().unwrap();
        assert!(conn.in_transaction());
    }
    assert!(!conn.in_transaction());
    assert_eq!(user.state(), ObjectState::Transient);
    assert_eq!(count(&conn, "user_account"), 0);
}

fn stored_names(conn: &Arc<dyn Connection>) -> Vec<String> {
    conn.query("SELECT name FROM user_account ORDER BY id", &[])
        .unwrap()
        .scalars()
        .unwrap()
}

#[test]
fn sessions_on_one_connection_do_not_share_a_transaction() {
    let conn = setup();
    let mut reader = Session::new(Arc::clone(&conn));
    reader.scalars(&select::<User>()).unwrap();
    assert!(reader.in_transaction());

    let mut writer = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("user1", "first"));
    writer.add(&user).unwrap();
    match writer.commit() {
        Err(Error::Transaction(e)) => assert_eq!(e.kind, TransactionErrorKind::AlreadyActive),
        other => panic!("expected the open transaction to block the commit, got {other:?}"),
    }
    assert_eq!(user.state(), ObjectState::Pending);
    assert!(user.read().id.is_none());
    assert!(!writer.needs_rollback());
    assert!(writer.scalars(&select::<User>()).is_err());

    // Closing the reader must not take the writer's rows with it.
    reader.close().unwrap();
    writer.commit().unwrap();
    assert_eq!(user.state(), ObjectState::Persistent);
    assert!(!conn.in_transaction());
    writer.close().unwrap();
    assert_eq!(count(&conn, "user_account"), 1);
    assert_eq!(user.state(), ObjectState::Detached);
    assert!(user.read().id.is_some());
}

#[test]
fn dropping_a_blocked_session_keeps_committed_rows() {
    let conn = setup();
    let mut owner = Session::new(Arc::clone(&conn));
    let kept = Instance::new(User::new("sandy", "Sandy"));
    owner.add(&kept).unwrap();
    owner.flush().unwrap();
    {
        let mut blocked = Session::new(Arc::clone(&conn));
        blocked.add(&Instance::new(User::new("gary", "Gary"))).unwrap();
        assert!(blocked.flush().is_err());
    }
    owner.commit().unwrap();
    assert_eq!(stored_names(&conn), vec!["sandy".to_string()]);
    assert_eq!(kept.state(), ObjectState::Persistent);
    owner.close().unwrap();
}

#[test]
fn edits_after_commit_are_flushed() {
    let conn = setup();
    let mut session = Session::new(Arc::clone(&conn));
    let user = Instance::new(User::new("before", "x"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    user.write().name = "after".into();
    assert_eq!(session.dirty_count(), 1);
    session.commit().unwrap();
    assert_eq!(stored_names(&conn), vec!["after".to_string()]);

    let id = user.read().id.unwrap();
    let again = session.get::<User>(id).unwrap().unwrap();
    assert!(again.ptr_eq(&user));
    assert_eq!(user.read().name, "after");
    session.close().unwrap();
}

#[test]
fn queries_without_autoflush_keep_unflushed_edits() {
    let conn = setup();
    let mut session = Session::with_config(
        Arc::clone(&conn),
        SessionConfig::default().autoflush(false),
    );
    let user = Instance::new(User::new("before", "x"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    user.write().name = "edited".into();
    let loaded = session.scalars(&select::<User>()).unwrap().one().unwrap();
    assert!(loaded.ptr_eq(&user));
    assert_eq!(user.read().name, "edited");
    assert_eq!(stored_names(&conn), vec!["before".to_string()]);

    session.commit().unwrap();
    assert_eq!(stored_names(&conn), vec!["edited".to_string()]);
    session.close().unwrap();
}

#[test]
fn refreshing_a_borrowed_instance_fails_instead_of_blocking() {
    let conn = setup();
    let mut session = Session::new(conn);
    let user = Instance::new(User::new("sandy", "Sandy"));
    session.add(&user).unwrap();
    session.commit().unwrap();

    // The read guard lives until the end of the statement.
    let err = session.get::<User>(user.read().id.unwrap()).unwrap_err();
    match err {
        Error::Session(e) => assert_eq!(e.kind, SessionErrorKind::InstanceLocked),
        other => panic!("unexpected error {other}"),
    }

    let id = user.read().id.unwrap();
    let again = session.get::<User>(id).unwrap().unwrap();
    assert!(again.ptr_eq(&user));
    session.close().unwrap();
}
