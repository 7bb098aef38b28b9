//! File-backed SQLite behavior that in-memory tests cannot show.

use ormtour_core::{Connection, Value};
use ormtour_sqlite::{OpenFlags, SqliteConfig, SqliteConnection};

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tour.db");
    let path = path.to_str().unwrap();

    {
        let conn = SqliteConnection::open_file(path).unwrap();
        conn.execute_script(
            "CREATE TABLE user_account (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO user_account (name) VALUES (?1), (?2)",
            &[Value::from("sandy"), Value::from("gary")],
        )
        .unwrap();
    }

    let conn = SqliteConnection::open_file(path).unwrap();
    let rows = conn
        .query("SELECT name FROM user_account ORDER BY id", &[])
        .unwrap();
    assert_eq!(
        rows.scalars::<String>().unwrap(),
        vec!["sandy".to_string(), "gary".to_string()]
    );
}

#[test]
fn read_only_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ro.db");
    let path = path.to_str().unwrap();

    SqliteConnection::open_file(path)
        .unwrap()
        .execute_script("CREATE TABLE t (x INTEGER)")
        .unwrap();

    let ro = SqliteConnection::open(&SqliteConfig::file(path).flags(OpenFlags::read_only())).unwrap();
    assert!(ro.execute("INSERT INTO t (x) VALUES (1)", &[]).is_err());
    assert_eq!(
        ro.query("SELECT COUNT(*) FROM t", &[]).unwrap().scalars::<i64>().unwrap(),
        vec![0]
    );
}

#[test]
fn uncommitted_work_is_not_visible_after_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tx.db");
    let path = path.to_str().unwrap();

    {
        let conn = SqliteConnection::open_file(path).unwrap();
        conn.execute_script("CREATE TABLE t (x INTEGER)").unwrap();
        conn.begin().unwrap();
        conn.execute("INSERT INTO t (x) VALUES (?1)", &[Value::BigInt(1)])
            .unwrap();
    }

    let conn = SqliteConnection::open_file(path).unwrap();
    let count = conn.query("SELECT COUNT(*) FROM t", &[]).unwrap();
    assert_eq!(count.scalars::<i64>().unwrap(), vec![0]);
}
