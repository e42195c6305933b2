use tempfile::NamedTempFile;
use tinydb::sql::ExecResult;
use tinydb::types::Value;
use tinydb::Database;

fn temp_db_path() -> std::path::PathBuf {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    path
}

#[test]
fn begin_insert_rollback_leaves_table_empty() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();

    db.execute("BEGIN", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    db.execute("ROLLBACK", &[]).unwrap();

    match db.execute("SELECT * FROM users", &[]).unwrap() {
        ExecResult::Rows(rows) => assert_eq!(rows.len(), 0),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn begin_insert_commit_persists_across_reopen() {
    let path = temp_db_path();
    {
        let mut db = Database::open(&path).unwrap();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
        db.execute("BEGIN", &[]).unwrap();
        db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
        db.execute("INSERT INTO users VALUES (2, 'Bob')", &[]).unwrap();
        db.execute("COMMIT", &[]).unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    match db.execute("SELECT * FROM users", &[]).unwrap() {
        ExecResult::Rows(rows) => assert_eq!(rows.len(), 2),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn parameterized_insert_handles_quote_containing_text() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[]).unwrap();

    db.execute(
        "INSERT INTO notes VALUES (?, ?)",
        &[Value::Integer(1), Value::Text("it's a trap".into())],
    )
    .unwrap();

    let rows = match db
        .execute("SELECT body FROM notes WHERE id = ?", &[Value::Integer(1)])
        .unwrap()
    {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows[0].get("body"), Some(&Value::Text("it's a trap".into())));
}

#[test]
fn commit_without_begin_is_rejected() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    let err = db.execute("COMMIT", &[]).unwrap_err();
    assert!(err.to_string().contains("No active transaction to COMMIT"));
}

#[test]
fn nested_begin_is_rejected() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("BEGIN", &[]).unwrap();
    let err = db.execute("BEGIN", &[]).unwrap_err();
    assert!(err.to_string().contains("Transaction already active"));
    db.execute("ROLLBACK", &[]).unwrap();
}

#[test]
fn a_failed_statement_inside_an_explicit_transaction_does_not_auto_rollback() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();

    db.execute("BEGIN", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    let _ = db.execute("INSERT INTO users VALUES (1, 'Duplicate')", &[]);
    db.execute("COMMIT", &[]).unwrap();

    match db.execute("SELECT * FROM users", &[]).unwrap() {
        ExecResult::Rows(rows) => assert_eq!(rows.len(), 1),
        other => panic!("expected rows, got {other:?}"),
    }
}
