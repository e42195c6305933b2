use tempfile::NamedTempFile;
use tinydb::Database;

fn temp_db_path() -> std::path::PathBuf {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    path
}

#[test]
fn duplicate_primary_key_is_rejected() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    let err = db.execute("INSERT INTO users VALUES (1, 'Eve')", &[]).unwrap_err();
    assert!(err.to_string().contains("Duplicate primary key"));
}

#[test]
fn not_null_is_enforced() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[]).unwrap();
    let err = db.execute("INSERT INTO users (id, name) VALUES (2, NULL)", &[]).unwrap_err();
    assert!(err.to_string().contains("cannot be NULL"));
}

#[test]
fn unique_constraint_is_enforced() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'a@x')", &[]).unwrap();
    let err = db.execute("INSERT INTO users VALUES (2, 'a@x')", &[]).unwrap_err();
    assert!(err.to_string().contains("UNIQUE constraint failed"));
}

#[test]
fn check_constraint_rejects_falsy_rows() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance INTEGER CHECK (balance >= 0))", &[]).unwrap();
    db.execute("INSERT INTO accounts VALUES (1, 10)", &[]).unwrap();
    let err = db.execute("INSERT INTO accounts VALUES (2, -5)", &[]).unwrap_err();
    assert!(err.to_string().contains("CHECK constraint failed"));
}

#[test]
fn table_level_check_constraint_is_enforced() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute(
        "CREATE TABLE ranges (lo INTEGER, hi INTEGER, CHECK (lo <= hi))",
        &[],
    )
    .unwrap();
    db.execute("INSERT INTO ranges (lo, hi) VALUES (1, 5)", &[]).unwrap();
    let err = db.execute("INSERT INTO ranges (lo, hi) VALUES (5, 1)", &[]).unwrap_err();
    assert!(err.to_string().contains("CHECK constraint failed"));
}

#[test]
fn foreign_key_cascade_deletes_children() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    db.execute(
        "CREATE TABLE games (id INTEGER PRIMARY KEY, user_id INTEGER, FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE)",
        &[],
    )
    .unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (2, 'Bob')", &[]).unwrap();
    db.execute("INSERT INTO games VALUES (10, 1)", &[]).unwrap();
    db.execute("INSERT INTO games VALUES (11, 1)", &[]).unwrap();
    db.execute("INSERT INTO games VALUES (12, 2)", &[]).unwrap();

    match db.execute("DELETE FROM users WHERE id=1", &[]).unwrap() {
        tinydb::sql::ExecResult::RowsAffected(n) => assert_eq!(n, 1),
        other => panic!("expected affected count, got {other:?}"),
    }

    let rows = match db.execute("SELECT id, user_id FROM games", &[]).unwrap() {
        tinydb::sql::ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&tinydb::types::Value::Integer(12)));
}

#[test]
fn foreign_key_restrict_blocks_delete() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    db.execute(
        "CREATE TABLE games (id INTEGER PRIMARY KEY, user_id INTEGER, FOREIGN KEY (user_id) REFERENCES users(id))",
        &[],
    )
    .unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    db.execute("INSERT INTO games VALUES (10, 1)", &[]).unwrap();

    let err = db.execute("DELETE FROM users WHERE id=1", &[]).unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY constraint failed"));
}

#[test]
fn foreign_key_insert_requires_existing_parent() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", &[]).unwrap();
    db.execute(
        "CREATE TABLE games (id INTEGER PRIMARY KEY, user_id INTEGER, FOREIGN KEY (user_id) REFERENCES users(id))",
        &[],
    )
    .unwrap();
    let err = db.execute("INSERT INTO games VALUES (1, 99)", &[]).unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY constraint failed"));
}

#[test]
fn foreign_key_can_reference_a_non_primary_key_column() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE)", &[]).unwrap();
    db.execute(
        "CREATE TABLE games (id INTEGER PRIMARY KEY, owner_email TEXT, FOREIGN KEY (owner_email) REFERENCES users(email) ON DELETE CASCADE)",
        &[],
    )
    .unwrap();
    db.execute("INSERT INTO users VALUES (1, 'a@x')", &[]).unwrap();

    // The referenced column is `email`, not `id`: an insert that only
    // matches the parent's PK but not its `email` must still fail.
    let err = db.execute("INSERT INTO games VALUES (10, 'missing@x')", &[]).unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY constraint failed"));

    db.execute("INSERT INTO games VALUES (11, 'a@x')", &[]).unwrap();

    match db.execute("DELETE FROM users WHERE id=1", &[]).unwrap() {
        tinydb::sql::ExecResult::RowsAffected(n) => assert_eq!(n, 1),
        other => panic!("expected affected count, got {other:?}"),
    }
    let rows = match db.execute("SELECT id FROM games", &[]).unwrap() {
        tinydb::sql::ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 0, "cascade delete should follow the email column, not the PK");
}
