use tempfile::NamedTempFile;
use tinydb::Database;

fn temp_db_path() -> std::path::PathBuf {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    path
}

#[test]
fn add_column_rejects_not_null() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
    let err = db.execute("ALTER TABLE users ADD COLUMN test INTEGER NOT NULL", &[]).unwrap_err();
    assert!(err.to_string().contains("does not support NOT NULL"));
}

#[test]
fn remove_column_requires_last_column() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", &[]).unwrap();
    db.execute("ALTER TABLE users ADD COLUMN test INTEGER", &[]).unwrap();
    let err = db.execute("ALTER TABLE users REMOVE COLUMN name", &[]).unwrap_err();
    assert!(err.to_string().contains("supports only the last column"));
    // The last column is still droppable.
    db.execute("ALTER TABLE users REMOVE COLUMN test", &[]).unwrap();
}

#[test]
fn remove_column_rejects_primary_key() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (name TEXT, id INTEGER PRIMARY KEY)", &[]).unwrap();
    let err = db.execute("ALTER TABLE users REMOVE COLUMN id", &[]).unwrap_err();
    assert!(err.to_string().contains("primary key"));
}

#[test]
fn remove_column_rejects_indexed_column() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)", &[]).unwrap();
    db.execute("CREATE INDEX idx_email ON users (email)", &[]).unwrap();
    let err = db.execute("ALTER TABLE users REMOVE COLUMN email", &[]).unwrap_err();
    assert!(err.to_string().contains("index"));
}

#[test]
fn rename_table_rejects_existing_name() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY)", &[]).unwrap();
    db.execute("CREATE TABLE accounts (id INTEGER PRIMARY KEY)", &[]).unwrap();
    let err = db.execute("ALTER TABLE users RENAME TO accounts", &[]).unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn rename_column_rejects_existing_name() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, nickname TEXT)", &[]).unwrap();
    let err = db.execute("ALTER TABLE users RENAME COLUMN name TO nickname", &[]).unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn rename_indexed_column_keeps_index_usable() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)", &[]).unwrap();
    db.execute("CREATE INDEX idx_email ON users (email)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'a@x')", &[]).unwrap();

    db.execute("ALTER TABLE users RENAME COLUMN email TO email_address", &[]).unwrap();

    // The index metadata must track the rename, or inserting again would
    // fail trying to resolve the old column name.
    db.execute("INSERT INTO users VALUES (2, 'b@x')", &[]).unwrap();
    match db.execute("SELECT id FROM users WHERE email_address = 'b@x'", &[]).unwrap() {
        tinydb::sql::ExecResult::Rows(rows) => assert_eq!(rows.len(), 1),
        other => panic!("expected rows, got {other:?}"),
    }
}
