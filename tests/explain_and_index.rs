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

fn plan(db: &mut Database, sql: &str) -> String {
    match db.execute(sql, &[]).unwrap() {
        ExecResult::Rows(rows) => {
            assert_eq!(rows.len(), 1, "EXPLAIN should return exactly one row");
            match rows[0].get("plan") {
                Some(Value::Text(label)) => label.clone(),
                other => panic!("expected a text `plan` column, got {other:?}"),
            }
        }
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn explain_picks_pk_lookup_over_full_scan() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    assert_eq!(plan(&mut db, "EXPLAIN SELECT * FROM users WHERE id = 1"), "PK INDEX LOOKUP");
    assert_eq!(plan(&mut db, "EXPLAIN SELECT * FROM users"), "FULL TABLE SCAN");
}

#[test]
fn explain_picks_secondary_index_lookup_after_create_index() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)", &[]).unwrap();
    db.execute("CREATE INDEX idx_email ON users (email)", &[]).unwrap();
    assert_eq!(
        plan(&mut db, "EXPLAIN SELECT * FROM users WHERE email = 'a@x'"),
        "SECONDARY INDEX LOOKUP"
    );
}

#[test]
fn secondary_index_stays_consistent_after_update() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)", &[]).unwrap();
    db.execute("CREATE INDEX idx_email ON users (email)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (1, 'old@x')", &[]).unwrap();
    db.execute("UPDATE users SET email='new@x' WHERE id=1", &[]).unwrap();

    let rows = match db.execute("SELECT id FROM users WHERE email='new@x'", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));

    let rows = match db.execute("SELECT id FROM users WHERE email='old@x'", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 0);
}
