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
fn full_crud_cycle() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();

    db.execute(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score REAL, active BOOLEAN)",
        &[],
    )
    .unwrap();

    db.execute("INSERT INTO users VALUES (1, 'Alice', 9.5, TRUE)", &[]).unwrap();
    db.execute("INSERT INTO users VALUES (2, 'Bob', 7.0, FALSE)", &[]).unwrap();

    let rows = match db.execute("SELECT * FROM users ORDER BY id ASC", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));
    assert_eq!(rows[0].get("name"), Some(&Value::Text("Alice".into())));
    assert_eq!(rows[1].get("id"), Some(&Value::Integer(2)));

    match db.execute("UPDATE users SET score=8.2 WHERE id=2", &[]).unwrap() {
        ExecResult::RowsAffected(n) => assert_eq!(n, 1),
        other => panic!("expected affected count, got {other:?}"),
    }
    let rows = match db.execute("SELECT score FROM users WHERE id=2", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows[0].get("score"), Some(&Value::Real(8.2)));

    match db.execute("DELETE FROM users WHERE id=1", &[]).unwrap() {
        ExecResult::RowsAffected(n) => assert_eq!(n, 1),
        other => panic!("expected affected count, got {other:?}"),
    }
    let rows = match db.execute("SELECT * FROM users", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::Text("Bob".into())));
}

#[test]
fn composite_primary_key_rejects_duplicate_tuple_but_allows_partial_overlap() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();

    db.execute(
        "CREATE TABLE enrollments (student_id INTEGER, course_id INTEGER, grade TEXT, PRIMARY KEY (student_id, course_id))",
        &[],
    )
    .unwrap();

    db.execute("INSERT INTO enrollments VALUES (1, 100, 'A')", &[]).unwrap();
    db.execute("INSERT INTO enrollments VALUES (1, 200, 'B')", &[]).unwrap();
    db.execute("INSERT INTO enrollments VALUES (2, 100, 'C')", &[]).unwrap();

    let err = db.execute("INSERT INTO enrollments VALUES (1, 100, 'Z')", &[]).unwrap_err();
    assert!(err.to_string().contains("Duplicate primary key"));

    let rows = match db.execute("SELECT grade FROM enrollments WHERE student_id = 1 AND course_id = 200", &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("grade"), Some(&Value::Text("B".into())));
}
