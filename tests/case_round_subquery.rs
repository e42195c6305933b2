use tempfile::NamedTempFile;
use tinydb::sql::eval::Row;
use tinydb::sql::ExecResult;
use tinydb::types::Value;
use tinydb::Database;

fn temp_db_path() -> std::path::PathBuf {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    drop(tmp);
    path
}

fn rows(db: &mut Database, sql: &str) -> Vec<Row> {
    match db.execute(sql, &[]).unwrap() {
        ExecResult::Rows(rows) => rows,
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn searched_case_when() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 150.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 10.0)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT id, CASE WHEN amount > 100 THEN 'big' ELSE 'small' END AS size FROM orders ORDER BY id ASC",
    );
    assert_eq!(out[0].get("size"), Some(&Value::Text("big".into())));
    assert_eq!(out[1].get("size"), Some(&Value::Text("small".into())));
}

#[test]
fn simple_case_when_with_no_matching_branch_and_no_else_is_null() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 1)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 9)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT id, CASE customer_id WHEN 1 THEN 'first' END AS label FROM orders ORDER BY id ASC",
    );
    assert_eq!(out[0].get("label"), Some(&Value::Text("first".into())));
    assert_eq!(out[1].get("label"), Some(&Value::Null));
}

#[test]
fn round_with_and_without_digits() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 12.3456)", &[]).unwrap();

    let out = rows(&mut db, "SELECT ROUND(amount, 2) AS r2, ROUND(amount) AS r0 FROM orders");
    assert_eq!(out[0].get("r2"), Some(&Value::Real(12.35)));
    assert_eq!(out[0].get("r0"), Some(&Value::Real(12.0)));
}

#[test]
fn round_applied_after_avg() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 1, 10.111)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 1, 10.222)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT customer_id, ROUND(AVG(amount), 2) AS avg_amt FROM orders GROUP BY customer_id",
    );
    assert_eq!(out[0].get("avg_amt"), Some(&Value::Real(10.17)));
}

#[test]
fn count_case_when_counts_matching_rows() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 150.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 10.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (3, 200.0)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT COUNT(CASE WHEN amount > 100 THEN 1 END) AS big_count FROM orders",
    );
    assert_eq!(out[0].get("big_count"), Some(&Value::Integer(2)));
}

#[test]
fn in_subquery_and_not_in_subquery() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (1, 'Alice')", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (2, 'Bob')", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 1, 80.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 2, 5.0)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT name FROM customers WHERE id IN (SELECT customer_id FROM orders WHERE amount > 50) ORDER BY name ASC",
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("name"), Some(&Value::Text("Alice".into())));

    let out = rows(
        &mut db,
        "SELECT name FROM customers WHERE id NOT IN (SELECT customer_id FROM orders WHERE amount > 50) ORDER BY name ASC",
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("name"), Some(&Value::Text("Bob".into())));
}

#[test]
fn scalar_equality_subquery() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER)", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (1, 'Alice')", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (2, 'Bob')", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 2)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT name FROM customers WHERE id = (SELECT customer_id FROM orders WHERE id = 1)",
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("name"), Some(&Value::Text("Bob".into())));
}

#[test]
fn correlated_scalar_subquery_in_having() {
    let path = temp_db_path();
    let mut db = Database::open(&path).unwrap();
    db.execute("CREATE TABLE customers (id INTEGER PRIMARY KEY, min_spend REAL)", &[]).unwrap();
    db.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, amount REAL)", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (1, 50.0)", &[]).unwrap();
    db.execute("INSERT INTO customers VALUES (2, 1000.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (1, 1, 30.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (2, 1, 50.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (3, 2, 40.0)", &[]).unwrap();
    db.execute("INSERT INTO orders VALUES (4, 2, 40.0)", &[]).unwrap();

    let out = rows(
        &mut db,
        "SELECT customer_id, SUM(amount) AS total FROM orders GROUP BY customer_id \
         HAVING total > (SELECT min_spend FROM customers WHERE id = customer_id)",
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].get("customer_id"), Some(&Value::Integer(1)));
}
