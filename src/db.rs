use std::path::Path;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::sql::{execute, number_params, parse_sql, ExecResult};
use crate::storage::Pager;
use crate::types::Value;

/// The embedded database handle: owns the pager (and through it, the WAL)
/// and the in-memory catalog, and drives the explicit/auto-commit
/// transaction state machine described by spec §4.9.
pub struct Database {
    pager: Pager,
    catalog: Catalog,
    explicit_tx: bool,
}

impl Database {
    /// Opens the database file at `path`, creating it if absent. `Pager::open`
    /// already folds create-or-open together (it runs WAL recovery first),
    /// so this is the one entry point for both cases.
    pub fn open(path: impl AsRef<Path>) -> Result<Database> {
        let pager = Pager::open(path)?;
        let catalog = Catalog::load(&pager)?;
        Ok(Database { pager, catalog, explicit_tx: false })
    }

    /// Alias for `open`, kept for symmetry with `Pager::create`/`Pager::open`;
    /// there is no separate on-disk "create" format here, so this just calls
    /// `open`.
    pub fn create(path: impl AsRef<Path>) -> Result<Database> {
        Self::open(path)
    }

    /// Parses `sql`, binds `params` positionally, and runs it through the
    /// explicit/auto-commit transaction state machine.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let mut stmt = parse_sql(sql)?;
        let required = number_params(&mut stmt);
        if params.len() < required {
            return Err(Error::Execution("Not enough parameters".into()));
        }
        if params.len() > required {
            return Err(Error::Execution("Too many parameters".into()));
        }

        match &stmt {
            crate::sql::Statement::Begin => self.handle_begin(),
            crate::sql::Statement::Commit => self.handle_commit(),
            crate::sql::Statement::Rollback => self.handle_rollback(),
            _ => {
                if self.explicit_tx {
                    execute(&mut self.pager, &mut self.catalog, &stmt, params)
                } else {
                    self.pager.begin()?;
                    match execute(&mut self.pager, &mut self.catalog, &stmt, params) {
                        Ok(result) => {
                            self.pager.commit()?;
                            Ok(result)
                        }
                        Err(e) => {
                            self.pager.rollback();
                            self.catalog = Catalog::load(&self.pager)?;
                            Err(e)
                        }
                    }
                }
            }
        }
    }

    fn handle_begin(&mut self) -> Result<ExecResult> {
        if self.explicit_tx {
            return Err(Error::Transaction("Transaction already active".into()));
        }
        self.pager.begin()?;
        self.explicit_tx = true;
        Ok(ExecResult::Message("OK".into()))
    }

    fn handle_commit(&mut self) -> Result<ExecResult> {
        if !self.explicit_tx {
            return Err(Error::Transaction("No active transaction to COMMIT".into()));
        }
        self.pager.commit()?;
        self.explicit_tx = false;
        Ok(ExecResult::Message("OK".into()))
    }

    fn handle_rollback(&mut self) -> Result<ExecResult> {
        if !self.explicit_tx {
            return Err(Error::Transaction("No active transaction to ROLLBACK".into()));
        }
        self.pager.rollback();
        self.explicit_tx = false;
        self.catalog = Catalog::load(&self.pager)?;
        Ok(ExecResult::Message("OK".into()))
    }

    /// Flushes any buffered writes and drops the handle. An explicit
    /// transaction left open at close time is rolled back, matching the
    /// "caller's error" framing of leaving a transaction dangling.
    pub fn close(mut self) -> Result<()> {
        if self.explicit_tx {
            self.pager.rollback();
        }
        self.pager.flush()
    }

    /// Hashes `password` with argon2 and inserts a new row into `table`
    /// (`username`, `password_hash` columns), auto-assigning the next `id`
    /// when the table has an `INTEGER PRIMARY KEY` column named `id`.
    /// Grounded in `original_source/tinydb_engine/api.py::create_user`,
    /// reimplemented against this crate's `argon2` dependency instead of
    /// the original's hand-rolled PBKDF2.
    pub fn create_user(&mut self, username: &str, password: &str, table: &str) -> Result<ExecResult> {
        let clean_username = username.trim();
        if clean_username.is_empty() {
            return Err(Error::Execution("Username cannot be empty".into()));
        }
        if clean_username.contains('\'') {
            return Err(Error::Execution("Username cannot contain single quotes".into()));
        }

        let table_def = self
            .catalog
            .get(table)
            .ok_or_else(|| Error::Schema(format!("Unknown table: {table}")))?;
        let pk_cols = table_def.pk_columns();
        let hash = hash_password(password)?;

        if pk_cols.is_empty() {
            self.execute(
                &format!("INSERT INTO {table} (username, password_hash) VALUES (?, ?)"),
                &[Value::Text(clean_username.to_string()), Value::Text(hash)],
            )
        } else if pk_cols.len() == 1 && pk_cols[0].name.eq_ignore_ascii_case("id") {
            let rows = match self.execute(&format!("SELECT id FROM {table} ORDER BY id DESC LIMIT 1"), &[])? {
                ExecResult::Rows(rows) => rows,
                _ => Vec::new(),
            };
            let next_id = match rows.first().and_then(|r| r.get("id")) {
                Some(&Value::Integer(v)) => v + 1,
                _ => 1,
            };
            self.execute(
                &format!("INSERT INTO {table} (id, username, password_hash) VALUES (?, ?, ?)"),
                &[Value::Integer(next_id), Value::Text(clean_username.to_string()), Value::Text(hash)],
            )
        } else {
            Err(Error::Execution("create_user supports tables without PK or with INTEGER PRIMARY KEY id".into()))
        }
    }

    /// Looks up `username` in `table` and verifies `password` against the
    /// stored argon2 hash. Returns `false` for any lookup miss or hash
    /// mismatch rather than propagating an error, matching
    /// `original_source/tinydb_engine/api.py::authenticate_user`.
    pub fn authenticate_user(&mut self, username: &str, password: &str, table: &str) -> Result<bool> {
        let clean_username = username.trim();
        if clean_username.is_empty() || clean_username.contains('\'') {
            return Ok(false);
        }

        let rows = match self.execute(
            &format!("SELECT password_hash FROM {table} WHERE username = ? LIMIT 1"),
            &[Value::Text(clean_username.to_string())],
        )? {
            ExecResult::Rows(rows) => rows,
            _ => Vec::new(),
        };

        let Some(row) = rows.first() else { return Ok(false) };
        let Some(Value::Text(stored_hash)) = row.get("password_hash").cloned() else { return Ok(false) };
        Ok(verify_password(password, &stored_hash))
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Execution(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else { return false };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_db_path() -> std::path::PathBuf {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);
        path
    }

    #[test]
    fn auto_commit_persists_across_reopen() {
        let path = temp_db_path();
        {
            let mut db = Database::open(&path).unwrap();
            db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
            db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
        }
        let mut db = Database::open(&path).unwrap();
        match db.execute("SELECT name FROM users WHERE id = 1", &[]).unwrap() {
            ExecResult::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].get("name"), Some(&Value::Text("Alice".into())));
            }
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn explicit_rollback_discards_changes() {
        let path = temp_db_path();
        let mut db = Database::open(&path).unwrap();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
        db.execute("BEGIN", &[]).unwrap();
        db.execute("INSERT INTO users VALUES (1, 'Alice')", &[]).unwrap();
        db.execute("ROLLBACK", &[]).unwrap();
        match db.execute("SELECT * FROM users", &[]).unwrap() {
            ExecResult::Rows(rows) => assert_eq!(rows.len(), 0),
            _ => panic!("expected rows"),
        }
    }

    #[test]
    fn commit_while_idle_is_an_error() {
        let path = temp_db_path();
        let mut db = Database::open(&path).unwrap();
        let err = db.execute("COMMIT", &[]).unwrap_err();
        assert!(err.to_string().contains("No active transaction to COMMIT"));
    }

    #[test]
    fn begin_while_active_is_an_error() {
        let path = temp_db_path();
        let mut db = Database::open(&path).unwrap();
        db.execute("BEGIN", &[]).unwrap();
        let err = db.execute("BEGIN", &[]).unwrap_err();
        assert!(err.to_string().contains("Transaction already active"));
        db.execute("ROLLBACK", &[]).unwrap();
    }

    #[test]
    fn parameter_count_mismatch_is_rejected() {
        let path = temp_db_path();
        let mut db = Database::open(&path).unwrap();
        db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
        let err = db.execute("INSERT INTO users VALUES (?, ?)", &[Value::Integer(1)]).unwrap_err();
        assert!(err.to_string().contains("Not enough parameters"));
        let err = db
            .execute("INSERT INTO users VALUES (?, ?)", &[Value::Integer(1), Value::Text("a".into()), Value::Integer(2)])
            .unwrap_err();
        assert!(err.to_string().contains("Too many parameters"));
    }

    #[test]
    fn create_user_and_authenticate_round_trip() {
        let path = temp_db_path();
        let mut db = Database::open(&path).unwrap();
        db.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT UNIQUE, password_hash TEXT)",
            &[],
        )
        .unwrap();
        db.create_user("alice", "hunter2", "users").unwrap();
        assert!(db.authenticate_user("alice", "hunter2", "users").unwrap());
        assert!(!db.authenticate_user("alice", "wrong", "users").unwrap());
        assert!(!db.authenticate_user("bob", "hunter2", "users").unwrap());
    }
}
