//! tinydb: an embedded single-file relational SQL storage engine.
//!
//! A single-file database with:
//! - WAL-based crash recovery (redo-only)
//! - B-tree based storage with PRIMARY KEY and UNIQUE indexes
//! - A small hand-written SQL dialect (SELECT/INSERT/UPDATE/DELETE, joins,
//!   GROUP BY/aggregates, constraint enforcement)
//! - Single-writer concurrency with explicit and auto-commit transactions

pub mod btree;
pub mod catalog;
pub mod db;
pub mod error;
pub mod row;
pub mod schema;
pub mod sql;
pub mod storage;
pub mod types;
pub mod wal;

pub use db::Database;
pub use error::{Error, Result};
