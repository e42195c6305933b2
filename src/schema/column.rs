use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DataType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DefaultValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForeignKeyAction {
    Restrict,
    Cascade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: ForeignKeyAction,
}

/// A column definition, built with a chainable builder. The catalog stores
/// these directly as JSON inside page 0, so every field here derives
/// `Serialize`/`Deserialize` rather than going through a hand-rolled binary
/// tag table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub default: Option<DefaultValue>,
    pub check: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            data_type,
            primary_key: false,
            not_null: false,
            unique: false,
            auto_increment: false,
            default: None,
            check: None,
        }
    }

    pub fn primary_key(mut self) -> ColumnDef {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    pub fn not_null(mut self) -> ColumnDef {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> ColumnDef {
        self.unique = true;
        self
    }

    pub fn with_auto_increment(mut self) -> ColumnDef {
        self.auto_increment = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> ColumnDef {
        self.default = Some(default);
        self
    }

    pub fn with_check(mut self, expr: impl Into<String>) -> ColumnDef {
        self.check = Some(expr.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub root_page_id: u64,
}

/// Table metadata as stored in page 0's `metadata.schemas`. `data_root` is
/// the root page of the table's row-id B-tree (keyed by synthetic row id
/// unless an INTEGER PRIMARY KEY column acts as the key directly);
/// `pk_index_root` is the B-tree that enforces primary-key uniqueness and
/// serves PK lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub pk_index_root: u64,
    pub next_row_id: u64,
    pub foreign_keys: Vec<ForeignKeyDef>,
    pub indexes: Vec<IndexDef>,
    /// Table-level `CHECK (...)` clauses, stored as re-parseable SQL text
    /// the same way a column's inline `CHECK` is (see `ColumnDef::check`).
    #[serde(default)]
    pub check_exprs: Vec<String>,
}

impl TableDef {
    pub fn pk_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Schema(format!("Unknown column '{name}'")))
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn index_on(&self, column: &str) -> Option<&IndexDef> {
        self.indexes
            .iter()
            .find(|idx| idx.columns.len() == 1 && idx.columns[0].eq_ignore_ascii_case(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_flags() {
        let col = ColumnDef::new("id", DataType::Integer)
            .primary_key()
            .with_auto_increment();
        assert!(col.primary_key);
        assert!(col.not_null);
        assert!(col.auto_increment);
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let table = TableDef {
            name: "t".into(),
            columns: vec![ColumnDef::new("Name", DataType::Text)],
            pk_index_root: 0,
            next_row_id: 1,
            foreign_keys: vec![],
            indexes: vec![],
            check_exprs: vec![],
        };
        assert_eq!(table.column_index("name").unwrap(), 0);
        assert!(table.column_index("missing").is_err());
    }
}
