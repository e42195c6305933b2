use std::collections::BTreeMap;

use crate::error::Result;
use crate::schema::TableDef;
use crate::storage::Pager;

/// Schema storage for the whole database. Rather than a separate B-tree, the
/// catalog here is a plain JSON map kept inside page 0's `metadata.schemas`,
/// loaded wholesale on open and rewritten wholesale on every DDL statement.
/// Bootstrap only needs to read one page
/// before every table/index root is known.
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
}

impl Catalog {
    pub fn load(pager: &Pager) -> Result<Catalog> {
        let metadata = pager.metadata();
        let schemas = metadata
            .get("schemas")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let tables: BTreeMap<String, TableDef> = serde_json::from_value(schemas)?;
        Ok(Catalog { tables })
    }

    pub fn save(&self, pager: &mut Pager) -> Result<()> {
        let mut metadata = pager.metadata();
        let schemas = serde_json::to_value(&self.tables)?;
        metadata["schemas"] = schemas;
        pager.set_metadata(metadata)
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.get_mut(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn insert(&mut self, table: TableDef) {
        self.tables.insert(table.name.to_ascii_lowercase(), table);
    }

    pub fn remove(&mut self, name: &str) -> Option<TableDef> {
        self.tables.remove(&name.to_ascii_lowercase())
    }

    pub fn rename(&mut self, old: &str, new_name: &str) -> Option<()> {
        let mut table = self.tables.remove(&old.to_ascii_lowercase())?;
        table.name = new_name.to_string();
        self.tables.insert(new_name.to_ascii_lowercase(), table);
        Some(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name.clone()).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }
}
