use serde_json::Value as Json;

use crate::btree::BTree;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::row::{decode_row, encode_row};
use crate::schema::{ColumnDef, DefaultValue, ForeignKeyAction, ForeignKeyDef, IndexDef, TableDef};
use crate::storage::{Pager, SlottedPage};
use crate::types::Value;

use super::ast::*;
use super::eval::{compare_values, eval_expr, truthy, values_equal, Row};
use super::planner::{plan_select, Plan};

#[derive(Debug, Clone)]
pub enum ExecResult {
    Rows(Vec<Row>),
    RowsAffected(u64),
    Message(String),
}

type Location = (u64, u16);

/// Top-level dispatch. `params` are the already-bound positional `?`
/// parameters; the caller (the facade in `db.rs`) is responsible for
/// parsing the SQL text and assigning param indices before this is called.
pub fn execute(pager: &mut Pager, catalog: &mut Catalog, stmt: &Statement, params: &[Value]) -> Result<ExecResult> {
    match stmt {
        Statement::CreateTable(spec) => exec_create_table(pager, catalog, spec),
        Statement::DropTable { table_name, if_exists } => exec_drop_table(catalog, table_name, *if_exists),
        Statement::CreateIndex(spec) => exec_create_index(pager, catalog, spec),
        Statement::DropIndex { index_name, if_exists } => exec_drop_index(catalog, index_name, *if_exists),
        Statement::AlterTableRename { table_name, new_name } => exec_alter_rename(catalog, table_name, new_name),
        Statement::AlterTableRenameColumn { table_name, old_name, new_name } => {
            exec_alter_rename_column(catalog, table_name, old_name, new_name)
        }
        Statement::AlterTableAddColumn { table_name, column } => exec_alter_add_column(catalog, table_name, column),
        Statement::AlterTableRemoveColumn { table_name, column_name } => {
            exec_alter_remove_column(catalog, table_name, column_name)
        }
        Statement::Insert(ins) => exec_insert(pager, catalog, ins, params),
        Statement::Select(select) => exec_select(pager, catalog, select, params).map(ExecResult::Rows),
        Statement::Update(upd) => exec_update(pager, catalog, upd, params),
        Statement::Delete(del) => exec_delete(pager, catalog, del, params),
        Statement::Reindex { index_name } => exec_reindex(pager, catalog, index_name),
        Statement::Explain { stmt } => exec_explain(catalog, stmt, false),
        Statement::Profile { stmt } => exec_profile(pager, catalog, stmt, params),
        Statement::ShowTables => Ok(ExecResult::Rows(
            catalog
                .table_names()
                .into_iter()
                .map(|name| {
                    let mut row = Row::default();
                    row.push("table_name", Value::Text(name));
                    row
                })
                .collect(),
        )),
        Statement::ShowIndexes { table_name } => exec_show_indexes(catalog, table_name.as_deref()),
        Statement::ShowStats => exec_show_stats(pager, catalog),
        Statement::Describe { table_name } => exec_describe(catalog, table_name),
        Statement::Begin | Statement::Commit | Statement::Rollback => {
            // Handled by the facade's transaction state machine before reaching here.
            Ok(ExecResult::Message("OK".into()))
        }
    }
}

fn table_or_err<'a>(catalog: &'a Catalog, name: &str) -> Result<&'a TableDef> {
    catalog.get(name).ok_or_else(|| Error::Schema(format!("Unknown table: {name}")))
}

// ---------------------------------------------------------------- DDL ----

fn exec_create_table(pager: &mut Pager, catalog: &mut Catalog, spec: &CreateTable) -> Result<ExecResult> {
    if catalog.contains(&spec.table_name) {
        if spec.if_not_exists {
            return Ok(ExecResult::Message("OK".into()));
        }
        return Err(Error::Schema(format!("Table '{}' already exists", spec.table_name)));
    }

    let mut columns = Vec::new();
    for c in &spec.columns {
        let mut col = ColumnDef::new(&c.name, c.data_type);
        if c.primary_key {
            col = col.primary_key();
        }
        if c.not_null {
            col = col.not_null();
        }
        if c.unique {
            col = col.unique();
        }
        if c.auto_increment {
            col = col.with_auto_increment();
        }
        if let Some(default_expr) = &c.default {
            col = col.with_default(literal_default(default_expr)?);
        }
        if let Some(check) = &c.check {
            col = col.with_check(expr_to_sql(check));
        }
        columns.push(col);
    }

    let foreign_keys: Vec<ForeignKeyDef> = spec
        .foreign_keys
        .iter()
        .map(|fk| ForeignKeyDef {
            column: fk.column.clone(),
            ref_table: fk.ref_table.clone(),
            ref_column: fk.ref_column.clone(),
            on_delete: if fk.cascade { ForeignKeyAction::Cascade } else { ForeignKeyAction::Restrict },
        })
        .collect();

    let pk_index_root = BTree::create(pager, true)?.root_page_id();

    let check_exprs: Vec<String> = spec.table_checks.iter().map(expr_to_sql).collect();

    let mut table = TableDef {
        name: spec.table_name.clone(),
        columns,
        pk_index_root,
        next_row_id: 1,
        foreign_keys,
        indexes: Vec::new(),
        check_exprs,
    };

    // Auto-create a unique index for every UNIQUE (non-PK) column, the way
    // CREATE TABLE cascades into index creation for declared uniqueness.
    let unique_cols: Vec<String> = table
        .columns
        .iter()
        .filter(|c| c.unique && !c.primary_key)
        .map(|c| c.name.clone())
        .collect();
    for col_name in unique_cols {
        let root = BTree::create(pager, true)?.root_page_id();
        table.indexes.push(IndexDef {
            name: format!("auto_unique_{}_{}", table.name, col_name),
            table: table.name.clone(),
            columns: vec![col_name],
            unique: true,
            root_page_id: root,
        });
    }

    catalog.insert(table);
    catalog.save(pager)?;
    Ok(ExecResult::Message("OK".into()))
}

fn literal_default(expr: &Expr) -> Result<DefaultValue> {
    match expr {
        Expr::IntLiteral(v) => Ok(DefaultValue::Integer(*v)),
        Expr::RealLiteral(v) => Ok(DefaultValue::Real(*v)),
        Expr::StringLiteral(v) => Ok(DefaultValue::Text(v.clone())),
        Expr::BoolLiteral(v) => Ok(DefaultValue::Boolean(*v)),
        Expr::Null => Ok(DefaultValue::Null),
        other => Err(Error::Schema(format!("unsupported DEFAULT expression: {other:?}"))),
    }
}

fn exec_drop_table(catalog: &mut Catalog, table_name: &str, if_exists: bool) -> Result<ExecResult> {
    if catalog.remove(table_name).is_none() && !if_exists {
        return Err(Error::Schema(format!("Unknown table: {table_name}")));
    }
    Ok(ExecResult::Message("OK".into()))
}

fn exec_create_index(pager: &mut Pager, catalog: &mut Catalog, spec: &CreateIndex) -> Result<ExecResult> {
    if table_or_err(catalog, &spec.table_name)?
        .indexes
        .iter()
        .any(|i| i.name.eq_ignore_ascii_case(&spec.index_name))
    {
        if spec.if_not_exists {
            return Ok(ExecResult::Message("OK".into()));
        }
        return Err(Error::Schema(format!("Index '{}' already exists", spec.index_name)));
    }

    let table = table_or_err(catalog, &spec.table_name)?.clone();
    for col in &spec.columns {
        table.column_index(col)?;
    }

    let root = BTree::create(pager, spec.unique)?.root_page_id();
    let mut btree = BTree::open(root, spec.unique);

    // Scan existing rows and build the index's posting lists up front.
    let pk_tree = BTree::open(table.pk_index_root, true);
    for (_, posting) in pk_tree.scan(pager)? {
        let (page_id, slot) = location_from_json(&posting)?;
        let page = SlottedPage::from_bytes(&pager.read_page(page_id)?)?;
        let Some(blob) = page.get(slot) else { continue };
        let values = decode_row(blob, &table.columns)?;
        let key = index_key(&table, &spec.columns, &values)?;
        btree.insert(pager, key, Json::from(vec![page_id as i64, slot as i64]))?;
    }

    let table = catalog.get_mut(&spec.table_name).unwrap();
    table.indexes.push(IndexDef {
        name: spec.index_name.clone(),
        table: spec.table_name.clone(),
        columns: spec.columns.clone(),
        unique: spec.unique,
        root_page_id: root,
    });
    catalog.save(pager)?;
    Ok(ExecResult::Message("OK".into()))
}

fn exec_drop_index(catalog: &mut Catalog, index_name: &str, if_exists: bool) -> Result<ExecResult> {
    let mut found = false;
    for table in catalog.table_names() {
        if let Some(def) = catalog.get_mut(&table) {
            let before = def.indexes.len();
            def.indexes.retain(|i| !i.name.eq_ignore_ascii_case(index_name));
            if def.indexes.len() != before {
                found = true;
            }
        }
    }
    if !found && !if_exists {
        return Err(Error::Schema(format!("Unknown index: {index_name}")));
    }
    Ok(ExecResult::Message("OK".into()))
}

fn exec_alter_rename(catalog: &mut Catalog, table_name: &str, new_name: &str) -> Result<ExecResult> {
    table_or_err(catalog, table_name)?;
    if catalog.contains(new_name) {
        return Err(Error::Schema(format!("Table '{new_name}' already exists")));
    }
    catalog.rename(table_name, new_name);
    Ok(ExecResult::Message("OK".into()))
}

fn exec_alter_rename_column(catalog: &mut Catalog, table_name: &str, old_name: &str, new_name: &str) -> Result<ExecResult> {
    let table = catalog.get_mut(table_name).ok_or_else(|| Error::Schema(format!("Unknown table: {table_name}")))?;
    let idx = table.column_index(old_name)?;
    if table.column_index(new_name).is_ok() {
        return Err(Error::Schema(format!("Column '{new_name}' already exists")));
    }
    table.columns[idx].name = new_name.to_string();
    for idx_def in &mut table.indexes {
        for col in &mut idx_def.columns {
            if col.eq_ignore_ascii_case(old_name) {
                *col = new_name.to_string();
            }
        }
    }
    Ok(ExecResult::Message("OK".into()))
}

/// Appends the new column to the end of the column list. Existing row
/// blobs are never rewritten; `decode_row` pads short rows with the new
/// column's default the next time they are read. Spec requires the added
/// column to be nullable, since a NOT NULL column can never be backfilled
/// without rewriting every existing row.
fn exec_alter_add_column(catalog: &mut Catalog, table_name: &str, column: &ColumnSpec) -> Result<ExecResult> {
    if column.not_null {
        return Err(Error::Schema("ADD COLUMN does not support NOT NULL".into()));
    }
    let table = catalog.get_mut(table_name).ok_or_else(|| Error::Schema(format!("Unknown table: {table_name}")))?;
    let mut col = ColumnDef::new(&column.name, column.data_type);
    if column.unique {
        col = col.unique();
    }
    if let Some(default_expr) = &column.default {
        col = col.with_default(literal_default(default_expr)?);
    }
    if let Some(check) = &column.check {
        col = col.with_check(expr_to_sql(check));
    }
    table.columns.push(col);
    Ok(ExecResult::Message("OK".into()))
}

/// Removes the column from the schema. Existing row blobs keep the
/// trailing field on disk; `decode_row` simply stops reading once it has
/// filled the (now shorter) column list, which is only lossless when the
/// dropped column was the last one in declaration order, so anything else
/// is rejected outright.
fn exec_alter_remove_column(catalog: &mut Catalog, table_name: &str, column_name: &str) -> Result<ExecResult> {
    let table = catalog.get_mut(table_name).ok_or_else(|| Error::Schema(format!("Unknown table: {table_name}")))?;
    let idx = table.column_index(column_name)?;
    if idx != table.columns.len() - 1 {
        return Err(Error::Schema("ALTER TABLE DROP COLUMN supports only the last column".into()));
    }
    if table.columns[idx].primary_key {
        return Err(Error::Schema(format!("Cannot drop primary key column '{column_name}'")));
    }
    if table.indexes.iter().any(|i| i.columns.iter().any(|c| c.eq_ignore_ascii_case(column_name))) {
        return Err(Error::Schema(format!("Cannot drop column '{column_name}': referenced by an index")));
    }
    table.columns.remove(idx);
    Ok(ExecResult::Message("OK".into()))
}

fn exec_reindex(pager: &mut Pager, catalog: &mut Catalog, index_name: &str) -> Result<ExecResult> {
    let table_name = catalog
        .tables()
        .find(|t| t.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(index_name)))
        .map(|t| t.name.clone())
        .ok_or_else(|| Error::Schema(format!("Unknown index: {index_name}")))?;

    let table = catalog.get(&table_name).unwrap().clone();
    let index_def = table.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(index_name)).unwrap().clone();

    let new_root = BTree::create(pager, index_def.unique)?.root_page_id();
    let mut btree = BTree::open(new_root, index_def.unique);

    let pk_tree = BTree::open(table.pk_index_root, true);
    for (_, posting) in pk_tree.scan(pager)? {
        let (page_id, slot) = location_from_json(&posting)?;
        let page = SlottedPage::from_bytes(&pager.read_page(page_id)?)?;
        let Some(blob) = page.get(slot) else { continue };
        let values = decode_row(blob, &table.columns)?;
        let key = index_key(&table, &index_def.columns, &values)?;
        btree.insert(pager, key, Json::from(vec![page_id as i64, slot as i64]))?;
    }

    let table = catalog.get_mut(&table_name).unwrap();
    for idx in &mut table.indexes {
        if idx.name.eq_ignore_ascii_case(index_name) {
            idx.root_page_id = new_root;
        }
    }
    catalog.save(pager)?;
    Ok(ExecResult::Message("OK".into()))
}

// --------------------------------------------------------------- INSERT --

fn exec_insert(pager: &mut Pager, catalog: &mut Catalog, ins: &Insert, params: &[Value]) -> Result<ExecResult> {
    let table = table_or_err(catalog, &ins.table_name)?.clone();
    let empty_row = Row::default();
    let mut affected = 0u64;

    for tuple in &ins.values {
        let mut values = vec![Value::Null; table.columns.len()];
        match &ins.columns {
            Some(names) => {
                if names.len() != tuple.len() {
                    return Err(Error::Execution("column list and VALUES arity mismatch".into()));
                }
                for (name, expr) in names.iter().zip(tuple.iter()) {
                    let idx = table.column_index(name)?;
                    values[idx] = eval_expr(expr, &empty_row, params)?;
                }
            }
            None => {
                if tuple.len() != table.columns.len() {
                    return Err(Error::Execution("VALUES arity does not match table column count".into()));
                }
                for (idx, expr) in tuple.iter().enumerate() {
                    values[idx] = eval_expr(expr, &empty_row, params)?;
                }
            }
        }

        for (idx, col) in table.columns.iter().enumerate() {
            if values[idx].is_null() {
                if let Some(default) = &col.default {
                    values[idx] = match default {
                        DefaultValue::Integer(v) => Value::Integer(*v),
                        DefaultValue::Real(v) => Value::Real(*v),
                        DefaultValue::Text(v) => Value::Text(v.clone()),
                        DefaultValue::Boolean(v) => Value::Boolean(*v),
                        DefaultValue::Null => Value::Null,
                    };
                } else if col.auto_increment && col.primary_key {
                    values[idx] = Value::Integer(table_next_row_id(catalog, &table.name)? as i64);
                }
            }
            if !values[idx].is_null() {
                values[idx] = values[idx].clone().coerce(col.data_type)?;
            }
            if values[idx].is_null() && col.not_null {
                return Err(Error::Constraint(format!("Column '{}' cannot be NULL", col.name)));
            }
        }

        insert_row(pager, catalog, &ins.table_name, values, ins.or_replace)?;
        affected += 1;
    }

    catalog.save(pager)?;
    Ok(ExecResult::RowsAffected(affected))
}

fn table_next_row_id(catalog: &mut Catalog, table_name: &str) -> Result<u64> {
    let table = catalog.get_mut(table_name).unwrap();
    let id = table.next_row_id;
    table.next_row_id += 1;
    Ok(id)
}

fn pk_key(table: &TableDef, values: &[Value]) -> Result<Json> {
    let pk_cols = table.pk_columns();
    if pk_cols.is_empty() {
        // No declared PK: use the synthetic row id stashed in an implicit
        // slot. We reuse `next_row_id - 1`'s value is not recoverable here,
        // so callers without a PK are expected to route through row id
        // tracking at the storage layer instead (see `insert_row`).
        return Ok(Json::Null);
    }
    if pk_cols.len() == 1 {
        let idx = table.column_index(&pk_cols[0].name)?;
        return Ok(values[idx].to_json());
    }
    let mut parts = Vec::new();
    for pk in pk_cols {
        let idx = table.column_index(&pk.name)?;
        parts.push(values[idx].to_json());
    }
    Ok(Json::Array(parts))
}

fn index_key(table: &TableDef, columns: &[String], values: &[Value]) -> Result<Json> {
    if columns.len() == 1 {
        let idx = table.column_index(&columns[0])?;
        return Ok(values[idx].to_json());
    }
    let mut parts = Vec::new();
    for c in columns {
        let idx = table.column_index(c)?;
        parts.push(values[idx].to_json());
    }
    Ok(Json::Array(parts))
}

fn location_from_json(json: &Json) -> Result<Location> {
    let arr = json.as_array().ok_or_else(|| Error::Corruption("expected [page_id, slot]".into()))?;
    let page_id = arr.get(0).and_then(Json::as_i64).ok_or_else(|| Error::Corruption("bad posting".into()))? as u64;
    let slot = arr.get(1).and_then(Json::as_i64).ok_or_else(|| Error::Corruption("bad posting".into()))? as u16;
    Ok((page_id, slot))
}

fn location_to_json((page_id, slot): Location) -> Json {
    Json::from(vec![page_id as i64, slot as i64])
}

/// Appends a row's encoded bytes to the last page in the table's storage
/// list with room for it, allocating a fresh page when none has space.
fn store_row_bytes(pager: &mut Pager, table: &mut TableDefHandle, bytes: &[u8]) -> Result<Location> {
    for &page_id in table.data_pages.iter() {
        let raw = pager.read_page(page_id)?;
        let mut page = SlottedPage::from_bytes(&raw)?;
        if let Ok(slot) = page.insert(bytes) {
            pager.write_page(page_id, page.as_bytes())?;
            return Ok((page_id, slot));
        }
    }
    let page_id = pager.allocate_page()?;
    let mut page = SlottedPage::new();
    let slot = page.insert(bytes)?;
    pager.write_page(page_id, page.as_bytes())?;
    table.data_pages.push(page_id);
    Ok((page_id, slot))
}

/// The catalog doesn't persist a `data_pages` list on `TableDef` directly
/// (new pages are discovered lazily via the PK index scan instead), so this
/// is a lightweight handle used only while inserting within one statement.
struct TableDefHandle {
    data_pages: Vec<u64>,
}

fn insert_row(pager: &mut Pager, catalog: &mut Catalog, table_name: &str, values: Vec<Value>, or_replace: bool) -> Result<()> {
    let table = catalog.get(table_name).unwrap().clone();

    check_foreign_keys_on_write(pager, catalog, &table, &values)?;
    check_unique_constraints(pager, catalog, &table, &values)?;
    check_checks(&table, &values)?;

    // A table with no declared PRIMARY KEY is still keyed internally, by a
    // synthetic, never-reused row id drawn from the same counter ordinary
    // AUTOINCREMENT columns use.
    let key = if table.pk_columns().is_empty() {
        Json::from(table_next_row_id(catalog, table_name)? as i64)
    } else {
        pk_key(&table, &values)?
    };
    let bytes = encode_row(&values)?;

    if or_replace && !key.is_null() {
        let pk_tree = BTree::open(table.pk_index_root, true);
        if let Some(existing) = pk_tree.find(pager, &key)? {
            let (page_id, slot) = location_from_json(&existing)?;
            remove_row_everywhere(pager, catalog, table_name, &key, page_id, slot)?;
        }
    }

    let mut handle = TableDefHandle { data_pages: vec![] };
    // Best-effort reuse: walk the PK index scan once to discover existing
    // page ids so new rows pack into pages already touched this session.
    let known_pages = BTree::open(table.pk_index_root, true)
        .scan(pager)?
        .into_iter()
        .filter_map(|(_, v)| location_from_json(&v).ok())
        .map(|(p, _)| p)
        .collect::<std::collections::BTreeSet<_>>();
    handle.data_pages = known_pages.into_iter().collect();

    let location = store_row_bytes(pager, &mut handle, &bytes)?;

    let mut pk_tree = BTree::open(table.pk_index_root, true);
    pk_tree.insert(pager, key, location_to_json(location))?;

    for idx_def in &table.indexes {
        let mut idx_tree = BTree::open(idx_def.root_page_id, idx_def.unique);
        let k = index_key(&table, &idx_def.columns, &values)?;
        if !k.is_null() {
            idx_tree.insert(pager, k, location_to_json(location))?;
        }
    }

    Ok(())
}

/// True iff some live row of `table` holds `value` in `column`. Uses the PK
/// B-tree when `column` is the (single-column) primary key, a secondary
/// index on `column` when one exists, and otherwise falls back to a full
/// scan — an FK may reference any column, not only the primary key.
fn column_value_exists(pager: &mut Pager, table: &TableDef, column: &str, value: &Value) -> Result<bool> {
    let key = value.to_json();

    let pk_cols = table.pk_columns();
    if pk_cols.len() == 1 && pk_cols[0].name.eq_ignore_ascii_case(column) {
        let tree = BTree::open(table.pk_index_root, true);
        return Ok(tree.find(pager, &key)?.is_some());
    }

    if let Some(idx_def) = table.index_on(column) {
        let tree = BTree::open(idx_def.root_page_id, idx_def.unique);
        return Ok(!tree.find_postings(pager, &key)?.is_empty());
    }

    let idx = table.column_index(column)?;
    for row in full_scan(pager, table)? {
        if row[idx].to_json() == key {
            return Ok(true);
        }
    }
    Ok(false)
}

fn check_foreign_keys_on_write(pager: &mut Pager, catalog: &Catalog, table: &TableDef, values: &[Value]) -> Result<()> {
    for fk in &table.foreign_keys {
        let idx = table.column_index(&fk.column)?;
        if values[idx].is_null() {
            continue;
        }
        let ref_table = catalog
            .get(&fk.ref_table)
            .ok_or_else(|| Error::Schema(format!("Unknown table: {}", fk.ref_table)))?;
        if !column_value_exists(pager, ref_table, &fk.ref_column, &values[idx])? {
            return Err(Error::Constraint(format!(
                "FOREIGN KEY constraint failed: {}.{} references {}.{}",
                table.name, fk.column, ref_table.name, fk.ref_column
            )));
        }
    }
    Ok(())
}

fn check_unique_constraints(pager: &mut Pager, catalog: &Catalog, table: &TableDef, values: &[Value]) -> Result<()> {
    let _ = catalog;
    for idx_def in &table.indexes {
        if !idx_def.unique {
            continue;
        }
        let key = index_key(table, &idx_def.columns, values)?;
        if key.is_null() {
            continue;
        }
        let tree = BTree::open(idx_def.root_page_id, true);
        if tree.find(pager, &key)?.is_some() {
            return Err(Error::Constraint(format!("UNIQUE constraint failed: {}.{}", table.name, idx_def.columns.join(","))));
        }
    }
    Ok(())
}

fn check_checks(table: &TableDef, values: &[Value]) -> Result<()> {
    let mut row = Row::default();
    for (col, v) in table.columns.iter().zip(values.iter()) {
        row.push(col.name.clone(), v.clone());
    }
    for col in &table.columns {
        if let Some(check_text) = &col.check {
            evaluate_rendered_check(check_text, &row, &format!("{}.{}", table.name, col.name))?;
        }
    }
    for check_text in &table.check_exprs {
        evaluate_rendered_check(check_text, &row, &table.name)?;
    }
    Ok(())
}

/// CHECK expressions are stored as plain SQL text (see `expr_to_sql`) and
/// re-parsed here with the same expression grammar used everywhere else
/// (`parse_expr_standalone`), so CHECK gets exactly WHERE's comparison
/// semantics, including NULL-as-false.
fn evaluate_rendered_check(rendered: &str, row: &Row, what: &str) -> Result<()> {
    let expr = super::parser::parse_expr_standalone(rendered)?;
    let value = eval_expr(&expr, row, &[])?;
    if !truthy(&value) {
        return Err(Error::Constraint(format!("CHECK constraint failed: {what}")));
    }
    Ok(())
}

fn remove_row_everywhere(pager: &mut Pager, catalog: &mut Catalog, table_name: &str, _pk_key: &Json, page_id: u64, slot: u16) -> Result<()> {
    let table = catalog.get(table_name).unwrap().clone();
    let raw = pager.read_page(page_id)?;
    let mut page = SlottedPage::from_bytes(&raw)?;
    if let Some(blob) = page.get(slot) {
        let old_values = decode_row(blob, &table.columns)?;
        // Remove secondary index postings first, then the PK entry, so a
        // crash mid-removal never leaves a dangling index entry pointing
        // at a still-present row.
        for idx_def in &table.indexes {
            let key = index_key(&table, &idx_def.columns, &old_values)?;
            if key.is_null() {
                continue;
            }
            let mut tree = BTree::open(idx_def.root_page_id, idx_def.unique);
            if idx_def.unique {
                tree.delete(pager, &key)?;
            } else {
                tree.delete_posting(pager, &key, &location_to_json((page_id, slot)))?;
            }
        }
        let pk = pk_key(&table, &old_values)?;
        let mut pk_tree = BTree::open(table.pk_index_root, true);
        if !pk.is_null() {
            pk_tree.delete(pager, &pk)?;
        } else {
            // Synthetic-key tables: fall back to scanning for the matching location.
            for (k, v) in pk_tree.scan(pager)? {
                if location_from_json(&v).ok() == Some((page_id, slot)) {
                    pk_tree.delete(pager, &k)?;
                    break;
                }
            }
        }
    }
    page.tombstone(slot);
    pager.write_page(page_id, page.as_bytes())?;
    Ok(())
}

// --------------------------------------------------------------- SELECT --

fn load_row(pager: &mut Pager, columns: &[ColumnDef], location: Location) -> Result<Option<Vec<Value>>> {
    let (page_id, slot) = location;
    let raw = pager.read_page(page_id)?;
    let page = SlottedPage::from_bytes(&raw)?;
    match page.get(slot) {
        Some(blob) => Ok(Some(decode_row(blob, columns)?)),
        None => Ok(None),
    }
}

fn row_from_values(alias: &str, columns: &[ColumnDef], values: &[Value]) -> Row {
    let mut row = Row::default();
    for (col, v) in columns.iter().zip(values.iter()) {
        row.push(format!("{alias}.{}", col.name), v.clone());
    }
    row
}

fn full_scan(pager: &mut Pager, table: &TableDef) -> Result<Vec<Vec<Value>>> {
    let tree = BTree::open(table.pk_index_root, true);
    let mut out = Vec::new();
    for (_, posting) in tree.scan(pager)? {
        let loc = location_from_json(&posting)?;
        if let Some(values) = load_row(pager, &table.columns, loc)? {
            out.push(values);
        }
    }
    Ok(out)
}

// ------------------------------------------------------------ SUBQUERIES --

/// Maps a runtime `Value` back to the literal `Expr` variant that produces
/// it, so a resolved sub-query result can be spliced into an expression
/// tree the same way any other literal would be. TIMESTAMP/DECIMAL collapse
/// to their text form, matching how those types round-trip through a
/// column on read.
fn value_to_expr(v: &Value) -> Expr {
    match v {
        Value::Null => Expr::Null,
        Value::Integer(i) => Expr::IntLiteral(*i),
        Value::Real(r) => Expr::RealLiteral(*r),
        Value::Text(s) | Value::Timestamp(s) => Expr::StringLiteral(s.clone()),
        Value::Boolean(b) => Expr::BoolLiteral(*b),
        Value::Blob(b) => Expr::BlobLiteral(b.clone()),
        Value::Decimal(d) => Expr::StringLiteral(d.to_string()),
    }
}

/// Rewrites a correlated sub-query's WHERE clause before it runs: any
/// `ColumnRef` that isn't one of the inner table's own columns, but matches
/// a column in `outer` by its unqualified name, is replaced with the
/// outer row's literal value. This is how the inner SELECT sees the outer
/// row "bound into" it, per `HAVING ... (SELECT ... WHERE inner_col = outer_col)`.
fn bind_correlated(expr: &Expr, inner_table: &TableDef, outer: &Row) -> Expr {
    let rewrite_leaf = |e: &Expr| -> Expr {
        if let Expr::ColumnRef(name) = e {
            let short = name.rsplit('.').next().unwrap_or(name);
            if inner_table.column_index(short).is_err() {
                if let Some(v) = outer.get(short) {
                    return value_to_expr(v);
                }
            }
        }
        e.clone()
    };

    match expr {
        Expr::ColumnRef(_) => rewrite_leaf(expr),
        Expr::BinaryOp { left, op, right } => Expr::BinaryOp {
            left: Box::new(bind_correlated(left, inner_table, outer)),
            op: *op,
            right: Box::new(bind_correlated(right, inner_table, outer)),
        },
        Expr::UnaryOp { op, operand } => {
            Expr::UnaryOp { op: *op, operand: Box::new(bind_correlated(operand, inner_table, outer)) }
        }
        Expr::Like { expr, pattern, negated } => Expr::Like {
            expr: Box::new(bind_correlated(expr, inner_table, outer)),
            pattern: Box::new(bind_correlated(pattern, inner_table, outer)),
            negated: *negated,
        },
        Expr::InList { expr, list, negated } => Expr::InList {
            expr: Box::new(bind_correlated(expr, inner_table, outer)),
            list: list.iter().map(|e| bind_correlated(e, inner_table, outer)).collect(),
            negated: *negated,
        },
        Expr::Between { expr, low, high, negated } => Expr::Between {
            expr: Box::new(bind_correlated(expr, inner_table, outer)),
            low: Box::new(bind_correlated(low, inner_table, outer)),
            high: Box::new(bind_correlated(high, inner_table, outer)),
            negated: *negated,
        },
        Expr::IsNull { expr, negated } => {
            Expr::IsNull { expr: Box::new(bind_correlated(expr, inner_table, outer)), negated: *negated }
        }
        Expr::CaseWhen { operand, when_clauses, else_clause } => Expr::CaseWhen {
            operand: operand.as_deref().map(|o| Box::new(bind_correlated(o, inner_table, outer))),
            when_clauses: when_clauses
                .iter()
                .map(|(c, t)| (bind_correlated(c, inner_table, outer), bind_correlated(t, inner_table, outer)))
                .collect(),
            else_clause: else_clause.as_deref().map(|e| Box::new(bind_correlated(e, inner_table, outer))),
        },
        Expr::FunctionCall { name, args } => Expr::FunctionCall {
            name: name.clone(),
            args: args.iter().map(|a| bind_correlated(a, inner_table, outer)).collect(),
        },
        other => other.clone(),
    }
}

/// Runs a sub-query's SELECT and returns its first projected column's
/// value for every row. `IN (SELECT ...)` and scalar sub-queries both read
/// only the first column; a sub-query with more than one SELECT-list entry
/// simply ignores the rest, matching the "single-column" contract.
fn execute_subquery(
    sel: &Select,
    pager: &mut Pager,
    catalog: &Catalog,
    outer: Option<&Row>,
    params: &[Value],
) -> Result<Vec<Value>> {
    let mut sel = sel.clone();
    if let Some(outer_row) = outer {
        let inner_table = table_or_err(catalog, &sel.table_name)?.clone();
        if let Some(where_clause) = &sel.where_clause {
            sel.where_clause = Some(bind_correlated(where_clause, &inner_table, outer_row));
        }
    }
    let rows = exec_select(pager, catalog, &sel, params)?;
    Ok(rows
        .into_iter()
        .map(|r| r.columns.first().map(|(_, v)| v.clone()).unwrap_or(Value::Null))
        .collect())
}

/// Recursively replaces every `InSubquery`/`ScalarSubquery` node in `expr`
/// with an ordinary literal (`InList` or a single value), by actually
/// running the inner SELECT. Everything downstream (`eval_expr`) then sees
/// a sub-query-free tree and never needs database access itself.
fn materialize_subqueries(expr: &Expr, pager: &mut Pager, catalog: &Catalog, outer: Option<&Row>, params: &[Value]) -> Result<Expr> {
    match expr {
        Expr::InSubquery { expr: inner, subquery, negated } => {
            let resolved_inner = materialize_subqueries(inner, pager, catalog, outer, params)?;
            let values = execute_subquery(subquery, pager, catalog, outer, params)?;
            Ok(Expr::InList { expr: Box::new(resolved_inner), list: values.iter().map(value_to_expr).collect(), negated: *negated })
        }
        Expr::ScalarSubquery(subquery) => {
            let values = execute_subquery(subquery, pager, catalog, outer, params)?;
            Ok(value_to_expr(values.first().unwrap_or(&Value::Null)))
        }
        Expr::BinaryOp { left, op, right } => Ok(Expr::BinaryOp {
            left: Box::new(materialize_subqueries(left, pager, catalog, outer, params)?),
            op: *op,
            right: Box::new(materialize_subqueries(right, pager, catalog, outer, params)?),
        }),
        Expr::UnaryOp { op, operand } => Ok(Expr::UnaryOp { op: *op, operand: Box::new(materialize_subqueries(operand, pager, catalog, outer, params)?) }),
        Expr::Like { expr, pattern, negated } => Ok(Expr::Like {
            expr: Box::new(materialize_subqueries(expr, pager, catalog, outer, params)?),
            pattern: Box::new(materialize_subqueries(pattern, pager, catalog, outer, params)?),
            negated: *negated,
        }),
        Expr::InList { expr, list, negated } => Ok(Expr::InList {
            expr: Box::new(materialize_subqueries(expr, pager, catalog, outer, params)?),
            list: list.iter().map(|e| materialize_subqueries(e, pager, catalog, outer, params)).collect::<Result<_>>()?,
            negated: *negated,
        }),
        Expr::Between { expr, low, high, negated } => Ok(Expr::Between {
            expr: Box::new(materialize_subqueries(expr, pager, catalog, outer, params)?),
            low: Box::new(materialize_subqueries(low, pager, catalog, outer, params)?),
            high: Box::new(materialize_subqueries(high, pager, catalog, outer, params)?),
            negated: *negated,
        }),
        Expr::IsNull { expr, negated } => {
            Ok(Expr::IsNull { expr: Box::new(materialize_subqueries(expr, pager, catalog, outer, params)?), negated: *negated })
        }
        Expr::CaseWhen { operand, when_clauses, else_clause } => Ok(Expr::CaseWhen {
            operand: operand
                .as_deref()
                .map(|o| materialize_subqueries(o, pager, catalog, outer, params).map(Box::new))
                .transpose()?,
            when_clauses: when_clauses
                .iter()
                .map(|(c, t)| {
                    Ok((
                        materialize_subqueries(c, pager, catalog, outer, params)?,
                        materialize_subqueries(t, pager, catalog, outer, params)?,
                    ))
                })
                .collect::<Result<_>>()?,
            else_clause: else_clause
                .as_deref()
                .map(|e| materialize_subqueries(e, pager, catalog, outer, params).map(Box::new))
                .transpose()?,
        }),
        Expr::FunctionCall { name, args } => Ok(Expr::FunctionCall {
            name: name.clone(),
            args: args.iter().map(|a| materialize_subqueries(a, pager, catalog, outer, params)).collect::<Result<_>>()?,
        }),
        other => Ok(other.clone()),
    }
}

fn exec_select(pager: &mut Pager, catalog: &Catalog, select: &Select, params: &[Value]) -> Result<Vec<Row>> {
    let table = table_or_err(catalog, &select.table_name)?.clone();
    let base_alias = select.table_alias.clone().unwrap_or_else(|| table.name.clone());

    let plan = plan_select(select, &table);

    let mut base_rows: Vec<Vec<Value>> = match &plan {
        Plan::PkLookup { key_expr } => {
            let key = eval_expr(key_expr, &Row::default(), params)?.to_json();
            let tree = BTree::open(table.pk_index_root, true);
            match tree.find(pager, &key)? {
                Some(posting) => {
                    let loc = location_from_json(&posting)?;
                    load_row(pager, &table.columns, loc)?.into_iter().collect()
                }
                None => Vec::new(),
            }
        }
        Plan::SecondaryIndexLookup { index_name, key_expr } => {
            let idx_def = table.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(index_name)).unwrap();
            let key = eval_expr(key_expr, &Row::default(), params)?.to_json();
            let tree = BTree::open(idx_def.root_page_id, idx_def.unique);
            let mut out = Vec::new();
            for posting in tree.find_postings(pager, &key)? {
                let loc = location_from_json(&posting)?;
                if let Some(values) = load_row(pager, &table.columns, loc)? {
                    out.push(values);
                }
            }
            out
        }
        Plan::IndexOrderScan { index_name } => {
            let idx_def = table.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(index_name)).unwrap();
            let tree = BTree::open(idx_def.root_page_id, idx_def.unique);
            let mut out = Vec::new();
            for (_, posting_or_list) in tree.scan(pager)? {
                let postings = if idx_def.unique { vec![posting_or_list] } else { posting_or_list.as_array().cloned().unwrap_or_default() };
                for posting in postings {
                    let loc = location_from_json(&posting)?;
                    if let Some(values) = load_row(pager, &table.columns, loc)? {
                        out.push(values);
                    }
                }
            }
            out
        }
        Plan::FullTableScan | Plan::NestedLoopJoin => full_scan(pager, &table)?,
    };

    // Materialize joined rows (nested loop: for each base row, scan every
    // joined table and keep matches; LEFT JOIN keeps an all-NULL extension
    // when nothing matches).
    let mut joined: Vec<Row> = Vec::new();
    if select.joins.is_empty() {
        for values in base_rows.drain(..) {
            joined.push(row_from_values(&base_alias, &table.columns, &values));
        }
    } else {
        for values in base_rows.drain(..) {
            let mut rows_for_base = vec![row_from_values(&base_alias, &table.columns, &values)];
            for join in &select.joins {
                let join_table = table_or_err(catalog, &join.table_name)?.clone();
                let join_alias = join.alias.clone().unwrap_or_else(|| join_table.name.clone());
                let join_rows = full_scan(pager, &join_table)?;

                let mut next = Vec::new();
                for left in rows_for_base {
                    let mut matched_any = false;
                    for rvalues in &join_rows {
                        let mut combined = left.clone();
                        for (col, v) in join_table.columns.iter().zip(rvalues.iter()) {
                            combined.push(format!("{join_alias}.{}", col.name), v.clone());
                        }
                        let keep = match (&join.join_type, &join.on_condition) {
                            (JoinType::Cross, _) => true,
                            (_, Some(cond)) => truthy(&eval_expr(cond, &combined, params)?),
                            (_, None) => true,
                        };
                        if keep {
                            matched_any = true;
                            next.push(combined);
                        }
                    }
                    if !matched_any && join.join_type == JoinType::Left {
                        let mut combined = left.clone();
                        for col in &join_table.columns {
                            combined.push(format!("{join_alias}.{}", col.name), Value::Null);
                        }
                        next.push(combined);
                    }
                }
                rows_for_base = next;
            }
            joined.extend(rows_for_base);
        }
    }

    let filtered: Vec<Row> = if let Some(where_clause) = &select.where_clause {
        let resolved = materialize_subqueries(where_clause, pager, catalog, None, params)?;
        joined
            .into_iter()
            .filter(|row| eval_expr(&resolved, row, params).map(|v| truthy(&v)).unwrap_or(false))
            .collect()
    } else {
        joined
    };

    let grouped_output = if !select.group_by.is_empty() || select_has_aggregates(select) {
        group_and_aggregate(&filtered, select, params)?
    } else {
        project(&filtered, &select.columns, params)?
    };

    // HAVING is evaluated against the already-projected/aggregated row, so a
    // correlated sub-query in it binds to that row, not to a raw table row.
    let having_filtered: Vec<Row> = if let Some(having) = &select.having {
        let mut out = Vec::new();
        for row in grouped_output {
            let resolved = materialize_subqueries(having, pager, catalog, Some(&row), params)?;
            if truthy(&eval_expr(&resolved, &row, params)?) {
                out.push(row);
            }
        }
        out
    } else {
        grouped_output
    };

    let mut result = having_filtered;

    if select.distinct {
        let mut seen: Vec<Row> = Vec::new();
        result.retain(|row| {
            let dup = seen.iter().any(|s| rows_equal(s, row));
            if !dup {
                seen.push(row.clone());
            }
            !dup
        });
    }

    if let Some(order_items) = &select.order_by {
        result.sort_by(|a, b| {
            for item in order_items {
                let av = eval_expr(&item.expr, a, params).unwrap_or(Value::Null);
                let bv = eval_expr(&item.expr, b, params).unwrap_or(Value::Null);
                let ord = compare_values(&av, &bv).unwrap_or(std::cmp::Ordering::Equal);
                let ord = if item.descending { ord.reverse() } else { ord };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    let offset = select.offset.unwrap_or(0) as usize;
    if offset > 0 {
        result = result.into_iter().skip(offset).collect();
    }
    if let Some(limit) = select.limit {
        result.truncate(limit as usize);
    }

    Ok(result)
}

fn rows_equal(a: &Row, b: &Row) -> bool {
    a.columns.len() == b.columns.len()
        && a.columns.iter().zip(b.columns.iter()).all(|((_, x), (_, y))| values_equal(x, y) || (x.is_null() && y.is_null()))
}

fn project(rows: &[Row], columns: &[SelectColumn], params: &[Value]) -> Result<Vec<Row>> {
    rows.iter().map(|row| project_one(row, columns, params)).collect()
}

fn project_one(row: &Row, columns: &[SelectColumn], params: &[Value]) -> Result<Row> {
    let mut out = Row::default();
    for col in columns {
        match col {
            SelectColumn::Star => {
                for (name, v) in &row.columns {
                    let short = name.rsplit('.').next().unwrap_or(name);
                    out.push(short, v.clone());
                }
            }
            SelectColumn::Expr(expr, alias) => {
                let value = eval_expr(expr, row, params)?;
                let name = alias.clone().unwrap_or_else(|| expr_display_name(expr));
                out.push(name, value);
            }
        }
    }
    Ok(out)
}

fn expr_display_name(expr: &Expr) -> String {
    match expr {
        Expr::ColumnRef(name) => name.rsplit('.').next().unwrap_or(name).to_string(),
        Expr::AggregateFunc { name, .. } => name.clone(),
        Expr::FunctionCall { name, .. } => name.clone(),
        Expr::CaseWhen { .. } => "CASE".to_string(),
        _ => "expr".to_string(),
    }
}

/// True if `expr` has an aggregate anywhere in its tree, not just at the
/// top level, so `ROUND(AVG(x), 2)` in a SELECT list (or HAVING) still
/// routes the query through grouping instead of plain projection.
fn expr_contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::AggregateFunc { .. } => true,
        Expr::BinaryOp { left, right, .. } => expr_contains_aggregate(left) || expr_contains_aggregate(right),
        Expr::UnaryOp { operand, .. } => expr_contains_aggregate(operand),
        Expr::FunctionCall { args, .. } => args.iter().any(expr_contains_aggregate),
        Expr::CaseWhen { operand, when_clauses, else_clause } => {
            operand.as_deref().is_some_and(expr_contains_aggregate)
                || when_clauses.iter().any(|(c, t)| expr_contains_aggregate(c) || expr_contains_aggregate(t))
                || else_clause.as_deref().is_some_and(expr_contains_aggregate)
        }
        Expr::Like { expr, pattern, .. } => expr_contains_aggregate(expr) || expr_contains_aggregate(pattern),
        Expr::InList { expr, list, .. } => expr_contains_aggregate(expr) || list.iter().any(expr_contains_aggregate),
        Expr::Between { expr, low, high, .. } => {
            expr_contains_aggregate(expr) || expr_contains_aggregate(low) || expr_contains_aggregate(high)
        }
        Expr::IsNull { expr, .. } => expr_contains_aggregate(expr),
        _ => false,
    }
}

fn select_has_aggregates(select: &Select) -> bool {
    select.columns.iter().any(|c| matches!(c, SelectColumn::Expr(e, _) if expr_contains_aggregate(e)))
        || select.having.as_ref().is_some_and(expr_contains_aggregate)
}

fn group_and_aggregate(rows: &[Row], select: &Select, params: &[Value]) -> Result<Vec<Row>> {
    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
    for row in rows {
        let key: Vec<Value> = select
            .group_by
            .iter()
            .map(|e| eval_expr(e, row, params))
            .collect::<Result<_>>()?;
        if let Some(existing) = groups.iter_mut().find(|(k, _)| k.len() == key.len() && k.iter().zip(key.iter()).all(|(a, b)| values_equal(a, b) || (a.is_null() && b.is_null()))) {
            existing.1.push(row);
        } else {
            groups.push((key, vec![row]));
        }
    }
    if groups.is_empty() && select.group_by.is_empty() {
        groups.push((Vec::new(), rows.iter().collect()));
    }

    let mut out = Vec::new();
    for (_, members) in groups {
        let representative = members.first().copied().cloned().unwrap_or_default();
        let mut result_row = Row::default();
        for col in &select.columns {
            match col {
                SelectColumn::Star => {
                    for (name, v) in &representative.columns {
                        result_row.push(name.rsplit('.').next().unwrap_or(name), v.clone());
                    }
                }
                SelectColumn::Expr(Expr::AggregateFunc { name, arg, distinct }, alias) => {
                    let value = compute_aggregate(name, arg.as_deref(), *distinct, &members, params)?;
                    result_row.push(alias.clone().unwrap_or_else(|| name.clone()), value);
                }
                SelectColumn::Expr(expr, alias) if expr_contains_aggregate(expr) => {
                    let value = eval_post_aggregate(expr, &members, &representative, params)?;
                    result_row.push(alias.clone().unwrap_or_else(|| expr_display_name(expr)), value);
                }
                SelectColumn::Expr(expr, alias) => {
                    let value = eval_expr(expr, &representative, params)?;
                    result_row.push(alias.clone().unwrap_or_else(|| expr_display_name(expr)), value);
                }
            }
        }
        out.push(result_row);
    }
    Ok(out)
}

/// Evaluates a select-list expression that has an aggregate nested inside
/// it (e.g. `ROUND(AVG(price), 2)`): every `AggregateFunc` node is computed
/// once over the whole group, then the surrounding expression is evaluated
/// against those computed values plus the group's representative row for
/// any plain column references mixed into the same expression.
fn eval_post_aggregate(expr: &Expr, members: &[&Row], representative: &Row, params: &[Value]) -> Result<Value> {
    match expr {
        Expr::AggregateFunc { name, arg, distinct } => compute_aggregate(name, arg.as_deref(), *distinct, members, params),
        Expr::BinaryOp { left, op, right } => {
            let l = eval_post_aggregate(left, members, representative, params)?;
            let r = eval_post_aggregate(right, members, representative, params)?;
            eval_expr(
                &Expr::BinaryOp { left: Box::new(value_to_expr(&l)), op: *op, right: Box::new(value_to_expr(&r)) },
                representative,
                params,
            )
        }
        Expr::UnaryOp { op, operand } => {
            let v = eval_post_aggregate(operand, members, representative, params)?;
            eval_expr(&Expr::UnaryOp { op: *op, operand: Box::new(value_to_expr(&v)) }, representative, params)
        }
        Expr::FunctionCall { name, args } => {
            let resolved_args = args
                .iter()
                .map(|a| eval_post_aggregate(a, members, representative, params).map(|v| value_to_expr(&v)))
                .collect::<Result<Vec<_>>>()?;
            eval_expr(&Expr::FunctionCall { name: name.clone(), args: resolved_args }, representative, params)
        }
        Expr::CaseWhen { operand, when_clauses, else_clause } => {
            let resolved_operand = operand
                .as_deref()
                .map(|o| eval_post_aggregate(o, members, representative, params).map(|v| Box::new(value_to_expr(&v))))
                .transpose()?;
            let resolved_clauses = when_clauses
                .iter()
                .map(|(c, t)| {
                    let cv = eval_post_aggregate(c, members, representative, params)?;
                    let tv = eval_post_aggregate(t, members, representative, params)?;
                    Ok((value_to_expr(&cv), value_to_expr(&tv)))
                })
                .collect::<Result<Vec<_>>>()?;
            let resolved_else = else_clause
                .as_deref()
                .map(|e| eval_post_aggregate(e, members, representative, params).map(|v| Box::new(value_to_expr(&v))))
                .transpose()?;
            eval_expr(
                &Expr::CaseWhen { operand: resolved_operand, when_clauses: resolved_clauses, else_clause: resolved_else },
                representative,
                params,
            )
        }
        other => eval_expr(other, representative, params),
    }
}

fn compute_aggregate(name: &str, arg: Option<&Expr>, distinct: bool, members: &[&Row], params: &[Value]) -> Result<Value> {
    let mut values: Vec<Value> = Vec::new();
    for row in members {
        let v = match arg {
            Some(expr) => eval_expr(expr, *row, params)?,
            None => Value::Integer(1),
        };
        values.push(v);
    }
    if distinct {
        let mut seen: Vec<Value> = Vec::new();
        values.retain(|v| {
            let dup = seen.iter().any(|s| values_equal(s, v));
            if !dup {
                seen.push(v.clone());
            }
            !dup
        });
    }

    match name {
        "COUNT" => {
            let count = if arg.is_none() {
                members.len()
            } else {
                values.iter().filter(|v| !v.is_null()).count()
            };
            Ok(Value::Integer(count as i64))
        }
        "SUM" => {
            let mut total = 0f64;
            let mut any = false;
            for v in &values {
                if let Some(f) = v.as_f64() {
                    total += f;
                    any = true;
                }
            }
            if !any {
                Ok(Value::Null)
            } else {
                Ok(Value::Real(total))
            }
        }
        "AVG" => {
            let nums: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if nums.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Real(nums.iter().sum::<f64>() / nums.len() as f64))
            }
        }
        "MIN" => values
            .into_iter()
            .filter(|v| !v.is_null())
            .reduce(|a, b| if compare_values(&a, &b).unwrap_or(std::cmp::Ordering::Equal) == std::cmp::Ordering::Greater { b } else { a })
            .map(Ok)
            .unwrap_or(Ok(Value::Null)),
        "MAX" => values
            .into_iter()
            .filter(|v| !v.is_null())
            .reduce(|a, b| if compare_values(&a, &b).unwrap_or(std::cmp::Ordering::Equal) == std::cmp::Ordering::Less { b } else { a })
            .map(Ok)
            .unwrap_or(Ok(Value::Null)),
        other => Err(Error::Execution(format!("unknown aggregate function {other}"))),
    }
}

// --------------------------------------------------------------- UPDATE --

fn exec_update(pager: &mut Pager, catalog: &mut Catalog, upd: &Update, params: &[Value]) -> Result<ExecResult> {
    let table = table_or_err(catalog, &upd.table_name)?.clone();
    let tree = BTree::open(table.pk_index_root, true);
    let mut affected = 0u64;

    let where_clause = match &upd.where_clause {
        Some(w) => Some(materialize_subqueries(w, pager, &*catalog, None, params)?),
        None => None,
    };

    let candidates: Vec<(Json, Location)> = tree
        .scan(pager)?
        .into_iter()
        .map(|(k, v)| Ok::<_, Error>((k, location_from_json(&v)?)))
        .collect::<Result<_>>()?;

    for (old_key, location) in candidates {
        let Some(old_values) = load_row(pager, &table.columns, location)? else { continue };
        let row = row_from_values(&table.name, &table.columns, &old_values);
        let row_unqualified = {
            let mut r = Row::default();
            for (c, v) in table.columns.iter().zip(old_values.iter()) {
                r.push(c.name.clone(), v.clone());
            }
            r
        };
        let matches = match &where_clause {
            Some(cond) => truthy(&eval_expr(cond, &row, params)?) || truthy(&eval_expr(cond, &row_unqualified, params)?),
            None => true,
        };
        if !matches {
            continue;
        }

        let mut new_values = old_values.clone();
        for (col_name, expr) in &upd.assignments {
            let idx = table.column_index(col_name)?;
            let v = eval_expr(expr, &row_unqualified, params)?;
            new_values[idx] = v.coerce(table.columns[idx].data_type)?;
        }
        for (idx, col) in table.columns.iter().enumerate() {
            if new_values[idx].is_null() && col.not_null {
                return Err(Error::Constraint(format!("Column '{}' cannot be NULL", col.name)));
            }
        }
        check_checks(&table, &new_values)?;
        check_foreign_keys_on_write(pager, catalog, &table, &new_values)?;

        remove_row_everywhere(pager, catalog, &upd.table_name, &old_key, location.0, location.1)?;
        check_unique_constraints(pager, catalog, &table, &new_values)?;
        insert_row(pager, catalog, &upd.table_name, new_values, false)?;
        affected += 1;
    }

    catalog.save(pager)?;
    Ok(ExecResult::RowsAffected(affected))
}

// --------------------------------------------------------------- DELETE --

fn exec_delete(pager: &mut Pager, catalog: &mut Catalog, del: &Delete, params: &[Value]) -> Result<ExecResult> {
    let table = table_or_err(catalog, &del.table_name)?.clone();
    let tree = BTree::open(table.pk_index_root, true);
    let mut affected = 0u64;

    let where_clause = match &del.where_clause {
        Some(w) => Some(materialize_subqueries(w, pager, &*catalog, None, params)?),
        None => None,
    };

    let candidates: Vec<(Json, Location)> = tree
        .scan(pager)?
        .into_iter()
        .map(|(k, v)| Ok::<_, Error>((k, location_from_json(&v)?)))
        .collect::<Result<_>>()?;

    for (key, location) in candidates {
        let Some(values) = load_row(pager, &table.columns, location)? else { continue };
        let mut row = Row::default();
        for (c, v) in table.columns.iter().zip(values.iter()) {
            row.push(c.name.clone(), v.clone());
        }
        let matches = match &where_clause {
            Some(cond) => truthy(&eval_expr(cond, &row, params)?),
            None => true,
        };
        if !matches {
            continue;
        }

        enforce_restrict_or_cascade_children(pager, catalog, &table, &values)?;
        remove_row_everywhere(pager, catalog, &del.table_name, &key, location.0, location.1)?;
        affected += 1;
    }

    catalog.save(pager)?;
    Ok(ExecResult::RowsAffected(affected))
}

fn enforce_restrict_or_cascade_children(pager: &mut Pager, catalog: &mut Catalog, table: &TableDef, values: &[Value]) -> Result<()> {
    let child_tables: Vec<(String, ForeignKeyDef)> = catalog
        .tables()
        .filter(|t| t.name != table.name)
        .flat_map(|t| t.foreign_keys.iter().filter(|fk| fk.ref_table.eq_ignore_ascii_case(&table.name)).map(move |fk| (t.name.clone(), fk.clone())))
        .collect();

    for (child_name, fk) in child_tables {
        // The FK's ref_column need not be the parent's primary key, so the
        // comparison value is read out of the row being deleted by name.
        let ref_idx = table.column_index(&fk.ref_column)?;
        let ref_value = values[ref_idx].to_json();

        let child = catalog.get(&child_name).unwrap().clone();
        let fk_col_idx = child.column_index(&fk.column)?;
        let tree = BTree::open(child.pk_index_root, true);
        let rows: Vec<(Json, Location)> = tree
            .scan(pager)?
            .into_iter()
            .map(|(k, v)| Ok::<_, Error>((k, location_from_json(&v)?)))
            .collect::<Result<_>>()?;

        for (child_key, loc) in rows {
            let Some(child_values) = load_row(pager, &child.columns, loc)? else { continue };
            if child_values[fk_col_idx].to_json() != ref_value {
                continue;
            }
            match fk.on_delete {
                ForeignKeyAction::Restrict => {
                    return Err(Error::Constraint(format!(
                        "FOREIGN KEY constraint failed: row is referenced by {}.{}",
                        child.name, fk.column
                    )));
                }
                ForeignKeyAction::Cascade => {
                    enforce_restrict_or_cascade_children(pager, catalog, &child, &child_values)?;
                    remove_row_everywhere(pager, catalog, &child_name, &child_key, loc.0, loc.1)?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------- Introspection --

fn plan_label_for(catalog: &Catalog, stmt: &Statement) -> Result<String> {
    Ok(match stmt {
        Statement::Select(select) => {
            let table = table_or_err(catalog, &select.table_name)?;
            plan_select(select, table).label()
        }
        other => format!("FULL EXECUTION ({})", statement_name(other)),
    })
}

fn exec_explain(catalog: &Catalog, stmt: &Statement, _profile: bool) -> Result<ExecResult> {
    let mut row = Row::default();
    row.push("plan", Value::Text(plan_label_for(catalog, stmt)?));
    Ok(ExecResult::Rows(vec![row]))
}

fn exec_profile(pager: &mut Pager, catalog: &mut Catalog, stmt: &Statement, params: &[Value]) -> Result<ExecResult> {
    let label = plan_label_for(catalog, stmt)?;
    let start = std::time::Instant::now();
    let result = execute(pager, catalog, stmt, params)?;
    let elapsed = start.elapsed();
    let row_count = match &result {
        ExecResult::Rows(rows) => rows.len() as u64,
        ExecResult::RowsAffected(n) => *n,
        ExecResult::Message(_) => 0,
    };
    let mut row = Row::default();
    row.push("elapsed_ms", Value::Real(elapsed.as_secs_f64() * 1000.0));
    row.push("row_count", Value::Integer(row_count as i64));
    row.push("plan", Value::Text(label));
    Ok(ExecResult::Rows(vec![row]))
}

fn statement_name(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::CreateTable(_) => "CreateTable",
        Statement::DropTable { .. } => "DropTable",
        Statement::CreateIndex(_) => "CreateIndex",
        Statement::DropIndex { .. } => "DropIndex",
        Statement::AlterTableRename { .. } => "AlterTableRename",
        Statement::AlterTableRenameColumn { .. } => "AlterTableRenameColumn",
        Statement::AlterTableAddColumn { .. } => "AlterTableAddColumn",
        Statement::AlterTableRemoveColumn { .. } => "AlterTableRemoveColumn",
        Statement::Insert(_) => "Insert",
        Statement::Select(_) => "Select",
        Statement::Update(_) => "Update",
        Statement::Delete(_) => "Delete",
        Statement::Reindex { .. } => "Reindex",
        Statement::Explain { .. } => "Explain",
        Statement::Profile { .. } => "Profile",
        Statement::ShowTables => "ShowTables",
        Statement::ShowIndexes { .. } => "ShowIndexes",
        Statement::ShowStats => "ShowStats",
        Statement::Describe { .. } => "Describe",
        Statement::Begin => "Begin",
        Statement::Commit => "Commit",
        Statement::Rollback => "Rollback",
    }
}

fn exec_show_indexes(catalog: &Catalog, table_name: Option<&str>) -> Result<ExecResult> {
    let mut rows = Vec::new();
    for table in catalog.tables() {
        if let Some(filter) = table_name {
            if !table.name.eq_ignore_ascii_case(filter) {
                continue;
            }
        }
        for idx in &table.indexes {
            let mut row = Row::default();
            row.push("table", Value::Text(table.name.clone()));
            row.push("name", Value::Text(idx.name.clone()));
            row.push("columns", Value::Text(idx.columns.join(",")));
            row.push("unique", Value::Boolean(idx.unique));
            rows.push(row);
        }
    }
    Ok(ExecResult::Rows(rows))
}

fn exec_show_stats(pager: &mut Pager, catalog: &Catalog) -> Result<ExecResult> {
    let mut rows = Vec::new();
    let mut pages_row = Row::default();
    pages_row.push("stat", Value::Text("pages".into()));
    pages_row.push("value", Value::Text(pager.page_count().to_string()));
    rows.push(pages_row);

    for table in catalog.tables() {
        let tree = BTree::open(table.pk_index_root, true);
        let count = tree.scan(pager)?.len();
        let mut row = Row::default();
        row.push("stat", Value::Text(format!("{}.rows", table.name)));
        row.push("value", Value::Text(count.to_string()));
        rows.push(row);

        let mut idx_row = Row::default();
        idx_row.push("stat", Value::Text(format!("{}.indexes", table.name)));
        idx_row.push("value", Value::Text(table.indexes.len().to_string()));
        rows.push(idx_row);
    }
    Ok(ExecResult::Rows(rows))
}

fn exec_describe(catalog: &Catalog, table_name: &str) -> Result<ExecResult> {
    let table = table_or_err(catalog, table_name)?;
    let mut rows = Vec::new();
    for col in &table.columns {
        let mut row = Row::default();
        row.push("name", Value::Text(col.name.clone()));
        row.push("type", Value::Text(col.data_type.name().to_string()));
        row.push("primary_key", Value::Boolean(col.primary_key));
        row.push("not_null", Value::Boolean(col.not_null));
        row.push("unique", Value::Boolean(col.unique));
        rows.push(row);
    }
    Ok(ExecResult::Rows(rows))
}

