use super::ast::{BinaryOp, Expr, Select};
use crate::schema::TableDef;

/// A plan choice, surfaced verbatim to EXPLAIN/PROFILE as the label names
/// below. Selection is a handful of fast-path checks, not a cost-based
/// optimizer: PK/secondary-index equality beats an ORDER BY-satisfying
/// index scan beats a full table scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    PkLookup { key_expr: Box<Expr> },
    SecondaryIndexLookup { index_name: String, key_expr: Box<Expr> },
    IndexOrderScan { index_name: String },
    NestedLoopJoin,
    FullTableScan,
}

impl Plan {
    pub fn label(&self) -> String {
        match self {
            Plan::PkLookup { .. } => "PK INDEX LOOKUP".to_string(),
            Plan::SecondaryIndexLookup { .. } => "SECONDARY INDEX LOOKUP".to_string(),
            Plan::IndexOrderScan { .. } => "INDEX ORDER SCAN".to_string(),
            Plan::NestedLoopJoin => "NESTED LOOP JOIN".to_string(),
            Plan::FullTableScan => "FULL TABLE SCAN".to_string(),
        }
    }
}

/// Pulls an equality comparison `column = literal-ish-expr` out of a WHERE
/// clause, looking only at the top level and at the first-level ANDs (this
/// crate does not attempt to plan through OR).
fn extract_equality<'e>(expr: &'e Expr, column: &str) -> Option<&'e Expr> {
    match expr {
        Expr::BinaryOp { left, op: BinaryOp::Eq, right } => {
            if let Expr::ColumnRef(name) = left.as_ref() {
                if name.eq_ignore_ascii_case(column) || name.rsplit('.').next() == Some(column) {
                    return Some(right);
                }
            }
            if let Expr::ColumnRef(name) = right.as_ref() {
                if name.eq_ignore_ascii_case(column) || name.rsplit('.').next() == Some(column) {
                    return Some(left);
                }
            }
            None
        }
        Expr::BinaryOp { left, op: BinaryOp::And, right } => {
            extract_equality(left, column).or_else(|| extract_equality(right, column))
        }
        _ => None,
    }
}

pub fn plan_select(select: &Select, table: &TableDef) -> Plan {
    if !select.joins.is_empty() {
        return Plan::NestedLoopJoin;
    }

    if let Some(where_clause) = &select.where_clause {
        for pk in table.pk_columns() {
            if let Some(key_expr) = extract_equality(where_clause, &pk.name) {
                return Plan::PkLookup { key_expr: Box::new(key_expr.clone()) };
            }
        }
        for idx in &table.indexes {
            if idx.columns.len() == 1 {
                if let Some(key_expr) = extract_equality(where_clause, &idx.columns[0]) {
                    return Plan::SecondaryIndexLookup {
                        index_name: idx.name.clone(),
                        key_expr: Box::new(key_expr.clone()),
                    };
                }
            }
        }
    }

    if let Some(order_by) = &select.order_by {
        if order_by.len() == 1 {
            if let Expr::ColumnRef(name) = &order_by[0].expr {
                if let Some(idx) = table.index_on(name) {
                    return Plan::IndexOrderScan { index_name: idx.name.clone() };
                }
            }
        }
    }

    Plan::FullTableScan
}
