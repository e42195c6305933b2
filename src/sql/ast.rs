use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral(i64),
    RealLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),
    BlobLiteral(Vec<u8>),
    Null,
    ColumnRef(String),
    Param(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    AggregateFunc {
        name: String,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// Searched or simple `CASE`. `operand` is `Some` for `CASE x WHEN ...`
    /// form, `None` for `CASE WHEN cond ...`.
    CaseWhen {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
    /// Scalar function call. Only `ROUND` is currently evaluated; any other
    /// name reaching `eval::eval_expr` is an execution error.
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    /// `expr (NOT) IN (SELECT ...)`, resolved away before evaluation by
    /// `executor::materialize_subqueries`.
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    /// `(SELECT ...)` used where a single value is expected, e.g.
    /// `col =_SUBQUERY (...)`. Resolved away the same way as `InSubquery`.
    ScalarSubquery(Box<Select>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub auto_increment: bool,
    pub default: Option<Expr>,
    pub check: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ForeignKeySpec {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
    pub cascade: bool,
}

#[derive(Debug, Clone)]
pub struct CreateTable {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
    pub foreign_keys: Vec<ForeignKeySpec>,
    /// Table-level `CHECK (...)` clauses, as opposed to a single column's
    /// inline `CHECK`. Evaluated against the whole candidate row.
    pub table_checks: Vec<Expr>,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone)]
pub struct CreateIndex {
    pub index_name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table_name: String,
    pub alias: Option<String>,
    pub on_condition: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum SelectColumn {
    Star,
    Expr(Expr, Option<String>),
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Debug, Clone)]
pub struct Select {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub table_name: String,
    pub table_alias: Option<String>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Option<Vec<OrderByItem>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub table_name: String,
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expr>>,
    pub or_replace: bool,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub table_name: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Delete {
    pub table_name: String,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable(CreateTable),
    DropTable {
        table_name: String,
        if_exists: bool,
    },
    CreateIndex(CreateIndex),
    DropIndex {
        index_name: String,
        if_exists: bool,
    },
    AlterTableRename {
        table_name: String,
        new_name: String,
    },
    AlterTableRenameColumn {
        table_name: String,
        old_name: String,
        new_name: String,
    },
    AlterTableAddColumn {
        table_name: String,
        column: ColumnSpec,
    },
    AlterTableRemoveColumn {
        table_name: String,
        column_name: String,
    },
    Insert(Insert),
    Select(Box<Select>),
    Update(Update),
    Delete(Delete),
    Reindex {
        index_name: String,
    },
    Explain {
        stmt: Box<Statement>,
    },
    Profile {
        stmt: Box<Statement>,
    },
    ShowTables,
    ShowIndexes {
        table_name: Option<String>,
    },
    ShowStats,
    Describe {
        table_name: String,
    },
    Begin,
    Commit,
    Rollback,
}

/// Renders an `Expr` back to SQL text that `parser::parse_expr_standalone`
/// can re-parse. Used to persist CHECK constraints in the catalog as plain
/// strings (same storage shape as every other schema field) rather than
/// carrying a serializable AST around.
pub fn expr_to_sql(expr: &Expr) -> String {
    match expr {
        Expr::IntLiteral(v) => v.to_string(),
        Expr::RealLiteral(v) => v.to_string(),
        Expr::StringLiteral(v) => format!("'{}'", v.replace('\'', "''")),
        Expr::BoolLiteral(v) => v.to_string().to_ascii_uppercase(),
        Expr::BlobLiteral(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("x'{hex}'")
        }
        Expr::Null => "NULL".to_string(),
        Expr::ColumnRef(name) => name.clone(),
        Expr::Param(_) => "?".to_string(),
        Expr::BinaryOp { left, op, right } => {
            format!("({} {} {})", expr_to_sql(left), binary_op_sql(*op), expr_to_sql(right))
        }
        Expr::UnaryOp { op: UnaryOp::Not, operand } => format!("(NOT {})", expr_to_sql(operand)),
        Expr::UnaryOp { op: UnaryOp::Neg, operand } => format!("(-{})", expr_to_sql(operand)),
        Expr::Like { expr, pattern, negated } => {
            format!("({} {}LIKE {})", expr_to_sql(expr), if *negated { "NOT " } else { "" }, expr_to_sql(pattern))
        }
        Expr::InList { expr, list, negated } => {
            let items: Vec<String> = list.iter().map(expr_to_sql).collect();
            format!("({} {}IN ({}))", expr_to_sql(expr), if *negated { "NOT " } else { "" }, items.join(", "))
        }
        Expr::Between { expr, low, high, negated } => {
            format!(
                "({} {}BETWEEN {} AND {})",
                expr_to_sql(expr),
                if *negated { "NOT " } else { "" },
                expr_to_sql(low),
                expr_to_sql(high)
            )
        }
        Expr::IsNull { expr, negated } => {
            format!("({} IS {}NULL)", expr_to_sql(expr), if *negated { "NOT " } else { "" })
        }
        Expr::AggregateFunc { name, arg, distinct } => match arg {
            Some(a) => format!("{name}({}{})", if *distinct { "DISTINCT " } else { "" }, expr_to_sql(a)),
            None => format!("{name}(*)"),
        },
        Expr::CaseWhen { operand, when_clauses, else_clause } => {
            let mut s = "CASE".to_string();
            if let Some(op) = operand {
                s.push(' ');
                s.push_str(&expr_to_sql(op));
            }
            for (cond, then) in when_clauses {
                s.push_str(&format!(" WHEN {} THEN {}", expr_to_sql(cond), expr_to_sql(then)));
            }
            if let Some(e) = else_clause {
                s.push_str(&format!(" ELSE {}", expr_to_sql(e)));
            }
            s.push_str(" END");
            s
        }
        Expr::FunctionCall { name, args } => {
            let items: Vec<String> = args.iter().map(expr_to_sql).collect();
            format!("{name}({})", items.join(", "))
        }
        Expr::InSubquery { expr, subquery, negated } => {
            format!("({} {}IN ({}))", expr_to_sql(expr), if *negated { "NOT " } else { "" }, select_to_sql(subquery))
        }
        Expr::ScalarSubquery(select) => format!("({})", select_to_sql(select)),
    }
}

/// Best-effort re-rendering of a `Select` for embedding inside a subquery
/// expression's SQL text. CHECK constraints never legitimately contain
/// subqueries, so this only needs to round-trip well enough for the
/// resolver's own re-parse of a stored CHECK; it is not exercised by any
/// other path.
fn select_to_sql(select: &Select) -> String {
    let mut s = String::from("SELECT ");
    if select.distinct {
        s.push_str("DISTINCT ");
    }
    let cols: Vec<String> = select
        .columns
        .iter()
        .map(|c| match c {
            SelectColumn::Star => "*".to_string(),
            SelectColumn::Expr(e, Some(alias)) => format!("{} AS {}", expr_to_sql(e), alias),
            SelectColumn::Expr(e, None) => expr_to_sql(e),
        })
        .collect();
    s.push_str(&cols.join(", "));
    s.push_str(" FROM ");
    s.push_str(&select.table_name);
    if let Some(alias) = &select.table_alias {
        s.push_str(&format!(" AS {alias}"));
    }
    for join in &select.joins {
        let jt = match join.join_type {
            JoinType::Inner => "JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Cross => "CROSS JOIN",
        };
        s.push_str(&format!(" {jt} {}", join.table_name));
        if let Some(a) = &join.alias {
            s.push_str(&format!(" AS {a}"));
        }
        if let Some(on) = &join.on_condition {
            s.push_str(&format!(" ON {}", expr_to_sql(on)));
        }
    }
    if let Some(w) = &select.where_clause {
        s.push_str(&format!(" WHERE {}", expr_to_sql(w)));
    }
    if !select.group_by.is_empty() {
        let gb: Vec<String> = select.group_by.iter().map(expr_to_sql).collect();
        s.push_str(&format!(" GROUP BY {}", gb.join(", ")));
    }
    if let Some(h) = &select.having {
        s.push_str(&format!(" HAVING {}", expr_to_sql(h)));
    }
    if let Some(items) = &select.order_by {
        let ob: Vec<String> = items
            .iter()
            .map(|i| format!("{} {}", expr_to_sql(&i.expr), if i.descending { "DESC" } else { "ASC" }))
            .collect();
        s.push_str(&format!(" ORDER BY {}", ob.join(", ")));
    }
    if let Some(l) = select.limit {
        s.push_str(&format!(" LIMIT {l}"));
    }
    if let Some(o) = select.offset {
        s.push_str(&format!(" OFFSET {o}"));
    }
    s
}

fn binary_op_sql(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
    }
}
