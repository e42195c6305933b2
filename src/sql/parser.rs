use crate::error::{Error, Result};
use crate::types::DataType;

use super::ast::*;
use super::lexer::{tokenize, Token};

pub fn parse_sql(sql: &str) -> Result<Statement> {
    let tokens = tokenize(sql)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmt = parser.parse_statement()?;
    parser.skip(&Token::Semicolon);
    parser.expect_eof()?;
    Ok(stmt)
}

/// Parses a bare expression (no surrounding statement), used to re-parse a
/// CHECK constraint's rendered text back into an `Expr` at enforcement time.
pub fn parse_expr_standalone(text: &str) -> Result<Expr> {
    let tokens = tokenize(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn skip(&mut self, tok: &Token) {
        if self.peek() == tok {
            self.advance();
        }
    }

    fn expect_eof(&self) -> Result<()> {
        if self.peek() == &Token::Eof {
            Ok(())
        } else {
            Err(Error::Parse(format!("unexpected trailing input near {:?}", self.peek())))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(Error::Parse(format!("expected {kw}, found {:?}", self.peek())))
        }
    }

    fn expect_token(&mut self, tok: Token) -> Result<()> {
        if self.peek() == &tok {
            self.advance();
            Ok(())
        } else {
            Err(Error::Parse(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            Token::Keyword(k) => Ok(k),
            other => Err(Error::Parse(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek().clone() {
            Token::Keyword(k) if k == "SELECT" => Ok(Statement::Select(Box::new(self.parse_select()?))),
            Token::Keyword(k) if k == "INSERT" => self.parse_insert(),
            Token::Keyword(k) if k == "UPDATE" => self.parse_update(),
            Token::Keyword(k) if k == "DELETE" => self.parse_delete(),
            Token::Keyword(k) if k == "CREATE" => self.parse_create(),
            Token::Keyword(k) if k == "DROP" => self.parse_drop(),
            Token::Keyword(k) if k == "ALTER" => self.parse_alter(),
            Token::Keyword(k) if k == "REINDEX" => {
                self.advance();
                let index_name = self.expect_ident()?;
                Ok(Statement::Reindex { index_name })
            }
            Token::Keyword(k) if k == "EXPLAIN" => {
                self.advance();
                Ok(Statement::Explain { stmt: Box::new(self.parse_statement()?) })
            }
            Token::Keyword(k) if k == "PROFILE" => {
                self.advance();
                Ok(Statement::Profile { stmt: Box::new(self.parse_statement()?) })
            }
            Token::Keyword(k) if k == "SHOW" => {
                self.advance();
                if self.eat_keyword("TABLES") {
                    Ok(Statement::ShowTables)
                } else if self.eat_keyword("INDEXES") {
                    let table_name = if self.eat_keyword("FROM") {
                        Some(self.expect_ident()?)
                    } else {
                        None
                    };
                    Ok(Statement::ShowIndexes { table_name })
                } else if self.eat_keyword("STATS") {
                    Ok(Statement::ShowStats)
                } else {
                    Err(Error::Parse("expected TABLES, INDEXES, or STATS after SHOW".into()))
                }
            }
            Token::Keyword(k) if k == "DESCRIBE" => {
                self.advance();
                Ok(Statement::Describe { table_name: self.expect_ident()? })
            }
            Token::Keyword(k) if k == "BEGIN" => {
                self.advance();
                self.skip(&Token::Keyword("TRANSACTION".into()));
                Ok(Statement::Begin)
            }
            Token::Keyword(k) if k == "COMMIT" => {
                self.advance();
                Ok(Statement::Commit)
            }
            Token::Keyword(k) if k == "ROLLBACK" => {
                self.advance();
                Ok(Statement::Rollback)
            }
            other => Err(Error::Parse(format!("unexpected token at start of statement: {other:?}"))),
        }
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword("CREATE")?;
        if self.eat_keyword("TABLE") {
            let if_not_exists = self.eat_keyword("IF") && {
                self.expect_keyword("NOT")?;
                self.expect_keyword("EXISTS")?;
                true
            };
            let table_name = self.expect_ident()?;
            self.expect_token(Token::LParen)?;
            let mut columns = Vec::new();
            let mut foreign_keys = Vec::new();
            let mut table_checks = Vec::new();
            let mut composite_pk: Option<Vec<String>> = None;
            loop {
                if self.is_keyword("FOREIGN") {
                    self.advance();
                    self.expect_keyword("KEY")?;
                    self.expect_token(Token::LParen)?;
                    let column = self.expect_ident()?;
                    self.expect_token(Token::RParen)?;
                    self.expect_keyword("REFERENCES")?;
                    let ref_table = self.expect_ident()?;
                    self.expect_token(Token::LParen)?;
                    let ref_column = self.expect_ident()?;
                    self.expect_token(Token::RParen)?;
                    let mut cascade = false;
                    if self.eat_keyword("ON") {
                        self.expect_keyword("DELETE")?;
                        if self.eat_keyword("CASCADE") {
                            cascade = true;
                        } else {
                            self.expect_keyword("RESTRICT")?;
                        }
                    }
                    foreign_keys.push(ForeignKeySpec { column, ref_table, ref_column, cascade });
                } else if self.is_keyword("CHECK") {
                    self.advance();
                    self.expect_token(Token::LParen)?;
                    let expr = self.parse_expr()?;
                    self.expect_token(Token::RParen)?;
                    table_checks.push(expr);
                } else if self.is_keyword("PRIMARY") {
                    self.advance();
                    self.expect_keyword("KEY")?;
                    self.expect_token(Token::LParen)?;
                    let mut cols = vec![self.expect_ident()?];
                    while self.peek() == &Token::Comma {
                        self.advance();
                        cols.push(self.expect_ident()?);
                    }
                    self.expect_token(Token::RParen)?;
                    composite_pk = Some(cols);
                } else {
                    columns.push(self.parse_column_spec()?);
                }
                if self.peek() == &Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect_token(Token::RParen)?;
            if let Some(pk_cols) = composite_pk {
                for name in &pk_cols {
                    let col = columns
                        .iter_mut()
                        .find(|c| c.name.eq_ignore_ascii_case(name))
                        .ok_or_else(|| Error::Parse(format!("PRIMARY KEY references unknown column '{name}'")))?;
                    col.primary_key = true;
                    col.not_null = true;
                }
            }
            Ok(Statement::CreateTable(CreateTable {
                table_name,
                columns,
                foreign_keys,
                table_checks,
                if_not_exists,
            }))
        } else {
            let unique = self.eat_keyword("UNIQUE");
            self.expect_keyword("INDEX")?;
            let if_not_exists = self.eat_keyword("IF") && {
                self.expect_keyword("NOT")?;
                self.expect_keyword("EXISTS")?;
                true
            };
            let index_name = self.expect_ident()?;
            self.expect_keyword("ON")?;
            let table_name = self.expect_ident()?;
            self.expect_token(Token::LParen)?;
            let mut columns = vec![self.expect_ident()?];
            while self.peek() == &Token::Comma {
                self.advance();
                columns.push(self.expect_ident()?);
            }
            self.expect_token(Token::RParen)?;
            Ok(Statement::CreateIndex(CreateIndex {
                index_name,
                table_name,
                columns,
                unique,
                if_not_exists,
            }))
        }
    }

    fn parse_column_spec(&mut self) -> Result<ColumnSpec> {
        let name = self.expect_ident()?;
        let type_name = self.expect_ident()?;
        let data_type = DataType::parse(&type_name)?;
        let mut spec = ColumnSpec {
            name,
            data_type,
            primary_key: false,
            not_null: false,
            unique: false,
            auto_increment: false,
            default: None,
            check: None,
        };
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                spec.primary_key = true;
                spec.not_null = true;
            } else if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                spec.not_null = true;
            } else if self.eat_keyword("UNIQUE") {
                spec.unique = true;
            } else if self.eat_keyword("AUTOINCREMENT") {
                spec.auto_increment = true;
            } else if self.eat_keyword("DEFAULT") {
                spec.default = Some(self.parse_primary()?);
            } else if self.eat_keyword("CHECK") {
                self.expect_token(Token::LParen)?;
                let expr = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                spec.check = Some(expr);
            } else {
                break;
            }
        }
        Ok(spec)
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword("DROP")?;
        if self.eat_keyword("TABLE") {
            let if_exists = self.eat_keyword("IF") && {
                self.expect_keyword("EXISTS")?;
                true
            };
            Ok(Statement::DropTable { table_name: self.expect_ident()?, if_exists })
        } else {
            self.expect_keyword("INDEX")?;
            let if_exists = self.eat_keyword("IF") && {
                self.expect_keyword("EXISTS")?;
                true
            };
            Ok(Statement::DropIndex { index_name: self.expect_ident()?, if_exists })
        }
    }

    fn parse_alter(&mut self) -> Result<Statement> {
        self.expect_keyword("ALTER")?;
        self.expect_keyword("TABLE")?;
        let table_name = self.expect_ident()?;
        if self.eat_keyword("RENAME") {
            if self.eat_keyword("COLUMN") {
                let old_name = self.expect_ident()?;
                self.expect_keyword("TO")?;
                let new_name = self.expect_ident()?;
                Ok(Statement::AlterTableRenameColumn { table_name, old_name, new_name })
            } else {
                self.expect_keyword("TO")?;
                let new_name = self.expect_ident()?;
                Ok(Statement::AlterTableRename { table_name, new_name })
            }
        } else if self.eat_keyword("ADD") {
            self.skip(&Token::Keyword("COLUMN".into()));
            let column = self.parse_column_spec()?;
            Ok(Statement::AlterTableAddColumn { table_name, column })
        } else if self.eat_keyword("DROP") {
            self.skip(&Token::Keyword("COLUMN".into()));
            let column_name = self.expect_ident()?;
            Ok(Statement::AlterTableRemoveColumn { table_name, column_name })
        } else {
            Err(Error::Parse("expected RENAME, ADD, or DROP after ALTER TABLE".into()))
        }
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INSERT")?;
        let or_replace = self.eat_keyword("OR") && {
            self.expect_keyword("REPLACE")?;
            true
        };
        self.expect_keyword("INTO")?;
        let table_name = self.expect_ident()?;
        let columns = if self.peek() == &Token::LParen {
            self.advance();
            let mut cols = vec![self.expect_ident()?];
            while self.peek() == &Token::Comma {
                self.advance();
                cols.push(self.expect_ident()?);
            }
            self.expect_token(Token::RParen)?;
            Some(cols)
        } else {
            None
        };
        self.expect_keyword("VALUES")?;
        let mut values = vec![self.parse_value_tuple()?];
        while self.peek() == &Token::Comma {
            self.advance();
            values.push(self.parse_value_tuple()?);
        }
        Ok(Statement::Insert(Insert { table_name, columns, values, or_replace }))
    }

    fn parse_value_tuple(&mut self) -> Result<Vec<Expr>> {
        self.expect_token(Token::LParen)?;
        let mut values = vec![self.parse_expr()?];
        while self.peek() == &Token::Comma {
            self.advance();
            values.push(self.parse_expr()?);
        }
        self.expect_token(Token::RParen)?;
        Ok(values)
    }

    fn parse_update(&mut self) -> Result<Statement> {
        self.expect_keyword("UPDATE")?;
        let table_name = self.expect_ident()?;
        self.expect_keyword("SET")?;
        let mut assignments = vec![self.parse_assignment()?];
        while self.peek() == &Token::Comma {
            self.advance();
            assignments.push(self.parse_assignment()?);
        }
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Update(Update { table_name, assignments, where_clause }))
    }

    fn parse_assignment(&mut self) -> Result<(String, Expr)> {
        let name = self.expect_ident()?;
        self.expect_token(Token::Eq)?;
        let expr = self.parse_expr()?;
        Ok((name, expr))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table_name = self.expect_ident()?;
        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Statement::Delete(Delete { table_name, where_clause }))
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");
        let mut columns = vec![self.parse_select_column()?];
        while self.peek() == &Token::Comma {
            self.advance();
            columns.push(self.parse_select_column()?);
        }
        self.expect_keyword("FROM")?;
        let table_name = self.expect_ident()?;
        let table_alias = self.parse_optional_alias()?;

        let mut joins = Vec::new();
        loop {
            let join_type = if self.eat_keyword("INNER") {
                self.expect_keyword("JOIN")?;
                JoinType::Inner
            } else if self.eat_keyword("LEFT") {
                self.skip(&Token::Keyword("OUTER".into()));
                self.expect_keyword("JOIN")?;
                JoinType::Left
            } else if self.eat_keyword("CROSS") {
                self.expect_keyword("JOIN")?;
                JoinType::Cross
            } else if self.eat_keyword("JOIN") {
                JoinType::Inner
            } else {
                break;
            };
            let join_table = self.expect_ident()?;
            let alias = self.parse_optional_alias()?;
            let on_condition = if join_type != JoinType::Cross {
                self.expect_keyword("ON")?;
                Some(self.parse_expr()?)
            } else {
                None
            };
            joins.push(JoinClause { join_type, table_name: join_table, alias, on_condition });
        }

        let where_clause = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            let mut exprs = vec![self.parse_expr()?];
            while self.peek() == &Token::Comma {
                self.advance();
                exprs.push(self.parse_expr()?);
            }
            exprs
        } else {
            Vec::new()
        };

        let having = if self.eat_keyword("HAVING") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let mut items = vec![self.parse_order_item()?];
            while self.peek() == &Token::Comma {
                self.advance();
                items.push(self.parse_order_item()?);
            }
            Some(items)
        } else {
            None
        };

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.parse_u64_literal()?)
        } else {
            None
        };
        let offset = if self.eat_keyword("OFFSET") {
            Some(self.parse_u64_literal()?)
        } else {
            None
        };

        Ok(Select {
            distinct,
            columns,
            table_name,
            table_alias,
            joins,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
        })
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.eat_keyword("AS") {
            Ok(Some(self.expect_ident()?))
        } else if matches!(self.peek(), Token::Ident(_)) {
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    fn parse_u64_literal(&mut self) -> Result<u64> {
        match self.advance() {
            Token::Int(v) if v >= 0 => Ok(v as u64),
            other => Err(Error::Parse(format!("expected non-negative integer, found {other:?}"))),
        }
    }

    fn parse_order_item(&mut self) -> Result<OrderByItem> {
        let expr = self.parse_expr()?;
        let descending = if self.eat_keyword("DESC") {
            true
        } else {
            self.eat_keyword("ASC");
            false
        };
        Ok(OrderByItem { expr, descending })
    }

    fn parse_select_column(&mut self) -> Result<SelectColumn> {
        if self.peek() == &Token::Star {
            self.advance();
            return Ok(SelectColumn::Star);
        }
        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;
        Ok(SelectColumn::Expr(expr, alias))
    }

    // Expr grammar, lowest to highest precedence:
    // or -> and -> not -> comparison (incl. LIKE/IN/BETWEEN/IS NULL) -> additive -> multiplicative -> unary -> primary
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::Or, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            left = Expr::BinaryOp { left: Box::new(left), op: BinaryOp::And, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            let operand = self.parse_not()?;
            Ok(Expr::UnaryOp { op: UnaryOp::Not, operand: Box::new(operand) })
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let expr = self.parse_additive()?;

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Expr::IsNull { expr: Box::new(expr), negated });
        }

        let negated_prefix = self.eat_keyword("NOT");
        if self.eat_keyword("LIKE") {
            let pattern = self.parse_additive()?;
            return Ok(Expr::Like { expr: Box::new(expr), pattern: Box::new(pattern), negated: negated_prefix });
        }
        if self.eat_keyword("BETWEEN") {
            let low = self.parse_additive()?;
            self.expect_keyword("AND")?;
            let high = self.parse_additive()?;
            return Ok(Expr::Between { expr: Box::new(expr), low: Box::new(low), high: Box::new(high), negated: negated_prefix });
        }
        if self.eat_keyword("IN") {
            self.expect_token(Token::LParen)?;
            if self.is_keyword("SELECT") {
                let subquery = self.parse_select()?;
                self.expect_token(Token::RParen)?;
                return Ok(Expr::InSubquery {
                    expr: Box::new(expr),
                    subquery: Box::new(subquery),
                    negated: negated_prefix,
                });
            }
            let mut list = vec![self.parse_expr()?];
            while self.peek() == &Token::Comma {
                self.advance();
                list.push(self.parse_expr()?);
            }
            self.expect_token(Token::RParen)?;
            return Ok(Expr::InList { expr: Box::new(expr), list, negated: negated_prefix });
        }
        if negated_prefix {
            return Err(Error::Parse("expected LIKE, IN, or BETWEEN after NOT".into()));
        }

        let op = match self.peek() {
            Token::Eq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            Token::Lt => Some(BinaryOp::Lt),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Le => Some(BinaryOp::Le),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::BinaryOp { left: Box::new(expr), op, right: Box::new(right) });
        }
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinaryOp { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == &Token::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::UnaryOp { op: UnaryOp::Neg, operand: Box::new(operand) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(v) => Ok(Expr::IntLiteral(v)),
            Token::Real(v) => Ok(Expr::RealLiteral(v)),
            Token::String(s) => Ok(Expr::StringLiteral(s)),
            Token::Blob(b) => Ok(Expr::BlobLiteral(b)),
            Token::Param => Ok(Expr::Param(0)), // index assigned later by the binder
            Token::Keyword(k) if k == "NULL" => Ok(Expr::Null),
            Token::Keyword(k) if k == "TRUE" => Ok(Expr::BoolLiteral(true)),
            Token::Keyword(k) if k == "FALSE" => Ok(Expr::BoolLiteral(false)),
            Token::Keyword(k) if ["COUNT", "SUM", "AVG", "MIN", "MAX"].contains(&k.as_str()) => {
                self.expect_token(Token::LParen)?;
                let distinct = self.eat_keyword("DISTINCT");
                let arg = if self.peek() == &Token::Star {
                    self.advance();
                    None
                } else {
                    Some(Box::new(self.parse_expr()?))
                };
                self.expect_token(Token::RParen)?;
                Ok(Expr::AggregateFunc { name: k, arg, distinct })
            }
            Token::Keyword(k) if k == "ROUND" => {
                self.expect_token(Token::LParen)?;
                let mut args = vec![self.parse_expr()?];
                while self.peek() == &Token::Comma {
                    self.advance();
                    args.push(self.parse_expr()?);
                }
                self.expect_token(Token::RParen)?;
                Ok(Expr::FunctionCall { name: k, args })
            }
            Token::Keyword(k) if k == "CASE" => {
                let operand = if self.is_keyword("WHEN") { None } else { Some(Box::new(self.parse_expr()?)) };
                let mut when_clauses = Vec::new();
                while self.eat_keyword("WHEN") {
                    let cond = self.parse_expr()?;
                    self.expect_keyword("THEN")?;
                    let then = self.parse_expr()?;
                    when_clauses.push((cond, then));
                }
                if when_clauses.is_empty() {
                    return Err(Error::Parse("expected at least one WHEN clause in CASE".into()));
                }
                let else_clause = if self.eat_keyword("ELSE") {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                self.expect_keyword("END")?;
                Ok(Expr::CaseWhen { operand, when_clauses, else_clause })
            }
            Token::LParen => {
                if self.is_keyword("SELECT") {
                    let subquery = self.parse_select()?;
                    self.expect_token(Token::RParen)?;
                    return Ok(Expr::ScalarSubquery(Box::new(subquery)));
                }
                let expr = self.parse_expr()?;
                self.expect_token(Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => {
                if self.peek() == &Token::Dot {
                    self.advance();
                    let col = self.expect_ident()?;
                    Ok(Expr::ColumnRef(format!("{name}.{col}")))
                } else {
                    Ok(Expr::ColumnRef(name))
                }
            }
            other => Err(Error::Parse(format!("unexpected token in expression: {other:?}"))),
        }
    }
}

/// Assigns sequential indices (0, 1, 2, ...) to every `Expr::Param(_)` node
/// in left-to-right occurrence order, matching positional `?` binding.
pub fn number_params(stmt: &mut Statement) -> usize {
    let mut counter = 0usize;
    number_params_stmt(stmt, &mut counter);
    counter
}

fn number_params_stmt(stmt: &mut Statement, counter: &mut usize) {
    match stmt {
        Statement::Insert(ins) => {
            for tuple in &mut ins.values {
                for e in tuple {
                    number_params_expr(e, counter);
                }
            }
        }
        Statement::Update(u) => {
            for (_, e) in &mut u.assignments {
                number_params_expr(e, counter);
            }
            if let Some(w) = &mut u.where_clause {
                number_params_expr(w, counter);
            }
        }
        Statement::Delete(d) => {
            if let Some(w) = &mut d.where_clause {
                number_params_expr(w, counter);
            }
        }
        Statement::Select(s) => number_params_select(s, counter),
        Statement::Explain { stmt } | Statement::Profile { stmt } => {
            number_params_stmt(stmt, counter)
        }
        _ => {}
    }
}

fn number_params_select(select: &mut Select, counter: &mut usize) {
    for col in &mut select.columns {
        if let SelectColumn::Expr(e, _) = col {
            number_params_expr(e, counter);
        }
    }
    for join in &mut select.joins {
        if let Some(on) = &mut join.on_condition {
            number_params_expr(on, counter);
        }
    }
    if let Some(w) = &mut select.where_clause {
        number_params_expr(w, counter);
    }
    for e in &mut select.group_by {
        number_params_expr(e, counter);
    }
    if let Some(h) = &mut select.having {
        number_params_expr(h, counter);
    }
    if let Some(items) = &mut select.order_by {
        for item in items {
            number_params_expr(&mut item.expr, counter);
        }
    }
}

fn number_params_expr(expr: &mut Expr, counter: &mut usize) {
    match expr {
        Expr::Param(idx) => {
            *idx = *counter;
            *counter += 1;
        }
        Expr::BinaryOp { left, right, .. } => {
            number_params_expr(left, counter);
            number_params_expr(right, counter);
        }
        Expr::UnaryOp { operand, .. } => number_params_expr(operand, counter),
        Expr::Like { expr, pattern, .. } => {
            number_params_expr(expr, counter);
            number_params_expr(pattern, counter);
        }
        Expr::InList { expr, list, .. } => {
            number_params_expr(expr, counter);
            for e in list {
                number_params_expr(e, counter);
            }
        }
        Expr::Between { expr, low, high, .. } => {
            number_params_expr(expr, counter);
            number_params_expr(low, counter);
            number_params_expr(high, counter);
        }
        Expr::IsNull { expr, .. } => number_params_expr(expr, counter),
        Expr::AggregateFunc { arg: Some(arg), .. } => number_params_expr(arg, counter),
        Expr::CaseWhen { operand, when_clauses, else_clause } => {
            if let Some(op) = operand {
                number_params_expr(op, counter);
            }
            for (cond, then) in when_clauses {
                number_params_expr(cond, counter);
                number_params_expr(then, counter);
            }
            if let Some(e) = else_clause {
                number_params_expr(e, counter);
            }
        }
        Expr::FunctionCall { args, .. } => {
            for a in args {
                number_params_expr(a, counter);
            }
        }
        Expr::InSubquery { expr, subquery, .. } => {
            number_params_expr(expr, counter);
            number_params_select(subquery, counter);
        }
        Expr::ScalarSubquery(subquery) => number_params_select(subquery, counter),
        _ => {}
    }
}
