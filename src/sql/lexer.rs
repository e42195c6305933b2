use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Keyword(String),
    Int(i64),
    Real(f64),
    String(String),
    Blob(Vec<u8>),
    Param,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Eof,
}

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE", "CREATE",
    "TABLE", "DROP", "ALTER", "ADD", "COLUMN", "RENAME", "TO", "INDEX", "UNIQUE", "NOT", "NULL",
    "PRIMARY", "KEY", "DEFAULT", "CHECK", "FOREIGN", "REFERENCES", "ON", "CASCADE", "RESTRICT",
    "AND", "OR", "LIKE", "IN", "BETWEEN", "IS", "ORDER", "BY", "GROUP", "HAVING", "LIMIT",
    "OFFSET", "ASC", "DESC", "JOIN", "INNER", "LEFT", "CROSS", "AS", "DISTINCT", "BEGIN",
    "COMMIT", "ROLLBACK", "TRANSACTION", "IF", "EXISTS", "EXPLAIN", "PROFILE", "SHOW", "TABLES",
    "INDEXES", "STATS", "DESCRIBE", "REINDEX", "AUTOINCREMENT", "REPLACE", "OR", "TRUE", "FALSE",
    "COUNT", "SUM", "AVG", "MIN", "MAX", "CASE", "WHEN", "THEN", "ELSE", "END", "ROUND",
];

pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '=' => {
                out.push(Token::Eq);
                i += 1;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Token::Le);
                    i += 2;
                } else if chars.get(i + 1) == Some(&'>') {
                    out.push(Token::Ne);
                    i += 2;
                } else {
                    out.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Token::Ge);
                    i += 2;
                } else {
                    out.push(Token::Gt);
                    i += 1;
                }
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                out.push(Token::Ne);
                i += 2;
            }
            '+' => {
                out.push(Token::Plus);
                i += 1;
            }
            '-' => {
                out.push(Token::Minus);
                i += 1;
            }
            '*' => {
                out.push(Token::Star);
                i += 1;
            }
            '/' => {
                out.push(Token::Slash);
                i += 1;
            }
            '%' => {
                out.push(Token::Percent);
                i += 1;
            }
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            ',' => {
                out.push(Token::Comma);
                i += 1;
            }
            '.' => {
                out.push(Token::Dot);
                i += 1;
            }
            ';' => {
                out.push(Token::Semicolon);
                i += 1;
            }
            '?' => {
                out.push(Token::Param);
                i += 1;
            }
            '\'' => {
                let (s, next) = read_quoted_string(&chars, i)?;
                out.push(Token::String(s));
                i = next;
            }
            'x' | 'X' if chars.get(i + 1) == Some(&'\'') => {
                let (s, next) = read_quoted_string(&chars, i + 1)?;
                let bytes = hex_decode(&s)?;
                out.push(Token::Blob(bytes));
                i = next;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                let mut is_real = false;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    if chars[i] == '.' {
                        is_real = true;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if is_real {
                    out.push(Token::Real(text.parse().map_err(|_| {
                        Error::Parse(format!("invalid numeric literal '{text}'"))
                    })?));
                } else {
                    out.push(Token::Int(text.parse().map_err(|_| {
                        Error::Parse(format!("invalid numeric literal '{text}'"))
                    })?));
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let upper = text.to_ascii_uppercase();
                if KEYWORDS.contains(&upper.as_str()) {
                    out.push(Token::Keyword(upper));
                } else {
                    out.push(Token::Ident(text));
                }
            }
            other => return Err(Error::Parse(format!("unexpected character '{other}'"))),
        }
    }
    out.push(Token::Eof);
    Ok(out)
}

/// Reads a `'...'` string starting at the opening quote, honoring `''` as an
/// escaped literal quote. Returns the unescaped contents and the index just
/// past the closing quote.
fn read_quoted_string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut i = start + 1;
    let mut out = String::new();
    loop {
        if i >= chars.len() {
            return Err(Error::Parse("unterminated string literal".into()));
        }
        if chars[i] == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                out.push('\'');
                i += 2;
                continue;
            }
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
}

fn hex_decode(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(Error::Parse("blob literal must have an even number of hex digits".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| Error::Parse("invalid hex digit in blob literal".into())))
        .collect()
}
