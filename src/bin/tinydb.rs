use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use tinydb::sql::ExecResult;
use tinydb::types::Value;
use tinydb::Database;

/// Batch-mode scripting front door. No REPL loop (no readline history, no
/// line editing) — it runs one statement and exits, which is the whole of
/// the ambient CLI surface this crate needs.
#[derive(Parser)]
#[command(name = "tinydb", about = "tinydb - embedded single-file SQL database")]
struct Cli {
    /// Path to the database file, created if it does not already exist.
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one SQL statement against the database and print its result.
    Exec {
        sql: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut db = match Database::open(&cli.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("ERROR: failed to open {}: {e}", cli.db_path.display());
            process::exit(1);
        }
    };

    let Command::Exec { sql } = cli.command;
    match db.execute(&sql, &[]) {
        Ok(result) => println!("{}", format_result(&result)),
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    }

    if let Err(e) = db.close() {
        eprintln!("ERROR: failed to flush database: {e}");
        process::exit(1);
    }
}

fn format_result(result: &ExecResult) -> String {
    match result {
        ExecResult::Message(msg) => msg.clone(),
        ExecResult::RowsAffected(n) => format!("Query OK, {n} row(s) affected"),
        ExecResult::Rows(rows) => {
            if rows.is_empty() {
                return "Empty set".to_string();
            }
            let columns: Vec<&str> = rows[0].columns.iter().map(|(name, _)| name.as_str()).collect();
            let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
            for row in rows {
                for (i, (_, val)) in row.columns.iter().enumerate() {
                    widths[i] = widths[i].max(format_value(val).len());
                }
            }

            let separator: String =
                widths.iter().map(|w| format!("+{}", "-".repeat(w + 2))).collect::<String>() + "+";

            let mut out = String::new();
            out.push_str(&separator);
            out.push('\n');
            out.push_str("| ");
            out.push_str(
                &columns
                    .iter()
                    .zip(widths.iter())
                    .map(|(name, w)| format!("{name:<w$} | "))
                    .collect::<String>(),
            );
            out.pop();
            out.push('\n');
            out.push_str(&separator);
            out.push('\n');
            for row in rows {
                out.push_str("| ");
                out.push_str(
                    &row.columns
                        .iter()
                        .zip(widths.iter())
                        .map(|((_, v), w)| format!("{:<w$} | ", format_value(v)))
                        .collect::<String>(),
                );
                out.pop();
                out.push('\n');
            }
            out.push_str(&separator);
            out.push('\n');
            out.push_str(&format!("{} row(s) in set", rows.len()));
            out
        }
    }
}

fn format_value(val: &Value) -> String {
    match val {
        Value::Blob(b) => format!("0x{}", b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
        other => other.to_string(),
    }
}
