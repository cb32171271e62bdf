// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Output writers.
//!
//! Every writer accepts a batch of [`Record`]s and reports how many it
//! persisted. Nested values are JSON-encoded into a single cell; the
//! `source_url` and `page_type` provenance columns are always present.

pub mod file;
pub mod sql;

use async_trait::async_trait;
use serde::Serialize;
use smartspider::Record;
use std::path::PathBuf;
use thiserror::Error;

pub use file::{CsvWriter, JsonWriter, PrintWriter, TxtWriter};
pub use sql::{DbConfig, MySqlWriter, PostgresWriter, SqliteWriter};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid output configuration: {0}")]
    Config(String),
}

/// Per-batch status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub written: usize,
    pub destination: String,
}

/// Persists batches of records.
#[async_trait]
pub trait RecordWriter: Send {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError>;
}

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Print,
    Txt,
    Json,
    Csv,
    Sqlite,
    Mysql,
    Postgres,
}

impl OutputMode {
    pub fn default_path(&self) -> Option<&'static str> {
        match self {
            OutputMode::Txt => Some("output.txt"),
            OutputMode::Json => Some("output.json"),
            OutputMode::Csv => Some("output.csv"),
            OutputMode::Sqlite => Some("data.db"),
            OutputMode::Print | OutputMode::Mysql | OutputMode::Postgres => None,
        }
    }
}

/// Format plus destination.
#[derive(Debug, Clone, Default)]
pub struct OutputTarget {
    pub mode: OutputMode,
    pub path: Option<PathBuf>,
    pub db: DbConfig,
}

impl OutputTarget {
    fn path_or_default(&self) -> PathBuf {
        self.path
            .clone()
            .or_else(|| self.mode.default_path().map(PathBuf::from))
            .unwrap_or_default()
    }
}

/// Build the writer for a target.
pub fn open_writer(target: &OutputTarget) -> Result<Box<dyn RecordWriter>, WriteError> {
    Ok(match target.mode {
        OutputMode::Print => Box::new(PrintWriter::stdout()),
        OutputMode::Txt => Box::new(TxtWriter::new(target.path_or_default())),
        OutputMode::Json => Box::new(JsonWriter::new(target.path_or_default())),
        OutputMode::Csv => Box::new(CsvWriter::new(target.path_or_default())),
        OutputMode::Sqlite => Box::new(SqliteWriter::new(
            target.path_or_default(),
            target.db.table.clone(),
        )),
        OutputMode::Mysql => Box::new(MySqlWriter::new(target.db.require_database()?)),
        OutputMode::Postgres => Box::new(PostgresWriter::new(target.db.require_database()?)),
    })
}

/// Union of flattened columns in first-seen order, provenance last.
pub fn collect_columns(rows: &[Vec<(String, String)>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for (key, _) in row {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    for provenance in ["source_url", "page_type"] {
        if let Some(pos) = columns.iter().position(|c| c == provenance) {
            let col = columns.remove(pos);
            columns.push(col);
        }
    }
    columns
}

/// Cells of `row` in `columns` order, `None` where the row lacks a column.
pub fn cells(row: &[(String, String)], columns: &[String]) -> Vec<Option<String>> {
    columns
        .iter()
        .map(|c| row.iter().find(|(k, _)| k == c).map(|(_, v)| v.clone()))
        .collect()
}

/// Flattened rows plus their column set. Absent cells stay `None` so
/// database writers can store NULL.
pub fn tabulate_sparse(records: &[Record]) -> (Vec<String>, Vec<Vec<Option<String>>>) {
    let flat: Vec<Vec<(String, String)>> = records.iter().map(Record::flatten).collect();
    let columns = collect_columns(&flat);
    let rows = flat.iter().map(|row| cells(row, &columns)).collect();
    (columns, rows)
}

/// [`tabulate_sparse`] with absent cells as empty strings, for text formats.
pub fn tabulate(records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
    let (columns, rows) = tabulate_sparse(records);
    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect();
    (columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartspider::{FieldValue, PageType};

    #[test]
    fn test_tabulate_unions_columns_and_encodes_nested() {
        let mut a = Record::new("https://e.com/1", PageType::List);
        a.insert("title", "One".into());
        let mut b = Record::new("https://e.com/2", PageType::List);
        b.insert("price", FieldValue::Number(9.5));
        b.insert("tags", FieldValue::List(vec!["x".into(), "y".into()]));

        let (columns, rows) = tabulate(&[a, b]);
        assert_eq!(columns, vec!["title", "price", "tags", "source_url", "page_type"]);
        assert_eq!(rows[0], vec!["One", "", "", "https://e.com/1", "list"]);
        assert_eq!(rows[1], vec!["", "9.5", r#"["x","y"]"#, "https://e.com/2", "list"]);
    }

    #[test]
    fn test_tabulate_sparse_leaves_absent_cells_none() {
        let mut a = Record::new("https://e.com/1", PageType::News);
        a.insert("title", "One".into());
        a.insert("author", FieldValue::Text(String::new()));
        let mut b = Record::new("https://e.com/2", PageType::News);
        b.insert("title", "Two".into());

        let (columns, rows) = tabulate_sparse(&[a, b]);
        assert_eq!(columns, vec!["title", "author", "source_url", "page_type"]);
        // Extracted-but-empty differs from never extracted.
        assert_eq!(rows[0][1].as_deref(), Some(""));
        assert_eq!(rows[1][1], None);
        assert_eq!(rows[1][0].as_deref(), Some("Two"));
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(OutputMode::Csv.default_path(), Some("output.csv"));
        assert_eq!(OutputMode::Postgres.default_path(), None);
    }
}
