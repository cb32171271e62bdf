// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Relational writers: SQLite via rusqlite, PostgreSQL and MySQL via sqlx.
//!
//! Every column is stored as text, and a cell the record lacks is NULL. The
//! table is created on first write and gains a column whenever a batch
//! carries a field it has not seen before.

use super::{tabulate_sparse, RecordWriter, WriteError, WriteReport};
use async_trait::async_trait;
use rusqlite::Connection;
use smartspider::Record;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TABLE: &str = "smartspider_records";

/// Connection settings shared by the server-backed writers.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: None,
            user: None,
            password: None,
            database: None,
            table: DEFAULT_TABLE.into(),
        }
    }
}

impl DbConfig {
    /// Fails when no database name was given.
    pub fn require_database(&self) -> Result<DbConfig, WriteError> {
        match self.database.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(self.clone()),
            _ => Err(WriteError::Config(
                "a database name is required (--db-name)".into(),
            )),
        }
    }

    fn database_name(&self) -> &str {
        self.database.as_deref().unwrap_or_default()
    }

    fn describe(&self, default_port: u16) -> String {
        format!(
            "{}:{}/{}.{}",
            self.host,
            self.port.unwrap_or(default_port),
            self.database_name(),
            self.table
        )
    }
}

// ── Dialects ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    fn column_type(&self) -> &'static str {
        match self {
            Dialect::MySql => "LONGTEXT",
            Dialect::Sqlite | Dialect::Postgres => "TEXT",
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite | Dialect::MySql => "?".into(),
        }
    }

    pub fn create_table(&self, table: &str, columns: &[String]) -> String {
        let defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", self.quote(c), self.column_type()))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(table),
            defs.join(", ")
        )
    }

    pub fn add_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.quote(table),
            self.quote(column),
            self.column_type()
        )
    }

    pub fn insert(&self, table: &str, columns: &[String]) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let slots: Vec<String> = (1..=columns.len()).map(|i| self.placeholder(i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            names.join(", "),
            slots.join(", ")
        )
    }
}

fn missing_columns<'a>(columns: &'a [String], existing: &[String]) -> Vec<&'a String> {
    columns
        .iter()
        .filter(|c| !existing.iter().any(|e| e == *c))
        .collect()
}

fn empty_report(destination: String) -> WriteReport {
    WriteReport {
        written: 0,
        destination,
    }
}

// ── SQLite ──────────────────────────────────────────────────────────

pub struct SqliteWriter {
    path: PathBuf,
    table: String,
}

impl SqliteWriter {
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
        }
    }

    fn write_rows(&self, columns: &[String], rows: &[Vec<Option<String>>]) -> Result<(), WriteError> {
        let dialect = Dialect::Sqlite;
        let mut conn = Connection::open(&self.path)?;
        conn.execute_batch(&dialect.create_table(&self.table, columns))?;

        let existing: Vec<String> = {
            let mut stmt = conn.prepare(&format!(
                "PRAGMA table_info({})",
                dialect.quote(&self.table)
            ))?;
            let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
            names.collect::<Result<_, _>>()?
        };
        for column in missing_columns(columns, &existing) {
            conn.execute_batch(&dialect.add_column(&self.table, column))?;
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&dialect.insert(&self.table, columns))?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl RecordWriter for SqliteWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        let destination = format!("{}#{}", self.path.display(), self.table);
        if records.is_empty() {
            return Ok(empty_report(destination));
        }
        let (columns, rows) = tabulate_sparse(records);
        self.write_rows(&columns, &rows)?;
        debug!(table = %self.table, rows = rows.len(), "sqlite write");
        Ok(WriteReport {
            written: rows.len(),
            destination,
        })
    }
}

// ── PostgreSQL ──────────────────────────────────────────────────────

pub struct PostgresWriter {
    config: DbConfig,
    pool: Option<PgPool>,
}

impl PostgresWriter {
    pub fn new(config: DbConfig) -> Self {
        Self { config, pool: None }
    }

    async fn pool(&mut self) -> Result<PgPool, WriteError> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let c = &self.config;
        let mut options = PgConnectOptions::new()
            .host(&c.host)
            .port(c.port.unwrap_or(5432))
            .username(c.user.as_deref().unwrap_or("postgres"))
            .database(c.database_name());
        if let Some(password) = &c.password {
            options = options.password(password);
        }
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl RecordWriter for PostgresWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        let destination = self.config.describe(5432);
        if records.is_empty() {
            return Ok(empty_report(destination));
        }
        let dialect = Dialect::Postgres;
        let table = self.config.table.clone();
        let (columns, rows) = tabulate_sparse(records);
        let pool = self.pool().await?;

        sqlx::query(&dialect.create_table(&table, &columns))
            .execute(&pool)
            .await?;
        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(table.as_str())
        .fetch_all(&pool)
        .await?;
        for column in missing_columns(&columns, &existing) {
            sqlx::query(&dialect.add_column(&table, column))
                .execute(&pool)
                .await?;
        }

        let sql = dialect.insert(&table, &columns);
        let mut tx = pool.begin().await?;
        for row in &rows {
            let mut query = sqlx::query(&sql);
            for cell in row {
                query = query.bind(cell.as_deref());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(table = %table, rows = rows.len(), "postgres write");
        Ok(WriteReport {
            written: rows.len(),
            destination,
        })
    }
}

// ── MySQL ───────────────────────────────────────────────────────────

pub struct MySqlWriter {
    config: DbConfig,
    pool: Option<MySqlPool>,
}

impl MySqlWriter {
    pub fn new(config: DbConfig) -> Self {
        Self { config, pool: None }
    }

    async fn pool(&mut self) -> Result<MySqlPool, WriteError> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let c = &self.config;
        let mut options = MySqlConnectOptions::new()
            .host(&c.host)
            .port(c.port.unwrap_or(3306))
            .username(c.user.as_deref().unwrap_or("root"))
            .database(c.database_name())
            .charset("utf8mb4");
        if let Some(password) = &c.password {
            options = options.password(password);
        }
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }
}

#[async_trait]
impl RecordWriter for MySqlWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        let destination = self.config.describe(3306);
        if records.is_empty() {
            return Ok(empty_report(destination));
        }
        let dialect = Dialect::MySql;
        let table = self.config.table.clone();
        let (columns, rows) = tabulate_sparse(records);
        let pool = self.pool().await?;

        sqlx::query(&dialect.create_table(&table, &columns))
            .execute(&pool)
            .await?;
        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(table.as_str())
        .fetch_all(&pool)
        .await?;
        for column in missing_columns(&columns, &existing) {
            sqlx::query(&dialect.add_column(&table, column))
                .execute(&pool)
                .await?;
        }

        let sql = dialect.insert(&table, &columns);
        let mut tx = pool.begin().await?;
        for row in &rows {
            let mut query = sqlx::query(&sql);
            for cell in row {
                query = query.bind(cell.as_deref());
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!(table = %table, rows = rows.len(), "mysql write");
        Ok(WriteReport {
            written: rows.len(),
            destination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartspider::{FieldValue, PageType};

    fn record(url: &str, fields: &[(&str, FieldValue)]) -> Record {
        let mut r = Record::new(url, PageType::News);
        for (k, v) in fields {
            r.insert(*k, v.clone());
        }
        r
    }

    #[test]
    fn test_dialect_statements() {
        let cols = vec!["title".to_string(), "we\"ird".to_string()];
        assert_eq!(
            Dialect::Postgres.insert("t", &cols),
            r#"INSERT INTO "t" ("title", "we""ird") VALUES ($1, $2)"#
        );
        assert_eq!(
            Dialect::MySql.create_table("t", &cols[..1]),
            "CREATE TABLE IF NOT EXISTS `t` (`title` LONGTEXT)"
        );
        assert_eq!(
            Dialect::Sqlite.insert("t", &cols[..1]),
            r#"INSERT INTO "t" ("title") VALUES (?)"#
        );
    }

    #[test]
    fn test_require_database() {
        assert!(matches!(
            DbConfig::default().require_database(),
            Err(WriteError::Config(_))
        ));
        let named = DbConfig {
            database: Some("crawl".into()),
            ..DbConfig::default()
        };
        assert!(named.require_database().is_ok());
    }

    #[tokio::test]
    async fn test_sqlite_creates_table_and_grows_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let mut writer = SqliteWriter::new(&path, "articles");

        let first = writer
            .write(&[record("https://news.example.com/a", &[("title", "A".into())])])
            .await
            .unwrap();
        assert_eq!(first.written, 1);

        writer
            .write(&[record(
                "https://news.example.com/b",
                &[("title", "B".into()), ("author", "Lee".into())],
            )])
            .await
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let mut stmt = conn
            .prepare(r#"SELECT title, author, source_url, page_type FROM "articles" ORDER BY title"#)
            .unwrap();
        let rows: Vec<(String, Option<String>, String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "A");
        assert_eq!(rows[0].1, None);
        assert_eq!(rows[1].1.as_deref(), Some("Lee"));
        assert_eq!(rows[1].3, "news");
    }

    #[tokio::test]
    async fn test_sqlite_absent_cells_are_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let mut writer = SqliteWriter::new(&path, DEFAULT_TABLE);
        writer
            .write(&[
                record("https://shop.example.com/1", &[("name", "Kettle".into()), ("sku", "".into())]),
                record("https://shop.example.com/2", &[("name", "Lamp".into())]),
            ])
            .await
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let skus: Vec<Option<String>> = conn
            .prepare(r#"SELECT sku FROM "smartspider_records" ORDER BY name"#)
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        // Lamp never had a sku; Kettle had an empty one.
        assert_eq!(skus, vec![Some(String::new()), None]);
    }

    #[tokio::test]
    async fn test_empty_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let mut writer = SqliteWriter::new(&path, DEFAULT_TABLE);
        assert_eq!(writer.write(&[]).await.unwrap().written, 0);
        assert!(!path.exists());
    }
}
