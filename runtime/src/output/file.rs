// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

//! Console and flat-file writers.

use super::{tabulate, RecordWriter, WriteError, WriteReport};
use async_trait::async_trait;
use smartspider::Record;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

fn destination(path: &Path) -> String {
    path.display().to_string()
}

fn ensure_parent(path: &Path) -> Result<(), WriteError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

// ── Print ───────────────────────────────────────────────────────────

/// Pretty JSON to any sink; stdout by default.
pub struct PrintWriter<W: Write + Send> {
    sink: W,
}

impl PrintWriter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            sink: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> PrintWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[async_trait]
impl<W: Write + Send> RecordWriter for PrintWriter<W> {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        for record in records {
            serde_json::to_writer_pretty(&mut self.sink, record)?;
            writeln!(self.sink)?;
        }
        self.sink.flush()?;
        Ok(WriteReport {
            written: records.len(),
            destination: "stdout".into(),
        })
    }
}

// ── Txt (JSON lines) ────────────────────────────────────────────────

/// One JSON object per line, appended.
pub struct TxtWriter {
    path: PathBuf,
}

impl TxtWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordWriter for TxtWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        ensure_parent(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(WriteReport {
            written: records.len(),
            destination: destination(&self.path),
        })
    }
}

// ── JSON ────────────────────────────────────────────────────────────

/// Pretty JSON array. Successive batches on the same writer accumulate
/// into one array.
pub struct JsonWriter {
    path: PathBuf,
    written: Vec<Record>,
}

impl JsonWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Vec::new(),
        }
    }
}

#[async_trait]
impl RecordWriter for JsonWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        ensure_parent(&self.path)?;
        self.written.extend_from_slice(records);
        let mut out = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut out, &self.written)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(WriteReport {
            written: records.len(),
            destination: destination(&self.path),
        })
    }
}

// ── CSV ─────────────────────────────────────────────────────────────

/// CSV with a header row over the union of columns. Successive batches
/// rewrite the file so the header stays a superset of every row.
pub struct CsvWriter {
    path: PathBuf,
    written: Vec<Record>,
}

impl CsvWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: Vec::new(),
        }
    }
}

#[async_trait]
impl RecordWriter for CsvWriter {
    async fn write(&mut self, records: &[Record]) -> Result<WriteReport, WriteError> {
        ensure_parent(&self.path)?;
        self.written.extend_from_slice(records);
        let (columns, rows) = tabulate(&self.written);

        let mut out = csv::Writer::from_path(&self.path)?;
        if !columns.is_empty() {
            out.write_record(&columns)?;
        }
        for row in &rows {
            out.write_record(row)?;
        }
        out.flush()?;
        Ok(WriteReport {
            written: records.len(),
            destination: destination(&self.path),
        })
    }
}
