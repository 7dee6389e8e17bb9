//! Output formatting for query results.
//!
//! Supports pretty-printing, JSON serialization, and CSV tables.

use anyhow::{Context, Result};
use clap::ValueEnum;
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Rust debug pretty-print
    Pretty,
    /// Pretty-printed JSON
    #[default]
    Json,
    /// CSV with a header row
    Csv,
}

/// Writes `value` using Rust's debug pretty-print format.
pub fn write_pretty<W: Write, T: Debug>(mut out: W, value: &T) -> Result<()> {
    writeln!(out, "{:#?}", value)?;
    Ok(())
}

/// Writes `value` as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut out: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Writes `rows` as CSV. The header comes from the field names of `T`.
pub fn write_csv<W: Write, T: Serialize>(out: W, rows: &[T]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `rows` in `format` to `path`, or to stdout when no path is given.
pub fn emit<T: Serialize + Debug>(format: Format, path: Option<&Path>, rows: &[T]) -> Result<()> {
    let out: Box<dyn Write> = match path {
        Some(path) => {
            debug!(path = %path.display(), ?format, rows = rows.len(), "Writing output file");
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    match format {
        Format::Pretty => write_pretty(out, &rows),
        Format::Json => write_json(out, rows),
        Format::Csv => write_csv(out, rows),
    }
}
