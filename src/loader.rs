//! Reads raw readings from CSV files and runs them through the normalizer.
//!
//! Files ending in `.gz` are decompressed on the fly. A file that lacks a
//! required column, or that cannot be read or decoded, is skipped with a
//! warning and listed in the report. The load fails only when no file could
//! be used at all.

use csv::StringRecord;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::NormalizeConfig;
use crate::error::{LoadError, LoadResult};
use crate::normalize::{Dataset, Normalizer, REQUIRED_COLUMNS, RawRow};
use crate::stats::SkippedFile;

/// Rows read from one source.
#[derive(Debug, Default)]
pub struct FileRows {
    pub rows: Vec<RawRow>,
    /// Records the CSV reader could not decode.
    pub malformed: usize,
}

/// Outcome of reading one file.
#[derive(Debug)]
pub enum FileRead {
    Rows(FileRows),
    MissingColumns(Vec<&'static str>),
}

/// Reads and normalizes every file in `paths`.
#[tracing::instrument(skip_all, fields(files = paths.len()))]
pub fn load(paths: &[PathBuf], config: &NormalizeConfig) -> LoadResult<Dataset> {
    let config = config.clone().validate()?;
    if paths.is_empty() {
        return Err(LoadError::NoInput);
    }

    let start = Instant::now();
    let mut rows = Vec::new();
    let mut malformed = 0;
    let mut files_read = 0;
    let mut skipped = Vec::new();
    let mut first_failure = None;

    for path in paths {
        let reason = match read_file(path) {
            Ok(FileRead::Rows(file)) => {
                debug!(path = %path.display(), rows = file.rows.len(), "File read");
                files_read += 1;
                malformed += file.malformed;
                rows.extend(file.rows);
                continue;
            }
            Ok(FileRead::MissingColumns(missing)) => {
                warn!(path = %path.display(), ?missing, "File lacks required columns, skipping");
                let reason = format!("missing columns: {}", missing.join(", "));
                first_failure.get_or_insert(LoadError::SchemaViolation { field: missing[0] });
                reason
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File could not be read, skipping");
                let reason = e.to_string();
                first_failure.get_or_insert(e);
                reason
            }
        };
        skipped.push(SkippedFile {
            path: path.display().to_string(),
            reason,
        });
    }

    if files_read == 0 {
        if let Some(e) = first_failure {
            return Err(e);
        }
    }

    let read_time = start.elapsed();
    info!(files_read, skipped = skipped.len(), rows = rows.len(), elapsed = ?read_time, "Input read");

    let mut dataset = Normalizer::new(config).normalize(&rows)?;
    let report = &mut dataset.report;
    report.files_read = files_read;
    report.files_skipped = skipped;
    report.rows_read += malformed;
    report.malformed = malformed;
    report.read_time = read_time;

    Ok(dataset)
}

/// Opens `path`, decompressing it if it ends in `.gz`, and reads its rows.
pub fn read_file(path: &Path) -> LoadResult<FileRead> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let reader: Box<dyn Read> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    read_csv(reader, path)
}

/// Reads CSV rows from any reader. `path` is only used in error messages.
///
/// Each required field is taken from the first of its accepted columns
/// present in the header; other columns are ignored.
pub fn read_csv<R: Read>(reader: R, path: &Path) -> LoadResult<FileRead> {
    let csv_error = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(csv_error)?.clone();
    let columns = match locate_columns(&headers) {
        Ok(columns) => columns,
        Err(missing) => return Ok(FileRead::MissingColumns(missing)),
    };

    let mut file = FileRows::default();
    for result in rdr.records() {
        match result {
            Ok(record) => file.rows.push(project(&record, &columns)),
            Err(e) if e.is_io_error() => return Err(csv_error(e)),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Malformed record");
                file.malformed += 1;
            }
        }
    }

    Ok(FileRead::Rows(file))
}

/// Header position of each required field, in `REQUIRED_COLUMNS` order, or
/// the names of the fields with no matching column.
fn locate_columns(headers: &StringRecord) -> Result<Vec<usize>, Vec<&'static str>> {
    let mut columns = Vec::with_capacity(REQUIRED_COLUMNS.len());
    let mut missing = Vec::new();
    for &(field, aliases) in REQUIRED_COLUMNS {
        match aliases
            .iter()
            .find_map(|alias| headers.iter().position(|h| h == *alias))
        {
            Some(position) => columns.push(position),
            None => missing.push(field),
        }
    }
    if missing.is_empty() {
        Ok(columns)
    } else {
        Err(missing)
    }
}

fn project(record: &StringRecord, columns: &[usize]) -> RawRow {
    let field = |i: usize| record.get(columns[i]).map(str::to_string);
    RawRow {
        entity: field(0),
        facility: field(1),
        measurement_point: field(2),
        end_timestamp: field(3),
        power_value: field(4),
    }
}
