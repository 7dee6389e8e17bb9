//! Error types for loading and querying.
//!
//! Row-level data problems are never errors: they are counted in
//! [`LoadReport`](crate::stats::LoadReport) and the row is dropped. Only
//! structural problems stop a load, and only incomplete filters are reported
//! back from queries. A query that matches nothing returns an empty result.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems while reading or normalizing the input.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A required field is absent from the whole input.
    #[error("required field `{field}` is missing from the input")]
    SchemaViolation { field: &'static str },

    /// No input files were given.
    #[error("no input files given")]
    NoInput,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid normalization settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("slot width must divide a day into whole slots, got {0} minutes")]
    SlotWidth(u32),

    #[error("at least one timestamp format is required")]
    NoTimestampFormats,

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems with a query request itself, as opposed to "no data".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The caller left required selections empty.
    #[error("incomplete filter, missing: {}", .missing.join(", "))]
    IncompleteFilter { missing: Vec<&'static str> },
}

pub type LoadResult<T> = Result<T, LoadError>;
pub type QueryResult<T> = Result<T, QueryError>;
