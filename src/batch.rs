//! JSON-lines request loop for driving the analyzer from another process.
//!
//! Each input line is one [`Request`]; each output line is one JSON object,
//! either `{"ok": ...}` or `{"error": "..."}`. A bad request never stops the
//! loop. Blank lines are ignored.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

use crate::analyzers::analyzer::Analyzer;
use crate::index::Level;
use crate::query::Selection;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Series(Selection),
    Envelope(Selection),
    Options {
        level: Level,
        #[serde(flatten)]
        selection: Selection,
    },
    Days {
        year: u16,
        month: u8,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub requests: usize,
    pub failed: usize,
}

/// Answers one request.
pub fn handle(analyzer: &Analyzer, request: &Request) -> Result<Value> {
    let value = match request {
        Request::Series(selection) => serde_json::to_value(analyzer.series(selection)?)?,
        Request::Envelope(selection) => {
            serde_json::to_value(&analyzer.timeslot_envelope(selection)?.slots)?
        }
        Request::Options { level, selection } => {
            serde_json::to_value(&*analyzer.dependent_options(*level, selection)?)?
        }
        Request::Days { year, month } => serde_json::to_value(analyzer.day_options(*year, *month))?,
    };
    Ok(value)
}

/// Reads requests from `input` until EOF, writing one response per request.
pub fn run<R: BufRead, W: Write>(analyzer: &Analyzer, input: R, mut out: W) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.requests += 1;

        let response = serde_json::from_str::<Request>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|request| {
                debug!(?request, "Handling request");
                handle(analyzer, &request)
            });

        let response = match response {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                warn!(error = %e, "Request failed");
                summary.failed += 1;
                json!({ "error": e.to_string() })
            }
        };
        serde_json::to_writer(&mut out, &response)?;
        writeln!(out)?;
    }

    out.flush()?;
    Ok(summary)
}
