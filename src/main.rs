//! CLI entry point for powerview.
//!
//! Loads power readings from CSV files, builds the index once, then answers
//! one query per invocation or a stream of JSON-lines queries in batch mode.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use powerview::analyzers::analyzer::Analyzer;
use powerview::batch;
use powerview::config::NormalizeConfig;
use powerview::index::Level;
use powerview::loader;
use powerview::output::{self, Format};
use powerview::query::{QueryEngine, Selection};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "powerview")]
#[command(about = "Query and summarize power-output readings", long_about = None)]
struct Cli {
    /// CSV files (optionally gzipped) holding the readings
    #[arg(
        short,
        long = "data",
        env = "POWERVIEW_DATA",
        value_delimiter = ',',
        required = true,
        num_args = 1..
    )]
    data: Vec<PathBuf>,

    /// JSON file overriding the normalization settings
    #[arg(short, long, env = "POWERVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Width of a time slot in minutes; must divide a day evenly
    #[arg(long)]
    slot_minutes: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the load report
    Summary {
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// List the values available at one level given the choices so far
    Options {
        #[arg(short, long, value_enum)]
        level: Level,

        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// List the valid days of a month
    Days {
        #[arg(long)]
        year: u16,

        #[arg(long)]
        month: u8,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Raw readings of a facility for a month or a day
    Series {
        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Per-time-slot min/p25/mean/p75/max for one measurement point's month
    Envelope {
        #[command(flatten)]
        selection: SelectionArgs,

        #[command(flatten)]
        out: OutputArgs,
    },
    /// Answer JSON-lines requests from a file or stdin
    Batch {
        /// Request file; stdin when omitted
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct SelectionArgs {
    #[arg(short, long)]
    entity: Option<String>,

    #[arg(short = 'F', long)]
    facility: Option<String>,

    #[arg(short, long, visible_alias = "measurement-point")]
    point: Option<String>,

    #[arg(short, long)]
    year: Option<u16>,

    #[arg(short, long)]
    month: Option<u8>,

    #[arg(short, long)]
    day: Option<u8>,
}

impl From<SelectionArgs> for Selection {
    fn from(args: SelectionArgs) -> Self {
        Selection {
            entity: args.entity,
            facility: args.facility,
            measurement_point: args.point,
            year: args.year,
            month: args.month,
            day: args.day,
        }
    }
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// File to write to; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/powerview.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("powerview.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let config = normalize_config(cli.config.as_deref(), cli.slot_minutes)?;
    let dataset = loader::load(&cli.data, &config).context("failed to load readings")?;
    let analyzer = Analyzer::new(QueryEngine::new(dataset));

    match cli.command {
        Commands::Summary { format } => {
            let report = analyzer.report();
            info!(
                rows_kept = report.rows_kept,
                dropped = report.dropped(),
                dropped_pct = report.dropped_pct(),
                "Load summary"
            );
            match format {
                Format::Pretty => output::write_pretty(io::stdout().lock(), report)?,
                Format::Json => output::write_json(io::stdout().lock(), report)?,
                Format::Csv => bail!("the load report has no CSV form, use json or pretty"),
            }
        }
        Commands::Options {
            level,
            selection,
            out,
        } => {
            let options = analyzer.dependent_options(level, &selection.into())?;
            output::emit(out.format, out.output.as_deref(), options.as_slice())?;
        }
        Commands::Days { year, month, out } => {
            let days = analyzer.day_options(year, month);
            output::emit(out.format, out.output.as_deref(), days.as_slice())?;
        }
        Commands::Series { selection, out } => {
            let rows = analyzer.series(&selection.into())?;
            info!(rows = rows.len(), "Series ready");
            output::emit(out.format, out.output.as_deref(), rows.as_slice())?;
        }
        Commands::Envelope { selection, out } => {
            let envelope = analyzer.timeslot_envelope(&selection.into())?;
            info!(slots = envelope.len(), "Envelope ready");
            output::emit(out.format, out.output.as_deref(), envelope.slots.as_slice())?;
        }
        Commands::Batch { input } => {
            let stdout = io::stdout().lock();
            let summary = match input {
                Some(path) => {
                    let file = File::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    batch::run(&analyzer, BufReader::new(file), stdout)?
                }
                None => batch::run(&analyzer, io::stdin().lock(), stdout)?,
            };
            info!(
                requests = summary.requests,
                failed = summary.failed,
                cache = ?analyzer.cache_stats(),
                "Batch finished"
            );
        }
    }

    Ok(())
}

/// Built-in defaults, overridden by the config file and then the CLI flag.
fn normalize_config(path: Option<&Path>, slot_minutes: Option<u32>) -> Result<NormalizeConfig> {
    let config = match path {
        Some(path) => NormalizeConfig::load(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => NormalizeConfig::default(),
    };
    let config = match slot_minutes {
        Some(minutes) => config.with_slot_minutes(minutes).validate()?,
        None => config,
    };
    Ok(config)
}
