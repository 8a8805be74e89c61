//! locdigest - Mobility digest generation CLI.
//!
//! Supports two modes:
//! - digest: condense a whole event table into digests
//! - analyse: digest only an observation window and report warmup,
//!   observation and buffer statistics
//!
//! Usage:
//!   locdigest digest -i events.csv -o digests.csv
//!   locdigest digest -i events.parquet -o digests.parquet \
//!       --input-format parquet --output-format parquet
//!   locdigest analyse -i events.csv -o digests.csv \
//!       --ow-start "2022-01-01 00:00:00" --ow-end "2022-01-08 00:00:00" \
//!       --meta meta.json

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use locdigest::analysis::generate_digests_observation_window;
use locdigest::digest::{CUTOFF, DigestParams, LONG_DT, SHORT_DT};
use locdigest::driver::digest_multi_user;
use locdigest::table::{Compression, TableFormat, read_events, write_digests, write_meta};
use locdigest::util::parse_instant;

/// Mobility digest generation tool.
#[derive(Parser)]
#[command(name = "locdigest", about = "Mobility digest generation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Digest a whole event table.
    Digest(IoArgs),
    /// Digest an observation window and report window statistics.
    Analyse(AnalyseArgs),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Parquet,
}

impl From<FormatArg> for TableFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => TableFormat::Csv,
            FormatArg::Parquet => TableFormat::Parquet,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    Gzip,
    Zip,
}

impl From<CompressionArg> for Compression {
    fn from(c: CompressionArg) -> Self {
        match c {
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Zip => Compression::Zip,
        }
    }
}

#[derive(Args)]
struct IoArgs {
    /// Input event table. Required columns: user, time, cell.
    #[arg(short, long, value_name = "PATH")]
    input: PathBuf,

    /// Output digest table.
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Input table format.
    #[arg(long, value_enum, default_value = "csv")]
    input_format: FormatArg,

    /// Output table format.
    #[arg(long, value_enum, default_value = "csv")]
    output_format: FormatArg,

    /// Output compression. Compressed CSV input is detected by extension.
    #[arg(long, value_enum)]
    compression: Option<CompressionArg>,

    /// Extra per-user property columns carried through grouping,
    /// comma-separated.
    #[arg(long, value_name = "COLS", value_delimiter = ',')]
    user_props: Vec<String>,

    /// Flapping threshold in seconds.
    #[arg(long, default_value_t = SHORT_DT)]
    short_dt: i64,

    /// Single-cell continuation threshold in seconds.
    #[arg(long, default_value_t = LONG_DT)]
    long_dt: i64,

    /// Maximum digest duration in seconds.
    #[arg(long, default_value_t = CUTOFF)]
    cutoff: i64,
}

#[derive(Args)]
struct AnalyseArgs {
    #[command(flatten)]
    io: IoArgs,

    /// Observation window start. Formats: ISO 8601, "YYYY-MM-DD HH:MM:SS",
    /// date only, unix seconds.
    #[arg(long, value_name = "TIME")]
    ow_start: String,

    /// Observation window end (inclusive).
    #[arg(long, value_name = "TIME")]
    ow_end: String,

    /// Also write the window-metadata record as JSON.
    #[arg(long, value_name = "PATH")]
    meta: Option<PathBuf>,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("locdigest={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Digest(io) => {
            let params = DigestParams::new(io.short_dt, io.long_dt, io.cutoff)?;
            let events = read_events(&io.input, io.input_format.into(), &io.user_props)?;
            let digests = digest_multi_user(&events, params)?;
            write_digests(
                &io.output,
                io.output_format.into(),
                io.compression.map(Into::into),
                &digests,
            )?;
            info!("done: {} digests", digests.rows.len());
        }
        Command::Analyse(args) => {
            let io = args.io;
            let params = DigestParams::new(io.short_dt, io.long_dt, io.cutoff)?;
            let ow_start = parse_instant(&args.ow_start)?;
            let ow_end = parse_instant(&args.ow_end)?;
            let events = read_events(&io.input, io.input_format.into(), &io.user_props)?;
            let (digests, meta) =
                generate_digests_observation_window(&events, params, ow_start, ow_end)?;
            write_digests(
                &io.output,
                io.output_format.into(),
                io.compression.map(Into::into),
                &digests,
            )?;
            if let Some(meta_path) = args.meta {
                write_meta(&meta_path, &meta)?;
            }
            info!(
                "done: {} digests in window, {} events observed",
                digests.rows.len(),
                meta.observation.events
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
