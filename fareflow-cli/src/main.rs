//! Fareflow CLI: collect, refine and validate flight-fare snapshots.
//!
//! Commands:
//! - `collect`: fetch quotes for every route and commit one raw partition
//! - `refine`: read all raw partitions and write the silver Parquet file
//! - `validate`: check a silver file against the contract, write the report
//! - `run`: collect, refine and validate in sequence

use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use fareflow_core::config::{split_codes, CollectorConfig};
use fareflow_core::ingest::{collect, FareSource, QuoteFetcher, SnapshotSummary, SyntheticFares};
use fareflow_core::transform::{read_silver, refine, SilverMeta};
use fareflow_core::validate::{validate, write_report, ValidationReport};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const API_KEY_VAR: &str = "TRAVELPAYOUTS_API_KEY";
const DEFAULT_SILVER: &str = "data/silver/flight_fares.parquet";
const DEFAULT_REPORT: &str = "analytics/outputs/validation_report.json";

#[derive(Parser)]
#[command(
    name = "fareflow",
    about = "Fareflow CLI: flight-fare snapshots and bronze to silver refinement"
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch quotes for every origin/destination pair and commit one raw partition.
    Collect(CollectArgs),
    /// Refine raw partitions into the silver Parquet file.
    Refine {
        /// Bronze root (or a single raw file).
        #[arg(long, default_value = "data/bronze")]
        input: PathBuf,

        /// Silver Parquet output path.
        #[arg(long, default_value = DEFAULT_SILVER)]
        output: PathBuf,
    },
    /// Validate a silver file and write the JSON report. Exits non-zero on failure.
    Validate {
        /// Silver Parquet file.
        #[arg(long, default_value = DEFAULT_SILVER)]
        path: PathBuf,

        /// Report output path.
        #[arg(long, default_value = DEFAULT_REPORT)]
        report: PathBuf,
    },
    /// Collect, refine and validate in sequence.
    Run {
        #[command(flatten)]
        collect: CollectArgs,

        /// Silver Parquet output path.
        #[arg(long, default_value = DEFAULT_SILVER)]
        output: PathBuf,

        /// Report output path.
        #[arg(long, default_value = DEFAULT_REPORT)]
        report: PathBuf,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Path to a TOML collector config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated origin codes (e.g. JFK,LAX).
    #[arg(long)]
    origins: Option<String>,

    /// Comma-separated destination codes (e.g. LHR,CDG).
    #[arg(long)]
    dests: Option<String>,

    /// Snapshot date (YYYY-MM-DD), or the first day of a backfill. Defaults
    /// to today (UTC).
    #[arg(long, alias = "start")]
    date: Option<String>,

    /// Number of consecutive snapshot days to collect, starting at --date.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,

    /// Generate synthetic quotes instead of calling the API.
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Bronze root directory. Overrides the config file.
    #[arg(long)]
    bronze_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Collect(args) => run_collect(&args).map(|_| ()),
        Commands::Refine { input, output } => run_refine(&input, &output).map(|_| ()),
        Commands::Validate { path, report } => run_validate(&path, &report).map(|_| ()),
        Commands::Run {
            collect,
            output,
            report,
        } => {
            let summaries = run_collect(&collect)?;
            let bronze_root = summaries
                .last()
                .and_then(|s| s.path.parent())
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .context("partition path has no bronze root")?;
            run_refine(&bronze_root, &output)?;
            run_validate(&output, &report).map(|_| ())
        }
    }
}

/// `RUST_LOG` wins; otherwise `-q`/`-v` pick the level.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &CollectArgs) -> Result<CollectorConfig> {
    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CollectorConfig::default(),
    };

    if let Some(origins) = &args.origins {
        config.origins = split_codes(origins);
    }
    if let Some(dests) = &args.dests {
        config.dests = split_codes(dests);
    }
    if let Some(root) = &args.bronze_root {
        config.bronze_root = root.clone();
    }
    if config.api_key.is_none() {
        config.api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty());
    }
    Ok(config)
}

fn parse_snapshot_date(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --date '{s}', expected YYYY-MM-DD")),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Snapshot days covered by a run: `days` consecutive dates from `start`.
fn snapshot_dates(start: NaiveDate, days: u32) -> Result<Vec<NaiveDate>> {
    (0..u64::from(days))
        .map(|offset| {
            start
                .checked_add_days(Days::new(offset))
                .with_context(|| format!("backfill runs past the last date from {start}"))
        })
        .collect()
}

fn run_collect(args: &CollectArgs) -> Result<Vec<SnapshotSummary>> {
    let config = build_config(args)?;
    let start = parse_snapshot_date(args.date.as_deref())?;
    let dates = snapshot_dates(start, args.days)?;

    let synthetic = args.synthetic || config.api_key.is_none();
    if synthetic && !args.synthetic {
        warn!("{API_KEY_VAR} is not set; collecting synthetic quotes");
    }
    config.validate(!synthetic)?;

    let live = if synthetic {
        None
    } else {
        Some(QuoteFetcher::live(&config).context("building HTTP client")?)
    };

    let mut summaries = Vec::with_capacity(dates.len());
    for snapshot_date in dates {
        let synthetic_source;
        let source: &dyn FareSource = match &live {
            Some(fetcher) => fetcher,
            None => {
                synthetic_source = SyntheticFares::new(snapshot_date, config.days_ahead);
                &synthetic_source
            }
        };
        let summary = collect(&config, source, snapshot_date)?;
        print_summary(&summary, source.name());
        summaries.push(summary);
    }
    if summaries.len() > 1 {
        info!(days = summaries.len(), "backfill complete");
    }
    Ok(summaries)
}

fn print_summary(summary: &SnapshotSummary, source: &str) {
    println!("Snapshot {} ({source})", summary.snapshot_date);
    println!("  path:            {}", summary.path.display());
    println!("  pairs:           {}", summary.pairs);
    println!("  rows written:    {}", summary.rows_written);
    println!("  skipped invalid: {}", summary.skipped_invalid);
    println!("  warnings:        {}", summary.warnings);
    if summary.fell_back {
        println!("  (canonical file locked; wrote fallback file)");
    }
    if !summary.all_pairs_answered() {
        warn!(warnings = summary.warnings, "some pairs exhausted their retries");
    }
}

fn run_refine(input: &Path, output: &Path) -> Result<SilverMeta> {
    let meta = refine(input, output)
        .with_context(|| format!("refining {} into {}", input.display(), output.display()))?;
    println!(
        "[OK] Wrote silver parquet: {} rows={} cols={}",
        output.display(),
        meta.rows,
        meta.columns.len()
    );
    Ok(meta)
}

fn run_validate(path: &Path, report_path: &Path) -> Result<ValidationReport> {
    let df = read_silver(path)?;
    let report = validate(&df);
    write_report(&report, report_path)?;
    info!(report = %report_path.display(), "validation report written");

    if !report.ok {
        bail!("validation failed: {:?}", report.issues);
    }
    println!("[OK] Validation passed. Report -> {}", report_path.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "fareflow",
            "collect",
            "--origins",
            " jfk, lax ,",
            "--dests",
            "lhr",
            "--bronze-root",
            "/tmp/bronze",
        ])
        .unwrap();
        let Commands::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        let config = build_config(&args).unwrap();
        assert_eq!(config.origins, ["JFK", "LAX"]);
        assert_eq!(config.dests, ["LHR"]);
        assert_eq!(config.bronze_root, PathBuf::from("/tmp/bronze"));
    }

    #[test]
    fn snapshot_date_parsing() {
        assert_eq!(
            parse_snapshot_date(Some("2026-01-17")).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 17).unwrap()
        );
        assert!(parse_snapshot_date(Some("17/01/2026")).is_err());
    }

    #[test]
    fn backfill_flags_parse() {
        let cli = Cli::try_parse_from(["fareflow", "collect", "--start", "2026-01-30", "--days", "3"])
            .unwrap();
        let Commands::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.date.as_deref(), Some("2026-01-30"));
        assert_eq!(args.days, 3);

        assert!(Cli::try_parse_from(["fareflow", "collect", "--days", "0"]).is_err());
    }

    #[test]
    fn snapshot_dates_cover_consecutive_days() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 30).unwrap();
        let dates = snapshot_dates(start, 3).unwrap();
        assert_eq!(
            dates,
            vec![
                start,
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            ]
        );
        assert!(snapshot_dates(NaiveDate::MAX, 2).is_err());
    }

    #[test]
    fn synthetic_backfill_writes_one_partition_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let cli = Cli::try_parse_from([
            "fareflow",
            "collect",
            "--synthetic",
            "--origins",
            "JFK",
            "--dests",
            "LHR",
            "--date",
            "2026-01-17",
            "--days",
            "2",
            "--bronze-root",
            root.as_str(),
        ])
        .unwrap();
        let Commands::Collect(args) = cli.command else {
            panic!("expected collect");
        };

        let summaries = run_collect(&args).unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(dir.path().join("dt=2026-01-17/fares.csv").exists());
        assert!(dir.path().join("dt=2026-01-18/fares.csv").exists());
    }

    #[test]
    fn run_accepts_collect_flags_and_outputs() {
        let cli = Cli::try_parse_from([
            "fareflow",
            "-v",
            "run",
            "--synthetic",
            "--output",
            "out.parquet",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run {
                collect, output, ..
            } => {
                assert!(collect.synthetic);
                assert_eq!(output, PathBuf::from("out.parquet"));
            }
            _ => panic!("expected run"),
        }
    }
}
