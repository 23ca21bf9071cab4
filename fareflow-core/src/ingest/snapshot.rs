//! Raw (bronze) snapshot writer with Hive-style date partitions.
//!
//! Layout: `{bronze_root}/dt={YYYY-MM-DD}/fares.csv`
//!
//! - One partition per run, keyed by the snapshot day
//! - Atomic commit: rows stream into `fares.tmp.{pid}.csv` in the partition
//!   directory, which is renamed onto `fares.csv` once complete
//! - An abandoned writer removes its temp file; the canonical file is never
//!   touched until the rename
//! - If the canonical file is locked (rename denied), the partition lands in
//!   a time-stamped sibling `fares_{ts}_{pid}.csv` and a warning is raised

use super::provider::{FareItem, FareSource, FetchOutcome};
use crate::config::CollectorConfig;
use crate::parse::parse_date;
use chrono::{DateTime, Days, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Canonical file name inside a partition directory.
pub const PARTITION_FILE: &str = "fares.csv";

/// Leading byte-order mark on raw partition files, so spreadsheet tools
/// detect UTF-8.
pub const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Column order of a raw partition file.
pub const RAW_HEADER: [&str; 9] = [
    "snapshot_date",
    "origin",
    "dest",
    "depart_date",
    "price_usd",
    "scrape_ts",
    "gate",
    "trip_class",
    "number_of_changes",
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("partition I/O error: {0}")]
    Io(String),

    #[error("partition CSV error: {0}")]
    Csv(String),
}

/// An accepted upstream price observation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub snapshot_date: NaiveDate,
    pub origin: String,
    pub dest: String,
    pub depart_date: NaiveDate,
    pub price_usd: f64,
    pub scrape_ts: DateTime<Utc>,
    pub gate: Option<String>,
    pub trip_class: Option<i64>,
    pub number_of_changes: Option<i64>,
}

/// Departure window a quote must fall in: `[snapshot_date, snapshot_date + days_ahead]`.
/// A cutoff past the last representable date is clamped to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptWindow {
    pub snapshot_date: NaiveDate,
    pub cutoff: NaiveDate,
}

impl AcceptWindow {
    pub fn new(snapshot_date: NaiveDate, days_ahead: u32) -> Self {
        Self {
            snapshot_date,
            cutoff: snapshot_date
                .checked_add_days(Days::new(u64::from(days_ahead)))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.snapshot_date && date <= self.cutoff
    }
}

impl Quote {
    /// Accept an upstream item into the partition, or `None` when its departure
    /// date is missing or outside the window, or it has no price.
    pub fn accept(
        item: &FareItem,
        origin: &str,
        dest: &str,
        window: &AcceptWindow,
        scrape_ts: DateTime<Utc>,
    ) -> Option<Self> {
        let depart_date = item.depart_date.as_deref().and_then(parse_date)?;
        if !window.contains(depart_date) {
            return None;
        }
        let price_usd = item.price()?;

        Some(Self {
            snapshot_date: window.snapshot_date,
            origin: origin.to_string(),
            dest: dest.to_string(),
            depart_date,
            price_usd,
            scrape_ts,
            gate: item.gate(),
            trip_class: item.trip_class(),
            number_of_changes: item.number_of_changes(),
        })
    }

    fn to_record(&self) -> [String; 9] {
        [
            self.snapshot_date.to_string(),
            self.origin.clone(),
            self.dest.clone(),
            self.depart_date.to_string(),
            self.price_usd.to_string(),
            format_scrape_ts(self.scrape_ts),
            self.gate.clone().unwrap_or_default(),
            self.trip_class.map(|v| v.to_string()).unwrap_or_default(),
            self.number_of_changes
                .map(|v| v.to_string())
                .unwrap_or_default(),
        ]
    }
}

/// `2026-01-17T06:00:00Z`: second precision, `Z` suffix.
pub fn format_scrape_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Partition directory for a snapshot day: `{root}/dt={YYYY-MM-DD}`.
pub fn partition_dir(root: &Path, snapshot_date: NaiveDate) -> PathBuf {
    root.join(format!("dt={snapshot_date}"))
}

/// Where a committed partition ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPartition {
    pub path: PathBuf,
    pub rows: usize,
    /// True when the canonical file was locked and a sibling was written instead.
    pub fell_back: bool,
}

/// Streams quotes into a temp file and commits it with an atomic rename.
pub struct PartitionWriter {
    canonical: PathBuf,
    tmp_path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows: usize,
}

impl PartitionWriter {
    /// Create the partition directory and open the temp file with the header written.
    pub fn create(root: &Path, snapshot_date: NaiveDate) -> Result<Self, SnapshotError> {
        let dir = partition_dir(root, snapshot_date);
        fs::create_dir_all(&dir).map_err(|e| {
            SnapshotError::Io(format!("create dir {}: {e}", dir.display()))
        })?;

        let canonical = dir.join(PARTITION_FILE);
        let tmp_path = dir.join(format!("fares.tmp.{}.csv", std::process::id()));
        let file = File::create(&tmp_path)
            .and_then(|mut f| f.write_all(UTF8_BOM).map(|()| f))
            .map_err(|e| {
                SnapshotError::Io(format!("create temp file {}: {e}", tmp_path.display()))
            })?;

        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(RAW_HEADER)
            .map_err(|e| SnapshotError::Csv(format!("write header: {e}")))?;

        Ok(Self {
            canonical,
            tmp_path,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    pub fn temp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_quote(&mut self, quote: &Quote) -> Result<(), SnapshotError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SnapshotError::Io("partition writer already closed".into()))?;
        writer
            .write_record(quote.to_record())
            .map_err(|e| SnapshotError::Csv(format!("write row: {e}")))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush, fsync and rename the temp file into place.
    ///
    /// `scrape_ts` names the fallback file if the canonical one is locked.
    pub fn commit(mut self, scrape_ts: DateTime<Utc>) -> Result<CommittedPartition, SnapshotError> {
        self.commit_with(scrape_ts, |from, to| fs::rename(from, to))
    }

    fn commit_with<R>(
        &mut self,
        scrape_ts: DateTime<Utc>,
        rename: R,
    ) -> Result<CommittedPartition, SnapshotError>
    where
        R: Fn(&Path, &Path) -> io::Result<()>,
    {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| SnapshotError::Io("partition writer already closed".into()))?;

        let placed = finish_file(writer).and_then(|()| {
            let fallback = self.fallback_path(scrape_ts);
            place_partition(&self.tmp_path, &self.canonical, &fallback, rename)
        });
        let (path, fell_back) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path);
                return Err(e);
            }
        };

        Ok(CommittedPartition {
            path,
            rows: self.rows,
            fell_back,
        })
    }

    fn fallback_path(&self, scrape_ts: DateTime<Utc>) -> PathBuf {
        let safe_ts = format_scrape_ts(scrape_ts).replace(':', "-");
        let name = format!("fares_{safe_ts}_{}.csv", std::process::id());
        match self.canonical.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

impl Drop for PartitionWriter {
    fn drop(&mut self) {
        // Uncommitted: discard the temp file, leave the canonical file alone.
        if self.writer.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Flush buffered rows and fsync the temp file.
fn finish_file(writer: csv::Writer<File>) -> Result<(), SnapshotError> {
    let file = writer
        .into_inner()
        .map_err(|e| SnapshotError::Io(format!("flush temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| SnapshotError::Io(format!("sync temp file: {e}")))
}

/// Rename `tmp` onto `canonical`; on a permission error (file locked by another
/// process) rename onto `fallback` instead. Returns the final path and whether
/// the fallback was used.
fn place_partition<R>(
    tmp: &Path,
    canonical: &Path,
    fallback: &Path,
    rename: R,
) -> Result<(PathBuf, bool), SnapshotError>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    match rename(tmp, canonical) {
        Ok(()) => Ok((canonical.to_path_buf(), false)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            rename(tmp, fallback).map_err(|e| {
                SnapshotError::Io(format!("fallback rename to {}: {e}", fallback.display()))
            })?;
            warn!(
                canonical = %canonical.display(),
                fallback = %fallback.display(),
                "canonical partition file is locked; wrote fallback file"
            );
            Ok((fallback.to_path_buf(), true))
        }
        Err(e) => Err(SnapshotError::Io(format!(
            "atomic rename to {}: {e}",
            canonical.display()
        ))),
    }
}

/// Outcome of one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub snapshot_date: NaiveDate,
    /// File the partition was committed to.
    pub path: PathBuf,
    pub pairs: usize,
    pub rows_written: usize,
    /// Pairs the API rejected or reported as unsuccessful.
    pub skipped_invalid: usize,
    /// Pairs that exhausted their retries.
    pub warnings: usize,
    /// Items dropped by the acceptance window or for a missing price.
    pub quotes_dropped: usize,
    pub fell_back: bool,
}

impl SnapshotSummary {
    pub fn all_pairs_answered(&self) -> bool {
        self.warnings == 0
    }
}

/// Collect one raw partition for `snapshot_date`, stamped with the current time.
pub fn collect(
    config: &CollectorConfig,
    source: &dyn FareSource,
    snapshot_date: NaiveDate,
) -> Result<SnapshotSummary, SnapshotError> {
    collect_at(config, source, snapshot_date, Utc::now())
}

/// Collect one raw partition with an explicit scrape timestamp.
///
/// Walks origins × destinations (self-pairs skipped). A pair that exhausts its
/// retries is counted as a warning and skipped; the run continues. Re-running
/// for the same day replaces that day's canonical file.
pub fn collect_at(
    config: &CollectorConfig,
    source: &dyn FareSource,
    snapshot_date: NaiveDate,
    scrape_ts: DateTime<Utc>,
) -> Result<SnapshotSummary, SnapshotError> {
    let window = AcceptWindow::new(snapshot_date, config.days_ahead);
    let mut writer = PartitionWriter::create(&config.bronze_root, snapshot_date)?;

    let mut pairs = 0;
    let mut skipped_invalid = 0;
    let mut warnings = 0;
    let mut quotes_dropped = 0;

    info!(
        source = source.name(),
        %snapshot_date,
        origins = config.origins.len(),
        dests = config.dests.len(),
        "collecting snapshot"
    );

    for origin in &config.origins {
        for dest in &config.dests {
            if origin.trim().eq_ignore_ascii_case(dest.trim()) {
                continue;
            }
            pairs += 1;

            match source.fetch(origin, dest) {
                FetchOutcome::Accepted(items) => {
                    let before = writer.rows();
                    for item in &items {
                        match Quote::accept(item, origin, dest, &window, scrape_ts) {
                            Some(quote) => writer.write_quote(&quote)?,
                            None => quotes_dropped += 1,
                        }
                    }
                    debug!(
                        origin = origin.as_str(),
                        dest = dest.as_str(),
                        items = items.len(),
                        accepted = writer.rows() - before,
                        "pair fetched"
                    );
                }
                FetchOutcome::Skipped(reason) => {
                    skipped_invalid += 1;
                    debug!(origin = origin.as_str(), dest = dest.as_str(), %reason, "pair skipped");
                }
                FetchOutcome::Failed(err) => {
                    warnings += 1;
                    warn!(error = %err, "pair failed; continuing without it");
                }
            }
        }
    }

    let committed = writer.commit(scrape_ts)?;

    info!(
        path = %committed.path.display(),
        rows_written = committed.rows,
        skipped_invalid,
        warnings,
        "snapshot committed"
    );

    Ok(SnapshotSummary {
        snapshot_date,
        path: committed.path,
        pairs,
        rows_written: committed.rows,
        skipped_invalid,
        warnings,
        quotes_dropped,
        fell_back: committed.fell_back,
    })
}
