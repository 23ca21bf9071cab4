//! Silver (refined) dataset output.
//!
//! One Parquet file plus a `{stem}.meta.json` sidecar:
//!
//! - Atomic write: the frame goes to `{file}.parquet.tmp`, then is renamed
//! - Required columns are typed (`Date`, `Float64`); optional and extra
//!   columns the source carried follow; `load_ts` is last
//! - The sidecar records row count, columns, a BLAKE3 hash of the records,
//!   the bronze files read, and the load timestamp

use super::clean::{CleanStats, RefinedRecord, RefinedTable};
use super::TransformError;
use crate::contract::{FLIGHT_FARES, LOAD_TS};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Metadata sidecar for a silver file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverMeta {
    pub rows: usize,
    pub columns: Vec<String>,
    pub data_hash: String,
    pub sources: Vec<String>,
    pub contract_version: u32,
    pub load_ts: DateTime<Utc>,
    pub stats: CleanStats,
}

/// Sidecar path for a silver file: `flight_fares.parquet` → `flight_fares.meta.json`.
pub fn silver_meta_path(path: &Path) -> PathBuf {
    path.with_extension("meta.json")
}

fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn date_column<I>(name: &str, dates: I) -> Result<Column, TransformError>
where
    I: Iterator<Item = NaiveDate>,
{
    let days: Vec<i32> = dates.map(epoch_days).collect();
    Column::new(name.into(), days)
        .cast(&DataType::Date)
        .map_err(|e| TransformError::Parquet(format!("{name} cast: {e}")))
}

fn datetime_column<I>(name: &str, micros: I) -> Result<Column, TransformError>
where
    I: Iterator<Item = Option<i64>>,
{
    let values: Vec<Option<i64>> = micros.collect();
    Column::new(name.into(), values)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
        .map_err(|e| TransformError::Parquet(format!("{name} cast: {e}")))
}

fn optional_text<'a>(record: &'a RefinedRecord, name: &str) -> Option<&'a str> {
    match name {
        "gate" => record.gate.as_deref(),
        "trip_class" => record.trip_class.as_deref(),
        "cabin" => record.cabin.as_deref(),
        "carrier" => record.carrier.as_deref(),
        "currency" => record.currency.as_deref(),
        _ => None,
    }
}

impl RefinedTable {
    /// Build the silver frame. Column order matches [`RefinedTable::column_names`].
    pub fn to_dataframe(&self) -> Result<DataFrame, TransformError> {
        let recs = &self.records;
        let mut columns: Vec<Column> = Vec::with_capacity(self.column_names().len());

        columns.push(date_column(
            "snapshot_date",
            recs.iter().map(|r| r.snapshot_date),
        )?);
        columns.push(Column::new(
            "origin".into(),
            recs.iter().map(|r| r.origin.as_str()).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            "dest".into(),
            recs.iter().map(|r| r.dest.as_str()).collect::<Vec<_>>(),
        ));
        columns.push(date_column("depart_date", recs.iter().map(|r| r.depart_date))?);
        columns.push(Column::new(
            FLIGHT_FARES.price_column.into(),
            recs.iter().map(|r| r.price_usd).collect::<Vec<f64>>(),
        ));

        for &name in &self.optional_columns {
            let column = match name {
                "scrape_ts" => datetime_column(
                    name,
                    recs.iter().map(|r| r.scrape_ts.map(|t| t.timestamp_micros())),
                )?,
                "number_of_changes" => Column::new(
                    name.into(),
                    recs.iter()
                        .map(|r| r.number_of_changes)
                        .collect::<Vec<Option<i64>>>(),
                ),
                _ => Column::new(
                    name.into(),
                    recs.iter()
                        .map(|r| optional_text(r, name))
                        .collect::<Vec<Option<&str>>>(),
                ),
            };
            columns.push(column);
        }

        for name in &self.extra_columns {
            columns.push(Column::new(
                name.as_str().into(),
                recs.iter()
                    .map(|r| r.extra.get(name).map(String::as_str))
                    .collect::<Vec<Option<&str>>>(),
            ));
        }

        columns.push(datetime_column(
            LOAD_TS,
            recs.iter().map(|r| Some(r.load_ts.timestamp_micros())),
        )?);

        DataFrame::new(columns)
            .map_err(|e| TransformError::Parquet(format!("dataframe creation: {e}")))
    }
}

/// Write `table` to `path` as Parquet, atomically, plus its metadata sidecar.
///
/// `sources` are the bronze files the table was read from.
pub fn write_silver(
    table: &RefinedTable,
    path: &Path,
    sources: &[PathBuf],
) -> Result<SilverMeta, TransformError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| TransformError::Io(format!("create dir {}: {e}", dir.display())))?;
    }

    let mut df = table.to_dataframe()?;
    let tmp_path = path.with_extension("parquet.tmp");

    let written = fs::File::create(&tmp_path)
        .map_err(|e| TransformError::Io(format!("create {}: {e}", tmp_path.display())))
        .and_then(|file| {
            ParquetWriter::new(file)
                .finish(&mut df)
                .map_err(|e| TransformError::Parquet(format!("write parquet: {e}")))
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        TransformError::Io(format!("atomic rename to {}: {e}", path.display()))
    })?;

    let records_json = serde_json::to_vec(&table.records)
        .map_err(|e| TransformError::Io(format!("hash serialization: {e}")))?;
    let meta = SilverMeta {
        rows: table.len(),
        columns: table.column_names(),
        data_hash: blake3::hash(&records_json).to_hex().to_string(),
        sources: sources.iter().map(|p| p.display().to_string()).collect(),
        contract_version: FLIGHT_FARES.version,
        load_ts: table.load_ts,
        stats: table.stats,
    };
    let meta_json = serde_json::to_string_pretty(&meta)
        .map_err(|e| TransformError::Io(format!("meta serialization: {e}")))?;
    let meta_path = silver_meta_path(path);
    fs::write(&meta_path, meta_json)
        .map_err(|e| TransformError::Io(format!("meta write {}: {e}", meta_path.display())))?;

    info!(
        path = %path.display(),
        rows = meta.rows,
        cols = meta.columns.len(),
        "silver written"
    );
    Ok(meta)
}

/// Load a silver Parquet file.
pub fn read_silver(path: &Path) -> Result<DataFrame, TransformError> {
    let file = fs::File::open(path).map_err(|e| TransformError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| TransformError::Parquet(format!("read {}: {e}", path.display())))
}

/// Metadata sidecar of a silver file, if present and readable.
pub fn read_silver_meta(path: &Path) -> Option<SilverMeta> {
    let content = fs::read_to_string(silver_meta_path(path)).ok()?;
    serde_json::from_str(&content).ok()
}
