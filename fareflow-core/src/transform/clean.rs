//! Cleaning and casting: loosely typed raw rows → typed refined records.
//!
//! Per row: trim and upper-case airport codes, cast dates and price (anything
//! unparseable becomes missing), drop rows missing a required value or with a
//! non-positive price. Then deduplicate on the contract key keeping the last
//! occurrence, and stamp every survivor with one load timestamp.
//!
//! Bad data is filtered, never raised. The only error is structural: a
//! required column that is absent from the table altogether.

use super::table::RawTable;
use super::TransformError;
use crate::contract::{Contract, FLIGHT_FARES, LOAD_TS};
use crate::parse::{parse_date, parse_f64, parse_i64};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// One silver row. Required fields are typed; optional contract columns are
/// `Option`; unknown columns are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedRecord {
    pub snapshot_date: NaiveDate,
    pub origin: String,
    pub dest: String,
    pub depart_date: NaiveDate,
    pub price_usd: f64,
    pub scrape_ts: Option<DateTime<Utc>>,
    pub gate: Option<String>,
    pub trip_class: Option<String>,
    pub number_of_changes: Option<i64>,
    pub cabin: Option<String>,
    pub carrier: Option<String>,
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
    pub load_ts: DateTime<Utc>,
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStats {
    pub input_rows: usize,
    pub dropped_missing: usize,
    pub dropped_non_positive: usize,
    pub dropped_duplicates: usize,
    pub output_rows: usize,
}

/// Output of [`clean`]: the records plus which non-required columns the
/// source actually carried.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedTable {
    pub records: Vec<RefinedRecord>,
    /// Optional contract columns present in the source, in contract order.
    pub optional_columns: Vec<&'static str>,
    /// Columns unknown to the contract, in source order.
    pub extra_columns: Vec<String>,
    pub load_ts: DateTime<Utc>,
    pub stats: CleanStats,
}

impl RefinedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every column the silver dataset will carry, in output order.
    pub fn column_names(&self) -> Vec<String> {
        FLIGHT_FARES
            .required
            .iter()
            .chain(self.optional_columns.iter())
            .map(|c| c.to_string())
            .chain(self.extra_columns.iter().cloned())
            .chain(std::iter::once(LOAD_TS.to_string()))
            .collect()
    }

    /// Lowest price, or `None` for an empty table.
    pub fn min_price(&self) -> Option<f64> {
        self.records.iter().map(|r| r.price_usd).reduce(f64::min)
    }
}

/// Clean a normalized raw table, stamped with the current time.
pub fn clean(table: &RawTable) -> Result<RefinedTable, TransformError> {
    clean_at(table, Utc::now())
}

/// Clean a normalized raw table with an explicit load timestamp.
pub fn clean_at(table: &RawTable, load_ts: DateTime<Utc>) -> Result<RefinedTable, TransformError> {
    clean_with(table, &FLIGHT_FARES, load_ts)
}

/// Column positions resolved once per table.
struct Layout {
    snapshot_date: usize,
    origin: usize,
    dest: usize,
    depart_date: usize,
    price_usd: usize,
    optional: Vec<(&'static str, usize)>,
    extra: Vec<(String, usize)>,
}

impl Layout {
    fn resolve(table: &RawTable, contract: &Contract) -> Result<Self, TransformError> {
        let missing = contract.missing_required(table.columns());
        if !missing.is_empty() {
            return Err(TransformError::MissingRequiredColumns(
                missing.into_iter().map(String::from).collect(),
            ));
        }
        let idx = |name: &str| {
            table
                .column_index(name)
                .ok_or_else(|| TransformError::MissingRequiredColumns(vec![name.to_string()]))
        };

        let optional = contract
            .optional
            .iter()
            .filter_map(|&c| table.column_index(c).map(|i| (c, i)))
            .collect();

        // First occurrence of each unknown label only.
        let mut extra: Vec<(String, usize)> = Vec::new();
        for (i, c) in table.columns().iter().enumerate() {
            if !contract.is_known(c) && !extra.iter().any(|(e, _)| e == c) {
                extra.push((c.clone(), i));
            }
        }

        Ok(Self {
            snapshot_date: idx("snapshot_date")?,
            origin: idx("origin")?,
            dest: idx("dest")?,
            depart_date: idx("depart_date")?,
            price_usd: idx("price_usd")?,
            optional,
            extra,
        })
    }
}

fn text(row: &[Option<String>], i: usize) -> Option<&str> {
    row.get(i)
        .and_then(|c| c.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn airport_code(row: &[Option<String>], i: usize) -> Option<String> {
    text(row, i).map(str::to_uppercase)
}

enum RowVerdict {
    Keep(Box<RefinedRecord>),
    MissingRequired,
    NonPositivePrice,
}

fn refine_row(row: &[Option<String>], layout: &Layout, load_ts: DateTime<Utc>) -> RowVerdict {
    let snapshot_date = text(row, layout.snapshot_date).and_then(parse_date);
    let origin = airport_code(row, layout.origin);
    let dest = airport_code(row, layout.dest);
    let depart_date = text(row, layout.depart_date).and_then(parse_date);
    let price_usd = text(row, layout.price_usd).and_then(parse_f64);

    let (Some(snapshot_date), Some(origin), Some(dest), Some(depart_date), Some(price_usd)) =
        (snapshot_date, origin, dest, depart_date, price_usd)
    else {
        return RowVerdict::MissingRequired;
    };
    if price_usd <= 0.0 {
        return RowVerdict::NonPositivePrice;
    }

    let mut record = RefinedRecord {
        snapshot_date,
        origin,
        dest,
        depart_date,
        price_usd,
        scrape_ts: None,
        gate: None,
        trip_class: None,
        number_of_changes: None,
        cabin: None,
        carrier: None,
        currency: None,
        extra: BTreeMap::new(),
        load_ts,
    };

    for &(name, i) in &layout.optional {
        let value = text(row, i);
        match name {
            "scrape_ts" => {
                record.scrape_ts = value
                    .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                    .map(|dt| dt.with_timezone(&Utc));
            }
            "gate" => record.gate = value.map(String::from),
            // Integral spellings collapse to one form so "1.0" matches "1".
            "trip_class" => {
                record.trip_class = value.map(|v| match parse_i64(v) {
                    Some(n) => n.to_string(),
                    None => v.to_string(),
                });
            }
            "number_of_changes" => record.number_of_changes = value.and_then(parse_i64),
            "cabin" => record.cabin = value.map(String::from),
            "carrier" => record.carrier = value.map(String::from),
            "currency" => record.currency = value.map(String::from),
            _ => {}
        }
    }

    for (name, i) in &layout.extra {
        if let Some(v) = row.get(*i).and_then(|c| c.clone()) {
            record.extra.insert(name.clone(), v);
        }
    }

    RowVerdict::Keep(Box::new(record))
}

/// Dedup key: the contract's key with the price compared bit-for-bit.
type DedupKey = (NaiveDate, String, String, NaiveDate, u64);

fn dedup_key(r: &RefinedRecord) -> DedupKey {
    (
        r.snapshot_date,
        r.origin.clone(),
        r.dest.clone(),
        r.depart_date,
        r.price_usd.to_bits(),
    )
}

/// Keep the last occurrence of each key; survivors stay in input order.
fn dedup_keep_last(records: Vec<RefinedRecord>) -> Vec<RefinedRecord> {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(records.len());
    let mut kept: Vec<RefinedRecord> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(dedup_key(r)))
        .collect();
    kept.reverse();
    kept
}

pub(crate) fn clean_with(
    table: &RawTable,
    contract: &Contract,
    load_ts: DateTime<Utc>,
) -> Result<RefinedTable, TransformError> {
    let layout = Layout::resolve(table, contract)?;
    let mut stats = CleanStats {
        input_rows: table.len(),
        ..CleanStats::default()
    };

    let mut records = Vec::with_capacity(table.len());
    for row in table.rows() {
        match refine_row(row, &layout, load_ts) {
            RowVerdict::Keep(record) => records.push(*record),
            RowVerdict::MissingRequired => stats.dropped_missing += 1,
            RowVerdict::NonPositivePrice => stats.dropped_non_positive += 1,
        }
    }

    let before = records.len();
    let records = dedup_keep_last(records);
    stats.dropped_duplicates = before - records.len();
    stats.output_rows = records.len();

    info!(
        input_rows = stats.input_rows,
        output_rows = stats.output_rows,
        dropped_missing = stats.dropped_missing,
        dropped_non_positive = stats.dropped_non_positive,
        dropped_duplicates = stats.dropped_duplicates,
        "cleaned bronze rows"
    );

    Ok(RefinedTable {
        records,
        optional_columns: layout.optional.iter().map(|(c, _)| *c).collect(),
        extra_columns: layout.extra.into_iter().map(|(c, _)| c).collect(),
        load_ts,
        stats,
    })
}
