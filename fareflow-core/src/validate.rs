//! Contract checks over a refined dataset.
//!
//! Every failing check adds one issue string; nothing here fails on bad data.
//! Checks, in order:
//!
//! 1. at least one row (`row_count is 0`)
//! 2. required columns present (`missing_required_columns: [...]`)
//! 3. null rate per thresholded column (`null_rate_too_high: col=rate > max`)
//! 4. no non-positive prices (`price_usd_non_positive_rows: n`)
//! 5. enumerated columns inside their value sets (`invalid_<col>_values: [...]`)

use crate::contract::{Contract, FLIGHT_FARES};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Most offending values listed per enumerated column.
const MAX_LISTED_VALUES: usize = 10;

/// Pass/fail result of a validation run. `ok` is true iff `issues` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub cols: usize,
    pub issues: Vec<String>,
    pub ok: bool,
}

impl ValidationReport {
    fn new(rows: usize, cols: usize, issues: Vec<String>) -> Self {
        let ok = issues.is_empty();
        Self {
            rows,
            cols,
            issues,
            ok,
        }
    }

    /// True if any issue starts with `prefix`.
    pub fn has_issue(&self, prefix: &str) -> bool {
        self.issues.iter().any(|i| i.starts_with(prefix))
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(String),

    #[error("report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Validate against the flight-fare contract.
pub fn validate(df: &DataFrame) -> ValidationReport {
    validate_with(df, &FLIGHT_FARES)
}

pub fn validate_with(df: &DataFrame, contract: &Contract) -> ValidationReport {
    let rows = df.height();
    let mut issues = Vec::new();

    if rows == 0 {
        issues.push("row_count is 0".to_string());
    }

    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let missing = contract.missing_required(&names);
    if !missing.is_empty() {
        issues.push(format!("missing_required_columns: {missing:?}"));
    }

    if rows > 0 {
        for &(name, max_null) in contract.null_thresholds {
            let Ok(column) = df.column(name) else {
                continue;
            };
            let rate = missing_count(column) as f64 / rows as f64;
            if rate > max_null {
                issues.push(format!(
                    "null_rate_too_high: {name}={rate:.3} > {max_null:.3}"
                ));
            }
        }
    }

    if let Ok(column) = df.column(contract.price_column) {
        match non_positive_count(column) {
            Some(0) => {}
            Some(bad) => issues.push(format!(
                "{}_non_positive_rows: {bad}",
                contract.price_column
            )),
            None => issues.push(format!(
                "{}_not_numeric: {}",
                contract.price_column,
                column.dtype()
            )),
        }
    }

    for &(name, accepted) in contract.accepted_values {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let bad = invalid_values(column, accepted);
        if !bad.is_empty() {
            issues.push(format!("invalid_{name}_values: {bad:?}"));
        }
    }

    let report = ValidationReport::new(rows, df.width(), issues);
    if report.ok {
        info!(rows = report.rows, cols = report.cols, "validation passed");
    } else {
        warn!(issues = ?report.issues, "validation failed");
    }
    report
}

/// Nulls, plus NaN for float columns.
fn missing_count(column: &Column) -> usize {
    match column.f64() {
        Ok(ca) => ca.into_iter().filter(|v| v.map_or(true, f64::is_nan)).count(),
        Err(_) => column.null_count(),
    }
}

/// Count of prices `<= 0`, or `None` if the column is not numeric.
fn non_positive_count(column: &Column) -> Option<usize> {
    match column.dtype() {
        DataType::Float64
        | DataType::Float32
        | DataType::Int64
        | DataType::Int32
        | DataType::UInt64
        | DataType::UInt32 => {}
        _ => return None,
    }
    let prices = column.cast(&DataType::Float64).ok()?;
    let ca = prices.f64().ok()?;
    Some(ca.into_iter().flatten().filter(|p| *p <= 0.0).count())
}

/// Distinct non-null values outside `accepted`, sorted, first few only.
fn invalid_values(column: &Column, accepted: &[&str]) -> Vec<String> {
    let Ok(as_text) = column.cast(&DataType::String) else {
        return Vec::new();
    };
    let Ok(ca) = as_text.str() else {
        return Vec::new();
    };
    let bad: BTreeSet<&str> = ca
        .into_iter()
        .flatten()
        .filter(|v| !accepted.contains(v))
        .collect();
    bad.into_iter()
        .take(MAX_LISTED_VALUES)
        .map(String::from)
        .collect()
}

/// Persist `report` as pretty JSON, creating parent directories.
pub fn write_report(report: &ValidationReport, path: &Path) -> Result<(), ReportError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| ReportError::Io(format!("create dir {}: {e}", dir.display())))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).map_err(|e| ReportError::Io(format!("write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_frame() -> DataFrame {
        df!(
            "snapshot_date" => ["2026-01-01", "2026-01-01"],
            "origin" => ["JFK", "SFO"],
            "dest" => ["LAX", "HND"],
            "depart_date" => ["2026-02-01", "2026-03-01"],
            "price_usd" => [50.0, 880.0],
            "load_ts" => ["2026-01-01T00:00:00Z", "2026-01-01T00:00:00Z"]
        )
        .unwrap()
    }

    #[test]
    fn clean_frame_passes() {
        let report = validate(&good_frame());
        assert!(report.ok, "{:?}", report.issues);
        assert!(report.issues.is_empty());
        assert_eq!(report.rows, 2);
        assert_eq!(report.cols, 6);
    }

    #[test]
    fn empty_frame_fails_on_row_count() {
        let df = good_frame().head(Some(0));
        let report = validate(&df);
        assert!(!report.ok);
        assert!(report.issues.contains(&"row_count is 0".to_string()));
    }

    #[test]
    fn missing_required_columns_are_named() {
        let df = df!("origin" => ["JFK"], "dest" => ["LAX"]).unwrap();
        let report = validate(&df);
        assert!(!report.ok);
        let issue = report
            .issues
            .iter()
            .find(|i| i.contains("missing_required_columns"))
            .unwrap();
        assert!(issue.contains("price_usd"));
        assert!(issue.contains("snapshot_date"));
    }

    #[test]
    fn non_positive_prices_are_counted() {
        let df = df!(
            "snapshot_date" => ["2026-01-01", "2026-01-01"],
            "origin" => ["JFK", "JFK"],
            "dest" => ["LAX", "LAX"],
            "depart_date" => ["2026-02-01", "2026-02-02"],
            "price_usd" => [0.0, -3.0]
        )
        .unwrap();
        let report = validate(&df);
        assert!(report
            .issues
            .contains(&"price_usd_non_positive_rows: 2".to_string()));
    }

    #[test]
    fn integer_prices_are_numeric() {
        let df = df!(
            "snapshot_date" => ["2026-01-01"],
            "origin" => ["JFK"],
            "dest" => ["LAX"],
            "depart_date" => ["2026-02-01"],
            "price_usd" => [0i64]
        )
        .unwrap();
        assert!(validate(&df).has_issue("price_usd_non_positive_rows"));
    }

    #[test]
    fn text_prices_are_flagged() {
        let df = df!(
            "snapshot_date" => ["2026-01-01"],
            "origin" => ["JFK"],
            "dest" => ["LAX"],
            "depart_date" => ["2026-02-01"],
            "price_usd" => ["cheap"]
        )
        .unwrap();
        assert!(validate(&df).has_issue("price_usd_not_numeric"));
    }

    #[test]
    fn null_rates_above_threshold() {
        let df = df!(
            "snapshot_date" => ["2026-01-01", "2026-01-01"],
            "origin" => [Some("JFK"), None],
            "dest" => ["LAX", "LAX"],
            "depart_date" => ["2026-02-01", "2026-02-01"],
            "price_usd" => [Some(100.0), Some(f64::NAN)]
        )
        .unwrap();
        let report = validate(&df);
        assert!(report
            .issues
            .contains(&"null_rate_too_high: origin=0.500 > 0.000".to_string()));
        assert!(report.has_issue("null_rate_too_high: price_usd"));
    }

    #[test]
    fn invalid_enumerations_are_listed_sorted() {
        let df = df!(
            "snapshot_date" => ["2026-01-01", "2026-01-01", "2026-01-01"],
            "origin" => ["JFK", "JFK", "JFK"],
            "dest" => ["LAX", "LAX", "LAX"],
            "depart_date" => ["2026-02-01", "2026-02-02", "2026-02-03"],
            "price_usd" => [10.0, 20.0, 30.0],
            "cabin" => [Some("coach"), Some("economy"), None],
            "trip_class" => ["0", "7", "1"]
        )
        .unwrap();
        let report = validate(&df);
        assert!(report
            .issues
            .contains(&"invalid_cabin_values: [\"coach\"]".to_string()));
        assert!(report
            .issues
            .contains(&"invalid_trip_class_values: [\"7\"]".to_string()));
    }

    #[test]
    fn offending_values_are_capped() {
        let cabins: Vec<String> = (0..15).map(|i| format!("class_{i:02}")).collect();
        let n = cabins.len();
        let df = df!(
            "snapshot_date" => vec!["2026-01-01"; n],
            "origin" => vec!["JFK"; n],
            "dest" => vec!["LAX"; n],
            "depart_date" => vec!["2026-02-01"; n],
            "price_usd" => (1..=n).map(|p| p as f64).collect::<Vec<_>>(),
            "cabin" => cabins.iter().map(String::as_str).collect::<Vec<_>>()
        )
        .unwrap();
        let report = validate(&df);
        let issue = report
            .issues
            .iter()
            .find(|i| i.starts_with("invalid_cabin_values"))
            .unwrap();
        assert!(issue.contains("class_09"));
        assert!(!issue.contains("class_10"));
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs/validation_report.json");
        let report = validate(&good_frame());
        write_report(&report, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let back: ValidationReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["ok"], serde_json::json!(true));
        assert!(raw.get("rows").is_some() && raw.get("cols").is_some());
    }
}
