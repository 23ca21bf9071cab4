//! Raw partition discovery and reading.
//!
//! Bronze roots hold `dt=YYYY-MM-DD/` directories of CSV partitions (the
//! collector's output) and, from older ingests, JSON Lines files. Files are
//! read in path order so later days come last and win deduplication.

use super::normalize::normalize;
use super::table::{cell, RawTable};
use super::TransformError;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const RAW_EXTENSIONS: [&str; 2] = ["csv", "jsonl"];

/// In-flight writer output, never a committed partition.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(".tmp."))
}

fn is_raw_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| RAW_EXTENSIONS.contains(&e))
        && !is_temp_file(path)
}

/// Find raw partition files under `root`, recursively, sorted by path.
///
/// `root` may also name a single raw file. Finding nothing is a structural
/// error.
pub fn discover_partitions(root: &Path) -> Result<Vec<PathBuf>, TransformError> {
    if root.is_file() {
        return if is_raw_file(root) {
            Ok(vec![root.to_path_buf()])
        } else {
            Err(TransformError::NoInputFiles(root.to_path_buf()))
        };
    }
    if !root.is_dir() {
        return Err(TransformError::NoInputFiles(root.to_path_buf()));
    }

    let mut files = Vec::new();
    walk(root, &mut files)?;
    files.sort();

    if files.is_empty() {
        return Err(TransformError::NoInputFiles(root.to_path_buf()));
    }
    debug!(root = %root.display(), files = files.len(), "discovered raw partitions");
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TransformError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TransformError::Io(format!("read dir {}: {e}", dir.display())))?;

    for entry in entries {
        let entry = entry.map_err(|e| TransformError::Io(format!("dir entry: {e}")))?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if is_raw_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Read one CSV file. Every cell is text; empty cells are missing.
pub fn read_csv(path: &Path) -> Result<RawTable, TransformError> {
    let read_err = |reason: String| TransformError::Read {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| read_err(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| read_err(format!("header: {e}")))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut table = RawTable::new(headers);
    for record in reader.records() {
        let record = record.map_err(|e| read_err(e.to_string()))?;
        table
            .push_row(record.iter().map(cell).collect())
            .map_err(|e| read_err(e.to_string()))?;
    }
    Ok(table)
}

/// Read one JSON Lines file of flat objects. Blank lines are ignored; scalars
/// become text, `null` is missing, nested values keep their JSON text.
pub fn read_jsonl(path: &Path) -> Result<RawTable, TransformError> {
    let read_err = |reason: String| TransformError::Read {
        path: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
    let mut table = RawTable::default();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| read_err(format!("line {}: {e}", lineno + 1)))?;
        let Value::Object(map) = value else {
            return Err(read_err(format!("line {}: not a JSON object", lineno + 1)));
        };

        let mut row = RawTable::new(map.keys().cloned().collect());
        row.push_row(map.values().map(json_cell).collect())?;
        table.append(row);
    }
    Ok(table)
}

fn json_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => cell(s),
        other => Some(other.to_string()),
    }
}

/// Read and concatenate raw files. Each file's labels are normalized before
/// the merge, so columns are the union of every file's normalized header in
/// first-seen order.
pub fn read_partitions(files: &[PathBuf]) -> Result<RawTable, TransformError> {
    if files.is_empty() {
        return Err(TransformError::Malformed("no partition files to read".into()));
    }

    let mut combined = RawTable::default();
    for path in files {
        let table = match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl") => read_jsonl(path)?,
            _ => read_csv(path)?,
        };
        debug!(path = %path.display(), rows = table.len(), "read partition");
        combined.append(normalize(table));
    }

    info!(
        files = files.len(),
        rows = combined.len(),
        columns = combined.columns().len(),
        "bronze loaded"
    );
    Ok(combined)
}

/// Discover and read every raw file under `root`.
pub fn read_bronze(root: &Path) -> Result<(RawTable, Vec<PathBuf>), TransformError> {
    let files = discover_partitions(root)?;
    let table = read_partitions(&files)?;
    Ok((table, files))
}
