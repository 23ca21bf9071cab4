//! Column label normalization.

use super::table::RawTable;

/// Canonical form of a raw column label: trimmed, lower-cased, spaces and
/// hyphens replaced with underscores. Idempotent.
///
/// `"Price USD"` → `"price_usd"`, `" Depart-Date "` → `"depart_date"`.
pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Relabel every column of `table`. Unknown columns pass through; cells are
/// untouched.
pub fn normalize(table: RawTable) -> RawTable {
    table.map_columns(normalize_label)
}
