//! The flight-fare data contract.
//!
//! One static declaration consulted by both the cleaner (which columns a row
//! cannot be missing) and the validator (presence, null tolerance, price
//! sign, accepted enumerations). Bump `version` whenever a rule changes.

/// Column holding the processing timestamp stamped by the cleaner.
pub const LOAD_TS: &str = "load_ts";

/// Schema and quality policy for a refined dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contract {
    pub version: u32,
    /// Must be present and non-null.
    pub required: &'static [&'static str],
    /// Tolerated if absent.
    pub optional: &'static [&'static str],
    /// Maximum fraction of nulls per column, checked only when the column exists.
    pub null_thresholds: &'static [(&'static str, f64)],
    /// Closed value sets, checked only when the column exists.
    pub accepted_values: &'static [(&'static str, &'static [&'static str])],
    /// Must be strictly positive.
    pub price_column: &'static str,
    /// Dedup key, in order.
    pub dedup_key: &'static [&'static str],
}

pub const ACCEPTED_CABIN: &[&str] = &["economy", "premium_economy", "business", "first"];

/// Upstream trip classes: 0 economy, 1 business, 2 first.
pub const ACCEPTED_TRIP_CLASS: &[&str] = &["0", "1", "2"];

pub const FLIGHT_FARES: Contract = Contract {
    version: 1,
    required: &["snapshot_date", "origin", "dest", "depart_date", "price_usd"],
    optional: &[
        "scrape_ts",
        "gate",
        "trip_class",
        "number_of_changes",
        "cabin",
        "carrier",
        "currency",
    ],
    null_thresholds: &[
        ("snapshot_date", 0.0),
        ("origin", 0.0),
        ("dest", 0.0),
        ("depart_date", 0.0),
        ("price_usd", 0.0),
    ],
    accepted_values: &[("cabin", ACCEPTED_CABIN), ("trip_class", ACCEPTED_TRIP_CLASS)],
    price_column: "price_usd",
    dedup_key: &["snapshot_date", "origin", "dest", "depart_date", "price_usd"],
};

impl Contract {
    pub fn is_required(&self, column: &str) -> bool {
        self.required.contains(&column)
    }

    pub fn is_optional(&self, column: &str) -> bool {
        self.optional.contains(&column)
    }

    /// Declared by the contract (required, optional, or the load timestamp).
    pub fn is_known(&self, column: &str) -> bool {
        self.is_required(column) || self.is_optional(column) || column == LOAD_TS
    }

    /// Required columns absent from `present`, in contract order.
    pub fn missing_required<S: AsRef<str>>(&self, present: &[S]) -> Vec<&'static str> {
        self.required
            .iter()
            .copied()
            .filter(|req| !present.iter().any(|p| p.as_ref() == *req))
            .collect()
    }

    pub fn null_threshold(&self, column: &str) -> Option<f64> {
        self.null_thresholds
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, t)| *t)
    }

    pub fn accepted(&self, column: &str) -> Option<&'static [&'static str]> {
        self.accepted_values
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_has_all_required_columns() {
        for col in ["snapshot_date", "origin", "dest", "depart_date", "price_usd"] {
            assert!(FLIGHT_FARES.is_required(col), "{col} should be required");
        }
        assert!(!FLIGHT_FARES.is_required("cabin"));
        assert!(FLIGHT_FARES.is_optional("cabin"));
    }

    #[test]
    fn every_required_column_has_zero_null_tolerance() {
        for col in FLIGHT_FARES.required {
            assert_eq!(FLIGHT_FARES.null_threshold(col), Some(0.0));
        }
    }

    #[test]
    fn missing_required_keeps_contract_order() {
        let present = ["dest", "origin"];
        assert_eq!(
            FLIGHT_FARES.missing_required(&present),
            vec!["snapshot_date", "depart_date", "price_usd"]
        );
    }

    #[test]
    fn known_columns_include_load_ts() {
        assert!(FLIGHT_FARES.is_known(LOAD_TS));
        assert!(FLIGHT_FARES.is_known("gate"));
        assert!(!FLIGHT_FARES.is_known("distance"));
    }

    #[test]
    fn accepted_values_lookup() {
        assert_eq!(FLIGHT_FARES.accepted("cabin"), Some(ACCEPTED_CABIN));
        assert_eq!(FLIGHT_FARES.accepted("origin"), None);
    }

    #[test]
    fn dedup_key_is_drawn_from_required_columns() {
        for col in FLIGHT_FARES.dedup_key {
            assert!(FLIGHT_FARES.is_required(col));
        }
    }
}
