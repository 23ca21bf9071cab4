//! Synthetic fare source for demo runs without an API credential.
//!
//! Quotes are clearly fake but shaped like real latest-prices items. They are
//! deterministic: the RNG for each pair is seeded from a BLAKE3 hash of the
//! snapshot date and the route, so the same day always yields the same
//! partition.

use super::provider::{check_pair, FareItem, FareSource, FetchOutcome};
use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

const GATES: [&str; 4] = ["Kiwi.com", "Trip.com", "Mytrip", "Gotogate"];

#[derive(Debug, Clone)]
pub struct SyntheticFares {
    snapshot_date: NaiveDate,
    days_ahead: u32,
    quotes_per_pair: usize,
}

impl SyntheticFares {
    pub fn new(snapshot_date: NaiveDate, days_ahead: u32) -> Self {
        Self {
            snapshot_date,
            days_ahead,
            quotes_per_pair: 6,
        }
    }

    pub fn with_quotes_per_pair(mut self, n: usize) -> Self {
        self.quotes_per_pair = n;
        self
    }

    fn rng_for(&self, origin: &str, dest: &str) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.snapshot_date.to_string().as_bytes());
        hasher.update(origin.as_bytes());
        hasher.update(b"->");
        hasher.update(dest.as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn generate(&self, origin: &str, dest: &str) -> Vec<FareItem> {
        let mut rng = self.rng_for(origin, dest);
        let horizon = u64::from(self.days_ahead.max(1));
        let base: f64 = rng.gen_range(120.0..1400.0);

        (0..self.quotes_per_pair)
            .map(|_| {
                let offset = rng.gen_range(1..=horizon);
                let depart = self
                    .snapshot_date
                    .checked_add_days(Days::new(offset))
                    .unwrap_or(NaiveDate::MAX);
                // Fares rise as departure approaches.
                let urgency = 1.0 + 0.6 * (1.0 - offset as f64 / horizon as f64);
                let noise: f64 = rng.gen_range(0.85..1.15);
                let price = (base * urgency * noise * 100.0).round() / 100.0;
                let changes: u8 = rng.gen_range(0..=2);
                let gate = GATES[rng.gen_range(0..GATES.len())];

                FareItem {
                    depart_date: Some(depart.format("%Y-%m-%d").to_string()),
                    value: Some(json!(price)),
                    gate: Some(json!(gate)),
                    trip_class: Some(json!(0)),
                    number_of_changes: Some(json!(changes)),
                }
            })
            .collect()
    }
}

impl FareSource for SyntheticFares {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, origin: &str, dest: &str) -> FetchOutcome {
        if let Some(reason) = check_pair(origin, dest) {
            return FetchOutcome::Skipped(reason);
        }
        FetchOutcome::Accepted(self.generate(origin, dest))
    }
}
