//! Per-status-code record counters.
//!
//! Counters are observability only and never feed back into detection.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::record::EventRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    counts: BTreeMap<u16, u64>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every record once.
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut stats = Self::new();
        for record in records {
            stats.record(record.status_code());
        }
        stats
    }

    pub fn record(&mut self, status_code: u16) {
        *self.counts.entry(status_code).or_default() += 1;
    }

    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &ErrorStats) {
        for (code, count) in &other.counts {
            *self.counts.entry(*code).or_default() += count;
        }
    }

    pub fn count(&self, status_code: u16) -> u64 {
        self.counts.get(&status_code).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.counts.iter().map(|(code, count)| (*code, *count))
    }
}

/// `code=count` pairs in code order, e.g. `1=1 3=3`.
impl fmt::Display for ErrorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (code, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{code}={count}")?;
        }
        Ok(())
    }
}
