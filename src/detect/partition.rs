//! Burst partitioning.
//!
//! Partitions bound the per-unit cost of the quadratic clustering pass and are
//! the unit of parallel work. Grouping is a pure function of the records and
//! the mode: the same input always produces the same keys in the same order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::EventRecord;

/// How records are grouped before clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PartitionMode {
    /// Latitude bands of height `1 / scale` degrees, one partition per
    /// (band, status code). Longitude is ignored.
    Banded {
        #[serde(default = "default_scale")]
        scale: i64,
    },
    /// Square lat/lon cells of `cell_size` degrees. When `valid_status` is
    /// set, only records carrying that code are kept.
    Grid {
        #[serde(default = "default_cell_size")]
        cell_size: f64,
        #[serde(default)]
        valid_status: Option<u16>,
    },
}

fn default_scale() -> i64 {
    1
}

fn default_cell_size() -> f64 {
    1.0
}

impl Default for PartitionMode {
    fn default() -> Self {
        Self::Banded { scale: 1 }
    }
}

impl PartitionMode {
    /// Key for a record, or `None` if the mode filters it out.
    pub fn key_for(&self, record: &EventRecord) -> Option<PartitionKey> {
        match *self {
            Self::Banded { scale } => Some(PartitionKey::Band {
                band: floor_to_i64(record.latitude() * scale as f64),
                status_code: record.status_code(),
            }),
            Self::Grid {
                cell_size,
                valid_status,
            } => {
                if valid_status.is_some_and(|code| code != record.status_code()) {
                    return None;
                }
                Some(PartitionKey::Cell {
                    lat_cell: floor_to_i64(record.latitude() / cell_size),
                    lon_cell: floor_to_i64(record.longitude() / cell_size),
                })
            }
        }
    }
}

/// Identity of a partition. Ordering is total and used as the stable
/// tie-breaker when merging results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionKey {
    Band { band: i64, status_code: u16 },
    Cell { lat_cell: i64, lon_cell: i64 },
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKey::Band { band, status_code } => {
                write!(f, "band[{band}]/code[{status_code}]")
            }
            PartitionKey::Cell { lat_cell, lon_cell } => write!(f, "cell[{lat_cell},{lon_cell}]"),
        }
    }
}

/// Group records by partition key. Empty partitions never appear and each
/// partition keeps the burst's arrival order.
pub fn partition(
    records: &[EventRecord],
    mode: &PartitionMode,
) -> BTreeMap<PartitionKey, Vec<EventRecord>> {
    let mut groups: BTreeMap<PartitionKey, Vec<EventRecord>> = BTreeMap::new();
    for record in records {
        if let Some(key) = mode.key_for(record) {
            groups.entry(key).or_default().push(record.clone());
        }
    }
    groups
}

/// Status code reported for clusters found in a partition.
///
/// Banded partitions carry their code in the key. Grid partitions may mix
/// codes, so the most frequent one wins, lowest code on ties.
pub fn representative_status(key: &PartitionKey, records: &[EventRecord]) -> u16 {
    if let PartitionKey::Band { status_code, .. } = key {
        return *status_code;
    }

    let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.status_code()).or_default() += 1;
    }
    // max_by_key keeps the last maximum; iterate descending so that is the lowest code.
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, count)| *count)
        .map_or(0, |(code, _)| code)
}

fn floor_to_i64(value: f64) -> i64 {
    value.floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(lat: f64, lon: f64, code: i64) -> EventRecord {
        EventRecord::now(lat, lon, code).unwrap()
    }

    #[test]
    fn test_banded_groups_by_band_and_code() {
        let records = vec![
            rec(10.2, 5.0, 3),
            rec(10.9, -70.0, 3),
            rec(10.5, 5.0, 4),
            rec(11.1, 5.0, 3),
        ];
        let parts = partition(&records, &PartitionMode::Banded { scale: 1 });

        assert_eq!(parts.len(), 3);
        let band10 = &parts[&PartitionKey::Band { band: 10, status_code: 3 }];
        assert_eq!(band10.len(), 2);
        assert!(parts.contains_key(&PartitionKey::Band { band: 10, status_code: 4 }));
        assert!(parts.contains_key(&PartitionKey::Band { band: 11, status_code: 3 }));
    }

    #[test]
    fn test_banded_scale_and_negative_floor() {
        let key = PartitionMode::Banded { scale: 100 }.key_for(&rec(-0.015, 0.0, 1));
        assert_eq!(key, Some(PartitionKey::Band { band: -2, status_code: 1 }));
    }

    #[test]
    fn test_grid_cells() {
        let mode = PartitionMode::Grid {
            cell_size: 0.5,
            valid_status: None,
        };
        assert_eq!(
            mode.key_for(&rec(1.2, -0.2, 0)),
            Some(PartitionKey::Cell { lat_cell: 2, lon_cell: -1 })
        );
    }

    #[test]
    fn test_grid_valid_status_filter() {
        let mode = PartitionMode::Grid {
            cell_size: 1.0,
            valid_status: Some(3),
        };
        let records = vec![rec(0.5, 0.5, 3), rec(0.5, 0.5, 2), rec(0.6, 0.6, 3)];
        let parts = partition(&records, &mode);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts.values().next().map(Vec::len), Some(2));
    }

    #[test]
    fn test_empty_burst_has_no_partitions() {
        assert!(partition(&[], &PartitionMode::default()).is_empty());
    }

    #[test]
    fn test_representative_status() {
        let cell = PartitionKey::Cell { lat_cell: 0, lon_cell: 0 };
        let records = vec![rec(0.1, 0.1, 4), rec(0.1, 0.1, 2), rec(0.1, 0.1, 4), rec(0.1, 0.1, 2)];
        // Tie between 2 and 4 resolves to the lower code.
        assert_eq!(representative_status(&cell, &records), 2);

        let records = vec![rec(0.1, 0.1, 4), rec(0.1, 0.1, 4), rec(0.1, 0.1, 2)];
        assert_eq!(representative_status(&cell, &records), 4);

        let band = PartitionKey::Band { band: 0, status_code: 9 };
        assert_eq!(representative_status(&band, &records), 9);
    }

    fn arb_record() -> impl Strategy<Value = EventRecord> {
        (-90.0f64..=90.0, -180.0f64..=180.0, 0i64..6).prop_map(|(lat, lon, code)| rec(lat, lon, code))
    }

    fn arb_mode() -> impl Strategy<Value = PartitionMode> {
        prop_oneof![
            (1i64..2000).prop_map(|scale| PartitionMode::Banded { scale }),
            (0.01f64..10.0, proptest::option::of(0u16..6)).prop_map(|(cell_size, valid_status)| {
                PartitionMode::Grid {
                    cell_size,
                    valid_status,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_partition_is_pure(records in proptest::collection::vec(arb_record(), 0..200), mode in arb_mode()) {
            let first = partition(&records, &mode);
            let second = partition(&records, &mode);
            prop_assert_eq!(&first, &second);

            // Disjoint cover of the kept records, no empty groups.
            let kept = records.iter().filter(|r| mode.key_for(r).is_some()).count();
            prop_assert_eq!(first.values().map(Vec::len).sum::<usize>(), kept);
            prop_assert!(first.values().all(|group| !group.is_empty()));
        }
    }
}
