//! Merge per-partition results into one ranking.

use crate::detect::{Cluster, PartitionKey};

/// Concatenate partition results and rank by size, largest first.
///
/// Partitions are concatenated in key order before a stable sort, so equal
/// sizes are broken by partition key and then by discovery order within the
/// partition. The outcome does not depend on which worker finished first.
pub fn merge_ranked<I>(partitions: I) -> Vec<Cluster>
where
    I: IntoIterator<Item = (PartitionKey, Vec<Cluster>)>,
{
    let mut ordered: Vec<(PartitionKey, Vec<Cluster>)> = partitions.into_iter().collect();
    ordered.sort_by_key(|(key, _)| *key);

    let mut merged: Vec<Cluster> = ordered.into_iter().flat_map(|(_, list)| list).collect();
    merged.sort_by(|a, b| b.size.cmp(&a.size));
    merged
}
