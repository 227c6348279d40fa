//! Turn raw DBSCAN labels into reportable clusters.

use crate::detect::dbscan::Labels;
use crate::detect::{Cluster, PartitionKey};
use crate::record::GeoPoint;

/// Build clusters for every label with at least `min_cluster_size` members.
///
/// Smaller labels are dropped outright. The result is ordered by size,
/// largest first, with ties kept in label discovery order.
pub fn extract_clusters(
    points: &[GeoPoint],
    labels: &Labels,
    partition: PartitionKey,
    status_code: u16,
    min_cluster_size: usize,
) -> Vec<Cluster> {
    let mut members: Vec<Vec<GeoPoint>> = vec![Vec::new(); labels.cluster_count];
    for (point, label) in points.iter().zip(&labels.labels) {
        if let Some(id) = label.cluster_id() {
            members[id].push(*point);
        }
    }

    let mut clusters: Vec<Cluster> = members
        .into_iter()
        .filter(|group| !group.is_empty() && group.len() >= min_cluster_size)
        .map(|group| Cluster {
            center: mean_position(&group),
            size: group.len(),
            status_code,
            members: group,
            partition,
        })
        .collect();

    // Stable: equal sizes stay in label order.
    clusters.sort_by(|a, b| b.size.cmp(&a.size));
    clusters
}

/// Arithmetic mean of latitudes and longitudes.
pub fn mean_position(points: &[GeoPoint]) -> GeoPoint {
    if points.is_empty() {
        return GeoPoint::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
    GeoPoint::new(lat / n, lon / n)
}
