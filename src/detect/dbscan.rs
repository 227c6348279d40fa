//! DBSCAN density clustering over a single partition.
//!
//! Points are visited front to back. A point whose eps-neighbourhood (itself
//! included) holds at least `min_samples` points is a core point and seeds a
//! new cluster, which is expanded breadth-first through further core points.
//! Border points keep the label of the first cluster that reaches them and
//! anything never reached stays noise. For a fixed input order the labelling
//! is fully deterministic.
//!
//! Neighbour queries go through a uniform grid so only adjacent cells are
//! scanned. Every candidate is still checked against the
//! exact metric, so membership matches a brute-force scan.

use std::collections::{HashMap, VecDeque};

use tokio_util::sync::CancellationToken;

use crate::detect::{DetectError, DistanceMetric};
use crate::record::GeoPoint;

/// Cluster assignment for one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Noise,
    Cluster(usize),
}

impl Label {
    pub fn cluster_id(self) -> Option<usize> {
        match self {
            Label::Noise => None,
            Label::Cluster(id) => Some(id),
        }
    }
}

/// Output of a clustering run: one label per input point, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct Labels {
    pub labels: Vec<Label>,
    /// Number of distinct cluster ids; ids are `0..cluster_count`.
    pub cluster_count: usize,
}

impl Labels {
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|l| **l == Label::Noise).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
    pub metric: DistanceMetric,
}

/// Run DBSCAN over `points` (degrees). The token is polled between visits so
/// a shutdown can abort long partitions.
pub fn dbscan(
    points: &[GeoPoint],
    params: &DbscanParams,
    cancel: &CancellationToken,
) -> Result<Labels, DetectError> {
    cluster(points, params, cancel).map(|(labels, _)| labels)
}

/// Queue traffic of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct FrontierStats {
    pushes: usize,
    peak: usize,
}

/// Every point enters an expansion frontier at most once over the whole run,
/// so queue memory stays linear in the partition size.
fn cluster(
    points: &[GeoPoint],
    params: &DbscanParams,
    cancel: &CancellationToken,
) -> Result<(Labels, FrontierStats), DetectError> {
    if !(params.eps.is_finite() && params.eps > 0.0) {
        return Err(DetectError::InvalidConfig(format!(
            "eps must be positive and finite, got {}",
            params.eps
        )));
    }

    let index = NeighborIndex::build(points, params.eps, params.metric)?;
    let n = points.len();

    let mut assigned: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut queued = vec![false; n];
    let mut stats = FrontierStats::default();
    let mut next_id = 0usize;

    for seed in 0..n {
        if cancel.is_cancelled() {
            return Err(DetectError::Cancelled);
        }
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let neighbors = index.neighbors(seed);
        if neighbors.len() < params.min_samples {
            // Noise for now; a later cluster may still claim it as a border point.
            continue;
        }

        let id = next_id;
        next_id += 1;
        assigned[seed] = Some(id);

        let mut frontier = VecDeque::with_capacity(neighbors.len());
        for q in neighbors {
            if assigned[q].is_none() {
                assigned[q] = Some(id);
            }
            if !visited[q] && !queued[q] {
                queued[q] = true;
                frontier.push_back(q);
                stats.pushes += 1;
            }
        }
        stats.peak = stats.peak.max(frontier.len());
        // Queued points are unvisited and already labelled.
        while let Some(point) = frontier.pop_front() {
            visited[point] = true;

            if cancel.is_cancelled() {
                return Err(DetectError::Cancelled);
            }

            let reach = index.neighbors(point);
            if reach.len() >= params.min_samples {
                // Earlier noise points are claimed here as border points.
                for q in reach {
                    if assigned[q].is_none() {
                        assigned[q] = Some(id);
                    }
                    if !visited[q] && !queued[q] {
                        queued[q] = true;
                        frontier.push_back(q);
                        stats.pushes += 1;
                    }
                }
                stats.peak = stats.peak.max(frontier.len());
            }
        }
    }

    let labels = Labels {
        labels: assigned
            .into_iter()
            .map(|slot| slot.map_or(Label::Noise, Label::Cluster))
            .collect(),
        cluster_count: next_id,
    };
    Ok((labels, stats))
}

/// Grid bucket index over projected points.
///
/// Cells are `2 * eps` wide, so a true neighbour always lands in the same or
/// an adjacent cell even after rounding at a cell boundary.
///
/// Great-circle distance is never smaller than the latitude difference but
/// can be much smaller than the longitude difference near the poles, so the
/// haversine index buckets on latitude only.
struct NeighborIndex {
    projected: Vec<GeoPoint>,
    cells: HashMap<(i64, i64), Vec<usize>>,
    eps: f64,
    metric: DistanceMetric,
}

impl NeighborIndex {
    fn build(points: &[GeoPoint], eps: f64, metric: DistanceMetric) -> Result<Self, DetectError> {
        let mut projected = Vec::with_capacity(points.len());
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

        for (index, point) in points.iter().enumerate() {
            let p = metric.project(*point);
            if !(p.lat.is_finite() && p.lon.is_finite()) {
                return Err(DetectError::NonFiniteCoordinate { index });
            }
            cells.entry(cell_of(p, eps, metric)).or_default().push(index);
            projected.push(p);
        }

        Ok(Self {
            projected,
            cells,
            eps,
            metric,
        })
    }

    /// All points within eps of `index` (itself included), ascending.
    fn neighbors(&self, index: usize) -> Vec<usize> {
        let origin = self.projected[index];
        let (row, col) = cell_of(origin, self.eps, self.metric);
        let cols: &[i64] = match self.metric {
            DistanceMetric::Planar => &[-1, 0, 1],
            DistanceMetric::Haversine => &[0],
        };

        let mut found = Vec::new();
        for dr in -1..=1 {
            for dc in cols {
                let key = (row.saturating_add(dr), col.saturating_add(*dc));
                let Some(bucket) = self.cells.get(&key) else {
                    continue;
                };
                found.extend(bucket.iter().copied().filter(|&other| {
                    self.metric.distance(origin, self.projected[other]) <= self.eps
                }));
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }
}

fn cell_of(p: GeoPoint, eps: f64, metric: DistanceMetric) -> (i64, i64) {
    let width = 2.0 * eps;
    let row = (p.lat / width).floor() as i64;
    match metric {
        DistanceMetric::Planar => (row, (p.lon / width).floor() as i64),
        DistanceMetric::Haversine => (row, 0),
    }
}
