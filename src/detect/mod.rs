//! Density hotspot detection over closed bursts.
//!
//! A burst is split into independent partitions ([`partition`]), each
//! partition is clustered with DBSCAN ([`dbscan`]) on a bounded worker pool,
//! significant clusters are extracted ([`extract`]) and finally merged into a
//! single deterministic ranking ([`aggregate`]). [`engine::Detector`] ties
//! the stages together.

pub mod aggregate;
pub mod dbscan;
pub mod engine;
pub mod extract;
pub mod partition;
pub mod stats;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::GeoPoint;

pub use engine::{BurstReport, Detector, DetectorConfig};
pub use partition::{PartitionKey, PartitionMode};
pub use stats::ErrorStats;

/// Mean Earth radius in meters, for reporting haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),

    #[error("non-finite coordinate at index {index} in partition")]
    NonFiniteCoordinate { index: usize },

    #[error("detection cancelled")]
    Cancelled,

    #[error("detector worker failed: {0}")]
    WorkerFailed(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Distance function used for neighbour queries.
///
/// `eps` is interpreted in the metric's own units: degrees for
/// [`DistanceMetric::Planar`], radians of arc for [`DistanceMetric::Haversine`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance on raw (lat, lon) degrees.
    Planar,
    /// Great-circle distance in radians.
    #[default]
    Haversine,
}

impl DistanceMetric {
    /// Map a position into the coordinate space the metric operates on.
    pub fn project(self, point: GeoPoint) -> GeoPoint {
        match self {
            Self::Planar => point,
            Self::Haversine => point.to_radians(),
        }
    }

    /// Distance between two already-projected points.
    pub fn distance(self, a: GeoPoint, b: GeoPoint) -> f64 {
        match self {
            Self::Planar => (a.lat - b.lat).hypot(a.lon - b.lon),
            Self::Haversine => {
                let dlat = b.lat - a.lat;
                let dlon = b.lon - a.lon;
                let h = (dlat / 2.0).sin().powi(2)
                    + a.lat.cos() * b.lat.cos() * (dlon / 2.0).sin().powi(2);
                2.0 * h.sqrt().min(1.0).asin()
            }
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Planar => write!(f, "planar"),
            DistanceMetric::Haversine => write!(f, "haversine"),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planar" | "euclidean" => Ok(Self::Planar),
            "haversine" => Ok(Self::Haversine),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// A significant hotspot found in one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub center: GeoPoint,
    pub size: usize,
    pub status_code: u16,
    pub members: Vec<GeoPoint>,
    pub partition: PartitionKey,
}
