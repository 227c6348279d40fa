use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::burst::Burst;
use crate::detect::aggregate::merge_ranked;
use crate::detect::dbscan::{dbscan, DbscanParams};
use crate::detect::extract::extract_clusters;
use crate::detect::partition::{partition, representative_status};
use crate::detect::{Cluster, DetectError, DistanceMetric, ErrorStats, PartitionKey, PartitionMode};
use crate::record::{EventRecord, GeoPoint};

/// Detector parameters, fixed for the lifetime of a [`Detector`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorConfig {
    /// Neighbourhood radius in the metric's units.
    pub eps: f64,
    /// Neighbours (self included) needed for a core point.
    pub min_samples: usize,
    /// Smallest label kept as a reportable cluster.
    pub min_cluster_size: usize,
    pub metric: DistanceMetric,
    pub partition: PartitionMode,
    /// Worker threads for partition clustering; 0 uses available parallelism.
    pub worker_pool_size: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            eps: 0.005,
            min_samples: 100,
            min_cluster_size: 300,
            metric: DistanceMetric::Haversine,
            partition: PartitionMode::default(),
            worker_pool_size: 0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectError> {
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(DetectError::InvalidConfig(format!(
                "eps must be positive and finite, got {}",
                self.eps
            )));
        }
        if self.min_samples == 0 {
            return Err(DetectError::InvalidConfig("min_samples must be at least 1".into()));
        }
        if self.min_cluster_size == 0 {
            return Err(DetectError::InvalidConfig(
                "min_cluster_size must be at least 1".into(),
            ));
        }
        match self.partition {
            PartitionMode::Banded { scale } if scale < 1 => Err(DetectError::InvalidConfig(
                format!("partition scale must be at least 1, got {scale}"),
            )),
            PartitionMode::Grid { cell_size, .. } if !(cell_size.is_finite() && cell_size > 0.0) => {
                Err(DetectError::InvalidConfig(format!(
                    "partition cell_size must be positive, got {cell_size}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn dbscan_params(&self) -> DbscanParams {
        DbscanParams {
            eps: self.eps,
            min_samples: self.min_samples,
            metric: self.metric,
        }
    }

    /// Effective worker count after resolving 0 to the host's parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.worker_pool_size > 0 {
            return self.worker_pool_size;
        }
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

/// Everything produced for one closed burst.
#[derive(Debug, Clone, Serialize)]
pub struct BurstReport {
    pub burst_id: Uuid,
    /// Ranked largest first, ties by partition key then discovery order.
    pub clusters: Vec<Cluster>,
    /// Per-code counts for this burst only.
    pub stats: ErrorStats,
    pub partitions: usize,
    pub failed_partitions: usize,
    #[serde(with = "duration_ms")]
    pub latency: Duration,
}

/// Burst clustering front end.
///
/// Owns the configuration and a bounded rayon pool. Each call to
/// [`Detector::process_burst`] partitions the burst, clusters every
/// partition on the pool and merges the results once all workers return.
pub struct Detector {
    config: DetectorConfig,
    pool: rayon::ThreadPool,
    cancel: CancellationToken,
}

type PartitionOutcome = (PartitionKey, Result<Vec<Cluster>, String>);

impl Detector {
    pub fn new(config: DetectorConfig, cancel: CancellationToken) -> Result<Self, DetectError> {
        config.validate()?;
        let workers = config.effective_workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("geoburst-worker-{i}"))
            .build()?;

        info!(
            workers,
            eps = config.eps,
            min_samples = config.min_samples,
            min_cluster_size = config.min_cluster_size,
            metric = %config.metric,
            "detector ready"
        );
        Ok(Self { config, pool, cancel })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cluster one burst. Blocks until every partition has been processed.
    ///
    /// A partition that errors or panics contributes no clusters and is
    /// counted in [`BurstReport::failed_partitions`]. The only error returned
    /// is [`DetectError::Cancelled`].
    pub fn process_burst(&self, burst: &Burst) -> Result<BurstReport, DetectError> {
        let params = self.config.dbscan_params();
        let min_cluster_size = self.config.min_cluster_size;
        let cancel = &self.cancel;
        self.process_with(burst, |key, records| {
            cluster_partition(key, records, &params, min_cluster_size, cancel)
        })
    }

    fn process_with<F>(&self, burst: &Burst, cluster_fn: F) -> Result<BurstReport, DetectError>
    where
        F: Fn(PartitionKey, &[EventRecord]) -> Result<Vec<Cluster>, DetectError> + Sync,
    {
        let started = Instant::now();
        let stats = ErrorStats::from_records(&burst.records);
        let groups = partition(&burst.records, &self.config.partition);
        let partitions = groups.len();

        debug!(burst_id = %burst.id, records = burst.len(), partitions, "partitioned burst");

        let outcomes = self.run_partitions(groups, &cluster_fn);

        if self.cancel.is_cancelled() {
            info!(burst_id = %burst.id, "burst processing cancelled");
            return Err(DetectError::Cancelled);
        }

        let mut failed_partitions = 0;
        let mut succeeded = Vec::with_capacity(outcomes.len());
        for (key, outcome) in outcomes {
            match outcome {
                Ok(clusters) => succeeded.push((key, clusters)),
                Err(reason) => {
                    failed_partitions += 1;
                    warn!(burst_id = %burst.id, partition = %key, error = %reason, "partition failed");
                }
            }
        }

        let clusters = merge_ranked(succeeded);
        let latency = started.elapsed();
        info!(
            burst_id = %burst.id,
            records = burst.len(),
            partitions,
            failed_partitions,
            clusters = clusters.len(),
            latency_ms = latency.as_millis() as u64,
            "burst processed"
        );

        Ok(BurstReport {
            burst_id: burst.id,
            clusters,
            stats,
            partitions,
            failed_partitions,
            latency,
        })
    }

    /// Fan partitions out on the pool. Results come back in key order.
    fn run_partitions<F>(
        &self,
        groups: BTreeMap<PartitionKey, Vec<EventRecord>>,
        cluster_fn: &F,
    ) -> Vec<PartitionOutcome>
    where
        F: Fn(PartitionKey, &[EventRecord]) -> Result<Vec<Cluster>, DetectError> + Sync,
    {
        let work: Vec<(PartitionKey, Vec<EventRecord>)> = groups.into_iter().collect();
        self.pool.install(|| {
            work.par_iter()
                .map(|(key, records)| {
                    let result = catch_unwind(AssertUnwindSafe(|| cluster_fn(*key, records.as_slice())));
                    let outcome = match result {
                        Ok(Ok(clusters)) => Ok(clusters),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(payload) => Err(panic_message(payload.as_ref())),
                    };
                    (*key, outcome)
                })
                .collect()
        })
    }
}

fn cluster_partition(
    key: PartitionKey,
    records: &[EventRecord],
    params: &DbscanParams,
    min_cluster_size: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Cluster>, DetectError> {
    // Not enough points to ever reach the size filter.
    if records.len() < min_cluster_size.max(params.min_samples) {
        return Ok(Vec::new());
    }
    let positions: Vec<GeoPoint> = records.iter().map(EventRecord::position).collect();
    let labels = dbscan(&positions, params, cancel)?;
    let status = representative_status(&key, records);
    Ok(extract_clusters(&positions, &labels, key, status, min_cluster_size))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }
}
