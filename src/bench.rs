//! Worker-scaling benchmark.
//!
//! Times [`Detector::process_burst`] on the same burst for a series of pool
//! sizes and reports speedup relative to the first size.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::burst::Burst;
use crate::detect::{DetectError, Detector, DetectorConfig};

/// Pool sizes tried when none are given.
pub const DEFAULT_WORKER_COUNTS: &[usize] = &[1, 2, 4, 8, 16, 32, 64, 128];

#[derive(Debug, Clone, Serialize)]
pub struct BenchSample {
    pub workers: usize,
    pub seconds: f64,
    pub speedup: f64,
    pub clusters: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub records: usize,
    pub samples: Vec<BenchSample>,
}

/// Run the benchmark. Zero worker counts are skipped.
pub fn run_bench(
    base: &DetectorConfig,
    worker_counts: &[usize],
    burst: &Burst,
) -> Result<BenchReport, DetectError> {
    let mut timings: Vec<(usize, Duration, usize)> = Vec::with_capacity(worker_counts.len());
    for &workers in worker_counts.iter().filter(|w| **w > 0) {
        let config = DetectorConfig {
            worker_pool_size: workers,
            ..base.clone()
        };
        let detector = Detector::new(config, CancellationToken::new())?;

        let started = Instant::now();
        let report = detector.process_burst(burst)?;
        let elapsed = started.elapsed();

        info!(workers, seconds = elapsed.as_secs_f64(), clusters = report.clusters.len(), "bench run");
        timings.push((workers, elapsed, report.clusters.len()));
    }

    let baseline = timings.first().map_or(0.0, |(_, d, _)| d.as_secs_f64());
    let samples = timings
        .into_iter()
        .map(|(workers, elapsed, clusters)| {
            let seconds = elapsed.as_secs_f64();
            BenchSample {
                workers,
                seconds,
                speedup: speedup(baseline, seconds),
                clusters,
            }
        })
        .collect();

    Ok(BenchReport {
        records: burst.len(),
        samples,
    })
}

fn speedup(baseline: f64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        baseline / seconds
    } else {
        1.0
    }
}

/// Parse a comma-separated list such as `1,2,4,8`.
pub fn parse_worker_counts(s: &str) -> Result<Vec<usize>, String> {
    let counts = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|e| format!("invalid worker count '{part}': {e}"))
                .and_then(|n| {
                    if n == 0 {
                        Err("worker count must be at least 1".to_string())
                    } else {
                        Ok(n)
                    }
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if counts.is_empty() {
        return Err("at least one worker count is required".to_string());
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DistanceMetric, PartitionMode};
    use crate::simulate::{generate_burst, SimulationParams};

    #[test]
    fn test_parse_worker_counts() {
        assert_eq!(parse_worker_counts("1,2, 4,8").unwrap(), vec![1, 2, 4, 8]);
        assert!(parse_worker_counts("1,0").is_err());
        assert!(parse_worker_counts("two").is_err());
        assert!(parse_worker_counts("").is_err());
    }

    #[test]
    fn test_speedup_relative_to_first() {
        assert_eq!(speedup(2.0, 1.0), 2.0);
        assert_eq!(speedup(2.0, 0.0), 1.0);
    }

    #[test]
    fn test_run_bench_small_burst() {
        let burst = generate_burst(&SimulationParams {
            total_packets: 2_000,
            clusters: 2,
            cluster_size: 300,
            seed: Some(42),
        })
        .unwrap();
        let config = DetectorConfig {
            eps: 0.005,
            min_samples: 20,
            min_cluster_size: 50,
            metric: DistanceMetric::Haversine,
            partition: PartitionMode::Banded { scale: 1 },
            worker_pool_size: 0,
        };

        let report = run_bench(&config, &[1, 2], &burst).unwrap();
        assert_eq!(report.records, 2_000);
        assert_eq!(report.samples.len(), 2);
        assert_eq!(report.samples[0].workers, 1);
        assert!((report.samples[0].speedup - 1.0).abs() < 1e-9 || report.samples[0].seconds == 0.0);
        // Same burst, same clusters, whatever the pool size.
        assert_eq!(report.samples[0].clusters, report.samples[1].clusters);
    }
}
