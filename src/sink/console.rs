use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;

use super::{ClusterSink, DetectorEvent};
use crate::detect::Cluster;

/// Prints a ranked cluster table to stdout after every burst.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

/// Human-readable summary of one burst's clusters.
pub fn render_result(clusters: &[Cluster], latency: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Clusters detected: {}", clusters.len());
    for c in clusters {
        let _ = writeln!(
            out,
            "  center ({:.6}, {:.6})  code {:>4}  size {}",
            c.center.lat, c.center.lon, c.status_code, c.size
        );
    }
    let _ = writeln!(out, "Processing time: {:.3}s", latency.as_secs_f64());
    out
}

#[async_trait::async_trait]
impl ClusterSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn publish(&self, event: &DetectorEvent) -> Result<()> {
        if let DetectorEvent::Result {
            clusters, latency, ..
        } = event
        {
            print!("{}", render_result(clusters, *latency));
        }
        Ok(())
    }
}
