use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{ClusterSink, DetectorEvent};
use crate::detect::Cluster;
use crate::record::GeoPoint;

/// Appends one JSON line per burst for external visualisation.
///
/// Each line holds every point in the burst, the clusters found in it and
/// the `eps` used, which is enough to draw the points, the cluster centres
/// and their neighbourhood circles.
#[derive(Debug, Clone)]
pub struct PlotSink {
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct PlotLine<'a> {
    burst_id: Uuid,
    eps: f64,
    points: Vec<PlotPoint>,
    clusters: &'a [Cluster],
}

#[derive(Debug, Serialize)]
struct PlotPoint {
    #[serde(flatten)]
    position: GeoPoint,
    status_code: u16,
}

impl PlotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ClusterSink for PlotSink {
    fn name(&self) -> &str {
        "plot"
    }

    async fn publish(&self, event: &DetectorEvent) -> Result<()> {
        let DetectorEvent::Plot {
            burst,
            clusters,
            eps,
        } = event
        else {
            return Ok(());
        };

        let line = PlotLine {
            burst_id: burst.id,
            eps: *eps,
            points: burst
                .records
                .iter()
                .map(|r| PlotPoint {
                    position: r.position(),
                    status_code: r.status_code(),
                })
                .collect(),
            clusters,
        };
        let mut encoded = serde_json::to_vec(&line).context("failed to encode plot line")?;
        encoded.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open plot file {}", self.path.display()))?;
        file.write_all(&encoded)
            .await
            .with_context(|| format!("failed to write plot file {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }
}
