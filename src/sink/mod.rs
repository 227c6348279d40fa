//! Output sinks for detector results.
//!
//! The processing loop publishes a [`DetectorEvent::Result`] followed by a
//! [`DetectorEvent::Plot`] for every burst. Each sink picks the events it
//! cares about and ignores the rest. A failing sink is logged by the caller
//! and never stops the pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use crate::burst::Burst;
use crate::detect::Cluster;

pub mod console;
pub mod forward;
pub mod plot;

pub use console::ConsoleSink;
pub use forward::{ForwardRecord, ForwardSink};
pub use plot::PlotSink;

/// Something observable produced after a burst has been processed.
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// Ranked clusters for a burst.
    Result {
        burst_id: Uuid,
        clusters: Arc<Vec<Cluster>>,
        latency: Duration,
    },
    /// The full burst together with its clusters, for external plotting.
    Plot {
        burst: Arc<Burst>,
        clusters: Arc<Vec<Cluster>>,
        eps: f64,
    },
}

/// Consumer of detector events.
#[async_trait::async_trait]
pub trait ClusterSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn publish(&self, event: &DetectorEvent) -> Result<()>;
}
