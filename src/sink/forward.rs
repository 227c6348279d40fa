use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use super::{ClusterSink, DetectorEvent};
use crate::detect::Cluster;

/// One forwarded cluster, sent as a single JSON datagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRecord {
    pub message_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status_code: u16,
}

impl ForwardRecord {
    pub fn from_cluster(message_type: &str, cluster: &Cluster) -> Self {
        Self {
            message_type: message_type.to_string(),
            latitude: cluster.center.lat,
            longitude: cluster.center.lon,
            status_code: cluster.status_code,
        }
    }
}

/// Fire-and-forget UDP forwarding of cluster centres.
///
/// Send failures are logged and skipped; nothing is retried.
pub struct ForwardSink {
    socket: UdpSocket,
    target: String,
    message_type: String,
}

impl ForwardSink {
    pub async fn bind(target: impl Into<String>, message_type: impl Into<String>) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind forwarding socket")?;
        Ok(Self {
            socket,
            target: target.into(),
            message_type: message_type.into(),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait::async_trait]
impl ClusterSink for ForwardSink {
    fn name(&self) -> &str {
        "forward"
    }

    async fn publish(&self, event: &DetectorEvent) -> Result<()> {
        let DetectorEvent::Result { clusters, .. } = event else {
            return Ok(());
        };

        let mut sent = 0usize;
        for cluster in clusters.iter() {
            let record = ForwardRecord::from_cluster(&self.message_type, cluster);
            let payload = serde_json::to_vec(&record).context("failed to encode forward record")?;
            match self.socket.send_to(&payload, self.target.as_str()).await {
                Ok(_) => sent += 1,
                Err(e) => warn!(dest = %self.target, error = %e, "failed to forward cluster"),
            }
        }
        debug!(dest = %self.target, sent, "forwarded clusters");
        Ok(())
    }
}
