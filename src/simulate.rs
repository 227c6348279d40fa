//! Synthetic traffic generator.
//!
//! Produces a burst shaped like real field traffic: a handful of dense
//! hotspots, all reporting code 3, buried in uniform noise over the whole
//! globe with random codes. Used by the `simulate` and `bench` subcommands.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::burst::Burst;
use crate::record::{EventRecord, RecordError};

/// Status code carried by every hotspot packet.
pub const HOTSPOT_STATUS: i64 = 3;

/// Half-extent of a hotspot in degrees of latitude.
const HOTSPOT_LAT_SPREAD: f64 = 0.09;
/// Half-extent of a hotspot in degrees of longitude.
const HOTSPOT_LON_SPREAD: f64 = 0.18;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    /// Packets in the burst, hotspots included.
    pub total_packets: usize,
    pub clusters: usize,
    pub cluster_size: usize,
    /// Fixed seed for reproducible bursts.
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            total_packets: 300_000,
            clusters: 3,
            cluster_size: 600,
            seed: None,
        }
    }
}

/// One report in wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WirePacket {
    pub lat: f64,
    pub lon: f64,
    pub error_code: i64,
}

/// Generate a shuffled synthetic burst.
///
/// When hotspots alone exceed `total_packets` no noise is added.
pub fn generate_packets(params: &SimulationParams) -> Vec<WirePacket> {
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut packets = Vec::with_capacity(params.total_packets.max(params.clusters * params.cluster_size));
    for _ in 0..params.clusters {
        let center_lat: f64 = rng.gen_range(-40.0..=40.0);
        let center_lon: f64 = rng.gen_range(-91.0..=91.0);
        for _ in 0..params.cluster_size {
            packets.push(WirePacket {
                lat: center_lat + rng.gen_range(-HOTSPOT_LAT_SPREAD..=HOTSPOT_LAT_SPREAD),
                lon: center_lon + rng.gen_range(-HOTSPOT_LON_SPREAD..=HOTSPOT_LON_SPREAD),
                error_code: HOTSPOT_STATUS,
            });
        }
    }

    let noise = params.total_packets.saturating_sub(packets.len());
    for _ in 0..noise {
        packets.push(WirePacket {
            lat: rng.gen_range(-90.0..=90.0),
            lon: rng.gen_range(-180.0..=180.0),
            error_code: rng.gen_range(0..=4),
        });
    }

    packets.shuffle(&mut rng);
    packets
}

/// Generate a synthetic burst directly as validated records.
pub fn generate_burst(params: &SimulationParams) -> Result<Burst, RecordError> {
    let records = generate_packets(params)
        .into_iter()
        .map(|p| EventRecord::now(p.lat, p.lon, p.error_code))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Burst::from_records(records))
}

/// Send `packets` as individual JSON datagrams to `target`.
///
/// Yields to the runtime every `batch` packets, optionally pausing for
/// `pause`, so a local receiver is not overrun.
pub async fn send_packets(
    target: &str,
    packets: &[WirePacket],
    batch: usize,
    pause: Option<Duration>,
) -> Result<usize> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind sender socket")?;
    let batch = batch.max(1);

    info!(target_addr = target, packets = packets.len(), "sending synthetic burst");
    let mut sent = 0usize;
    for (i, packet) in packets.iter().enumerate() {
        let payload = serde_json::to_vec(packet).context("failed to encode packet")?;
        socket
            .send_to(&payload, target)
            .await
            .with_context(|| format!("failed to send packet to {target}"))?;
        sent += 1;

        if (i + 1) % batch == 0 {
            match pause {
                Some(d) => tokio::time::sleep(d).await,
                None => tokio::task::yield_now().await,
            }
        }
    }
    debug!(sent, "synthetic burst sent");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(total: usize) -> SimulationParams {
        SimulationParams {
            total_packets: total,
            clusters: 3,
            cluster_size: 50,
            seed: Some(7),
        }
    }

    #[test]
    fn test_packet_counts_and_codes() {
        let packets = generate_packets(&params(1000));
        assert_eq!(packets.len(), 1000);
        let hotspot = packets.iter().filter(|p| p.error_code == HOTSPOT_STATUS).count();
        // 150 hotspot packets plus whatever noise happened to draw code 3.
        assert!(hotspot >= 150);
        assert!(packets.iter().all(|p| (0..=4).contains(&p.error_code)));
        assert!(packets
            .iter()
            .all(|p| (-90.0..=90.0).contains(&p.lat) && (-180.0..=180.0).contains(&p.lon)));
    }

    #[test]
    fn test_seed_is_reproducible() {
        assert_eq!(generate_packets(&params(500)), generate_packets(&params(500)));
        let other = SimulationParams {
            seed: Some(8),
            ..params(500)
        };
        assert_ne!(generate_packets(&params(500)), generate_packets(&other));
    }

    #[test]
    fn test_hotspots_exceeding_total_add_no_noise() {
        let packets = generate_packets(&params(10));
        assert_eq!(packets.len(), 150);
        assert!(packets.iter().all(|p| p.error_code == HOTSPOT_STATUS));
    }

    #[test]
    fn test_generate_burst_validates() {
        let burst = generate_burst(&params(400)).unwrap();
        assert_eq!(burst.len(), 400);
    }

    #[tokio::test]
    async fn test_send_packets_delivers_json() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = receiver.local_addr().unwrap().to_string();
        let packets = vec![WirePacket {
            lat: 1.0,
            lon: 2.0,
            error_code: 3,
        }];

        let sent = send_packets(&target, &packets, 100, None).await.unwrap();
        assert_eq!(sent, 1);

        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let record = crate::ingest::decode_datagram(&buf[..len]).unwrap();
        assert_eq!(record.status_code(), 3);
    }
}
