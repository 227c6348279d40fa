//! Full pipeline over loopback UDP: datagrams in, forwarded clusters out.

use std::time::Duration;

use geoburst::config::GeoburstConfig;
use geoburst::detect::{DistanceMetric, PartitionMode};
use geoburst::pipeline::{build_sinks, run};
use geoburst::sink::ForwardRecord;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

fn test_config(forward_to: String, plot: std::path::PathBuf) -> GeoburstConfig {
    let mut config = GeoburstConfig::default();
    config.detector.eps = 0.01;
    config.detector.min_samples = 5;
    config.detector.min_cluster_size = 20;
    config.detector.metric = DistanceMetric::Planar;
    config.detector.worker_pool_size = 2;
    config.partition = PartitionMode::Banded { scale: 1 };
    config.burst.idle_timeout_ms = 300;
    config.burst.poll_interval_ms = 50;
    config.forward.enabled = true;
    config.forward.target = forward_to;
    config.forward.message_type = "cluster_alert".to_string();
    config.plot.path = Some(plot);
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_udp_burst_is_clustered_and_forwarded() {
    let collector = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let forward_to = collector.local_addr().unwrap().to_string();
    let dir = tempfile::tempdir().unwrap();
    let plot_path = dir.path().join("plot.jsonl");

    let config = test_config(forward_to, plot_path.clone());
    let ingest = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let ingest_addr = ingest.local_addr().unwrap();
    let sinks = build_sinks(&config).await.unwrap();
    let cancel = CancellationToken::new();

    let pipeline = {
        let cancel = cancel.clone();
        tokio::spawn(async move { run(ingest, &config, sinks, cancel).await })
    };

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // One hotspot of 40 reports with code 2, plus junk the listener must drop.
    for i in 0..40u32 {
        let lat = 12.5 + f64::from(i % 8) * 0.002;
        let lon = -45.0 + f64::from(i / 8) * 0.002;
        let payload = format!(r#"{{"lat": {lat}, "lon": {lon}, "error_code": 2}}"#);
        sender.send_to(payload.as_bytes(), ingest_addr).await.unwrap();
        if i % 10 == 0 {
            sender.send_to(b"{broken", ingest_addr).await.unwrap();
        }
    }
    sender
        .send_to(br#"{"lat": 123.0, "lon": 0.0, "error_code": 2}"#, ingest_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(10), collector.recv_from(&mut buf))
        .await
        .expect("forwarded cluster within timeout")
        .unwrap();
    let forwarded: ForwardRecord = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(forwarded.message_type, "cluster_alert");
    assert_eq!(forwarded.status_code, 2);
    assert!((forwarded.latitude - 12.507).abs() < 0.01);
    assert!((forwarded.longitude - -44.996).abs() < 0.01);

    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(10), pipeline)
        .await
        .expect("pipeline stops after cancel")
        .unwrap()
        .unwrap();

    assert_eq!(summary.bursts, 1);
    assert_eq!(summary.clusters, 1);
    assert_eq!(summary.accepted, 40);
    assert_eq!(summary.rejected, 5);
    assert_eq!(summary.stats.count(2), 40);

    let plot = std::fs::read_to_string(&plot_path).unwrap();
    assert_eq!(plot.lines().count(), 1);
}
