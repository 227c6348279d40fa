//! Task wiring for the live daemon.
//!
//! ```text
//! UDP socket -> listener -> records -> accumulator -> bursts -> processor -> sinks
//! ```
//!
//! Listener and accumulator run as their own tokio tasks. The processor runs
//! on the calling task and hands each burst to the detector on the blocking
//! pool, so only one burst is in flight while the next one accumulates.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::burst::{run_accumulator, Burst};
use crate::config::GeoburstConfig;
use crate::detect::{BurstReport, DetectError, Detector, ErrorStats};
use crate::ingest::{run_listener, ListenerStats};
use crate::sink::{ClusterSink, ConsoleSink, DetectorEvent, ForwardSink, PlotSink};

/// Totals reported when the pipeline shuts down.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub bursts: u64,
    pub clusters: u64,
    pub accepted: u64,
    pub rejected: u64,
    /// Per-code counts across every processed burst.
    pub stats: ErrorStats,
}

/// Bind the ingest socket, build the configured sinks and run until Ctrl-C.
pub async fn serve(config: GeoburstConfig) -> Result<PipelineSummary> {
    let socket = UdpSocket::bind(&config.listener.bind)
        .await
        .with_context(|| format!("failed to bind UDP socket on {}", config.listener.bind))?;
    let sinks = build_sinks(&config).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
        ctrl_c.cancel();
    });

    run(socket, &config, sinks, cancel).await
}

/// Sinks enabled by `config`: console always, plot and forward when set.
pub async fn build_sinks(config: &GeoburstConfig) -> Result<Vec<Box<dyn ClusterSink>>> {
    let mut sinks: Vec<Box<dyn ClusterSink>> = vec![Box::new(ConsoleSink::new())];
    if let Some(path) = &config.plot.path {
        info!(path = %path.display(), "plot export enabled");
        sinks.push(Box::new(PlotSink::new(path)));
    }
    if config.forward.enabled {
        let sink = ForwardSink::bind(&config.forward.target, &config.forward.message_type).await?;
        info!(forward_to = %sink.target(), "cluster forwarding enabled");
        sinks.push(Box::new(sink));
    }
    Ok(sinks)
}

/// Run the pipeline on an already-bound socket until `cancel` fires.
pub async fn run(
    socket: UdpSocket,
    config: &GeoburstConfig,
    sinks: Vec<Box<dyn ClusterSink>>,
    cancel: CancellationToken,
) -> Result<PipelineSummary> {
    config.validate()?;
    let detector = Arc::new(
        Detector::new(config.detector_config(), cancel.clone())
            .context("failed to start detector")?,
    );

    let (record_tx, record_rx) = mpsc::unbounded_channel();
    let (burst_tx, mut burst_rx) = mpsc::unbounded_channel::<Burst>();
    let listener_stats = Arc::new(ListenerStats::default());

    let listener = tokio::spawn(run_listener(
        socket,
        record_tx,
        config.listener.max_datagram_size,
        listener_stats.clone(),
        cancel.clone(),
    ));
    let accumulator = tokio::spawn(run_accumulator(
        record_rx,
        burst_tx,
        config.burst.idle_timeout(),
        config.burst.poll_interval(),
        cancel.clone(),
    ));

    let mut summary = PipelineSummary::default();
    loop {
        let burst = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            maybe = burst_rx.recv() => match maybe {
                Some(burst) => Arc::new(burst),
                None => break,
            },
        };

        let report = match process(&detector, burst.clone()).await {
            Ok(report) => report,
            Err(DetectError::Cancelled) => break,
            Err(e) => {
                error!(burst_id = %burst.id, error = %e, "burst processing failed");
                continue;
            }
        };

        summary.bursts += 1;
        summary.clusters += report.clusters.len() as u64;
        summary.stats.merge(&report.stats);
        debug!(
            records_total = summary.stats.total(),
            codes = %summary.stats,
            "cumulative error statistics"
        );

        publish(&sinks, report, burst, detector.config().eps).await;
    }

    cancel.cancel();
    if let Err(e) = listener.await {
        warn!(error = %e, "listener task ended abnormally");
    }
    if let Err(e) = accumulator.await {
        warn!(error = %e, "accumulator task ended abnormally");
    }

    summary.accepted = listener_stats.accepted();
    summary.rejected = listener_stats.rejected();
    info!(
        bursts = summary.bursts,
        clusters = summary.clusters,
        accepted = summary.accepted,
        rejected = summary.rejected,
        "pipeline stopped"
    );
    Ok(summary)
}

async fn process(detector: &Arc<Detector>, burst: Arc<Burst>) -> Result<BurstReport, DetectError> {
    let detector = detector.clone();
    match tokio::task::spawn_blocking(move || detector.process_burst(&burst)).await {
        Ok(result) => result,
        Err(e) => Err(DetectError::WorkerFailed(e.to_string())),
    }
}

async fn publish(sinks: &[Box<dyn ClusterSink>], report: BurstReport, burst: Arc<Burst>, eps: f64) {
    let clusters = Arc::new(report.clusters);
    let events = [
        DetectorEvent::Result {
            burst_id: report.burst_id,
            clusters: clusters.clone(),
            latency: report.latency,
        },
        DetectorEvent::Plot {
            burst,
            clusters,
            eps,
        },
    ];

    for event in &events {
        for sink in sinks {
            if let Err(e) = sink.publish(event).await {
                warn!(sink = sink.name(), error = %e, "sink failed");
            }
        }
    }
}
