//! UDP ingest listener.
//!
//! Every datagram carries one JSON report. Valid reports become
//! [`EventRecord`]s on the record channel; anything else is logged at debug
//! level, counted and dropped here so the detector only sees clean input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::record::{EventRecord, RecordError};

/// Default receive buffer, matching the largest report we expect.
pub const DEFAULT_MAX_DATAGRAM: usize = 4096;

/// First pause after a failed receive; doubles per consecutive failure.
const RECV_BACKOFF_BASE: Duration = Duration::from_millis(10);
/// Upper bound on the receive backoff.
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("datagram of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },

    #[error("malformed report: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid report: {0}")]
    Invalid(#[from] RecordError),
}

/// Report as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WireReport {
    #[serde(alias = "latitude")]
    lat: f64,
    #[serde(alias = "longitude")]
    lon: f64,
    #[serde(alias = "status_code")]
    error_code: i64,
}

/// Decode and validate one datagram payload.
pub fn decode_datagram(payload: &[u8]) -> Result<EventRecord, IngestError> {
    let report: WireReport = serde_json::from_slice(payload)?;
    Ok(EventRecord::now(report.lat, report.lon, report.error_code)?)
}

/// Counters shared between the listener task and its owner.
#[derive(Debug, Default)]
pub struct ListenerStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl ListenerStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Pause before the next receive after `failures` consecutive errors.
fn recv_backoff(failures: u32) -> Duration {
    let shift = failures.saturating_sub(1).min(16);
    RECV_BACKOFF_BASE
        .saturating_mul(1u32 << shift)
        .min(RECV_BACKOFF_MAX)
}

/// Receive datagrams until `cancel` fires or the record consumer goes away.
pub async fn run_listener(
    socket: UdpSocket,
    records: mpsc::UnboundedSender<EventRecord>,
    max_datagram: usize,
    stats: Arc<ListenerStats>,
    cancel: CancellationToken,
) {
    // One spare byte so an oversized datagram is detectable instead of
    // silently truncated into something that might parse.
    let mut buf = vec![0u8; max_datagram + 1];
    let local = socket.local_addr().ok();
    info!(addr = ?local, max_datagram, "UDP listener started");

    let mut failures = 0u32;
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("listener cancelled");
                break;
            }
            result = socket.recv_from(&mut buf) => {
                let (len, peer) = match result {
                    Ok(r) => {
                        failures = 0;
                        r
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let pause = recv_backoff(failures);
                        if failures == 1 {
                            warn!(error = %e, "recv_from error");
                        } else {
                            debug!(error = %e, failures, ?pause, "recv_from still failing");
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(pause) => {}
                        }
                        continue;
                    }
                };

                let decoded = if len > max_datagram {
                    Err(IngestError::Oversized { len, max: max_datagram })
                } else {
                    decode_datagram(&buf[..len])
                };

                match decoded {
                    Ok(record) => {
                        stats.accepted.fetch_add(1, Ordering::Relaxed);
                        if records.send(record).is_err() {
                            debug!("record consumer gone, stopping listener");
                            break;
                        }
                    }
                    Err(e) => {
                        stats.rejected.fetch_add(1, Ordering::Relaxed);
                        debug!(%peer, error = %e, "rejected datagram");
                    }
                }
            }
        }
    }

    info!(
        accepted = stats.accepted(),
        rejected = stats.rejected(),
        "UDP listener stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_backoff_grows_and_caps() {
        assert_eq!(recv_backoff(1), Duration::from_millis(10));
        assert_eq!(recv_backoff(2), Duration::from_millis(20));
        assert_eq!(recv_backoff(4), Duration::from_millis(80));
        assert_eq!(recv_backoff(8), RECV_BACKOFF_MAX);
        assert_eq!(recv_backoff(u32::MAX), RECV_BACKOFF_MAX);
    }

    #[test]
    fn test_decode_valid() {
        let record = decode_datagram(br#"{"lat": -23.5, "lon": -46.6, "error_code": 3}"#).unwrap();
        assert_eq!(record.latitude(), -23.5);
        assert_eq!(record.longitude(), -46.6);
        assert_eq!(record.status_code(), 3);
    }

    #[test]
    fn test_decode_aliases() {
        let record =
            decode_datagram(br#"{"latitude": 10.0, "longitude": 20.0, "status_code": 1}"#).unwrap();
        assert_eq!(record.status_code(), 1);
        assert_eq!(record.longitude(), 20.0);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let cases: [&[u8]; 5] = [
            b"not json",
            b"\xff\xfe",
            br#"{"lat": 1.0, "lon": 2.0}"#,
            br#"{"lat": "north", "lon": 2.0, "error_code": 1}"#,
            br#"{"lat": 1.0, "lon": 2.0, "error_code": 1.5}"#,
        ];
        for payload in cases {
            assert!(
                matches!(decode_datagram(payload), Err(IngestError::Malformed(_))),
                "accepted {payload:?}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        let cases: [&[u8]; 4] = [
            br#"{"lat": 91.0, "lon": 0.0, "error_code": 1}"#,
            br#"{"lat": 0.0, "lon": -180.5, "error_code": 1}"#,
            br#"{"lat": 0.0, "lon": 0.0, "error_code": -1}"#,
            br#"{"lat": 0.0, "lon": 0.0, "error_code": 100000}"#,
        ];
        for payload in cases {
            assert!(matches!(decode_datagram(payload), Err(IngestError::Invalid(_))));
        }
    }

    #[tokio::test]
    async fn test_listener_forwards_valid_and_counts_rejected() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stats = Arc::new(ListenerStats::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_listener(socket, tx, 64, stats.clone(), cancel.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender.send_to(&[b' '; 100], addr).await.unwrap();
        sender
            .send_to(br#"{"lat": 1.0, "lon": 2.0, "error_code": 4}"#, addr)
            .await
            .unwrap();

        let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("record within timeout")
            .expect("record");
        assert_eq!(record.status_code(), 4);
        assert_eq!(stats.accepted(), 1);
        // Datagrams from one sender arrive in order on loopback.
        assert_eq!(stats.rejected(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
