//! Idle-gap burst segmentation.
//!
//! Incoming records are buffered until the stream goes quiet for the
//! configured idle timeout. At that point the buffer is handed off as a
//! closed [`Burst`] and a new one starts accumulating.
//!
//! [`BurstAccumulator`] is a pure state machine driven by explicit
//! [`Instant`]s so it can be exercised without a clock. [`run_accumulator`]
//! wraps it in a tokio task that polls on a bounded interval, so a burst
//! closes even when arrivals stop entirely.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::record::EventRecord;

/// Default quiet period that closes a burst.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval at which the idle condition is re-checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A closed run of records, in arrival order.
#[derive(Debug, Clone, Serialize)]
pub struct Burst {
    pub id: Uuid,
    pub records: Vec<EventRecord>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl Burst {
    /// Wrap an already-collected set of records as a burst.
    pub fn from_records(records: Vec<EventRecord>) -> Self {
        let now = Utc::now();
        let opened_at = records.first().map_or(now, EventRecord::received_at);
        Self {
            id: Uuid::new_v4(),
            records,
            opened_at,
            closed_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Observable state of the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    Idle,
    Accumulating,
}

/// Buffers records and decides when the current burst is complete.
#[derive(Debug)]
pub struct BurstAccumulator {
    idle_timeout: Duration,
    buffer: Vec<EventRecord>,
    last_arrival: Option<Instant>,
}

impl BurstAccumulator {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            buffer: Vec::new(),
            last_arrival: None,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn state(&self) -> AccumulatorState {
        if self.last_arrival.is_some() {
            AccumulatorState::Accumulating
        } else {
            AccumulatorState::Idle
        }
    }

    /// Number of records buffered for the burst in progress.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a record that arrived at `now`.
    ///
    /// If the idle timeout had already elapsed before this arrival (a poll was
    /// missed), the stale burst is closed first and returned; the new record
    /// then opens the next burst.
    pub fn push(&mut self, record: EventRecord, now: Instant) -> Option<Burst> {
        let closed = self.poll(now);
        self.buffer.push(record);
        self.last_arrival = Some(now);
        closed
    }

    /// Close the current burst if the stream has been quiet long enough.
    pub fn poll(&mut self, now: Instant) -> Option<Burst> {
        let last = self.last_arrival?;
        if now.saturating_duration_since(last) < self.idle_timeout {
            return None;
        }
        self.last_arrival = None;
        self.take_burst()
    }

    /// Emit whatever is buffered regardless of timing.
    pub fn flush(&mut self) -> Option<Burst> {
        self.last_arrival = None;
        self.take_burst()
    }

    fn take_burst(&mut self) -> Option<Burst> {
        if self.buffer.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.buffer);
        Some(Burst::from_records(records))
    }
}

/// Drive a [`BurstAccumulator`] from a record channel until the channel
/// closes or `cancel` fires.
///
/// Closed bursts are sent on `bursts`. When the inbound channel closes the
/// pending buffer is flushed as a final burst; on cancellation it is dropped.
pub async fn run_accumulator(
    mut records: mpsc::UnboundedReceiver<EventRecord>,
    bursts: mpsc::UnboundedSender<Burst>,
    idle_timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let mut accumulator = BurstAccumulator::new(idle_timeout);
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        idle_timeout_ms = idle_timeout.as_millis() as u64,
        poll_interval_ms = poll_interval.as_millis() as u64,
        "burst accumulator started"
    );

    loop {
        let closed = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(pending = accumulator.pending(), "accumulator cancelled");
                break;
            }
            maybe_record = records.recv() => match maybe_record {
                Some(record) => accumulator.push(record, Instant::now()),
                None => {
                    debug!("record stream closed, flushing pending burst");
                    if let Some(burst) = accumulator.flush() {
                        emit(&bursts, burst);
                    }
                    break;
                }
            },
            _ = ticker.tick() => accumulator.poll(Instant::now()),
        };

        if let Some(burst) = closed {
            emit(&bursts, burst);
        }
    }

    info!("burst accumulator stopped");
}

fn emit(bursts: &mpsc::UnboundedSender<Burst>, burst: Burst) {
    info!(burst_id = %burst.id, records = burst.len(), "burst closed");
    if bursts.send(burst).is_err() {
        warn!("burst consumer gone, dropping closed burst");
    }
}
