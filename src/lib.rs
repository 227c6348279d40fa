//! geoburst -- burst segmentation and parallel density hotspot detection for
//! geolocated event streams.
//!
//! Reports arrive as JSON datagrams ([`ingest`]), are grouped into bursts by
//! an idle-timeout heuristic ([`burst`]) and each closed burst is clustered
//! with DBSCAN across partitions on a bounded worker pool ([`detect`]).
//! Ranked clusters are handed to the configured [`sink`]s.

pub mod bench;
pub mod burst;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod pipeline;
pub mod record;
pub mod simulate;
pub mod sink;

pub use pipeline::serve;
