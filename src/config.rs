//! TOML configuration for the geoburst daemon.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working configuration. The file is located through
//! [`GeoburstConfig::resolve`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::{DetectError, DetectorConfig, DistanceMetric, PartitionMode};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "GEOBURST_CONFIG";

/// Standard system location, tried after the environment variable.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/geoburst/geoburst.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<DetectError> for ConfigError {
    fn from(e: DetectError) -> Self {
        match e {
            DetectError::InvalidConfig(msg) => ConfigError::Invalid(msg),
            other => ConfigError::Invalid(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoburstConfig {
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub partition: PartitionMode,
    #[serde(default)]
    pub burst: BurstSection,
    #[serde(default)]
    pub listener: ListenerSection,
    #[serde(default)]
    pub forward: ForwardSection,
    #[serde(default)]
    pub plot: PlotSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl GeoburstConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Locate and load the configuration.
    ///
    /// An explicit path must load; its errors are returned. Otherwise the
    /// `GEOBURST_CONFIG` file, then the system file, then defaults are tried,
    /// with unreadable candidates logged and skipped.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "GEOBURST_CONFIG set but file could not be loaded, trying fallback"
                ),
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %system_path.display(),
                    error = %e,
                    "system config file exists but could not be loaded, using defaults"
                ),
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector_config().validate()?;
        if self.burst.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid("burst.idle_timeout_ms must be positive".into()));
        }
        if self.burst.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("burst.poll_interval_ms must be positive".into()));
        }
        if self.listener.max_datagram_size == 0 {
            return Err(ConfigError::Invalid(
                "listener.max_datagram_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Detector parameters assembled from the `[detector]` and `[partition]`
    /// sections.
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            eps: self.detector.eps,
            min_samples: self.detector.min_samples,
            min_cluster_size: self.detector.min_cluster_size,
            metric: self.detector.metric,
            partition: self.partition.clone(),
            worker_pool_size: self.detector.worker_pool_size,
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSection {
    /// Neighbourhood radius: radians for haversine, degrees for planar.
    pub eps: f64,
    pub min_samples: usize,
    pub min_cluster_size: usize,
    pub metric: DistanceMetric,
    /// 0 = one worker per available CPU.
    pub worker_pool_size: usize,
}

impl Default for DetectorSection {
    fn default() -> Self {
        let d = DetectorConfig::default();
        Self {
            eps: d.eps,
            min_samples: d.min_samples,
            min_cluster_size: d.min_cluster_size,
            metric: d.metric,
            worker_pool_size: d.worker_pool_size,
        }
    }
}

// ---------------------------------------------------------------------------
// Burst segmentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurstSection {
    pub idle_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for BurstSection {
    fn default() -> Self {
        Self {
            idle_timeout_ms: crate::burst::DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            poll_interval_ms: crate::burst::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl BurstSection {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerSection {
    /// UDP address the ingest socket binds to.
    pub bind: String,
    /// Datagrams longer than this are truncated and therefore rejected.
    pub max_datagram_size: usize,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            max_datagram_size: crate::ingest::DEFAULT_MAX_DATAGRAM,
        }
    }
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    pub enabled: bool,
    /// Destination for forwarded cluster records.
    pub target: String,
    /// Value of the `message_type` field on every forwarded record.
    pub message_type: String,
}

impl Default for ForwardSection {
    fn default() -> Self {
        Self {
            enabled: false,
            target: "127.0.0.1:5001".to_string(),
            message_type: "cluster_alert".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plot export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSection {
    /// JSON-lines file receiving one entry per processed burst. Disabled when unset.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit logs as JSON objects instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
