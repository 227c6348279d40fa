//! Geolocated event records as they enter the detection core.
//!
//! Records are validated exactly once, at construction. Everything downstream
//! of the listener assumes a record's position and status code are sane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest status code accepted from the wire.
pub const MAX_STATUS_CODE: u16 = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("status code {0} outside [0, 1024]")]
    StatusCodeOutOfRange(i64),
}

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Same point with both components converted to radians.
    pub fn to_radians(self) -> Self {
        Self {
            lat: self.lat.to_radians(),
            lon: self.lon.to_radians(),
        }
    }
}

/// One validated event report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    latitude: f64,
    longitude: f64,
    status_code: u16,
    received_at: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record, rejecting non-finite or out-of-range values.
    pub fn new(
        latitude: f64,
        longitude: f64,
        status_code: i64,
        received_at: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(RecordError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(RecordError::LongitudeOutOfRange(longitude));
        }
        let status_code = u16::try_from(status_code)
            .ok()
            .filter(|code| *code <= MAX_STATUS_CODE)
            .ok_or(RecordError::StatusCodeOutOfRange(status_code))?;

        Ok(Self {
            latitude,
            longitude,
            status_code,
            received_at,
        })
    }

    /// Convenience constructor stamping the record with the current time.
    pub fn now(latitude: f64, longitude: f64, status_code: i64) -> Result<Self, RecordError> {
        Self::new(latitude, longitude, status_code, Utc::now())
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}
