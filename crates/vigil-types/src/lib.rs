//! `vigil-types` – shared data model for the Vigil intruder monitor.
//!
//! Everything that crosses a crate boundary lives here: the wire shapes of
//! the two upstream feeds, the derived [`MonitorState`] snapshot handed to
//! observers, the run [`MonitorConfig`], and the [`FetchError`] taxonomy.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric timestamps at or above this magnitude are epoch milliseconds;
/// smaller ones are epoch seconds.
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

// ─────────────────────────────────────────────────────────────────────────────
// Feed payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Timestamp attached to a feed payload.
///
/// Producers send either a number (epoch seconds or milliseconds) or a string.
/// The feed service stamps payloads itself with a zone-less ISO-8601 string
/// when the producer omitted one, so both forms appear in practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedTimestamp {
    Epoch(f64),
    Text(String),
}

impl FeedTimestamp {
    /// Interpret the timestamp as a UTC instant.
    ///
    /// Returns `None` for values that cannot be interpreted; the raw value is
    /// still kept on the reading so a renderer can show it verbatim.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FeedTimestamp::Epoch(value) => {
                if !value.is_finite() {
                    return None;
                }
                let millis = if value.abs() >= EPOCH_MILLIS_CUTOFF {
                    *value
                } else {
                    value * 1000.0
                };
                DateTime::<Utc>::from_timestamp_millis(millis.round() as i64)
            }
            FeedTimestamp::Text(raw) => {
                let raw = raw.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }
        }
    }
}

impl std::fmt::Display for FeedTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => match self {
                FeedTimestamp::Epoch(v) => write!(f, "{v}"),
                FeedTimestamp::Text(s) => write!(f, "{s}"),
            },
        }
    }
}

/// One distance/light sample from the sensor feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Ultrasonic range in centimetres.
    pub ultrasonic_reading: f64,
    /// Raw light sensor value (unitless).
    pub light_level: f64,
    pub timestamp: FeedTimestamp,
}

/// Pixel-space box around a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// A single detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Detector score in `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Face-detection result set from the face feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Detected faces; the first entry is the primary detection.
    pub faces: Vec<Face>,
    /// Base64-encoded camera frame.
    pub image: String,
    pub timestamp: FeedTimestamp,
}

impl FaceObservation {
    /// The primary (first) detected face, if any.
    pub fn primary(&self) -> Option<&Face> {
        self.faces.first()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived state
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable snapshot published after every tick.
///
/// Each tick replaces the snapshot wholesale.  A failed tick carries the
/// previous readings forward and only sets `error`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorState {
    pub sensor_reading: Option<SensorReading>,
    pub face_observation: Option<FaceObservation>,
    pub intruder_detected: bool,
    pub error: Option<String>,
    /// Number of ticks processed so far, successful or not.
    pub ticks: u64,
    /// When this snapshot was produced.  `None` for the initial empty state.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MonitorState {
    /// `true` until the first tick has been processed.
    pub fn is_empty(&self) -> bool {
        self.ticks == 0
    }

    /// `true` when the last tick failed.
    pub fn is_stale(&self) -> bool {
        self.error.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Run configuration for one monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base URL of the feed service, e.g. `http://localhost:5000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Distances strictly below this (cm) flag an intruder.
    #[serde(default = "default_ultrasonic_threshold")]
    pub ultrasonic_threshold: f64,

    /// Light levels strictly above this flag an intruder.
    #[serde(default = "default_light_threshold")]
    pub light_threshold: f64,

    /// Tick cadence in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_ultrasonic_threshold() -> f64 {
    50.0
}
fn default_light_threshold() -> f64 {
    700.0
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ultrasonic_threshold: default_ultrasonic_threshold(),
            light_threshold: default_light_threshold(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than zero".to_string());
        }
        if !self.ultrasonic_threshold.is_finite() {
            return Err(format!(
                "ultrasonic_threshold must be finite, got {}",
                self.ultrasonic_threshold
            ));
        }
        if !self.light_threshold.is_finite() {
            return Err(format!(
                "light_threshold must be finite, got {}",
                self.light_threshold
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a tick failed.  Never fatal to the scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// Transport failure, timeout, or a non-success HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// Body was not JSON, or did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}
