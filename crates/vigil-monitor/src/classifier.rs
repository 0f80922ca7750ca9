//! The Classifier: pure functions from raw feed JSON to typed readings.
//!
//! Nothing here touches the network or the clock.  Absence is explicit
//! (`Ok(None)`) and malformed payloads are a typed [`FetchError::Parse`].

use serde::Deserialize;
use serde_json::Value;
use vigil_types::{Face, FaceObservation, FeedTimestamp, FetchError, MonitorConfig, SensorReading};

/// The primary face must score strictly above this to be shown.
pub const FACE_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Static intruder thresholds taken from [`MonitorConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Distances strictly below this (cm) are an intrusion.
    pub ultrasonic: f64,
    /// Light levels strictly above this are an intrusion.
    pub light: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl Thresholds {
    pub fn new(ultrasonic: f64, light: f64) -> Self {
        Self { ultrasonic, light }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.ultrasonic_threshold, config.light_threshold)
    }

    /// Both comparisons are strict: a reading exactly on a threshold is clear.
    pub fn is_intrusion(&self, reading: &SensorReading) -> bool {
        reading.ultrasonic_reading < self.ultrasonic || reading.light_level > self.light
    }
}

/// Extract the current reading from the sensor feed.
///
/// Accepts a single reading object or an oldest-first array whose last
/// element is current.  `null` and `[]` mean "no usable data" and yield
/// `Ok(None)`.
pub fn classify_sensor(raw: &Value) -> Result<Option<SensorReading>, FetchError> {
    let current = match raw {
        Value::Null => return Ok(None),
        Value::Array(readings) => match readings.last() {
            Some(last) => last,
            None => return Ok(None),
        },
        Value::Object(_) => raw,
        other => {
            return Err(FetchError::Parse(format!(
                "sensor feed: expected an object or an array, got {}",
                json_kind(other)
            )));
        }
    };

    SensorReading::deserialize(current)
        .map(Some)
        .map_err(|e| FetchError::Parse(format!("sensor feed: {e}")))
}

/// Face feed body as sent by the service.  Only the primary face decides the
/// display; `image` and `timestamp` are required once it passes.  Faces stay
/// untyped here so a malformed secondary entry cannot reject the payload.
#[derive(Debug, Deserialize)]
struct FacePayload {
    faces: Option<Vec<Value>>,
    image: Option<String>,
    timestamp: Option<FeedTimestamp>,
}

/// Decide whether the face feed holds a displayable observation.
///
/// Only the first face's confidence is evaluated, and only the first face
/// must be well formed; malformed secondary faces are dropped from the
/// observation.  Anything that fails the rule is `Ok(None)`, so a previously
/// shown observation is always cleared.
pub fn classify_faces(raw: &Value) -> Result<Option<FaceObservation>, FetchError> {
    if raw.is_null() {
        return Ok(None);
    }
    if !raw.is_object() {
        return Err(FetchError::Parse(format!(
            "face feed: expected an object, got {}",
            json_kind(raw)
        )));
    }

    let payload = FacePayload::deserialize(raw)
        .map_err(|e| FetchError::Parse(format!("face feed: {e}")))?;

    let raw_faces = payload.faces.unwrap_or_default();
    let Some((first, rest)) = raw_faces.split_first() else {
        return Ok(None);
    };
    let primary = Face::deserialize(first)
        .map_err(|e| FetchError::Parse(format!("face feed: primary face: {e}")))?;
    if primary.confidence <= FACE_CONFIDENCE_THRESHOLD || primary.confidence.is_nan() {
        return Ok(None);
    }

    let image = payload
        .image
        .ok_or_else(|| FetchError::Parse("face feed: missing field `image`".to_string()))?;
    let timestamp = payload
        .timestamp
        .ok_or_else(|| FetchError::Parse("face feed: missing field `timestamp`".to_string()))?;

    let faces = std::iter::once(primary)
        .chain(rest.iter().filter_map(|face| Face::deserialize(face).ok()))
        .collect();

    Ok(Some(FaceObservation {
        faces,
        image,
        timestamp,
    }))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
