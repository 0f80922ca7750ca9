//! Pure tick transition: previous snapshot + fetch outcome → next snapshot.

use chrono::{DateTime, Utc};
use vigil_types::{FaceObservation, FetchError, MonitorState, SensorReading};

use crate::classifier::{Thresholds, classify_faces, classify_sensor};
use crate::feed::RawFeeds;

/// Classify both payloads of a successful fetch.
///
/// A malformed payload in either feed fails the whole tick, the same way a
/// failed request does.
pub fn classify_feeds(
    raw: &RawFeeds,
) -> Result<(Option<SensorReading>, Option<FaceObservation>), FetchError> {
    let sensor = classify_sensor(&raw.sensors)?;
    let faces = classify_faces(&raw.faces)?;
    Ok((sensor, faces))
}

/// Build the snapshot that replaces `prev` after one tick.
///
/// * success: the face observation always reflects this tick; the sensor
///   reading is replaced when the feed had one and kept otherwise; `error`
///   is cleared.
/// * failure: readings and the intruder flag are carried forward untouched
///   and `error` carries the failure message.
pub fn reconcile(
    prev: &MonitorState,
    outcome: Result<RawFeeds, FetchError>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> MonitorState {
    let ticks = prev.ticks + 1;

    match outcome.and_then(|raw| classify_feeds(&raw)) {
        Ok((sensor, face_observation)) => {
            let sensor_reading = sensor.or_else(|| prev.sensor_reading.clone());
            let intruder_detected = sensor_reading
                .as_ref()
                .is_some_and(|reading| thresholds.is_intrusion(reading));
            MonitorState {
                sensor_reading,
                face_observation,
                intruder_detected,
                error: None,
                ticks,
                updated_at: Some(now),
            }
        }
        Err(err) => MonitorState {
            error: Some(err.to_string()),
            ticks,
            updated_at: Some(now),
            ..prev.clone()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn feeds(sensors: Value, faces: Value) -> RawFeeds {
        RawFeeds { sensors, faces }
    }

    fn sensor(ultrasonic: u32, light: u32) -> Value {
        json!({"ultrasonic_reading": ultrasonic, "light_level": light, "timestamp": 1700000000})
    }

    fn confident_face() -> Value {
        json!({"faces": [{"confidence": 0.9}], "image": "aW1n", "timestamp": 1700000000})
    }

    fn step(prev: &MonitorState, outcome: Result<RawFeeds, FetchError>) -> MonitorState {
        reconcile(prev, outcome, &Thresholds::default(), Utc::now())
    }

    #[test]
    fn close_reading_raises_intruder() {
        let next = step(&MonitorState::default(), Ok(feeds(sensor(30, 200), Value::Null)));
        assert!(next.intruder_detected);
        assert_eq!(next.ticks, 1);
        assert!(next.updated_at.is_some());
    }

    #[test]
    fn bright_reading_raises_intruder() {
        let next = step(&MonitorState::default(), Ok(feeds(sensor(80, 900), Value::Null)));
        assert!(next.intruder_detected);
    }

    #[test]
    fn quiet_reading_clears_intruder() {
        let prev = step(&MonitorState::default(), Ok(feeds(sensor(30, 200), Value::Null)));
        let next = step(&prev, Ok(feeds(sensor(80, 200), Value::Null)));
        assert!(!next.intruder_detected);
    }

    #[test]
    fn intruder_flag_ignores_faces() {
        let next = step(&MonitorState::default(), Ok(feeds(sensor(80, 200), confident_face())));
        assert!(!next.intruder_detected);
        assert!(next.face_observation.is_some());
    }

    #[test]
    fn face_observation_is_cleared_when_current_tick_lacks_one() {
        let prev = step(&MonitorState::default(), Ok(feeds(sensor(80, 200), confident_face())));
        assert!(prev.face_observation.is_some());

        let next = step(
            &prev,
            Ok(feeds(sensor(80, 200), json!({"faces": [{"confidence": 0.5}]}))),
        );
        assert!(next.face_observation.is_none());
    }

    #[test]
    fn missing_sensor_data_keeps_previous_reading_and_flag() {
        let prev = step(&MonitorState::default(), Ok(feeds(sensor(30, 200), Value::Null)));
        let next = step(&prev, Ok(feeds(json!([]), Value::Null)));
        assert_eq!(next.sensor_reading, prev.sensor_reading);
        assert!(next.intruder_detected);
        assert!(next.error.is_none());
    }

    #[test]
    fn no_reading_ever_means_no_intruder() {
        let next = step(&MonitorState::default(), Ok(feeds(Value::Null, Value::Null)));
        assert!(next.sensor_reading.is_none());
        assert!(!next.intruder_detected);
    }

    #[test]
    fn failed_tick_preserves_everything_but_error() {
        let prev = step(&MonitorState::default(), Ok(feeds(sensor(30, 200), confident_face())));
        let next = step(&prev, Err(FetchError::Network("HTTP 502".to_string())));

        assert_eq!(next.sensor_reading, prev.sensor_reading);
        assert_eq!(next.face_observation, prev.face_observation);
        assert_eq!(next.intruder_detected, prev.intruder_detected);
        assert!(next.error.as_deref().is_some_and(|e| e.contains("HTTP 502")));
        assert_eq!(next.ticks, 2);
    }

    #[test]
    fn successful_tick_clears_previous_error() {
        let prev = step(&MonitorState::default(), Err(FetchError::Network("down".to_string())));
        assert!(prev.is_stale());
        let next = step(&prev, Ok(feeds(sensor(80, 200), Value::Null)));
        assert!(next.error.is_none());
    }

    #[test]
    fn malformed_payload_fails_the_whole_tick() {
        let prev = step(&MonitorState::default(), Ok(feeds(sensor(30, 200), confident_face())));
        let next = step(&prev, Ok(feeds(sensor(80, 200), json!({"faces": "nope"}))));

        // The valid sensor half of the tick is not applied either.
        assert_eq!(next.sensor_reading, prev.sensor_reading);
        assert!(next.intruder_detected);
        assert!(next.face_observation.is_some());
        assert!(next.error.as_deref().is_some_and(|e| e.starts_with("Parse error")));
    }

    #[test]
    fn failed_first_tick_keeps_state_empty_of_readings() {
        let next = step(&MonitorState::default(), Err(FetchError::Parse("bad".to_string())));
        assert!(next.sensor_reading.is_none());
        assert!(next.face_observation.is_none());
        assert!(!next.intruder_detected);
        assert!(next.is_stale());
        assert!(!next.is_empty());
    }
}
