//! End-to-end tests against a local stub of the feed service.
//!
//! The stub is a bare `TcpListener` answering each connection with a canned
//! HTTP/1.1 response chosen by request path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use vigil_monitor::{FeedSource, HttpFeedSource, Scheduler};
use vigil_types::{FetchError, MonitorConfig};

type Routes = HashMap<&'static str, (u16, String)>;

async fn spawn_stub(routes: Routes) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub addr");
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = stream.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = routes
                    .get(path.as_str())
                    .cloned()
                    .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    500 => "Internal Server Error",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}

fn source_for(base_url: &str) -> HttpFeedSource {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("client");
    HttpFeedSource::with_client(base_url, client)
}

fn routes(sensors: (u16, &str), faces: (u16, &str)) -> Routes {
    let mut map = HashMap::new();
    map.insert("/api/sensors", (sensors.0, sensors.1.to_string()));
    map.insert("/api/faces", (faces.0, faces.1.to_string()));
    map
}

const CLOSE_READING: &str = r#"{"ultrasonic_reading":30,"light_level":200,"timestamp":"2024-03-01T12:00:00.000001"}"#;
const CONFIDENT_FACE: &str = r#"{"faces":[{"confidence":0.91,"bbox":{"x":4,"y":8,"width":60,"height":60}}],"image":"aW1n","timestamp":"2024-03-01T12:00:00"}"#;

// ── Fetcher ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fetches_both_feeds() {
    let base = spawn_stub(routes((200, CLOSE_READING), (200, CONFIDENT_FACE))).await;
    let raw = source_for(&base).fetch_feeds().await.expect("both feeds");
    assert_eq!(raw.sensors["ultrasonic_reading"], 30);
    assert_eq!(raw.faces["faces"][0]["confidence"], 0.91);
}

#[tokio::test]
async fn null_bodies_are_valid_json() {
    let base = spawn_stub(routes((200, "null"), (200, "null"))).await;
    let raw = source_for(&base).fetch_feeds().await.expect("null feeds");
    assert!(raw.sensors.is_null());
    assert!(raw.faces.is_null());
}

#[tokio::test]
async fn failing_face_feed_fails_the_tick() {
    let base = spawn_stub(routes((200, CLOSE_READING), (500, r#"{"error":"boom"}"#))).await;
    let err = source_for(&base).fetch_feeds().await.unwrap_err();
    match err {
        FetchError::Network(msg) => {
            assert!(msg.contains("/api/faces"), "message should name the feed: {msg}");
            assert!(msg.contains("500"));
        }
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_sensor_feed_fails_the_tick() {
    let base = spawn_stub(routes((503, "{}"), (200, CONFIDENT_FACE))).await;
    let err = source_for(&base).fetch_feeds().await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
}

#[tokio::test]
async fn missing_route_is_a_network_error() {
    let mut only_sensors = HashMap::new();
    only_sensors.insert("/api/sensors", (200, CLOSE_READING.to_string()));
    let base = spawn_stub(only_sensors).await;
    let err = source_for(&base).fetch_feeds().await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn non_json_body_is_a_parse_error() {
    let base = spawn_stub(routes((200, "<html>oops</html>"), (200, CONFIDENT_FACE))).await;
    let err = source_for(&base).fetch_feeds().await.unwrap_err();
    assert!(matches!(err, FetchError::Parse(_)), "got {err:?}");
}

// ── Scheduler over HTTP ─────────────────────────────────────────────────────

fn fast_config(base_url: &str) -> MonitorConfig {
    MonitorConfig {
        base_url: base_url.to_string(),
        poll_interval_ms: 50,
        ..MonitorConfig::default()
    }
}

#[tokio::test]
async fn monitor_publishes_intruder_and_face() {
    let base = spawn_stub(routes((200, CLOSE_READING), (200, CONFIDENT_FACE))).await;
    let mut monitor =
        Scheduler::new(fast_config(&base), Arc::new(source_for(&base))).expect("scheduler");
    let mut rx = monitor.subscribe();
    monitor.start().expect("start");

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("a tick within 5s")
        .expect("channel open");
    let state = rx.borrow_and_update().clone();
    monitor.stop();

    assert!(state.intruder_detected);
    assert!(state.error.is_none());
    let face = state.face_observation.as_ref().expect("face observation");
    assert_eq!(face.primary().and_then(|f| f.bbox).map(|b| b.width), Some(60));
    let reading = state.sensor_reading.as_ref().expect("sensor reading");
    assert!(reading.timestamp.to_datetime().is_some());
}

#[tokio::test]
async fn monitor_reports_error_when_service_fails() {
    let base = spawn_stub(routes((500, "{}"), (500, "{}"))).await;
    let mut monitor =
        Scheduler::new(fast_config(&base), Arc::new(source_for(&base))).expect("scheduler");
    let mut rx = monitor.subscribe();
    monitor.start().expect("start");

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("a tick within 5s")
        .expect("channel open");
    let state = rx.borrow_and_update().clone();
    monitor.stop();

    assert!(state.is_stale());
    assert!(state.sensor_reading.is_none());
    assert!(!state.intruder_detected);
}

#[tokio::test]
async fn connect_builds_http_monitor_from_config() {
    let monitor = Scheduler::connect(fast_config("http://127.0.0.1:1/")).expect("scheduler");
    assert_eq!(monitor.config().poll_interval_ms, 50);
    assert!(monitor.latest().is_empty());
}

const FAR_READING: &str = r#"{"ultrasonic_reading":180,"light_level":120,"timestamp":1700000000}"#;

#[tokio::test]
async fn reconfigure_switches_connected_monitor_to_new_base() {
    let first = spawn_stub(routes((200, CLOSE_READING), (200, "null"))).await;
    let second = spawn_stub(routes((200, FAR_READING), (200, "null"))).await;

    let mut monitor = Scheduler::connect(fast_config(&first)).expect("scheduler");
    let mut rx = monitor.subscribe();
    monitor.start().expect("start");

    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("a tick within 5s")
        .expect("channel open");
    assert!(rx.borrow_and_update().intruder_detected);

    monitor.reconfigure(fast_config(&second)).expect("reconfigure");
    assert_eq!(monitor.config().base_url, second);

    let switched = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            rx.changed().await.expect("channel open");
            let state = rx.borrow_and_update().clone();
            let distance = state.sensor_reading.as_ref().map(|r| r.ultrasonic_reading);
            if distance == Some(180.0) {
                return state;
            }
        }
    })
    .await
    .expect("a tick from the new base within 5s");
    monitor.stop();

    assert!(!switched.intruder_detected);
    assert!(switched.error.is_none());
}
