//! `vigil-monitor` – the polling-and-reconciliation core.
//!
//! Pulls the sensor and face feeds from the remote service on a fixed
//! cadence, classifies them, and publishes one immutable
//! [`MonitorState`][vigil_types::MonitorState] snapshot per tick.
//!
//! # Modules
//!
//! - [`feed`] – the Fetcher.  [`FeedSource`] is the async seam the scheduler
//!   drives; [`HttpFeedSource`] fetches `{base}/api/sensors` and
//!   `{base}/api/faces` concurrently with `reqwest`.
//! - [`classifier`] – pure rules: the strict-inequality intruder test in
//!   [`Thresholds`] and the primary-face confidence rule.
//! - [`reconcile`] – the tick transition from previous snapshot plus fetch
//!   outcome to the next snapshot (stale-but-present on failure).
//! - [`scheduler`] – [`Scheduler`]: Idle/Running/Stopped lifecycle, the
//!   non-overlapping interval worker, and observer channels.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP export.

pub mod classifier;
pub mod feed;
pub mod reconcile;
pub mod scheduler;
pub mod telemetry;

pub use classifier::{FACE_CONFIDENCE_THRESHOLD, Thresholds, classify_faces, classify_sensor};
pub use feed::{FeedSource, HttpFeedSource, RawFeeds};
pub use reconcile::reconcile;
pub use scheduler::{MonitorError, Phase, Scheduler};
pub use telemetry::{TracerProviderGuard, init_tracing};
