//! [`Scheduler`] – owns the polling timer and the published [`MonitorState`].
//!
//! Lifecycle is a three-phase state machine:
//!
//! | Phase | `start` | `stop` | `reconfigure` |
//! |---|---|---|---|
//! | [`Phase::Idle`] | → Running | no-op | replaces config |
//! | [`Phase::Running`] | error | → Stopped | stop + restart |
//! | [`Phase::Stopped`] | error | no-op | error |
//!
//! While Running a single worker task waits one full poll interval, runs a
//! tick (fetch → classify → publish), and waits again.  A tick is always
//! awaited before the next firing is considered, so ticks never overlap.
//!
//! Stopping does not cancel an in-flight fetch.  Each worker carries a
//! liveness flag that is checked under the state channel's write lock right
//! before publishing, and [`Scheduler::stop`] clears the flag under that same
//! lock, so nothing is written after `stop` returns.  A worker spawned by
//! [`Scheduler::reconfigure`] waits for its retired predecessor to exit
//! before its first fetch, so a reconfigure never puts two ticks in flight.
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_monitor::Scheduler;
//! use vigil_types::MonitorConfig;
//!
//! # async fn demo() -> Result<(), vigil_monitor::MonitorError> {
//! let mut monitor = Scheduler::connect(MonitorConfig::default())?;
//! let mut rx = monitor.subscribe();
//! monitor.start()?;
//!
//! while rx.changed().await.is_ok() {
//!     let state = rx.borrow_and_update().clone();
//!     if state.intruder_detected {
//!         println!("intruder!");
//!         break;
//!     }
//! }
//! monitor.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use vigil_types::{FetchError, MonitorConfig, MonitorState};

use crate::classifier::Thresholds;
use crate::feed::{FeedSource, HttpFeedSource, RawFeeds};
use crate::reconcile::reconcile;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle phase of a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Running => write!(f, "running"),
            Phase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Errors from constructing or driving a [`Scheduler`].
///
/// Tick failures are not represented here; they are reported on the
/// published [`MonitorState::error`].
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {action} a monitor that is {from}")]
    InvalidTransition { from: Phase, action: &'static str },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No Tokio runtime available: {0}")]
    Runtime(String),
}

type StateSender = Arc<watch::Sender<Arc<MonitorState>>>;

/// Handles kept by the scheduler for the currently running worker task.
struct WorkerHandle {
    alive: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Everything a worker task needs; moved into the task on spawn.
struct Worker {
    monitor_id: Uuid,
    source: Arc<dyn FeedSource>,
    thresholds: Thresholds,
    period: Duration,
    state_tx: StateSender,
    alive: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    /// Retired worker whose tick may still be in flight.
    predecessor: Option<JoinHandle<()>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the Fetcher and Classifier on a fixed cadence and publishes each
/// resulting snapshot to observers.
///
/// Every instance owns its own timer and state channel, so any number of
/// monitors can run side by side.
pub struct Scheduler {
    id: Uuid,
    config: MonitorConfig,
    source: Arc<dyn FeedSource>,
    /// `true` when `source` was built from `config` and must be rebuilt if
    /// the endpoint settings change on reconfigure.
    http_backed: bool,
    phase: Phase,
    state_tx: StateSender,
    worker: Option<WorkerHandle>,
}

impl Scheduler {
    /// Create an idle scheduler that polls `source`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: MonitorConfig, source: Arc<dyn FeedSource>) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::InvalidConfig)?;
        let (state_tx, _) = watch::channel(Arc::new(MonitorState::default()));
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            source,
            http_backed: false,
            phase: Phase::Idle,
            state_tx: Arc::new(state_tx),
            worker: None,
        })
    }

    /// Create an idle scheduler that polls the HTTP feeds under
    /// `config.base_url`.
    pub fn connect(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate().map_err(MonitorError::InvalidConfig)?;
        let source = HttpFeedSource::from_config(&config)?;
        let mut scheduler = Self::new(config, Arc::new(source))?;
        scheduler.http_backed = true;
        Ok(scheduler)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<MonitorState> {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to snapshot updates.  The current snapshot is marked seen.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorState>> {
        self.state_tx.subscribe()
    }

    /// Stream of published snapshots, starting with the next one.
    ///
    /// Only the latest snapshot is buffered: a consumer that falls behind
    /// skips to the newest one.  The stream ends once the scheduler and all
    /// of its workers are gone.
    pub fn updates(&self) -> BoxStream<'static, Arc<MonitorState>> {
        futures_util::stream::unfold(self.subscribe(), |mut rx| async move {
            rx.changed().await.ok()?;
            let state = rx.borrow_and_update().clone();
            Some((state, rx))
        })
        .boxed()
    }

    /// Idle → Running.  The first tick fires one poll interval from now.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`MonitorError::InvalidTransition`] unless the scheduler is Idle;
    /// [`MonitorError::Runtime`] when no runtime is available.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.phase != Phase::Idle {
            return Err(MonitorError::InvalidTransition {
                from: self.phase,
                action: "start",
            });
        }
        self.spawn_worker(None)?;
        self.phase = Phase::Running;
        info!(
            monitor_id = %self.id,
            base_url = %self.config.base_url,
            poll_interval_ms = self.config.poll_interval_ms,
            "monitor started"
        );
        Ok(())
    }

    /// Running → Stopped.  A no-op while Idle or already Stopped.
    pub fn stop(&mut self) {
        match self.phase {
            Phase::Running => {
                self.retire_worker();
                self.phase = Phase::Stopped;
                info!(monitor_id = %self.id, "monitor stopped");
            }
            Phase::Idle => {
                debug!(monitor_id = %self.id, "stop ignored; monitor was never started");
            }
            Phase::Stopped => {}
        }
    }

    /// Apply a new configuration.
    ///
    /// While Running this is a stop-then-restart so the timer always runs on
    /// the latest interval; the published snapshot survives the restart.
    ///
    /// # Errors
    ///
    /// [`MonitorError::InvalidConfig`] for an invalid `config` (the current
    /// one stays in effect); [`MonitorError::InvalidTransition`] once Stopped.
    pub fn reconfigure(&mut self, config: MonitorConfig) -> Result<(), MonitorError> {
        config.validate().map_err(MonitorError::InvalidConfig)?;
        if self.phase == Phase::Stopped {
            return Err(MonitorError::InvalidTransition {
                from: self.phase,
                action: "reconfigure",
            });
        }

        let endpoint_changed = config.base_url != self.config.base_url
            || config.request_timeout_ms != self.config.request_timeout_ms;
        if self.http_backed && endpoint_changed {
            self.source = Arc::new(HttpFeedSource::from_config(&config)?);
        }
        self.config = config;

        if self.phase == Phase::Running {
            let predecessor = self.retire_worker();
            if let Err(e) = self.spawn_worker(predecessor) {
                self.phase = Phase::Stopped;
                return Err(e);
            }
        }
        info!(
            monitor_id = %self.id,
            phase = %self.phase,
            ultrasonic_threshold = self.config.ultrasonic_threshold,
            light_threshold = self.config.light_threshold,
            poll_interval_ms = self.config.poll_interval_ms,
            "monitor reconfigured"
        );
        Ok(())
    }

    fn spawn_worker(&mut self, predecessor: Option<JoinHandle<()>>) -> Result<(), MonitorError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MonitorError::Runtime(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let worker = Worker {
            monitor_id: self.id,
            source: Arc::clone(&self.source),
            thresholds: Thresholds::from_config(&self.config),
            period: self.config.poll_interval(),
            state_tx: Arc::clone(&self.state_tx),
            alive: Arc::clone(&alive),
            shutdown: Arc::clone(&shutdown),
            predecessor,
        };
        let task = runtime.spawn(worker.run());
        self.worker = Some(WorkerHandle { alive, shutdown, task });
        Ok(())
    }

    /// Signal the current worker to exit and hand back its task so a
    /// successor can wait on it.
    fn retire_worker(&mut self) -> Option<JoinHandle<()>> {
        let worker = self.worker.take()?;
        // Taking the channel's write lock orders this store against any
        // publish in progress.
        self.state_tx.send_if_modified(|_| {
            worker.alive.store(false, Ordering::SeqCst);
            false
        });
        worker.shutdown.notify_one();
        Some(worker.task)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.retire_worker();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker task
// ─────────────────────────────────────────────────────────────────────────────

impl Worker {
    async fn run(mut self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Some(predecessor) = self.predecessor.take() {
            tokio::select! {
                _ = predecessor => {}
                _ = self.shutdown.notified() => {
                    debug!(monitor_id = %self.monitor_id, "worker retired before it started");
                    return;
                }
            }
        }

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if !self.alive.load(Ordering::SeqCst) {
                break;
            }

            let ticks = self.state_tx.borrow().ticks + 1;
            let span = info_span!("tick", monitor_id = %self.monitor_id, tick = ticks);
            let outcome = self.source.fetch_feeds().instrument(span).await;

            if !self.publish(outcome) {
                debug!(monitor_id = %self.monitor_id, "monitor stopped during tick; result discarded");
                break;
            }
        }
        debug!(monitor_id = %self.monitor_id, "worker exited");
    }

    /// Reconcile and publish one tick.  Returns `false` when the worker has
    /// been retired and the result was dropped.
    fn publish(&self, outcome: Result<RawFeeds, FetchError>) -> bool {
        let mut published: Option<(Arc<MonitorState>, Arc<MonitorState>)> = None;

        self.state_tx.send_if_modified(|current| {
            if !self.alive.load(Ordering::SeqCst) {
                return false;
            }
            let next = Arc::new(reconcile(current, outcome, &self.thresholds, Utc::now()));
            let prev = std::mem::replace(current, Arc::clone(&next));
            published = Some((prev, next));
            true
        });

        match published {
            Some((prev, next)) => {
                self.log_transition(&prev, &next);
                true
            }
            None => false,
        }
    }

    fn log_transition(&self, prev: &MonitorState, next: &MonitorState) {
        if let Some(error) = &next.error {
            warn!(monitor_id = %self.monitor_id, ticks = next.ticks, error = %error, "tick failed; keeping last readings");
        } else if prev.error.is_some() {
            info!(monitor_id = %self.monitor_id, ticks = next.ticks, "feeds recovered");
        }

        match (prev.intruder_detected, next.intruder_detected) {
            (false, true) => {
                let (distance, light) = next
                    .sensor_reading
                    .as_ref()
                    .map(|r| (r.ultrasonic_reading, r.light_level))
                    .unwrap_or_default();
                warn!(monitor_id = %self.monitor_id, distance_cm = distance, light_level = light, "intruder detected");
            }
            (true, false) => info!(monitor_id = %self.monitor_id, "intruder alert cleared"),
            _ => {}
        }

        debug!(
            monitor_id = %self.monitor_id,
            ticks = next.ticks,
            intruder = next.intruder_detected,
            face = next.face_observation.is_some(),
            "snapshot published"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
