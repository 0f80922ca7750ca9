//! The Fetcher: pulls the two upstream feeds for one tick.
//!
//! [`FeedSource`] is the seam the scheduler drives.  [`HttpFeedSource`] is the
//! production implementation; it issues both GETs concurrently and only
//! returns a [`RawFeeds`] pair when both succeed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vigil_monitor::feed::{FeedSource, HttpFeedSource};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpFeedSource::new("http://localhost:5000", Duration::from_secs(5))?;
//! let raw = source.fetch_feeds().await?;
//! println!("sensors: {}", raw.sensors);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use vigil_types::{FetchError, MonitorConfig};

/// Path of the sensor feed, relative to the base URL.
pub const SENSORS_PATH: &str = "/api/sensors";
/// Path of the face feed, relative to the base URL.
pub const FACES_PATH: &str = "/api/faces";

/// Parsed but unclassified bodies of both feeds from one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeeds {
    pub sensors: Value,
    pub faces: Value,
}

/// Something that can produce both feed payloads for a tick.
///
/// Implementations must not retry internally; the next scheduled tick is the
/// retry.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feeds(&self) -> Result<RawFeeds, FetchError>;
}

/// HTTP implementation of [`FeedSource`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    sensors_url: String,
    faces_url: String,
    client: reqwest::Client,
}

impl HttpFeedSource {
    /// Build a source for `base_url` (a trailing `/` is ignored) with the given
    /// per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Build a source around a preconfigured client (proxy, TLS, timeouts).
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Self {
        let base = base_url.trim().trim_end_matches('/');
        Self {
            sensors_url: format!("{base}{SENSORS_PATH}"),
            faces_url: format!("{base}{FACES_PATH}"),
            client,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn sensors_url(&self) -> &str {
        &self.sensors_url
    }

    pub fn faces_url(&self) -> &str {
        &self.faces_url
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!("GET {url} returned HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read body of {url}: {e}")))?;
        debug!(url, bytes = body.len(), "feed body received");

        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Parse(format!("invalid JSON from {url}: {e}")))
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_feeds(&self) -> Result<RawFeeds, FetchError> {
        let (sensors, faces) = tokio::try_join!(
            self.get_json(&self.sensors_url),
            self.get_json(&self.faces_url)
        )?;
        Ok(RawFeeds { sensors, faces })
    }
}
