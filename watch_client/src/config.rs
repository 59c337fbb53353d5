//! Runtime configuration of the market watch client.
use std::time::Duration;

use watch_common::net::{DEFAULT_API_URL, DEFAULT_FEED_URL};

/// Instruments per subscription batch.
pub const BATCH_SIZE: usize = 10;
/// Delay between two subscription batches.
pub const BATCH_DELAY: Duration = Duration::from_millis(500);
/// Bounded wait for a single connection attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
/// Connection attempts per cycle before falling back.
pub const MAX_ATTEMPTS: u32 = 3;
/// How long `subscribe_all` waits for the feed to open.
pub const SUBSCRIBE_WAIT: Duration = Duration::from_secs(2);
/// Longest delay before quote ticks reach readers.
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Endpoints, credentials and timing of a client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL of the back-office API.
    pub api_url: String,
    /// Real-time feed endpoint.
    pub feed_url: String,
    /// Stored session token sent as a bearer credential.
    pub session_token: Option<String>,
    /// Instruments per subscription batch.
    pub batch_size: usize,
    /// Delay between two subscription batches.
    pub batch_delay: Duration,
    /// Bounded wait for a single connection attempt.
    pub attempt_timeout: Duration,
    /// Attempts per connection cycle before fallback.
    pub max_attempts: u32,
    /// How long a deferred subscribe-all waits for the feed to open.
    pub subscribe_wait: Duration,
    /// Quote ticks are coalesced and handed to readers at this pace.
    pub publish_interval: Duration,
    /// Timeout of REST and long-poll requests.
    pub http_timeout: Duration,
    /// Refresh period of the active-client counter.
    pub active_clients_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::from(DEFAULT_API_URL),
            feed_url: String::from(DEFAULT_FEED_URL),
            session_token: None,
            batch_size: BATCH_SIZE,
            batch_delay: BATCH_DELAY,
            attempt_timeout: ATTEMPT_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
            subscribe_wait: SUBSCRIBE_WAIT,
            publish_interval: PUBLISH_INTERVAL,
            http_timeout: Duration::from_secs(30),
            active_clients_interval: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Config with the given endpoints and default timing.
    pub fn new(api_url: &str, feed_url: &str) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            feed_url: String::from(feed_url),
            ..Self::default()
        }
    }

    /// Sets the bearer token; blank tokens are ignored.
    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }
}
