//! Shared networking defaults and helpers used by client and simulator.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;

use crate::error::WatchError;

/// Default REST base URL of the back-office API.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";
/// Default WebSocket endpoint of the pricing feed.
pub const DEFAULT_FEED_URL: &str = "ws://127.0.0.1:8081/feed";
/// Default bind address of the feed simulator.
pub const DEFAULT_SIMULATOR_BIND: &str = "127.0.0.1:8081";
/// Path suffix of the long-polling endpoint.
pub const POLL_PATH: &str = "poll";

/// Transport strategy used for a connection attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Display, EnumString,
)]
#[clap(rename_all = "lower")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportMode {
    /// WebSocket streaming, the preferred mode.
    Streaming,
    /// HTTP long-polling, the degraded mode.
    Polling,
}

/// Long-polling endpoint derived from a feed URL.
///
/// `ws` becomes `http`, `wss` becomes `https`, and `/poll` is appended to the
/// path. HTTP URLs keep their scheme.
pub fn polling_url(feed_url: &str) -> Result<Url, WatchError> {
    let mut url = Url::parse(feed_url)?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(WatchError::Format(format!("unsupported feed scheme: {}", other)));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| WatchError::Format(format!("cannot switch {} to {}", feed_url, scheme)))?;
    let path = format!("{}/{}", url.path().trim_end_matches('/'), POLL_PATH);
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polling_url_switches_scheme_and_appends_path() {
        assert_eq!(
            polling_url("ws://127.0.0.1:8081/feed").unwrap().as_str(),
            "http://127.0.0.1:8081/feed/poll"
        );
        assert_eq!(
            polling_url("wss://feed.example.com/").unwrap().as_str(),
            "https://feed.example.com/poll"
        );
        assert!(polling_url("ftp://x").is_err());
    }

    #[test]
    fn mode_names() {
        assert_eq!(TransportMode::Streaming.to_string(), "streaming");
        assert_eq!("POLLING".parse::<TransportMode>().unwrap(), TransportMode::Polling);
    }
}
