//! Error types shared between the market watch client and the feed simulator.
//!
//! The `WatchError` enum unifies the failure cases of catalog loading,
//! administrative REST actions, the live transports and local parsing, so every
//! crate in the workspace can propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by client and simulator.
#[derive(Error, Debug)]
pub enum WatchError {
    /// I/O error originating from the standard library, sockets or files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// A configured endpoint is not a valid URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Error while parsing an instrument file into `Instrument` values.
    #[error("Parse instruments file error: {0}")]
    ParseInstrumentsFile(String),

    /// The instrument catalog could not be fetched (network, auth or decoding).
    #[error("Catalog fetch failed: {0}")]
    CatalogFetch(String),

    /// An administrative action was rejected by the backend.
    #[error("Administrative action failed with status {status}: {message}")]
    AdminAction {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Any other HTTP level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Live transport failure (refused, protocol error, closed handle).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The live feed was not open in time for the requested operation.
    #[error("Feed not connected: {0}")]
    NotConnected(String),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// A requested instrument name is not part of the loaded catalog.
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),
}
