//! Per-instrument quote state and the connection state shown next to it.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::instrument::Instrument;

/// Lifecycle of a single quote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuoteStatus {
    /// Subscribed, no quote received yet.
    Pending,
    /// At least one live quote has been applied.
    Active,
    /// Last known values from a feed session that is no longer live.
    Inactive,
}

/// Display state of one instrument in the market watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteState {
    /// Instrument display name, the key of the quote map.
    pub name: String,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Last traded price.
    pub last_traded_price: f64,
    /// Change versus previous close, in percent.
    pub change_percent: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Row lifecycle.
    pub status: QuoteStatus,
    /// Exchange segment reported by the feed.
    pub exchange: String,
    /// Feed token of the instrument.
    pub instrument_token: u64,
}

impl QuoteState {
    /// Placeholder row seeded when the subscription for `instrument` goes out.
    pub fn pending(instrument: &Instrument) -> Self {
        QuoteState {
            name: instrument.name.clone(),
            bid: 0.0,
            ask: 0.0,
            last_traded_price: 0.0,
            change_percent: 0.0,
            high: 0.0,
            low: 0.0,
            status: QuoteStatus::Pending,
            exchange: String::new(),
            instrument_token: instrument.token,
        }
    }
}

/// Lifecycle of the live feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// The transport is confirmed and carrying subscriptions.
    Open,
    /// An explicit teardown is in progress.
    Closing,
    /// No transport; reconnect is a user action.
    Closed,
    /// Every strategy failed; the view stays interactive without live data.
    Fallback,
}
