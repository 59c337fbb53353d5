//! Simulated quote data model and JSON encoding helpers.
//!
//! A `SimulatedQuote` is the payload of a `price_update` envelope. Prices follow a
//! small random walk per instrument; the session open, high and low are tracked in
//! `PriceState` so `change`, `high` and `low` stay consistent across ticks.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use watch_common::command::PRICE_UPDATE_EVENT;
use watch_common::{FeedEnvelope, Instrument, WatchError};

/// Exchange segment reported for every simulated instrument.
pub const EXCHANGE: &str = "NSE";

/// Running prices of one instrument.
#[derive(Debug, Clone)]
pub struct PriceState {
    open: f64,
    last: f64,
    high: f64,
    low: f64,
}

impl PriceState {
    /// Session opening at `price`.
    pub fn new(price: f64) -> Self {
        Self {
            open: price,
            last: price,
            high: price,
            low: price,
        }
    }

    fn apply(&mut self, price: f64) {
        self.last = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
    }
}

/// Market quote for a single instrument, in feed wire format.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedQuote {
    /// Instrument display name.
    pub instrument_name: String,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Last traded price.
    pub ltp: f64,
    /// Change versus open, in percent.
    pub change: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Exchange segment.
    pub exchange: String,
    /// Feed token.
    pub instrument_token: u64,
    /// UTC timestamp in milliseconds since Unix epoch.
    pub timestamp: i64,
}

impl SimulatedQuote {
    /// Calculate the next synthetic price using a small random walk around `current_price`.
    ///
    /// The change is sampled uniformly from `[-1%, +1%]` and the result is clamped
    /// to a minimum positive value to avoid non-sensical zero/negative prices.
    pub fn next_price(current_price: f64) -> f64 {
        let mut rng = rand::rng();
        let change: f64 = rng.random_range(-0.01..0.01);
        let new_price = current_price * (1.0 + change);
        new_price.max(0.05)
    }

    /// Moves `state` one tick and returns the quote for `instrument`.
    pub fn generate_new(instrument: &Instrument, state: &mut PriceState) -> SimulatedQuote {
        let price = round_tick(Self::next_price(state.last));
        state.apply(price);
        let half_spread = round_tick((price * 0.0005).max(0.05));
        SimulatedQuote {
            instrument_name: instrument.name.clone(),
            bid: round_tick(price - half_spread),
            ask: round_tick(price + half_spread),
            ltp: price,
            change: ((price - state.open) / state.open * 10_000.0).round() / 100.0,
            high: state.high,
            low: state.low,
            exchange: String::from(EXCHANGE),
            instrument_token: instrument.token,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Encode the quote as a `price_update` text frame.
    pub fn to_frame(&self) -> Result<String, WatchError> {
        FeedEnvelope {
            event: String::from(PRICE_UPDATE_EVENT),
            data: serde_json::to_value(self)?,
        }
        .to_json()
    }
}

/// Rounds to the 0.05 price tick.
fn round_tick(price: f64) -> f64 {
    ((price * 20.0).round() / 20.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_tracks_high_low_and_spread() {
        let instrument = Instrument::new("NIFTY25MAYFUT", 256265, "1");
        let mut state = PriceState::new(22_500.0);
        for _ in 0..50 {
            let quote = SimulatedQuote::generate_new(&instrument, &mut state);
            assert!(quote.bid < quote.ask);
            assert!(quote.low <= quote.ltp && quote.ltp <= quote.high);
            assert_eq!(quote.instrument_token, 256265);
        }
    }

    #[test]
    fn frame_uses_feed_field_names() {
        let instrument = Instrument::new("TCS", 2953217, "5");
        let quote = SimulatedQuote::generate_new(&instrument, &mut PriceState::new(100.0));
        let frame = quote.to_frame().unwrap();
        let envelope = FeedEnvelope::from_json(&frame).unwrap();
        let parsed = envelope.quote().unwrap().unwrap();
        assert_eq!(parsed.resolve_name(), Some("TCS"));
        assert!(parsed.instrument_token.is_some());
        assert!(parsed.ltp.is_some());
    }
}
