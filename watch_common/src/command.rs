//! Wire messages exchanged with the pricing feed.
//!
//! Every frame is a JSON envelope `{ "event": ..., "data": ... }`. The client
//! sends one `subscribe` envelope per instrument and receives `price_update`
//! envelopes. Quote payloads are decoded leniently into [`QuoteEvent`], whose
//! fields stay raw JSON values so the reconciler can coerce them.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WatchError;
use crate::instrument::Instrument;

/// Event name of subscription requests.
pub const SUBSCRIBE_EVENT: &str = "subscribe";
/// Event name of inbound quotes.
pub const PRICE_UPDATE_EVENT: &str = "price_update";

/// Envelope around every feed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEnvelope {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl FeedEnvelope {
    /// Decodes one envelope from a text frame.
    pub fn from_json(text: &str) -> Result<Self, WatchError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encodes the envelope as a text frame.
    pub fn to_json(&self) -> Result<String, WatchError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the quote carried by a `price_update` envelope.
    ///
    /// `None` for other events. A payload that is not a JSON object yields a
    /// `Format` error.
    pub fn quote(&self) -> Option<Result<QuoteEvent, WatchError>> {
        if self.event != PRICE_UPDATE_EVENT {
            return None;
        }
        if !self.data.is_object() {
            return Some(Err(WatchError::Format(format!(
                "price_update payload is not an object: {}",
                self.data
            ))));
        }
        Some(serde_json::from_value(self.data.clone()).map_err(WatchError::from))
    }
}

/// Subscription request for a single instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Instrument display name.
    pub symbol: String,
    /// Feed token.
    pub instrument_token: u64,
}

impl SubscribeRequest {
    /// Builds the request for `instrument`.
    pub fn for_instrument(instrument: &Instrument) -> Self {
        SubscribeRequest {
            symbol: instrument.name.clone(),
            instrument_token: instrument.token,
        }
    }

    /// Wraps the request into a `subscribe` envelope.
    pub fn to_envelope(&self) -> Result<FeedEnvelope, WatchError> {
        Ok(FeedEnvelope {
            event: String::from(SUBSCRIBE_EVENT),
            data: serde_json::to_value(self)?,
        })
    }
}

/// Raw inbound quote. Every field is optional and untyped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteEvent {
    /// `instrumentName`, the preferred name field.
    #[serde(rename = "instrumentName", default, skip_serializing_if = "Option::is_none")]
    pub instrument_name: Option<Value>,
    /// `instrument_name` spelling of the name field.
    #[serde(rename = "instrument_name", default, skip_serializing_if = "Option::is_none")]
    pub instrument_name_snake: Option<Value>,
    /// Broker trading symbol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradingsymbol: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<Value>,
    /// Last traded price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ltp: Option<Value>,
    /// Change in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Value>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Value>,
    /// `instrumentToken`, the preferred token field.
    #[serde(rename = "instrumentToken", default, skip_serializing_if = "Option::is_none")]
    pub instrument_token: Option<Value>,
    /// `instrument_token` spelling of the token field.
    #[serde(rename = "instrument_token", default, skip_serializing_if = "Option::is_none")]
    pub instrument_token_snake: Option<Value>,
}

impl QuoteEvent {
    /// Display name of the instrument.
    ///
    /// The name fields (`instrumentName`, `instrument_name`, `tradingsymbol`)
    /// are tried in that order before `symbol`. Only non-empty strings count.
    pub fn resolve_name(&self) -> Option<&str> {
        fn as_name(value: &Option<Value>) -> Option<&str> {
            match value {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
                _ => None,
            }
        }
        as_name(&self.instrument_name)
            .or_else(|| as_name(&self.instrument_name_snake))
            .or_else(|| as_name(&self.tradingsymbol))
            .or_else(|| as_name(&self.symbol))
    }

    /// Raw token value, `instrumentToken` first.
    pub fn token(&self) -> Option<&Value> {
        self.instrument_token
            .as_ref()
            .or(self.instrument_token_snake.as_ref())
    }
}

/// Lenient numeric coercion: JSON numbers and numeric strings, finite only.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
