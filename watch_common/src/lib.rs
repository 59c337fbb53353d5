//!
//! Common types and utilities shared by the market watch client and the feed simulator.
//!
//! This crate aggregates:
//! - `error` — unified error type `WatchError` used across the workspace.
//! - `result` — handy `Result<T, WatchError>` alias.
//! - `instrument` — instruments, the loaded catalog, and instrument file parsing.
//! - `quote` — per-instrument quote state and the connection state.
//! - `command` — feed envelopes exchanged with the pricing service.
//! - `net` — networking defaults, transport modes and URL helpers.
#![warn(missing_docs)]
pub mod command;
pub mod error;
pub mod instrument;
pub mod net;
pub mod quote;
pub mod result;

pub use command::{FeedEnvelope, QuoteEvent, SubscribeRequest};
pub use error::WatchError;
pub use instrument::{Catalog, Instrument};
pub use net::TransportMode;
pub use quote::{ConnectionState, QuoteState, QuoteStatus};
pub use result::Result;
