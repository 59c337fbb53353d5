//! Market Watch client: a live market data consumer for the brokerage back-office.
//!
//! The client loads the tradable instrument catalog over REST, opens a real-time
//! feed connection, subscribes every instrument in staggered batches and keeps a
//! flicker-free snapshot of per-instrument quotes for display.
//!
//! Building blocks, leaves first:
//! - `catalog` — instrument catalog loading (REST or file) and the `name -> id` lookup.
//! - `admin` — instrument ban action and the active-client counter.
//! - `connection` — the feed connection state machine (connect, retry, fallback).
//! - `dispatcher` — batch planning for subscribe-all.
//! - `reconciler` — the quote book, the only writer of quote rows.
//! - `filter` — search filter over the quote snapshot.
//! - `transport` — WebSocket streaming and HTTP long-polling transports.
//! - `session` — the session task tying it all together, plus its handle and view.
#![warn(missing_docs)]
pub mod admin;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod filter;
pub mod reconciler;
pub mod rest;
pub mod session;
pub mod transport;

pub use config::ClientConfig;
pub use session::{FeedSession, RunningSession, SessionHandle, WatchView};
