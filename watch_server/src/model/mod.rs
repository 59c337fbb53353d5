//! Domain models and utilities for the feed simulator.
//!
//! - `quote` — simulated `price_update` payloads and the per-instrument random walk.
//! - `generator` — background quote generator and tick broadcasting.

pub mod generator;
pub mod quote;
