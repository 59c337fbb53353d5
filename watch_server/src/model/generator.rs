//! Quote stream generator and tick broadcasting.
//!
//! The `QuoteGenerator` runs a background task that synthesizes a quote for every
//! instrument of the simulated universe at a fixed interval and broadcasts the
//! encoded frames. Client stream tasks subscribe to the broadcast and forward
//! only the instruments their client asked for.
//!
//! Design notes:
//! - Every client observes the same price sequence; prices live in the generator.
//! - Broadcast is best-effort: a client that falls behind skips ticks instead of
//!   slowing the generator down.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use rand::Rng;
use tokio::sync::broadcast;
use watch_common::Instrument;

use crate::model::quote::{PriceState, SimulatedQuote};

/// Ticks buffered per client before it starts skipping.
const CHANNEL_CAPACITY: usize = 4096;

/// One encoded quote ready to be sent.
#[derive(Debug, Clone)]
pub struct QuoteTick {
    /// Feed token of the quoted instrument.
    pub token: u64,
    /// `price_update` text frame.
    pub frame: Arc<str>,
}

/// Background market data generator that broadcasts to subscribers.
pub struct QuoteGenerator;

impl QuoteGenerator {
    /// Starts the generator task and returns the broadcast sender clients subscribe to.
    pub fn start(instruments: Vec<Instrument>, interval: Duration) -> broadcast::Sender<QuoteTick> {
        let (tick_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let sender = tick_tx.clone();

        let mut rng = rand::rng();
        let mut prices: HashMap<u64, PriceState> = instruments
            .iter()
            .map(|instrument| (instrument.token, PriceState::new(rng.random_range(100.0..25_000.0))))
            .collect();

        tokio::spawn(async move {
            info!("Market generator started for {} instruments", instruments.len());

            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for instrument in &instruments {
                    let Some(state) = prices.get_mut(&instrument.token) else {
                        continue;
                    };
                    let quote = SimulatedQuote::generate_new(instrument, state);
                    match quote.to_frame() {
                        Ok(frame) => {
                            // No receivers is fine; nobody is connected yet.
                            let _ = tick_tx.send(QuoteTick {
                                token: instrument.token,
                                frame: Arc::from(frame),
                            });
                        }
                        Err(e) => error!("Failed to encode quote for {}: {}", instrument.name, e),
                    }
                }
            }
        });
        sender
    }
}
