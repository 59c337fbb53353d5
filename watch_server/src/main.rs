//! Pricing feed simulator.
//!
//! This binary serves a WebSocket pricing feed for local development of the market
//! watch client. Internally, it wires together two building blocks:
//!
//! - `QuoteGenerator` — random-walks a price for every instrument of the simulated
//!   universe and broadcasts encoded `price_update` frames.
//! - Per-client stream task — a tokio task created for each accepted connection that
//!   records the client's `subscribe` requests and forwards matching frames.
//!
//! Network protocol (high-level):
//! - Bind address: `127.0.0.1:8081` by default (see `--bind`).
//! - Client sends `{"event":"subscribe","data":{"symbol":..,"instrument_token":..}}`.
//! - Server pushes `{"event":"price_update","data":{..}}` for subscribed tokens only.
//!
//! Only the streaming transport is simulated; clients that fall back to long-polling
//! need a real feed.
//!
//! Usage example:
//! ```bash
//! feed_simulator --path ./instruments.txt --interval-ms 250
//! ```
#![warn(missing_docs)]
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use watch_common::instrument::InstrumentParser;
use watch_common::{Instrument, Result, WatchError};

use crate::args::Args;
use crate::model::generator::QuoteGenerator;
use crate::stream::handle_client_stream;

mod args;
pub mod model;
mod stream;

#[tokio::main]
async fn main() -> Result<(), WatchError> {
    init_logger();
    let args = Args::parse();

    let reader = BufReader::new(File::open(&args.path)?);
    let instruments = Instrument::parse_from_file(reader)?;
    info!("Simulating {} instruments from {}", instruments.len(), args.path);

    let ticks = QuoteGenerator::start(instruments, Duration::from_millis(args.interval_ms.max(1)));
    let listener = TcpListener::bind(&args.bind).await?;
    info!("Feed simulator listening on ws://{}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received. Shutting down simulator...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let client_ticks = ticks.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client_stream(stream, peer, client_ticks).await {
                            error!("Client stream error: {}", e);
                        }
                    });
                }
                Err(e) => error!("Accept failed: {}", e),
            },
        }
    }
    Ok(())
}

fn init_logger() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
