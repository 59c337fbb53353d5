//! Command-line arguments for the feed simulator.
use clap::Parser;
use watch_common::net::DEFAULT_SIMULATOR_BIND;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address the WebSocket feed listens on.
    #[arg(long, default_value = DEFAULT_SIMULATOR_BIND)]
    pub bind: String,

    /// Instrument file (`NAME,TOKEN[,ID]` per line).
    #[arg(long)]
    pub path: String,

    /// Tick interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
}
