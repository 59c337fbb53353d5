//! Command-line arguments for the Market Watch client.
//!
//! This module defines the CLI interface using `clap`. Endpoints and the
//! session token fall back to environment variables. See `main` for end-to-end usage.
use clap::Parser;
use watch_common::net::{DEFAULT_API_URL, DEFAULT_FEED_URL};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// REST base URL of the back-office API.
    #[arg(long, env = "MW_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Real-time feed endpoint (ws:// or wss://).
    #[arg(long, env = "MW_FEED_URL", default_value = DEFAULT_FEED_URL)]
    pub feed_url: String,

    /// Stored session token sent as a bearer credential.
    #[arg(long, env = "MW_SESSION_TOKEN", hide_env_values = true)]
    pub session_token: Option<String>,

    /// Read the catalog from a `NAME,TOKEN[,ID]` file instead of the API.
    #[arg(long)]
    pub instruments_file: Option<String>,

    /// Initial search filter.
    #[arg(long, default_value = "")]
    pub query: String,

    /// How often the board is printed, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub render_interval_ms: u64,
}
