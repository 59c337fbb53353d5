//! Market Watch — a console front-end for the live market data client.
//!
//! It loads the instrument catalog (from the back-office API or a file), starts a
//! feed session, connects, and prints the search-filtered board at a fixed
//! interval. Operator commands are read from stdin (`help` lists them).
//!
//! Usage example (CLI):
//! ```bash
//! MW_SESSION_TOKEN=... market_watch --api-url http://10.0.0.5:8080 --feed-url ws://10.0.0.5:8081/feed --query nifty
//! ```
//!
//! Without an API, point it at the feed simulator and an instrument file:
//! ```bash
//! market_watch --instruments-file ./instruments.txt
//! ```
#![warn(missing_docs)]
mod args;
mod console;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use watch_client::admin::{ActiveClientCounter, ban_instrument};
use watch_client::catalog::{CatalogLoader, load_catalog_file};
use watch_client::rest::RestClient;
use watch_client::transport::FeedConnector;
use watch_client::{ClientConfig, FeedSession};
use watch_common::{Catalog, Result, WatchError};

use crate::args::Args;
use crate::console::{Board, HELP, Input};

/// Where the catalog comes from.
enum CatalogSource {
    Api(CatalogLoader),
    File(PathBuf),
}

impl CatalogSource {
    async fn load(&self) -> Result<Catalog> {
        match self {
            CatalogSource::Api(loader) => loader.load_catalog().await,
            CatalogSource::File(path) => load_catalog_file(path),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), WatchError> {
    init_logger();
    let args = Args::parse();

    let config = ClientConfig::new(&args.api_url, &args.feed_url)
        .with_session_token(args.session_token.clone());
    let rest = RestClient::new(&config)?;
    let source = match &args.instruments_file {
        Some(raw) => CatalogSource::File(normalize_path(raw)),
        None => CatalogSource::Api(CatalogLoader::new(rest.clone())),
    };

    let mut catalog = match source.load().await {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Catalog unavailable, starting with an empty market watch: {}", e);
            Catalog::default()
        }
    };

    let connector = FeedConnector::new(&config)?;
    let session = FeedSession::new(config.clone(), connector, catalog.clone()).start();
    let handle = session.handle().clone();
    handle.connect()?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down client...");
        let _ = shutdown_tx.send(true);
    })
    .map_err(|e| WatchError::Format(format!("Error setting Ctrl+C handler: {}", e)))?;

    let mut board = Board::new(args.query.clone());
    let counter = ActiveClientCounter::new();
    let mut refresh: Option<JoinHandle<Option<u64>>> = None;
    let mut render = tokio::time::interval(Duration::from_millis(args.render_interval_ms.max(100)));
    let mut clients_tick = tokio::time::interval(config.active_clients_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Client is running. Type `help` for commands, Ctrl+C to exit.");
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = render.tick() => {
                println!("{}", board.render(&handle.view(), counter.count()));
            }
            _ = clients_tick.tick() => {
                if refresh.as_ref().is_none_or(JoinHandle::is_finished) {
                    refresh = Some(counter.spawn_refresh(&rest));
                }
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed, console commands disabled");
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!("Reading stdin failed: {}", e);
                        stdin_open = false;
                        continue;
                    }
                };
                let Some(input) = Input::parse(&line) else {
                    continue;
                };
                match input {
                    Input::Quit => break,
                    Input::Help => println!("{}", HELP),
                    Input::Filter(query) => board.set_query(query),
                    Input::Connect => handle.connect()?,
                    Input::Disconnect => handle.disconnect()?,
                    Input::Reconnect => handle.reconnect()?,
                    Input::Subscribe => {
                        if let Err(e) = handle.subscribe_all().await {
                            error!("Subscribe failed: {}", e);
                        }
                    }
                    Input::Reload => match source.load().await {
                        Ok(fresh) => {
                            catalog = fresh;
                            handle.replace_catalog(catalog.clone())?;
                        }
                        Err(e) => error!("Catalog reload failed: {}", e),
                    },
                    Input::Ban(name) => match ban_instrument(&rest, &catalog, &name).await {
                        Ok(()) => println!("{} banned", name),
                        Err(e) => error!("Ban of {} failed: {}", name, e),
                    },
                    Input::Unknown(text) => println!("unknown command {:?}; {}", text, HELP),
                }
            }
        }
    }

    session.stop().await
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
///
/// This allows passing Windows paths in quotes without breaking parsing.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}
