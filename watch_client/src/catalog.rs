//! Instrument catalog loading.
//!
//! The catalog comes from `GET /api/instruments` or, for offline use, from an
//! instrument file. Failures are returned to the caller as-is; nothing here
//! retries.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::{info, warn};
use watch_common::instrument::InstrumentParser;
use watch_common::{Catalog, Instrument, Result, WatchError};

use crate::rest::RestClient;

/// REST path of the instrument list.
pub const INSTRUMENTS_PATH: &str = "/api/instruments";

/// Fetches the tradable instrument list.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    rest: RestClient,
}

impl CatalogLoader {
    /// Creates a loader on top of an authenticated REST client.
    pub fn new(rest: RestClient) -> Self {
        Self { rest }
    }

    /// Loads the catalog and builds its `name -> id` lookup.
    ///
    /// Works regardless of the feed connection state.
    pub async fn load_catalog(&self) -> Result<Catalog> {
        let instruments: Vec<Instrument> = self
            .rest
            .get_json(INSTRUMENTS_PATH)
            .await
            .map_err(|e| WatchError::CatalogFetch(e.to_string()))?;
        let fetched = instruments.len();
        let catalog = Catalog::new(instruments);
        if catalog.len() != fetched {
            warn!("Catalog listed {} duplicate instrument names", fetched - catalog.len());
        }
        info!("Catalog loaded: {} instruments", catalog.len());
        Ok(catalog)
    }
}

/// Reads a catalog from an instrument file (`NAME,TOKEN[,ID]` per line).
pub fn load_catalog_file(path: &Path) -> Result<Catalog> {
    let file = File::open(path)?;
    let instruments = Instrument::parse_from_file(BufReader::new(file))?;
    info!("Catalog read from {}: {} instruments", path.display(), instruments.len());
    Ok(Catalog::new(instruments))
}
