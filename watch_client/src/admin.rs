//! Administrative actions exposed next to the market watch.
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use watch_common::{Catalog, Result, WatchError};

use crate::rest::RestClient;

/// REST path of the active-client counter.
pub const ACTIVE_CLIENTS_PATH: &str = "/api/clients/active";

/// Bans the instrument called `name`.
///
/// The name is resolved to its catalog id first. A non-2xx answer is reported
/// as `WatchError::AdminAction` and never retried.
pub async fn ban_instrument(rest: &RestClient, catalog: &Catalog, name: &str) -> Result<()> {
    let id = catalog
        .id_for(name)
        .ok_or_else(|| WatchError::InstrumentNotFound(name.to_string()))?;
    let response = rest
        .put_json(&format!("/api/instruments/{}", id), &json!({ "banned": true }))
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request rejected").to_string()
        } else {
            body.trim().to_string()
        };
        return Err(WatchError::AdminAction {
            status: status.as_u16(),
            message,
        });
    }
    info!("Instrument {} (id {}) banned", name, id);
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ActiveClients {
    count: u64,
}

/// Last known number of active clients.
///
/// Clones share the value, so a refresh can run in its own task while the
/// console keeps reading [`ActiveClientCounter::count`].
#[derive(Debug, Default, Clone)]
pub struct ActiveClientCounter {
    count: Arc<Mutex<Option<u64>>>,
}

impl ActiveClientCounter {
    /// Counter with no value yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully fetched value.
    pub fn count(&self) -> Option<u64> {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refreshes the counter. On failure the previous value is kept.
    pub async fn refresh(&self, rest: &RestClient) -> Option<u64> {
        let fetched = rest.get_json::<ActiveClients>(ACTIVE_CLIENTS_PATH).await;
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        match fetched {
            Ok(active) => *count = Some(active.count),
            Err(e) => warn!("Active client count refresh failed: {}", e),
        }
        *count
    }

    /// Starts a refresh in the background.
    pub fn spawn_refresh(&self, rest: &RestClient) -> JoinHandle<Option<u64>> {
        let counter = self.clone();
        let rest = rest.clone();
        tokio::spawn(async move { counter.refresh(&rest).await })
    }
}
