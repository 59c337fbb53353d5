//! Thin REST client for the back-office API.
//!
//! Wraps a `reqwest::Client` with the API base URL and the stored session token,
//! which is sent as an `Authorization: Bearer` header on every request.
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use watch_common::{Result, WatchError};

use crate::config::ClientConfig;

/// Authenticated JSON client bound to one API base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    session_token: Option<String>,
}

impl RestClient {
    /// Builds the client from the session configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| WatchError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        })
    }

    /// Absolute URL of an API path such as `/api/instruments`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.session_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET` a JSON document.
    ///
    /// Non-2xx responses become `WatchError::Http` carrying the status and body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| WatchError::Http(format!("GET {}: {}", url, e)))?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| WatchError::Http(format!("GET {}: invalid body: {}", url, e)))
    }

    /// `PUT` a JSON body and return the raw response, whatever its status.
    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.url(path);
        debug!("PUT {}", url);
        self.authorize(self.client.put(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| WatchError::Http(format!("PUT {}: {}", url, e)))
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(WatchError::Http(format!("status {}: {}", status.as_u16(), body.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_without_double_slashes() {
        let config = ClientConfig::new("http://api.local/", "ws://feed.local");
        let client = RestClient::new(&config).unwrap();
        assert_eq!(client.url("/api/instruments"), "http://api.local/api/instruments");
        assert_eq!(client.url("api/clients/active"), "http://api.local/api/clients/active");
    }
}
