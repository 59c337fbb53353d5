//! HTTP long-polling transport, the degraded mode.
//!
//! `GET {base}` opens a polling session and returns `{ "sid": ... }`. Frames are
//! posted to `{base}?sid=...`; `GET {base}?sid=...` blocks until the server has
//! a batch of envelopes to hand out.
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use url::Url;
use watch_common::{FeedEnvelope, Result, WatchError};

use super::{EventSink, TransportEvent, TransportHandle, deliver_envelope};

#[derive(Debug, Deserialize)]
struct Handshake {
    sid: String,
}

/// Starts a polling transport against `base`.
pub fn spawn(client: Client, base: Url, sink: EventSink) -> TransportHandle {
    let (outbound_tx, outbound_rx) = unbounded_channel();
    let attempt = sink.attempt();
    let task = tokio::spawn(run(client, base, sink, outbound_rx));
    TransportHandle::new(attempt, outbound_tx, Some(task))
}

async fn run(client: Client, base: Url, sink: EventSink, mut outbound: UnboundedReceiver<String>) {
    let sid = match handshake(&client, &base).await {
        Ok(sid) => sid,
        Err(e) => {
            sink.emit(TransportEvent::ConnectFailed(e.to_string()));
            return;
        }
    };
    info!("Polling session {} opened at {}", sid, base);
    if !sink.emit(TransportEvent::Connected) {
        return;
    }

    let mut session_url = base;
    session_url.query_pairs_mut().append_pair("sid", &sid);

    let mut poll = Box::pin(poll_once(client.clone(), session_url.clone()));
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = post_frame(&client, &session_url, text).await {
                        sink.emit(TransportEvent::Disconnected(e.to_string()));
                        return;
                    }
                }
                None => return,
            },
            batch = &mut poll => {
                match batch {
                    Ok(envelopes) => {
                        for envelope in &envelopes {
                            deliver_envelope(&sink, envelope);
                        }
                    }
                    Err(e) => {
                        sink.emit(TransportEvent::Disconnected(e.to_string()));
                        return;
                    }
                }
                poll = Box::pin(poll_once(client.clone(), session_url.clone()));
            }
        }
    }
}

async fn handshake(client: &Client, base: &Url) -> Result<String> {
    let response = client
        .get(base.clone())
        .send()
        .await
        .map_err(|e| WatchError::Transport(format!("polling handshake: {}", e)))?;
    if !response.status().is_success() {
        return Err(WatchError::Transport(format!(
            "polling handshake rejected with status {}",
            response.status().as_u16()
        )));
    }
    let handshake: Handshake = response
        .json()
        .await
        .map_err(|e| WatchError::Transport(format!("polling handshake: {}", e)))?;
    Ok(handshake.sid)
}

async fn post_frame(client: &Client, url: &Url, text: String) -> Result<()> {
    let response = client
        .post(url.clone())
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(text)
        .send()
        .await
        .map_err(|e| WatchError::Transport(e.to_string()))?;
    if !response.status().is_success() {
        return Err(WatchError::Transport(format!(
            "frame rejected with status {}",
            response.status().as_u16()
        )));
    }
    Ok(())
}

async fn poll_once(client: Client, url: Url) -> Result<Vec<FeedEnvelope>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| WatchError::Transport(e.to_string()))?;
    match response.status() {
        StatusCode::NO_CONTENT => Ok(Vec::new()),
        status if status.is_success() => {
            let frames: Vec<serde_json::Value> = response
                .json()
                .await
                .map_err(|e| WatchError::Transport(format!("bad poll batch: {}", e)))?;
            debug!("Poll returned {} frames", frames.len());
            Ok(frames
                .into_iter()
                .filter_map(|frame| match serde_json::from_value::<FeedEnvelope>(frame) {
                    Ok(envelope) => Some(envelope),
                    Err(e) => {
                        warn!("Skipping malformed feed frame: {}", e);
                        None
                    }
                })
                .collect())
        }
        status => Err(WatchError::Transport(format!("poll failed with status {}", status.as_u16()))),
    }
}
