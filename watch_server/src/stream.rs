use std::collections::HashSet;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use watch_common::command::SUBSCRIBE_EVENT;
use watch_common::{FeedEnvelope, SubscribeRequest, WatchError};

use crate::model::generator::QuoteTick;

/// Stream task for a single WebSocket client.
///
/// Reads `subscribe` envelopes from the client and forwards every generated tick
/// whose token the client subscribed to. The task ends when the client goes away,
/// a send fails, or the generator stops.
pub async fn handle_client_stream(
    stream: TcpStream,
    peer: SocketAddr,
    mut ticks: Receiver<QuoteTick>,
) -> Result<(), WatchError> {
    let socket = accept_async(stream)
        .await
        .map_err(|e| WatchError::Transport(format!("handshake with {} failed: {}", peer, e)))?;
    info!("Client {} connected", peer);
    let (mut write, mut read) = socket.split();
    let mut subscribed: HashSet<u64> = HashSet::new();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(request) = subscription(&text) {
                        debug!("{} subscribed to {} ({})", peer, request.symbol, request.instrument_token);
                        subscribed.insert(request.instrument_token);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Client {} read error: {}", peer, e);
                    break;
                }
            },
            tick = ticks.recv() => match tick {
                Ok(tick) => {
                    if subscribed.contains(&tick.token) {
                        write
                            .send(Message::Text(tick.frame.to_string()))
                            .await
                            .map_err(|e| WatchError::Transport(format!("send to {} failed: {}", peer, e)))?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Client {} skipped {} ticks", peer, skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }
    info!("Client {} disconnected ({} subscriptions)", peer, subscribed.len());
    Ok(())
}

/// Subscribe request carried by a text frame, if it is one.
fn subscription(text: &str) -> Option<SubscribeRequest> {
    let envelope = match FeedEnvelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Ignoring malformed client frame: {}", e);
            return None;
        }
    };
    if envelope.event != SUBSCRIBE_EVENT {
        debug!("Ignoring client event {:?}", envelope.event);
        return None;
    }
    match serde_json::from_value(envelope.data) {
        Ok(request) => Some(request),
        Err(e) => {
            warn!("Ignoring malformed subscribe request: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_common::Instrument;

    #[test]
    fn reads_subscribe_frames_only() {
        let frame = SubscribeRequest::for_instrument(&Instrument::new("SBIN", 779521, "9"))
            .to_envelope()
            .unwrap()
            .to_json()
            .unwrap();
        assert_eq!(subscription(&frame).map(|r| r.instrument_token), Some(779521));
        assert!(subscription(r#"{"event":"ping"}"#).is_none());
        assert!(subscription("not json").is_none());
        assert!(subscription(r#"{"event":"subscribe","data":{"symbol":"X"}}"#).is_none());
    }
}
