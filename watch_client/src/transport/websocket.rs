//! WebSocket streaming transport, the preferred mode.
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{EventSink, TransportEvent, TransportHandle, deliver_text};

/// Starts a streaming transport to `url`.
///
/// A successful WebSocket upgrade confirms the attempt.
pub fn spawn(url: String, sink: EventSink) -> TransportHandle {
    let (outbound_tx, outbound_rx) = unbounded_channel();
    let attempt = sink.attempt();
    let task = tokio::spawn(run(url, sink, outbound_rx));
    TransportHandle::new(attempt, outbound_tx, Some(task))
}

async fn run(url: String, sink: EventSink, mut outbound: UnboundedReceiver<String>) {
    debug!("Opening WebSocket {}", url);
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            sink.emit(TransportEvent::ConnectFailed(e.to_string()));
            return;
        }
    };
    info!("WebSocket connected to {}", url);
    if !sink.emit(TransportEvent::Connected) {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.emit(TransportEvent::Disconnected(e.to_string()));
                        return;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => deliver_text(&sink, &text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => deliver_text(&sink, &text),
                    Err(e) => warn!("Skipping non UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| String::from("server closed connection"));
                    sink.emit(TransportEvent::Disconnected(reason));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.emit(TransportEvent::Disconnected(e.to_string()));
                    return;
                }
                None => {
                    sink.emit(TransportEvent::Disconnected(String::from("connection closed")));
                    return;
                }
            },
        }
    }
}
