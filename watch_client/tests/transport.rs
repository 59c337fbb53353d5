//! Streaming and polling transports against local test servers.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use watch_client::ClientConfig;
use watch_client::session::SessionEvent;
use watch_client::transport::{Connector, EventSink, FeedConnector, TransportEvent};
use watch_common::{Instrument, SubscribeRequest, TransportMode};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> TransportEvent {
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("transport event in time")
        .expect("session channel open");
    match event {
        SessionEvent::Transport { attempt, event } => {
            assert_eq!(attempt, 7);
            event
        }
        other => panic!("unexpected session event: {:?}", other),
    }
}

fn connector_for(feed_url: &str) -> FeedConnector {
    FeedConnector::new(&ClientConfig::new("http://127.0.0.1:1", feed_url)).unwrap()
}

fn sbin() -> Instrument {
    Instrument::new("SBIN", 779521, "9")
}

#[tokio::test]
async fn streaming_transport_delivers_quotes_and_reports_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let request = match ws.next().await {
            Some(Ok(Message::Text(text))) => text,
            other => panic!("expected subscribe frame, got {:?}", other),
        };
        ws.send(Message::Text(String::from("not json"))).await.unwrap();
        let update = json!({
            "event": "price_update",
            "data": {"instrumentName": "SBIN", "bid": "812.5", "ask": 813.0, "ltp": 812.75}
        });
        ws.send(Message::Text(update.to_string())).await.unwrap();
        ws.close(None).await.unwrap();
        request
    });

    let (tx, mut events) = unbounded_channel();
    let mut connector = connector_for(&format!("ws://{}/feed", addr));
    let handle = connector.open(TransportMode::Streaming, EventSink::new(7, tx));
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    handle.send(&SubscribeRequest::for_instrument(&sbin())).unwrap();
    match next_event(&mut events).await {
        TransportEvent::Quote(quote) => assert_eq!(quote.resolve_name(), Some("SBIN")),
        other => panic!("expected quote, got {:?}", other),
    }
    assert!(matches!(next_event(&mut events).await, TransportEvent::Disconnected(_)));

    let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(
        request,
        json!({"event": "subscribe", "data": {"symbol": "SBIN", "instrument_token": 779521}})
    );
}

#[tokio::test]
async fn refused_stream_reports_connect_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut events) = unbounded_channel();
    let mut connector = connector_for(&format!("ws://{}/feed", addr));
    let _handle = connector.open(TransportMode::Streaming, EventSink::new(7, tx));
    assert!(matches!(next_event(&mut events).await, TransportEvent::ConnectFailed(_)));
}

#[tokio::test]
async fn polling_transport_handshakes_posts_and_polls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed/poll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sid": "abc"})))
        .with_priority(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/poll"))
        .and(query_param("sid", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            "garbage",
            {"event": "heartbeat"},
            {"event": "price_update", "data": {"tradingsymbol": "SBIN", "bid": 812.5, "ask": 813.0, "ltp": 812.75}}
        ])))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/poll"))
        .and(query_param("sid", "abc"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(200)))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/feed/poll"))
        .and(query_param("sid", "abc"))
        .and(body_json(json!({"event": "subscribe", "data": {"symbol": "SBIN", "instrument_token": 779521}})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, mut events) = unbounded_channel();
    let mut connector = connector_for(&format!("{}/feed", server.uri()));
    let handle = connector.open(TransportMode::Polling, EventSink::new(7, tx));
    assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

    handle.send(&SubscribeRequest::for_instrument(&sbin())).unwrap();
    match next_event(&mut events).await {
        TransportEvent::Quote(quote) => assert_eq!(quote.resolve_name(), Some("SBIN")),
        other => panic!("expected quote, got {:?}", other),
    }

    let posted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.method.to_string() == "POST") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(posted.is_ok());
    handle.close();
}

#[tokio::test]
async fn rejected_polling_handshake_reports_connect_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed/poll"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (tx, mut events) = unbounded_channel();
    let mut connector = connector_for(&format!("{}/feed", server.uri()));
    let _handle = connector.open(TransportMode::Polling, EventSink::new(7, tx));
    assert!(matches!(next_event(&mut events).await, TransportEvent::ConnectFailed(_)));
}
