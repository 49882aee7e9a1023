//! Integration tests for the signaling client
//!
//! Each test runs a throwaway WebSocket server on an ephemeral port and
//! drives the client against it.

use futures::{SinkExt, StreamExt};
use motionlink_signaling::*;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    (listener, format!("ws://{}/signaling", addr))
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_text(socket: &mut ServerSocket) -> serde_json::Value {
    loop {
        match timeout(Duration::from_secs(5), socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).unwrap(),
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SignalingEvent>) -> SignalingEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for signaling event")
        .expect("event channel closed")
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts,
        delay: Duration::from_millis(20),
        connect_timeout: Duration::from_secs(2),
    }
}

// ============================================================================
// EXCHANGE TESTS
// ============================================================================

#[tokio::test]
async fn test_offer_answer_exchange() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = SignalingClient::connect(url, fast_policy(5), tx);

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);
    assert!(client.is_connected());

    client
        .send(ClientMessage::Offer(SessionDescription::offer("v=0 offer")))
        .unwrap();
    let offer = next_text(&mut server).await;
    assert_eq!(offer["event"], "offer");
    assert_eq!(offer["data"]["type"], "offer");

    server
        .send(Message::Text(
            r#"{"event":"answer","data":{"sdp":"v=0 answer","type":"answer"}}"#.to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut rx).await,
        SignalingEvent::Message(ServerMessage::Answer(SessionDescription::answer(
            "v=0 answer"
        )))
    );
}

#[tokio::test]
async fn test_outbound_messages_keep_order() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = SignalingClient::connect(url, fast_policy(5), tx);

    // Queued before the connection is accepted
    client
        .send(ClientMessage::IceCandidate(IceCandidate::new("candidate:1")))
        .unwrap();
    client
        .send(ClientMessage::ModeChange {
            mode: "motion".to_string(),
        })
        .unwrap();
    tokio_test::assert_ok!(client.send(ClientMessage::ClearCanvas));

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);

    let names: Vec<String> = {
        let mut names = Vec::new();
        for _ in 0..3 {
            names.push(next_text(&mut server).await["event"].as_str().unwrap().to_string());
        }
        names
    };
    assert_eq!(names, vec!["ice-candidate", "mode_change", "clear_canvas"]);
}

#[tokio::test]
async fn test_malformed_message_is_dropped() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _client = SignalingClient::connect(url, fast_policy(5), tx);

    let mut server = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);

    server
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    server
        .send(Message::Text(r#"{"event":"unknown","data":{}}"#.to_string()))
        .await
        .unwrap();
    server
        .send(Message::Text(r#"{"event":"canvas_cleared"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        SignalingEvent::Message(ServerMessage::CanvasCleared)
    );
}

// ============================================================================
// RECONNECT TESTS
// ============================================================================

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = SignalingClient::connect(url, fast_policy(5), tx);

    let mut first = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);
    first.close(None).await.unwrap();

    assert!(matches!(
        next_event(&mut rx).await,
        SignalingEvent::Disconnected { .. }
    ));

    let mut second = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);

    client.send(ClientMessage::ClearCanvas).unwrap();
    assert_eq!(next_text(&mut second).await["event"], "clear_canvas");
}

#[tokio::test]
async fn test_gives_up_after_bounded_attempts() {
    let (listener, url) = bind().await;
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = SignalingClient::connect(url, fast_policy(2), tx);

    assert_eq!(
        next_event(&mut rx).await,
        SignalingEvent::GaveUp { attempts: 3 }
    );
    assert!(!client.is_connected());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        client.send(ClientMessage::ClearCanvas),
        Err(SignalingError::Closed)
    ));
}

#[tokio::test]
async fn test_close_stops_reconnecting() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = SignalingClient::connect(url, fast_policy(5), tx);

    let _server = accept(&listener).await;
    assert_eq!(next_event(&mut rx).await, SignalingEvent::Connected);

    client.close();
    assert!(!client.is_open());

    let reconnect = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(reconnect.is_err());
}
