//! End-to-end tests against a live relay with real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use dotbridge_core::RelayError;
use dotbridge_relay::{ExpressionEvaluator, GraphPublisher, RelayConfig, RelayService};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn start_relay() -> RelayService {
    RelayService::start(RelayConfig {
        port: 0,
        ..RelayConfig::default()
    })
    .expect("relay should bind a loopback port")
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("handshake should succeed");
    ws
}

/// Wait until the relay has registered `n` connections. Registration runs
/// on the relay thread, so a fresh handshake is visible only eventually.
async fn wait_for_clients(relay: &RelayService, n: usize) {
    for _ in 0..100 {
        if relay.connection_count() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {n} connections, relay reports {}",
        relay.connection_count()
    );
}

async fn recv_text(ws: &mut WsClient) -> String {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended unexpectedly")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return text.to_string();
        }
    }
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let relay = start_relay();
    let mut a = connect(relay.local_addr()).await;
    let mut b = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 2).await;

    relay.submit("digraph{1->2}").unwrap();

    assert_eq!(recv_text(&mut a).await, "digraph{1->2}");
    assert_eq!(recv_text(&mut b).await, "digraph{1->2}");
    relay.stop();
}

#[tokio::test]
async fn inbound_text_is_echoed_to_all_clients_including_sender() {
    let relay = start_relay();
    let mut sender = connect(relay.local_addr()).await;
    let mut other = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 2).await;

    let payload = "sync-request {\"seq\":1}";
    sender.send(Message::text(payload)).await.unwrap();

    assert_eq!(recv_text(&mut sender).await, payload);
    assert_eq!(recv_text(&mut other).await, payload);
    relay.stop();
}

#[tokio::test]
async fn disconnect_does_not_disturb_remaining_clients() {
    let relay = start_relay();
    let mut leaver = connect(relay.local_addr()).await;
    let mut stayer = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 2).await;

    leaver.close(None).await.unwrap();
    wait_for_clients(&relay, 1).await;

    relay.submit("digraph{a->b}").unwrap();
    assert_eq!(recv_text(&mut stayer).await, "digraph{a->b}");
    relay.stop();
}

#[tokio::test]
async fn abrupt_disconnect_is_pruned() {
    let relay = start_relay();
    let leaver = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;

    // No Close frame: drop the TCP stream outright.
    drop(leaver);
    wait_for_clients(&relay, 0).await;

    // Broadcasting into an empty registry is still fine.
    relay.submit("digraph{}").unwrap();
    relay.stop();
}

#[tokio::test]
async fn payloads_are_delivered_byte_for_byte() {
    let relay = start_relay();
    let mut client = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;

    // Embedded quotes, newlines, and non-ASCII must survive untouched.
    let payload = "digraph{\n  1 [label=\"état q0\"];\n  1->2;\n}";
    relay.submit(payload).unwrap();
    assert_eq!(recv_text(&mut client).await, payload);
    relay.stop();
}

#[tokio::test]
async fn broadcasts_arrive_in_submission_order() {
    let relay = start_relay();
    let mut client = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;

    for i in 0..10 {
        relay.submit(format!("digraph{{ step{i} }}")).unwrap();
    }
    for i in 0..10 {
        assert_eq!(recv_text(&mut client).await, format!("digraph{{ step{i} }}"));
    }
    relay.stop();
}

#[tokio::test]
async fn stop_closes_clients_and_frees_the_port() {
    let relay = start_relay();
    let addr = relay.local_addr();
    let mut client = connect(addr).await;
    wait_for_clients(&relay, 1).await;

    relay.stop();

    // The client's stream ends (Close frame or EOF) rather than hanging.
    let shutdown_observed = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(shutdown_observed.is_ok(), "client never saw the shutdown");

    // The listening socket is released.
    let rebound = std::net::TcpListener::bind(addr);
    assert!(rebound.is_ok(), "port still occupied after stop");
}

#[tokio::test]
async fn submit_after_stop_is_rejected_without_panicking() {
    let relay = start_relay();
    relay.stop();
    assert!(matches!(
        relay.submit("digraph{}"),
        Err(RelayError::LoopNotRunning)
    ));
}

struct DotDumpEvaluator;

impl ExpressionEvaluator for DotDumpEvaluator {
    fn evaluate(&self, _expr: &str) -> Result<String, RelayError> {
        // A debugger renders a returned string as a quoted, escaped
        // literal; the publisher strips that wrapping before broadcast.
        Ok(r#""digraph{\n1 [label=\"q0\"];\n1->2;\n}""#.into())
    }
}

#[tokio::test]
async fn publisher_delivers_cleaned_dot_text_to_viewers() {
    let relay = start_relay();
    let mut viewer = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;

    let publisher = GraphPublisher::new(DotDumpEvaluator, "nfa._toDotString()");
    publisher.publish(&relay).unwrap();

    assert_eq!(
        recv_text(&mut viewer).await,
        "digraph{\n1 [label=\"q0\"];\n1->2;\n}"
    );
    relay.stop();
}

#[tokio::test]
async fn publish_with_no_viewers_is_a_no_op() {
    let relay = start_relay();
    let publisher = GraphPublisher::new(DotDumpEvaluator, "nfa._toDotString()");
    assert!(publisher.publish(&relay).is_ok());
    relay.stop();
}

#[tokio::test]
async fn publish_after_last_viewer_leaves_succeeds_quietly() {
    let relay = start_relay();
    let mut viewer = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;
    viewer.close(None).await.unwrap();
    wait_for_clients(&relay, 0).await;

    let publisher = GraphPublisher::new(DotDumpEvaluator, "nfa._toDotString()");
    assert!(publisher.publish(&relay).is_ok());
    assert_eq!(relay.connection_count(), 0);
    relay.stop();
}

#[tokio::test]
async fn non_websocket_connection_is_rejected_without_registration() {
    use tokio::io::AsyncWriteExt;

    let relay = start_relay();
    let mut raw = TcpStream::connect(relay.local_addr()).await.unwrap();
    raw.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(relay.connection_count(), 0);

    // A real client still gets through afterwards.
    let mut ws = connect(relay.local_addr()).await;
    wait_for_clients(&relay, 1).await;
    relay.submit("digraph{}").unwrap();
    assert_eq!(recv_text(&mut ws).await, "digraph{}");
    relay.stop();
}
