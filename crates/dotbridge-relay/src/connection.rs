//! One registered viewer connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique connection identity, assigned at accept time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Create a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("viewer_{}", Uuid::now_v7()))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Message queued toward the client's write task.
    Sent,
    /// The client's send queue is full; the message was dropped.
    Full,
    /// The client's write task is gone; the connection is dead.
    Closed,
}

/// A connected viewer.
///
/// Owned exclusively by the relay loop: created after a successful
/// handshake, destroyed on read error, send failure, force-close, or loop
/// shutdown. Never shared across threads.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ClientId,
    /// Peer address, for logging.
    pub peer: SocketAddr,
    /// Send queue toward the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    connected_at: Instant,
    /// Messages dropped because the queue was full.
    dropped: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection around its send queue.
    pub fn new(id: ClientId, peer: SocketAddr, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            peer,
            tx,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Attempt to deliver one text payload.
    ///
    /// Never blocks. A full queue counts against the connection's drop
    /// total; the registry force-closes past the configured ceiling.
    pub fn deliver(&self, payload: Arc<str>) -> DeliveryStatus {
        match self.tx.try_send(payload) {
            Ok(()) => DeliveryStatus::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                DeliveryStatus::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryStatus::Closed,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_peer() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientConnection::new(ClientId::new(), test_peer(), tx), rx)
    }

    #[test]
    fn client_ids_are_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("viewer_"));
    }

    #[tokio::test]
    async fn deliver_queues_message() {
        let (conn, mut rx) = make_connection(4);
        assert_eq!(conn.deliver(Arc::from("hello")), DeliveryStatus::Sent);
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn deliver_preserves_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            assert_eq!(
                conn.deliver(Arc::from(format!("msg_{i}").as_str())),
                DeliveryStatus::Sent
            );
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(&*msg, format!("msg_{i}"));
        }
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (conn, _rx) = make_connection(1);
        assert_eq!(conn.deliver(Arc::from("a")), DeliveryStatus::Sent);
        assert_eq!(conn.deliver(Arc::from("b")), DeliveryStatus::Full);
        assert_eq!(conn.deliver(Arc::from("c")), DeliveryStatus::Full);
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (tx, rx) = mpsc::channel(4);
        let conn = ClientConnection::new(ClientId::new(), test_peer(), tx);
        drop(rx);
        assert_eq!(conn.deliver(Arc::from("x")), DeliveryStatus::Closed);
        // A dead connection is not a slow one: no drop counted.
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn age_increases() {
        let (conn, _rx) = make_connection(1);
        let a = conn.age();
        std::thread::sleep(Duration::from_millis(5));
        assert!(conn.age() > a);
    }
}
