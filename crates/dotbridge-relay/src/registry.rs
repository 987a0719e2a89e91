//! Membership set and broadcast fan-out.
//!
//! The registry is a plain map with no interior locking: every mutation —
//! including those that originate on a foreign publisher thread — reaches it
//! as an event consumed by the single control task on the relay loop's own
//! thread. That single-writer invariant is what makes lock-free membership
//! sound here.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info, warn};

use crate::connection::{ClientConnection, ClientId, DeliveryStatus};

/// The set of currently-open viewer connections.
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, ClientConnection>,
    /// Shared with the service handle so `connection_count` needs no lock.
    active_count: Arc<AtomicUsize>,
    /// Cumulative drop ceiling before a slow client is force-closed.
    max_drops: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(active_count: Arc<AtomicUsize>, max_drops: u64) -> Self {
        Self {
            connections: HashMap::new(),
            active_count,
            max_drops,
        }
    }

    /// Add a connection.
    pub fn register(&mut self, conn: ClientConnection) {
        info!(client = %conn.id, peer = %conn.peer, "viewer connected");
        if self.connections.insert(conn.id.clone(), conn).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection. Returns whether it was still a member, so a
    /// disconnect observed by both halves of a connection unregisters once.
    pub fn unregister(&mut self, id: &ClientId) -> bool {
        if self.connections.remove(id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            info!(client = %id, "viewer disconnected");
            true
        } else {
            false
        }
    }

    /// Fan one message out to every current member.
    ///
    /// A member whose queue is closed, or whose cumulative drops exceed the
    /// ceiling, is removed in the same pass without aborting delivery to the
    /// rest. An empty registry is a cheap no-op. Returns the number of
    /// members the message was queued for.
    pub fn broadcast(&mut self, message: &str) -> usize {
        if self.connections.is_empty() {
            return 0;
        }

        let payload: Arc<str> = Arc::from(message);
        let mut delivered = 0;
        let mut to_remove = Vec::new();

        for conn in self.connections.values() {
            match conn.deliver(Arc::clone(&payload)) {
                DeliveryStatus::Sent => delivered += 1,
                DeliveryStatus::Full => {
                    let drops = conn.drop_count();
                    if drops >= self.max_drops {
                        warn!(client = %conn.id, drops, "force-closing slow viewer");
                        to_remove.push(conn.id.clone());
                    } else {
                        warn!(client = %conn.id, drops, "send queue full, message dropped");
                    }
                }
                DeliveryStatus::Closed => {
                    debug!(client = %conn.id, "send queue closed during broadcast");
                    to_remove.push(conn.id.clone());
                }
            }
        }

        for id in &to_remove {
            let _ = self.unregister(id);
        }

        debug!(recipients = delivered, "broadcast message");
        delivered
    }

    /// Drop every connection. Their write tasks observe the closed queues
    /// and send a Close frame on their way out.
    pub fn close_all(&mut self) {
        let n = self.connections.len();
        self.connections.clear();
        self.active_count.store(0, Ordering::Relaxed);
        if n > 0 {
            info!(closed = n, "closed all viewer connections");
        }
    }

    /// Number of current members.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry has no members.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
