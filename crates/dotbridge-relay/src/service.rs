//! The relay loop: lifecycle, socket accept/handshake, and the
//! cross-thread submission primitive.
//!
//! [`RelayService::start`] spawns a dedicated OS thread running a
//! current-thread tokio runtime. Everything that touches connection state —
//! accepts, handshakes, registry mutation, fan-out — executes on that one
//! thread as cooperatively scheduled tasks. Foreign threads interact with
//! the loop only through [`RelayService::submit`], which enqueues an event
//! for the loop's single consumer and returns immediately.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use dotbridge_core::RelayError;

use crate::config::RelayConfig;
use crate::connection::{ClientConnection, ClientId};
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Upper bound on a pending WebSocket upgrade, so a raw-TCP peer that
/// never speaks the protocol cannot pin resources.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period after shutdown for write tasks to flush Close frames.
const CLOSE_GRACE: Duration = Duration::from_millis(50);

/// Events consumed by the relay loop's control task.
///
/// Registration, disconnection, and broadcasts all flow through this one
/// channel, which is what keeps the registry single-writer.
enum RelayEvent {
    /// Fan a text payload out to every registered connection.
    Broadcast(String),
    /// A handshake completed; add the connection to the registry.
    Register(ClientConnection),
    /// A connection's read side ended or its write side failed.
    Disconnect(ClientId),
}

/// Handle to a running relay loop.
///
/// Returned by [`RelayService::start`] and passed explicitly to every later
/// operation — there is no process-wide singleton. Dropping the handle
/// stops the loop.
#[derive(Debug)]
pub struct RelayService {
    events: mpsc::UnboundedSender<RelayEvent>,
    shutdown: ShutdownCoordinator,
    local_addr: SocketAddr,
    active_count: Arc<AtomicUsize>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl RelayService {
    /// Bind the listening socket and start the relay loop on a dedicated
    /// background thread.
    ///
    /// Returns once the loop is accepting connections. A bind failure is
    /// surfaced synchronously as [`RelayError::Bind`] and leaves no thread
    /// running.
    pub fn start(config: RelayConfig) -> Result<Self, RelayError> {
        let host: IpAddr = config.host.parse().map_err(|e| RelayError::Bind {
            addr: format!("{}:{}", config.host, config.port),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")),
        })?;
        let addr = SocketAddr::new(host, config.port);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = ShutdownCoordinator::new();
        let active_count = Arc::new(AtomicUsize::new(0));

        // The loop thread reports its bind result back before `start`
        // returns, so callers get the error without a running thread
        // behind it.
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<SocketAddr, RelayError>>();

        let loop_shutdown = shutdown.clone();
        let loop_events = events_tx.clone();
        let loop_count = Arc::clone(&active_count);
        let thread = std::thread::Builder::new()
            .name("dotbridge-relay".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_io()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(RelayError::Bind {
                            addr: addr.to_string(),
                            source: e,
                        }));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let listener = match TcpListener::bind(addr).await {
                        Ok(l) => l,
                        Err(e) => {
                            let _ = ready_tx.send(Err(RelayError::Bind {
                                addr: addr.to_string(),
                                source: e,
                            }));
                            return;
                        }
                    };
                    let local = match listener.local_addr() {
                        Ok(a) => a,
                        Err(e) => {
                            let _ = ready_tx.send(Err(RelayError::Bind {
                                addr: addr.to_string(),
                                source: e,
                            }));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(local));
                    run_loop(listener, events_rx, loop_events, loop_shutdown, loop_count, &config)
                        .await;
                });
            })
            .map_err(|e| RelayError::Bind {
                addr: addr.to_string(),
                source: e,
            })?;

        match ready_rx.recv() {
            Ok(Ok(local_addr)) => {
                info!(addr = %local_addr, "relay loop started");
                Ok(Self {
                    events: events_tx,
                    shutdown,
                    local_addr,
                    active_count,
                    thread: Mutex::new(Some(thread)),
                })
            }
            Ok(Err(e)) => {
                // Bind failed; the thread has already exited.
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(RelayError::Bind {
                    addr: addr.to_string(),
                    source: std::io::Error::other("relay thread exited before binding"),
                })
            }
        }
    }

    /// Schedule a broadcast of `message` on the relay loop's own thread.
    ///
    /// Thread-safe and non-blocking: returns once the request is queued,
    /// not once delivery completes. Broadcasts execute in submission order.
    /// After [`stop`](Self::stop) this reports [`RelayError::LoopNotRunning`]
    /// and the message is dropped — callers log and continue.
    pub fn submit(&self, message: impl Into<String>) -> Result<(), RelayError> {
        if self.shutdown.is_shutdown() {
            return Err(RelayError::LoopNotRunning);
        }
        self.events
            .send(RelayEvent::Broadcast(message.into()))
            .map_err(|_| RelayError::LoopNotRunning)
    }

    /// Stop the relay loop: close every connection, release the listening
    /// socket, and join the background thread.
    ///
    /// Idempotent — calling it again (or after `Drop`) is a no-op.
    pub fn stop(&self) {
        self.shutdown.shutdown();
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("relay thread panicked during shutdown");
            }
            info!("relay loop stopped");
        }
    }

    /// Number of currently connected viewers.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// The address the relay is actually listening on (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for RelayService {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The control task: the single consumer of [`RelayEvent`]s and the sole
/// owner of the [`ConnectionRegistry`].
async fn run_loop(
    listener: TcpListener,
    mut events_rx: mpsc::UnboundedReceiver<RelayEvent>,
    events_tx: mpsc::UnboundedSender<RelayEvent>,
    shutdown: ShutdownCoordinator,
    active_count: Arc<AtomicUsize>,
    config: &RelayConfig,
) {
    let mut registry = ConnectionRegistry::new(active_count, config.max_client_drops);

    loop {
        tokio::select! {
            () = shutdown.requested() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // Handshakes run as their own tasks so a slow upgrade
                    // never stalls accepts or in-flight broadcasts.
                    let _ = tokio::spawn(accept_client(
                        stream,
                        peer,
                        events_tx.clone(),
                        config.send_queue_capacity,
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },

            event = events_rx.recv() => match event {
                Some(RelayEvent::Register(conn)) => registry.register(conn),
                Some(RelayEvent::Disconnect(id)) => {
                    let _ = registry.unregister(&id);
                }
                Some(RelayEvent::Broadcast(text)) => {
                    let _ = registry.broadcast(&text);
                }
                // The service handle holds a sender for the lifetime of the
                // loop, so this only fires once it is gone.
                None => break,
            },
        }
    }

    registry.close_all();
    drop(listener);
    // Let the write tasks observe their closed queues and flush Close
    // frames before the runtime is torn down.
    tokio::time::sleep(CLOSE_GRACE).await;
}

/// Perform the WebSocket upgrade on a freshly accepted socket and, on
/// success, wire up the connection's read/write tasks and register it.
///
/// A failed or timed-out upgrade closes the raw socket without touching
/// the registry.
async fn accept_client(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<RelayEvent>,
    queue_capacity: usize,
) {
    let ws = match tokio::time::timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            warn!(error = %RelayError::handshake(peer.to_string(), e.to_string()), "upgrade rejected");
            return;
        }
        Err(_) => {
            warn!(error = %RelayError::handshake(peer.to_string(), "timed out"), "upgrade rejected");
            return;
        }
    };

    let id = ClientId::new();
    let (tx, rx) = mpsc::channel(queue_capacity);
    let (sink, source) = ws.split();

    let _ = tokio::spawn(write_loop(sink, rx, events.clone(), id.clone()));
    let _ = tokio::spawn(read_loop(source, events.clone(), id.clone()));

    // On a current-thread runtime the tasks spawned above cannot run until
    // this task yields, so the registration event is enqueued before any
    // frame from this connection.
    let _ = events.send(RelayEvent::Register(ClientConnection::new(id, peer, tx)));
}

/// Drain the connection's send queue into the WebSocket sink.
///
/// Queue closure (unregistration or shutdown) ends the task with a polite
/// Close frame; a sink error reports the disconnect and ends it.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    events: mpsc::UnboundedSender<RelayEvent>,
    id: ClientId,
) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = sink.send(Message::text(text.as_ref())).await {
            let err = RelayError::Connection {
                id: id.to_string(),
                reason: format!("write failed: {e}"),
            };
            debug!(error = %err, "dropping connection");
            let _ = events.send(RelayEvent::Disconnect(id));
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

/// Forward inbound text frames into the broadcast path and report the
/// disconnect when the stream ends.
///
/// Every text frame a client sends is re-broadcast verbatim to all
/// clients, the sender included — the relay is an echo bus.
async fn read_loop(
    mut source: SplitStream<WebSocketStream<TcpStream>>,
    events: mpsc::UnboundedSender<RelayEvent>,
    id: ClientId,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let _ = events.send(RelayEvent::Broadcast(text.to_string()));
            }
            Ok(Message::Close(_)) => break,
            // Pings are answered by the protocol layer; binary frames are
            // not part of the relay's contract.
            Ok(_) => {}
            Err(e) => {
                let err = RelayError::Connection {
                    id: id.to_string(),
                    reason: format!("read failed: {e}"),
                };
                debug!(error = %err, "dropping connection");
                break;
            }
        }
    }
    let _ = events.send(RelayEvent::Disconnect(id));
}
