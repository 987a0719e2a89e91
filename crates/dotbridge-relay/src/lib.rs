//! # dotbridge-relay
//!
//! A loopback WebSocket broadcast relay. A background event loop on a
//! dedicated thread owns the accept socket and every client connection;
//! any other thread can hand it a message to fan out to all currently
//! connected viewers.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Bind address, queue sizing, viewer page |
//! | `connection` | One registered client: identity + bounded send queue |
//! | `registry` | Membership set and best-effort broadcast fan-out |
//! | `service` | The relay loop itself: accept/handshake, submission, shutdown |
//! | `shutdown` | Cross-thread shutdown request, idempotent |
//! | `publisher` | Debugger-command surface: evaluate an expression, publish it |
//! | `viewer` | Best-effort launch of the local visualization page |
//!
//! ## Data flow
//!
//! accept socket → handshake → `registry` (register). Foreign thread →
//! [`RelayService::submit`] → loop thread → `registry` broadcast. Inbound
//! client frames re-enter the same broadcast path (the relay is an echo
//! bus, not a one-way push channel).

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod shutdown;
pub mod viewer;

pub use config::RelayConfig;
pub use publisher::{ExpressionEvaluator, GraphPublisher};
pub use service::RelayService;
pub use shutdown::ShutdownCoordinator;
pub use viewer::open_viewer;
