//! Error hierarchy for the dotbridge relay.
//!
//! One variant per failure domain, with a fixed propagation policy:
//! connection-level failures are recovered inside the relay loop and never
//! surface past it; startup failures are returned synchronously from
//! `start`; publisher-side failures are reported to the operator and must
//! never crash the process being inspected.

use thiserror::Error;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listening socket could not be created. Fatal to startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A connecting peer failed the WebSocket upgrade. The raw socket is
    /// closed without being registered; the loop continues unaffected.
    #[error("websocket handshake with {peer} failed: {reason}")]
    Handshake {
        /// Peer address of the failed upgrade.
        peer: String,
        /// Handshake failure detail.
        reason: String,
    },

    /// A read/write failure on one established client. Removes only that
    /// client from the registry.
    #[error("connection {id} failed: {reason}")]
    Connection {
        /// Identity of the failed connection.
        id: String,
        /// Failure detail.
        reason: String,
    },

    /// A submission was attempted against a relay loop that has stopped.
    /// The message is dropped; callers log and continue.
    #[error("relay loop is not running")]
    LoopNotRunning,

    /// The host command's expression could not be resolved to a string.
    /// Reported to the operator; nothing is broadcast.
    #[error("failed to evaluate `{expr}`: {reason}")]
    Evaluation {
        /// The expression as given by the operator.
        expr: String,
        /// Why evaluation failed.
        reason: String,
    },
}

impl RelayError {
    /// Create an [`RelayError::Evaluation`] error.
    #[must_use]
    pub fn evaluation(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Evaluation {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Create a [`RelayError::Handshake`] error.
    #[must_use]
    pub fn handshake(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Handshake {
            peer: peer.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal to the component that produced it.
    ///
    /// Only bind failures are: everything else is recovered locally or
    /// reported and ignored.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = RelayError::Bind {
            addr: "127.0.0.1:8001".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("127.0.0.1:8001"));
        assert!(msg.contains("in use"));
    }

    #[test]
    fn handshake_error_display() {
        let err = RelayError::handshake("127.0.0.1:54321", "not a websocket upgrade");
        assert!(err.to_string().contains("54321"));
        assert!(err.to_string().contains("not a websocket upgrade"));
    }

    #[test]
    fn evaluation_error_display() {
        let err = RelayError::evaluation("nfa.to_dot()", "no such symbol");
        assert!(err.to_string().contains("nfa.to_dot()"));
        assert!(err.to_string().contains("no such symbol"));
    }

    #[test]
    fn loop_not_running_display() {
        assert_eq!(
            RelayError::LoopNotRunning.to_string(),
            "relay loop is not running"
        );
    }

    #[test]
    fn only_bind_is_fatal() {
        let bind = RelayError::Bind {
            addr: "x".into(),
            source: std::io::Error::other("boom"),
        };
        assert!(bind.is_fatal());
        assert!(!RelayError::LoopNotRunning.is_fatal());
        assert!(!RelayError::handshake("p", "r").is_fatal());
        assert!(!RelayError::evaluation("e", "r").is_fatal());
    }

    #[test]
    fn bind_error_exposes_source() {
        use std::error::Error as _;
        let err = RelayError::Bind {
            addr: "x".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
    }
}
