//! Bridges a debugger-side expression evaluator to the relay loop.
//!
//! [`GraphPublisher`] is what an operator-facing command calls: it asks an
//! [`ExpressionEvaluator`] for the automaton's DOT dump, normalizes the
//! string-literal wrapping the evaluator applies, and submits the result
//! for broadcast. Evaluation failures are reported to the operator and
//! never reach the wire.

use tracing::{debug, info, warn};

use dotbridge_core::{RelayError, clean_evaluator_output};

use crate::service::RelayService;

/// Evaluates an expression in the debuggee and returns its string value.
///
/// Implementations wrap whatever evaluation machinery the host debugger
/// exposes. The returned value may still carry the source-level quoting
/// and escapes of a string literal; the publisher cleans those up.
pub trait ExpressionEvaluator {
    /// Evaluate `expr` in the current debuggee context.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Evaluation`] when the expression cannot be
    /// evaluated — no session, no such symbol, or a raised error in the
    /// debuggee.
    fn evaluate(&self, expr: &str) -> Result<String, RelayError>;
}

/// Publishes a graph's DOT text to all connected viewers.
pub struct GraphPublisher<E> {
    evaluator: E,
    expression: String,
}

impl<E: ExpressionEvaluator> GraphPublisher<E> {
    /// Create a publisher that evaluates `expression` on each publish.
    pub fn new(evaluator: E, expression: impl Into<String>) -> Self {
        Self {
            evaluator,
            expression: expression.into(),
        }
    }

    /// The expression evaluated on each publish.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluate the configured expression and broadcast the cleaned DOT
    /// text through `relay`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Evaluation`] when evaluation fails and
    /// [`RelayError::LoopNotRunning`] when the relay has been stopped. In
    /// both cases nothing is broadcast.
    pub fn publish(&self, relay: &RelayService) -> Result<(), RelayError> {
        let raw = match self.evaluator.evaluate(&self.expression) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(expr = %self.expression, error = %e, "evaluation failed");
                return Err(e);
            }
        };
        let dot = clean_evaluator_output(&raw);
        debug!(bytes = dot.len(), "publishing graph");
        relay.submit(dot)?;
        info!(viewers = relay.connection_count(), "graph published");
        Ok(())
    }
}
