//! # dotbridge-core
//!
//! Foundation crate for the dotbridge relay:
//!
//! - **Errors**: [`RelayError`] hierarchy via `thiserror`
//! - **Evaluator output**: [`unquote::clean_evaluator_output`] strips the
//!   quoting artifacts a debugger's expression evaluator wraps around
//!   string values
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` setup
//!
//! Depended on by every other dotbridge crate.

#![deny(unsafe_code)]

pub mod errors;
pub mod logging;
pub mod unquote;

pub use errors::RelayError;
pub use unquote::clean_evaluator_output;
