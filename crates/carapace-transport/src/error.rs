// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport-layer failures.

use thiserror::Error;

/// Failures raised by a [`crate::Router`], [`crate::Dealer`],
/// [`crate::Publisher`], or [`crate::Subscriber`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying ZeroMQ call failed.
    #[error("zmq error: {0}")]
    Zmq(#[from] zmq::Error),

    /// The blocking socket task panicked or was cancelled.
    #[error("transport worker task failed: {0}")]
    Worker(String),

    /// An operation was attempted after [`close`](crate::Router::close)
    /// had already run.
    #[error("transport is closed")]
    Closed,
}
