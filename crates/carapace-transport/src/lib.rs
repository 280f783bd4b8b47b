// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport abstraction over the four IPC socket roles.
//!
//! Production wiring uses the `zmq`-backed sockets in [`zmq_backend`];
//! tests use the in-memory fakes in [`fake`].

pub mod error;
pub mod fake;
pub mod traits;
pub mod zmq_backend;

pub use error::TransportError;
pub use traits::{Dealer, Publisher, Router, Subscriber};
