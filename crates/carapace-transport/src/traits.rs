// SPDX-License-Identifier: MIT OR Apache-2.0
//! The four socket-role capability interfaces.
//!
//! Production code wires the `zmq`-backed implementations; tests wire
//! the in-memory fakes. Close is idempotent on every implementation.

use async_trait::async_trait;

use crate::error::TransportError;

/// Binds a local endpoint and sends `(topic, payload)` pairs to every
/// connected subscriber.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Fire-and-forget broadcast of `payload` under `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Idempotent close. Discards unsent frames (linger zero).
    async fn close(&self) -> Result<(), TransportError>;
}

/// Connects to a publisher and receives messages matching a subscribed
/// topic prefix.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe to every topic starting with `prefix`. An empty
    /// prefix subscribes to everything.
    async fn subscribe(&self, prefix: &str) -> Result<(), TransportError>;

    /// Block until the next matching `(topic, payload)` arrives.
    async fn recv(&self) -> Result<(String, Vec<u8>), TransportError>;

    /// Idempotent close.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Binds the request channel's host-side endpoint. Accepts connections
/// from many Dealers, each identified by an opaque identity frame.
#[async_trait]
pub trait Router: Send + Sync {
    /// Block until the next `(identity, payload)` arrives.
    async fn recv(&self) -> Result<(Vec<u8>, Vec<u8>), TransportError>;

    /// Send `payload` to the Dealer identified by `identity`.
    async fn send(&self, identity: Vec<u8>, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Idempotent close. Discards unsent frames (linger zero).
    async fn close(&self) -> Result<(), TransportError>;
}

/// Connects to a Router as a single logical client.
#[async_trait]
pub trait Dealer: Send + Sync {
    /// Send a single request payload.
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Block until the next response payload arrives.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Idempotent close. Discards unsent frames (linger zero).
    async fn close(&self) -> Result<(), TransportError>;
}
