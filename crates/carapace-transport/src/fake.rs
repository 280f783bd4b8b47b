// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory transport fakes, wired through channels instead of real
//! sockets. The primary test harness: deterministic, no filesystem
//! sockets, no `zmq` runtime dependency.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};

use crate::error::TransportError;
use crate::traits::{Dealer, Publisher, Router, Subscriber};

/// In-memory ROUTER endpoint. Dealers register via
/// [`FakeRouter::connect_dealer`], which hands back a paired
/// [`FakeDealer`].
pub struct FakeRouter {
    request_tx: mpsc::UnboundedSender<(Vec<u8>, Vec<u8>)>,
    request_rx: AsyncMutex<mpsc::UnboundedReceiver<(Vec<u8>, Vec<u8>)>>,
    dealers: StdMutex<HashMap<Vec<u8>, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl Default for FakeRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRouter {
    /// A router with no connected dealers yet.
    #[must_use]
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        Self {
            request_tx,
            request_rx: AsyncMutex::new(request_rx),
            dealers: StdMutex::new(HashMap::new()),
        }
    }

    /// Register a new dealer under `identity`, returning its paired
    /// handle.
    pub fn connect_dealer(&self, identity: impl Into<Vec<u8>>) -> FakeDealer {
        let identity = identity.into();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        self.dealers
            .lock()
            .expect("fake router mutex poisoned")
            .insert(identity.clone(), response_tx);
        FakeDealer {
            identity,
            request_tx: self.request_tx.clone(),
            response_rx: AsyncMutex::new(response_rx),
        }
    }
}

#[async_trait]
impl Router for FakeRouter {
    async fn recv(&self) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        self.request_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    async fn send(&self, identity: Vec<u8>, payload: Vec<u8>) -> Result<(), TransportError> {
        let dealers = self.dealers.lock().expect("fake router mutex poisoned");
        match dealers.get(&identity) {
            Some(sender) => sender.send(payload).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.dealers.lock().expect("fake router mutex poisoned").clear();
        Ok(())
    }
}

/// In-memory DEALER endpoint, paired with a [`FakeRouter`].
pub struct FakeDealer {
    identity: Vec<u8>,
    request_tx: mpsc::UnboundedSender<(Vec<u8>, Vec<u8>)>,
    response_rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl Dealer for FakeDealer {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.request_tx
            .send((self.identity.clone(), payload))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        self.response_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-memory PUB endpoint backed by a broadcast channel.
pub struct FakePublisher {
    tx: broadcast::Sender<(String, Vec<u8>)>,
}

impl FakePublisher {
    /// A publisher and one paired subscriber, already connected.
    #[must_use]
    pub fn pair() -> (Self, FakeSubscriber) {
        let (tx, rx) = broadcast::channel(1024);
        (
            Self { tx: tx.clone() },
            FakeSubscriber {
                tx,
                rx: AsyncMutex::new(rx),
                prefixes: StdMutex::new(Vec::new()),
            },
        )
    }

    /// Connect another subscriber to this same publisher.
    #[must_use]
    pub fn subscribe(&self) -> FakeSubscriber {
        FakeSubscriber {
            tx: self.tx.clone(),
            rx: AsyncMutex::new(self.tx.subscribe()),
            prefixes: StdMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        // No subscribers is not an error for a fire-and-forget publish.
        let _ = self.tx.send((topic.to_string(), payload));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-memory SUB endpoint, filtering by subscribed topic prefixes.
pub struct FakeSubscriber {
    tx: broadcast::Sender<(String, Vec<u8>)>,
    rx: AsyncMutex<broadcast::Receiver<(String, Vec<u8>)>>,
    prefixes: StdMutex<Vec<String>>,
}

#[async_trait]
impl Subscriber for FakeSubscriber {
    async fn subscribe(&self, prefix: &str) -> Result<(), TransportError> {
        self.prefixes
            .lock()
            .expect("fake subscriber mutex poisoned")
            .push(prefix.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<(String, Vec<u8>), TransportError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok((topic, payload)) => {
                    let matches = self
                        .prefixes
                        .lock()
                        .expect("fake subscriber mutex poisoned")
                        .iter()
                        .any(|p| topic.starts_with(p.as_str()));
                    if matches {
                        return Ok((topic, payload));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "fake subscriber dropped messages behind publisher");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Closed),
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = &self.tx;
        Ok(())
    }
}
