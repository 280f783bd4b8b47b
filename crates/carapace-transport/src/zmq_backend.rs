// SPDX-License-Identifier: MIT OR Apache-2.0
//! `zmq`-backed implementations of the four socket roles.
//!
//! `zmq::Socket` is blocking and `Send` but not `Sync`, so every call
//! is bounced onto a blocking-pool thread via [`tokio::task::spawn_blocking`],
//! serialized by an `Arc<Mutex<Socket>>` so concurrent callers never
//! issue overlapping syscalls on the same socket.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task;
use zmq::{Context, Socket};

use crate::error::TransportError;
use crate::traits::{Dealer, Publisher, Router, Subscriber};

fn new_context() -> Context {
    Context::new()
}

async fn blocking<F, T>(f: F) -> Result<T, TransportError>
where
    F: FnOnce() -> Result<T, zmq::Error> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Worker(e.to_string()))?
        .map_err(TransportError::from)
}

/// ROUTER socket bound at a local IPC endpoint.
pub struct ZmqRouter {
    _context: Context,
    socket: Arc<Mutex<Socket>>,
}

impl ZmqRouter {
    /// Bind a ROUTER socket at `endpoint` (e.g. `ipc:///path/to/router.sock`).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Zmq`] if the socket cannot be created
    /// or bound.
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let context = new_context();
        let socket = context.socket(zmq::ROUTER)?;
        socket.set_linger(0)?;
        socket.bind(endpoint)?;
        Ok(Self {
            _context: context,
            socket: Arc::new(Mutex::new(socket)),
        })
    }
}

#[async_trait]
impl Router for ZmqRouter {
    async fn recv(&self) -> Result<(Vec<u8>, Vec<u8>), TransportError> {
        let socket = self.socket.clone();
        let frames = blocking(move || {
            let socket = socket.lock().expect("zmq router mutex poisoned");
            socket.recv_multipart(0)
        })
        .await?;
        let mut iter = frames.into_iter();
        let identity = iter.next().unwrap_or_default();
        let _delimiter = iter.next();
        let payload = iter.next().unwrap_or_default();
        Ok((identity, payload))
    }

    async fn send(&self, identity: Vec<u8>, payload: Vec<u8>) -> Result<(), TransportError> {
        let socket = self.socket.clone();
        blocking(move || {
            let socket = socket.lock().expect("zmq router mutex poisoned");
            socket.send_multipart([identity, Vec::new(), payload], 0)
        })
        .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the socket with linger=0 already set discards
        // unsent frames; nothing further to do, and repeated calls
        // are safe.
        Ok(())
    }
}

/// DEALER socket connected to a [`ZmqRouter`]'s endpoint.
pub struct ZmqDealer {
    _context: Context,
    socket: Arc<Mutex<Socket>>,
}

impl ZmqDealer {
    /// Connect a DEALER socket to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Zmq`] if the socket cannot be created
    /// or connected.
    pub fn connect(endpoint: &str) -> Result<Self, TransportError> {
        let context = new_context();
        let socket = context.socket(zmq::DEALER)?;
        socket.set_linger(0)?;
        socket.connect(endpoint)?;
        Ok(Self {
            _context: context,
            socket: Arc::new(Mutex::new(socket)),
        })
    }
}

#[async_trait]
impl Dealer for ZmqDealer {
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let socket = self.socket.clone();
        blocking(move || {
            let socket = socket.lock().expect("zmq dealer mutex poisoned");
            socket.send_multipart([Vec::new(), payload], 0)
        })
        .await
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let socket = self.socket.clone();
        let frames = blocking(move || {
            let socket = socket.lock().expect("zmq dealer mutex poisoned");
            socket.recv_multipart(0)
        })
        .await?;
        Ok(frames.into_iter().nth(1).unwrap_or_default())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// PUB socket bound at a local IPC endpoint.
pub struct ZmqPublisher {
    _context: Context,
    socket: Arc<Mutex<Socket>>,
}

impl ZmqPublisher {
    /// Bind a PUB socket at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Zmq`] if the socket cannot be created
    /// or bound.
    pub fn bind(endpoint: &str) -> Result<Self, TransportError> {
        let context = new_context();
        let socket = context.socket(zmq::PUB)?;
        socket.set_linger(0)?;
        socket.bind(endpoint)?;
        Ok(Self {
            _context: context,
            socket: Arc::new(Mutex::new(socket)),
        })
    }
}

#[async_trait]
impl Publisher for ZmqPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let socket = self.socket.clone();
        let topic = topic.to_string();
        blocking(move || {
            let socket = socket.lock().expect("zmq publisher mutex poisoned");
            socket.send_multipart([topic.into_bytes(), payload], 0)
        })
        .await
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// SUB socket connected to a [`ZmqPublisher`]'s endpoint.
pub struct ZmqSubscriber {
    _context: Context,
    socket: Arc<Mutex<Socket>>,
}

impl ZmqSubscriber {
    /// Connect a SUB socket to `endpoint`, with no subscriptions yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Zmq`] if the socket cannot be created
    /// or connected.
    pub fn connect(endpoint: &str) -> Result<Self, TransportError> {
        let context = new_context();
        let socket = context.socket(zmq::SUB)?;
        socket.set_linger(0)?;
        socket.connect(endpoint)?;
        Ok(Self {
            _context: context,
            socket: Arc::new(Mutex::new(socket)),
        })
    }
}

#[async_trait]
impl Subscriber for ZmqSubscriber {
    async fn subscribe(&self, prefix: &str) -> Result<(), TransportError> {
        let socket = self.socket.clone();
        let prefix = prefix.to_string();
        blocking(move || {
            let socket = socket.lock().expect("zmq subscriber mutex poisoned");
            socket.set_subscribe(prefix.as_bytes())
        })
        .await
    }

    async fn recv(&self) -> Result<(String, Vec<u8>), TransportError> {
        let socket = self.socket.clone();
        let frames = blocking(move || {
            let socket = socket.lock().expect("zmq subscriber mutex poisoned");
            socket.recv_multipart(0)
        })
        .await?;
        let mut iter = frames.into_iter();
        let topic = iter.next().unwrap_or_default();
        let payload = iter.next().unwrap_or_default();
        Ok((String::from_utf8_lossy(&topic).into_owned(), payload))
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
