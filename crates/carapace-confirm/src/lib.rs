// SPDX-License-Identifier: MIT OR Apache-2.0
//! Confirmation gate for high-risk tool invocations.
//!
//! Holds a map of pending confirmations, each with a deadline timer.
//! `approve`/`deny` resolve an entry; the timer resolves it to
//! `Timeout` if neither fires first. Exactly one resolution path wins
//! per entry — the others are a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Default deadline for a pending confirmation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How a pending confirmation was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A caller approved the request.
    Approved,
    /// A caller denied the request.
    Denied,
    /// The deadline elapsed with no approve/deny.
    Timeout,
}

/// Registration-time failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmError {
    /// A pending entry with this id already exists.
    #[error("confirmation id `{0}` is already pending")]
    DuplicateId(String),
}

struct Pending {
    sender: oneshot::Sender<Resolution>,
    session_id: String,
    timer: JoinHandle<()>,
}

struct Inner {
    pending: Mutex<HashMap<String, Pending>>,
}

impl Inner {
    fn resolve(&self, id: &str, resolution: Resolution) -> bool {
        let removed = self
            .pending
            .lock()
            .expect("confirmation gate mutex poisoned")
            .remove(id);
        match removed {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.sender.send(resolution);
                true
            }
            None => false,
        }
    }
}

/// Shared handle to the pending-confirmation table. Cheap to clone;
/// all clones see the same underlying state.
#[derive(Clone)]
pub struct ConfirmationGate {
    inner: Arc<Inner>,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationGate {
    /// An empty gate with no pending confirmations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a pending confirmation with [`DEFAULT_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmError::DuplicateId`] if `id` is already pending.
    pub fn request(
        &self,
        id: impl Into<String>,
        tool_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<oneshot::Receiver<Resolution>, ConfirmError> {
        self.request_with_timeout(id, tool_name, session_id, DEFAULT_TIMEOUT)
    }

    /// Register a pending confirmation with an explicit deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmError::DuplicateId`] if `id` is already pending.
    pub fn request_with_timeout(
        &self,
        id: impl Into<String>,
        tool_name: impl Into<String>,
        session_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Resolution>, ConfirmError> {
        let id = id.into();
        let tool_name = tool_name.into();
        let session_id = session_id.into();

        let mut guard = self.inner.pending.lock().expect("confirmation gate mutex poisoned");
        if guard.contains_key(&id) {
            return Err(ConfirmError::DuplicateId(id));
        }

        let (sender, receiver) = oneshot::channel();
        let inner = self.inner.clone();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.resolve(&timer_id, Resolution::Timeout);
        });

        tracing::debug!(confirmation_id = %id, tool = %tool_name, session = %session_id, "confirmation pending");

        guard.insert(
            id,
            Pending {
                sender,
                session_id,
                timer,
            },
        );
        Ok(receiver)
    }

    /// Approve a pending confirmation. Returns `false` if it was
    /// already resolved or never registered.
    #[must_use]
    pub fn approve(&self, id: &str) -> bool {
        self.inner.resolve(id, Resolution::Approved)
    }

    /// Deny a pending confirmation. Returns `false` if it was already
    /// resolved or never registered.
    #[must_use]
    pub fn deny(&self, id: &str) -> bool {
        self.inner.resolve(id, Resolution::Denied)
    }

    /// Resolve every pending confirmation as `Timeout`. Used on
    /// shutdown.
    pub fn cancel_all(&self) {
        let entries: Vec<(String, Pending)> = self
            .inner
            .pending
            .lock()
            .expect("confirmation gate mutex poisoned")
            .drain()
            .collect();
        for (_, entry) in entries {
            entry.timer.abort();
            let _ = entry.sender.send(Resolution::Timeout);
        }
    }

    /// Resolve every confirmation belonging to `session_id` as
    /// `Timeout`. Called when a session ends.
    pub fn cancel_for_session(&self, session_id: &str) {
        let mut guard = self.inner.pending.lock().expect("confirmation gate mutex poisoned");
        let ids: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = guard.remove(&id) {
                entry.timer.abort();
                let _ = entry.sender.send(Resolution::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approve_resolves_the_receiver() {
        let gate = ConfirmationGate::new();
        let rx = gate.request("req-1", "delete_file", "sess-1").unwrap();
        assert!(gate.approve("req-1"));
        assert_eq!(rx.await.unwrap(), Resolution::Approved);
    }

    #[tokio::test]
    async fn deny_resolves_the_receiver() {
        let gate = ConfirmationGate::new();
        let rx = gate.request("req-1", "delete_file", "sess-1").unwrap();
        assert!(gate.deny("req-1"));
        assert_eq!(rx.await.unwrap(), Resolution::Denied);
    }

    #[tokio::test]
    async fn duplicate_id_registration_fails() {
        let gate = ConfirmationGate::new();
        let _rx = gate.request("req-1", "delete_file", "sess-1").unwrap();
        let err = gate.request("req-1", "delete_file", "sess-1").unwrap_err();
        assert_eq!(err, ConfirmError::DuplicateId("req-1".to_string()));
    }

    #[tokio::test]
    async fn first_resolution_wins_second_is_a_no_op() {
        let gate = ConfirmationGate::new();
        let rx = gate.request("req-1", "delete_file", "sess-1").unwrap();
        assert!(gate.approve("req-1"));
        assert!(!gate.deny("req-1"));
        assert_eq!(rx.await.unwrap(), Resolution::Approved);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_resolves_as_timeout() {
        let gate = ConfirmationGate::new();
        let rx = gate
            .request_with_timeout("req-1", "delete_file", "sess-1", Duration::from_secs(5))
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(rx.await.unwrap(), Resolution::Timeout);
    }

    #[tokio::test]
    async fn cancel_all_resolves_every_pending_entry() {
        let gate = ConfirmationGate::new();
        let rx1 = gate.request("req-1", "t", "sess-1").unwrap();
        let rx2 = gate.request("req-2", "t", "sess-2").unwrap();
        gate.cancel_all();
        assert_eq!(rx1.await.unwrap(), Resolution::Timeout);
        assert_eq!(rx2.await.unwrap(), Resolution::Timeout);
    }

    #[tokio::test]
    async fn cancel_for_session_only_resolves_matching_entries() {
        let gate = ConfirmationGate::new();
        let rx1 = gate.request("req-1", "t", "sess-1").unwrap();
        let rx2 = gate.request("req-2", "t", "sess-2").unwrap();
        gate.cancel_for_session("sess-1");
        assert_eq!(rx1.await.unwrap(), Resolution::Timeout);
        assert!(gate.deny("req-2"));
        assert_eq!(rx2.await.unwrap(), Resolution::Denied);
    }
}
