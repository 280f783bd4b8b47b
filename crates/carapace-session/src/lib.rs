// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session manager: maps a transport-supplied container identity to its
//! authorization context, and tears down the rate-limiter bucket and
//! pending confirmations that belong to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use carapace_confirm::ConfirmationGate;
use carapace_core::Session;
use carapace_ratelimit::RateLimiter;

/// Why a session operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A session is already live for this container.
    #[error("container `{0}` already has a live session")]
    AlreadyLive(String),
}

/// Owns the one-session-per-live-container invariant, and coordinates
/// teardown of the per-session rate-limiter bucket and pending
/// confirmations when a session ends.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    rate_limiter: Arc<RateLimiter>,
    confirmations: ConfirmationGate,
}

impl SessionManager {
    /// Build a manager sharing the given rate limiter and confirmation
    /// gate with the rest of the router.
    #[must_use]
    pub fn new(rate_limiter: Arc<RateLimiter>, confirmations: ConfirmationGate) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            rate_limiter,
            confirmations,
        }
    }

    /// Register a new session for `container_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyLive`] if a session for this
    /// container already exists.
    pub fn create_session(
        &self,
        group: impl Into<String>,
        source: impl Into<String>,
        container_id: impl Into<String>,
    ) -> Result<Session, SessionError> {
        let container_id = container_id.into();
        let mut sessions = self.sessions.lock().expect("session manager mutex poisoned");
        if sessions.contains_key(&container_id) {
            return Err(SessionError::AlreadyLive(container_id));
        }

        let session = Session::new(
            uuid::Uuid::new_v4().to_string(),
            container_id.clone(),
            group,
            source,
        );
        sessions.insert(container_id, session.clone());
        Ok(session)
    }

    /// Look up the live session for `container_id`.
    #[must_use]
    pub fn get(&self, container_id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .expect("session manager mutex poisoned")
            .get(container_id)
            .cloned()
    }

    /// End a session: frees its rate-limiter bucket and resolves any
    /// pending confirmations it owns as timeouts.
    ///
    /// Returns the removed session, or `None` if none was live.
    pub fn destroy_session(&self, container_id: &str) -> Option<Session> {
        let removed = self
            .sessions
            .lock()
            .expect("session manager mutex poisoned")
            .remove(container_id);
        if let Some(session) = &removed {
            self.rate_limiter.evict(&session.session_id);
            self.confirmations.cancel_for_session(&session.session_id);
        }
        removed
    }
}
