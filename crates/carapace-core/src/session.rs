// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sessions — the host's record of a live container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live container's authorization context.
///
/// `source`/`group` are stamped onto every envelope the host constructs
/// on this session's behalf; a container never gets to assert its own
/// identity. Rate-limiter state is owned separately by the rate-limiter
/// crate, keyed by `session_id` — keeping it here would tie this crate
/// to the rate-limiting algorithm's internals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique id for this session, independent of `container_id`.
    pub session_id: String,
    /// The sandboxed container this session belongs to. At most one live
    /// session per `container_id`.
    pub container_id: String,
    /// Authorization tenant.
    pub group: String,
    /// Identity stamped as `source` on envelopes raised for this session.
    pub source: String,
    /// Session creation time, UTC.
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Construct a new session starting now.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        container_id: impl Into<String>,
        group: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            container_id: container_id.into(),
            group: group.into(),
            source: source.into(),
            started_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_stamps_identity_fields() {
        let s = Session::new("sess-1", "container-a", "group-a", "container-a");
        assert_eq!(s.session_id, "sess-1");
        assert_eq!(s.container_id, "container-a");
        assert_eq!(s.group, "group-a");
    }
}
