// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-tool group authorization and the stage 5 pre-approval set.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Optional per-tool group restriction.
///
/// A tool with no entry in the map is unrestricted — every group may
/// invoke it. A tool with an entry restricts invocation to exactly the
/// listed groups.
#[derive(Default)]
pub struct AuthorizationPolicy {
    allowed_groups: HashMap<String, HashSet<String>>,
}

impl AuthorizationPolicy {
    /// An unrestricted policy: every tool is open to every group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `tool_name` to exactly `groups`.
    pub fn restrict(&mut self, tool_name: impl Into<String>, groups: impl IntoIterator<Item = String>) {
        self.allowed_groups.insert(tool_name.into(), groups.into_iter().collect());
    }

    /// Whether `group` may invoke `tool_name`.
    #[must_use]
    pub fn is_authorized(&self, tool_name: &str, group: &str) -> bool {
        match self.allowed_groups.get(tool_name) {
            None => true,
            Some(allowed) => allowed.contains(group),
        }
    }
}

/// The out-of-band, user-approval-driven set of correlation ids cleared
/// for a high-risk tool invocation.
///
/// A production deployment may instead block stage 5 on a real
/// [`carapace_confirm::ConfirmationGate::request`] await; this registry
/// implements the synchronous alternative the spec allows, keeping
/// stages 1-5 synchronous in-memory work. A correlation is consumed on
/// first use — pre-approval does not carry over to a retried request
/// under the same correlation id.
#[derive(Default)]
pub struct PreApprovals {
    approved: Mutex<HashSet<String>>,
}

impl PreApprovals {
    /// An empty pre-approval set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `correlation` as approved for its next stage 5 check.
    pub fn approve(&self, correlation: impl Into<String>) {
        self.approved
            .lock()
            .expect("pre-approvals mutex poisoned")
            .insert(correlation.into());
    }

    /// Consume a pending approval for `correlation`, returning `true` if
    /// one was present.
    pub fn take(&self, correlation: &str) -> bool {
        self.approved
            .lock()
            .expect("pre-approvals mutex poisoned")
            .remove(correlation)
    }
}
