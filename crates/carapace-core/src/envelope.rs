// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host-constructed envelopes that cross the trust boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use carapace_error::ErrorPayload;

/// Current wire protocol version. Bumped on incompatible envelope changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Arguments carried by a `request` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Copy of the wire message's arguments, post-construction. Validated
    /// against the tool's schema in stage 3, not here.
    pub arguments: serde_json::Map<String, Value>,
}

/// Result/error carried by a `response` envelope. Exactly one of `result`
/// and `error` is `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// The handler's result, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The structured error, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// An envelope exchanged between the host and a container, or broadcast
/// to event subscribers.
///
/// Serializes as a single flat JSON object with an internally-tagged
/// `"type"` discriminator (`"request" | "response" | "event"`), matching
/// §6's wire contract exactly: every variant carries the same identity
/// fields (`id`, `version`, `topic`, `source`, `correlation`, `timestamp`,
/// `group`) plus a variant-shaped `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Host → container: invoke a tool.
    Request {
        /// Fresh UUID, unrelated to `correlation`.
        id: Uuid,
        /// Wire protocol version.
        version: u32,
        /// `tool.invoke.<name>`.
        topic: String,
        /// Host-trusted container identity (from the session).
        source: String,
        /// Echoes the originating wire message's correlation id.
        correlation: String,
        /// Construction time, UTC.
        timestamp: DateTime<Utc>,
        /// Host-trusted authorization tenant (from the session).
        group: String,
        /// Request arguments.
        payload: RequestPayload,
    },
    /// Container → host direction conceptually, but always host-constructed:
    /// the host builds this from the pipeline's outcome and sends it back.
    Response {
        /// Fresh UUID, distinct from the request's `id`.
        id: Uuid,
        /// Wire protocol version.
        version: u32,
        /// Echoes the request's topic.
        topic: String,
        /// Echoes the request's source.
        source: String,
        /// Echoes the request's correlation id.
        correlation: String,
        /// Response construction time, UTC.
        timestamp: DateTime<Utc>,
        /// Echoes the request's group.
        group: String,
        /// Exactly one of `result`/`error` is set.
        payload: ResponsePayload,
    },
    /// Host-broadcast, schema-validated event.
    Event {
        /// Fresh UUID.
        id: Uuid,
        /// Wire protocol version.
        version: u32,
        /// Event topic, e.g. `response.chunk`.
        topic: String,
        /// Host identity that raised the event.
        source: String,
        /// Correlation id, when the event belongs to a request/response
        /// stream; otherwise empty.
        correlation: String,
        /// Event construction time, UTC.
        timestamp: DateTime<Utc>,
        /// Authorization tenant this event belongs to.
        group: String,
        /// Schema-validated event body.
        payload: Value,
    },
}

impl Envelope {
    /// Build the `Request` envelope for stage 1 of the pipeline.
    ///
    /// `id` is freshly generated; `source`/`group` come from the session,
    /// never from the wire message, per the invariant in §3.
    #[must_use]
    pub fn new_request(
        wire_topic: impl Into<String>,
        correlation: impl Into<String>,
        source: impl Into<String>,
        group: impl Into<String>,
        arguments: serde_json::Map<String, Value>,
    ) -> Self {
        Self::Request {
            id: Uuid::new_v4(),
            version: PROTOCOL_VERSION,
            topic: wire_topic.into(),
            source: source.into(),
            correlation: correlation.into(),
            timestamp: Utc::now(),
            group: group.into(),
            payload: RequestPayload { arguments },
        }
    }

    /// Build a successful `Response` envelope mirroring a `Request`.
    ///
    /// # Panics
    ///
    /// Panics if `request` is not an `Envelope::Request`. Callers always
    /// hold the request they are responding to; this is an internal
    /// invariant, not a user-facing error path.
    #[must_use]
    pub fn response_success(request: &Envelope, result: Value) -> Self {
        Self::response(request, ResponsePayload {
            result: Some(result),
            error: None,
        })
    }

    /// Build a failing `Response` envelope mirroring a `Request`.
    #[must_use]
    pub fn response_error(request: &Envelope, error: ErrorPayload) -> Self {
        Self::response(request, ResponsePayload {
            result: None,
            error: Some(error),
        })
    }

    /// Build a failing `Response` envelope without an originating
    /// `Request` envelope to mirror.
    ///
    /// Used for rejections raised before stage 1 can construct a
    /// request — a wire codec decode failure, or a missing session for
    /// the transport-supplied container identity — where `topic`,
    /// `correlation`, `source`, and `group` must be supplied directly.
    #[must_use]
    pub fn response_error_raw(
        topic: impl Into<String>,
        correlation: impl Into<String>,
        source: impl Into<String>,
        group: impl Into<String>,
        error: ErrorPayload,
    ) -> Self {
        Self::Response {
            id: Uuid::new_v4(),
            version: PROTOCOL_VERSION,
            topic: topic.into(),
            source: source.into(),
            correlation: correlation.into(),
            timestamp: Utc::now(),
            group: group.into(),
            payload: ResponsePayload {
                result: None,
                error: Some(error),
            },
        }
    }

    fn response(request: &Envelope, payload: ResponsePayload) -> Self {
        let Envelope::Request {
            topic,
            source,
            correlation,
            group,
            ..
        } = request
        else {
            panic!("response() called with a non-Request envelope");
        };
        Self::Response {
            id: Uuid::new_v4(),
            version: PROTOCOL_VERSION,
            topic: topic.clone(),
            source: source.clone(),
            correlation: correlation.clone(),
            timestamp: Utc::now(),
            group: group.clone(),
            payload,
        }
    }

    /// Build an `Event` envelope.
    #[must_use]
    pub fn new_event(
        topic: impl Into<String>,
        source: impl Into<String>,
        group: impl Into<String>,
        correlation: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::Event {
            id: Uuid::new_v4(),
            version: PROTOCOL_VERSION,
            topic: topic.into(),
            source: source.into(),
            correlation: correlation.into(),
            timestamp: Utc::now(),
            group: group.into(),
            payload,
        }
    }

    /// The envelope's correlation id, regardless of variant.
    #[must_use]
    pub fn correlation(&self) -> &str {
        match self {
            Self::Request { correlation, .. }
            | Self::Response { correlation, .. }
            | Self::Event { correlation, .. } => correlation,
        }
    }

    /// The envelope's topic, regardless of variant.
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Request { topic, .. } | Self::Response { topic, .. } | Self::Event { topic, .. } => {
                topic
            }
        }
    }
}
