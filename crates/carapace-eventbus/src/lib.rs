// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event bus: wraps a [`Publisher`] with a closed schema registry for
//! inbound events and per-container sequencing for outbound
//! response-stream events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use carapace_core::Envelope;
use carapace_protocol::EnvelopeCodec;
use carapace_transport::{Publisher, TransportError};
use jsonschema::Validator;
use serde_json::{json, Value};

/// The four outbound response-stream topics, carrying sequence numbers
/// per container for in-order reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTopic {
    /// System-level status for a response stream.
    System,
    /// One chunk of a streamed response.
    Chunk,
    /// The stream's final chunk.
    End,
    /// The stream failed.
    Error,
}

impl StreamTopic {
    /// The wire topic string for this stream event kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "response.system",
            Self::Chunk => "response.chunk",
            Self::End => "response.end",
            Self::Error => "response.error",
        }
    }
}

/// Failures from event-bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    /// The inbound topic is not in the closed registry.
    #[error("topic `{0}` is not a recognized inbound event type")]
    UnknownTopic(String),
    /// The inbound payload failed schema validation.
    #[error("inbound event on `{topic}` failed schema validation: {message}")]
    SchemaViolation { topic: String, message: String },
    /// Envelope serialization failed.
    #[error("event envelope serialization failed: {0}")]
    Encode(#[from] carapace_protocol::ProtocolError),
    /// The underlying transport failed to publish.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

fn message_inbound_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["content_type", "body"],
        "properties": {
            "content_type": { "type": "string", "enum": ["text", "json", "binary_ref"] },
            "body": { "type": "string", "maxLength": 65536 }
        }
    })
}

/// The closed registry of inbound event topics this host accepts, each
/// with its compiled schema.
struct InboundRegistry {
    schemas: HashMap<String, Validator>,
}

impl InboundRegistry {
    fn closed() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            "message.inbound".to_string(),
            jsonschema::validator_for(&message_inbound_schema()).expect("static schema compiles"),
        );
        Self { schemas }
    }
}

/// PUB/SUB event bus. Inbound events are validated against a closed,
/// fixed registry before being published to subscribers; outbound
/// response-stream events are stamped with a per-container sequence
/// number.
pub struct EventBus {
    publisher: Arc<dyn Publisher>,
    registry: InboundRegistry,
    sequences: Mutex<HashMap<String, u64>>,
}

impl EventBus {
    /// Build an event bus broadcasting through `publisher`.
    #[must_use]
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            registry: InboundRegistry::closed(),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Validate `payload` against `topic`'s registered schema, then
    /// publish it verbatim under `topic` for subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::UnknownTopic`] if `topic` is not in
    /// the closed registry, [`EventBusError::SchemaViolation`] if
    /// `payload` fails validation, or [`EventBusError::Transport`] if
    /// the publish fails.
    pub async fn ingest_inbound(&self, topic: &str, payload: &Value) -> Result<(), EventBusError> {
        let validator = self
            .registry
            .schemas
            .get(topic)
            .ok_or_else(|| EventBusError::UnknownTopic(topic.to_string()))?;

        if let Some(first_error) = validator.iter_errors(payload).next() {
            return Err(EventBusError::SchemaViolation {
                topic: topic.to_string(),
                message: first_error.to_string(),
            });
        }

        let bytes = serde_json::to_vec(payload).expect("validated JSON value serializes");
        self.publisher.publish(topic, bytes).await?;
        Ok(())
    }

    /// Publish one response-stream chunk for `container_id`, stamping
    /// the next sequence number for that container.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::Encode`] if the envelope cannot be
    /// serialized, or [`EventBusError::Transport`] if the publish
    /// fails.
    pub async fn publish_stream_event(
        &self,
        container_id: &str,
        topic: StreamTopic,
        group: &str,
        correlation: &str,
        body: Value,
    ) -> Result<(), EventBusError> {
        let seq = {
            let mut sequences = self.sequences.lock().expect("event bus mutex poisoned");
            let counter = sequences.entry(container_id.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        let envelope = Envelope::new_event(
            topic.as_str(),
            "host",
            group,
            correlation,
            json!({ "seq": seq, "body": body }),
        );
        let line = EnvelopeCodec::encode(&envelope)?;
        self.publisher.publish(topic.as_str(), line.into_bytes()).await?;
        Ok(())
    }

    /// Forget a container's stream sequence counter. Called when its
    /// session ends.
    pub fn reset_sequence(&self, container_id: &str) {
        self.sequences
            .lock()
            .expect("event bus mutex poisoned")
            .remove(container_id);
    }
}
