// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wire codec: decodes untrusted container messages and serializes
//! host-constructed envelopes.

pub mod envelope_codec;
pub mod error;
pub mod wire_gate;

pub use envelope_codec::EnvelopeCodec;
pub use error::ProtocolError;
pub use wire_gate::decode_wire_message;
