// SPDX-License-Identifier: MIT OR Apache-2.0
//! Newline-delimited JSON encode/decode for host-constructed envelopes.

use std::io::{BufRead, Write};

use carapace_core::Envelope;

use crate::error::ProtocolError;

/// Stateless encoder/decoder for [`Envelope`]s, one JSON object per line.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    /// Serialize an envelope to a newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if `envelope` cannot be
    /// serialized (never happens for well-formed envelopes).
    pub fn encode(envelope: &Envelope) -> Result<String, ProtocolError> {
        let mut s = serde_json::to_string(envelope)?;
        s.push('\n');
        Ok(s)
    }

    /// Deserialize a single JSON line into an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if `line` is not valid JSON or
    /// does not match the envelope shape.
    pub fn decode(line: &str) -> Result<Envelope, ProtocolError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Write a single envelope as a newline-terminated line.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] on serialization or I/O failure.
    pub fn encode_to_writer(writer: &mut impl Write, envelope: &Envelope) -> Result<(), ProtocolError> {
        let line = Self::encode(envelope)?;
        writer
            .write_all(line.as_bytes())
            .map_err(|e| ProtocolError::Json(e.to_string()))
    }

    /// Lazily decode JSONL lines from `reader`, skipping blank lines.
    pub fn decode_stream(reader: impl BufRead) -> impl Iterator<Item = Result<Envelope, ProtocolError>> {
        reader.lines().filter_map(|line_result| match line_result {
            Err(e) => Some(Err(ProtocolError::Json(e.to_string()))),
            Ok(line) => {
                if line.trim().is_empty() {
                    None
                } else {
                    Some(Self::decode(line.trim()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carapace_core::Envelope;

    #[test]
    fn roundtrips_through_a_single_line() {
        let env = Envelope::new_request(
            "tool.invoke.echo",
            "c1",
            "container-a",
            "group-a",
            serde_json::Map::new(),
        );
        let line = EnvelopeCodec::encode(&env).unwrap();
        assert!(line.ends_with('\n'));
        let decoded = EnvelopeCodec::decode(line.trim()).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn decode_stream_skips_blank_lines() {
        let env = Envelope::new_request(
            "tool.invoke.echo",
            "c1",
            "container-a",
            "group-a",
            serde_json::Map::new(),
        );
        let line = EnvelopeCodec::encode(&env).unwrap();
        let input = format!("\n{line}\n\n");
        let decoded: Vec<_> = EnvelopeCodec::decode_stream(input.as_bytes()).collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].as_ref().unwrap(), &env);
    }
}
