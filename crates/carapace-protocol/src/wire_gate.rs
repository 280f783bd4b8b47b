// SPDX-License-Identifier: MIT OR Apache-2.0
//! Stage 2: decode and field-whitelist a raw wire message.

use carapace_core::WireMessage;
use serde_json::Value;

use crate::error::ProtocolError;

const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];
const ALLOWED_FIELDS: [&str; 3] = ["topic", "correlation", "arguments"];

/// Decode a raw JSON line into a [`WireMessage`], enforcing the exact
/// three-field whitelist and rejecting prototype-pollution keys anywhere
/// under `arguments`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the line is not valid JSON, is not an
/// object, is missing a required field, carries an extra top-level
/// field, has a field of the wrong type, or `arguments` contains a
/// forbidden key at any depth.
pub fn decode_wire_message(raw: &str) -> Result<WireMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    for key in obj.keys() {
        if !ALLOWED_FIELDS.contains(&key.as_str()) {
            return Err(ProtocolError::UnexpectedField(key.clone()));
        }
    }

    let topic = obj
        .get("topic")
        .ok_or(ProtocolError::MissingField("topic"))?
        .as_str()
        .ok_or(ProtocolError::WrongType {
            field: "topic",
            expected: "string",
        })?
        .to_string();

    let correlation = obj
        .get("correlation")
        .ok_or(ProtocolError::MissingField("correlation"))?
        .as_str()
        .ok_or(ProtocolError::WrongType {
            field: "correlation",
            expected: "string",
        })?
        .to_string();

    let arguments_value = obj
        .get("arguments")
        .ok_or(ProtocolError::MissingField("arguments"))?;
    let arguments = arguments_value
        .as_object()
        .ok_or(ProtocolError::WrongType {
            field: "arguments",
            expected: "object",
        })?
        .clone();

    reject_forbidden_keys(arguments_value, "$.arguments")?;

    Ok(WireMessage {
        topic,
        correlation,
        arguments,
    })
}

/// Recursively walk `value`, rejecting any object key that matches a
/// prototype-pollution name, at any nesting depth (objects and arrays).
fn reject_forbidden_keys(value: &Value, path: &str) -> Result<(), ProtocolError> {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if let Some(&forbidden) = FORBIDDEN_KEYS.iter().find(|&&f| f == key) {
                    return Err(ProtocolError::ForbiddenKey {
                        key: forbidden,
                        path: format!("{path}.{key}"),
                    });
                }
                reject_forbidden_keys(nested, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                reject_forbidden_keys(item, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
