// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Codec
//!
//! Serializes outbound payloads as compact JSON whose object keys follow the lower
//! camel case convention, whatever casing the payload type itself serializes with.
//!
//! Conversion works on the serialized JSON value, where struct fields and map
//! entries look the same, so map keys are rewritten too (`plot_a` becomes `plotA`).
//! Two keys of one object that convert to the same name are rejected rather than
//! letting one overwrite the other.

use crate::errors::AmqpError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Serializes `message` to compact, camelCase JSON bytes.
pub fn serialize<T>(message: &T) -> Result<Vec<u8>, AmqpError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(message).map_err(|err| {
        error!(error = err.to_string(), "failure to serialize payload");
        AmqpError::SerializationError
    })?;

    let value = camel_case_keys(value).map_err(|key| {
        error!(key = %key, "payload has two keys that map to the same camelCase name");
        AmqpError::SerializationError
    })?;

    serde_json::to_vec(&value).map_err(|err| {
        error!(error = err.to_string(), "failure to encode payload");
        AmqpError::SerializationError
    })
}

/// Rewrites every object key; the error carries the first colliding key.
fn camel_case_keys(value: Value) -> Result<Value, String> {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let key = to_camel_case(&key);
                if out.contains_key(&key) {
                    return Err(key);
                }
                out.insert(key, camel_case_keys(value)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(camel_case_keys)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

/// `field_id`, `FieldId` and `fieldId` all become `fieldId`.
pub(crate) fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;

    for c in key.chars() {
        if c == '_' || c == '-' {
            upper_next = !out.is_empty();
            continue;
        }

        if out.is_empty() {
            out.extend(c.to_lowercase());
        } else if upper_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper_next = false;
    }

    out
}
