// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use serde::{Deserialize, Serialize};

use crate::registry::RequestId;

/// The handshake payload: just the client's chosen identifier string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassId(pub String);

/// `Params` is wrapped in a single-element array on the wire
/// (`[value]`, never a bare object); this module hides that behind a
/// plain [`serde_json::Value`] for callers on both ends.
mod params_as_singleton_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Value, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        [value].serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Value, D::Error>
    where D: Deserializer<'de> {
        let mut params = <[Value; 1]>::deserialize(deserializer)?;
        Ok(std::mem::take(&mut params[0]))
    }
}

/// An RPC request envelope, field names matching the wire spec.
///
/// `params` is kept as a raw [`serde_json::Value`] in memory so the
/// dispatch worker can read the header fields (`request_id`, `method`,
/// `my_unique_id`, `highest_reply_seen`) without parsing the
/// method-specific parameter type twice: it is only parsed into the
/// registered request type on a completed-cache miss. On the wire it is
/// encoded as a single-element array, per `Params: [T]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "Params", with = "params_as_singleton_array")]
    pub params: serde_json::Value,
    #[serde(rename = "MyUniqueID")]
    pub my_unique_id: String,
    #[serde(rename = "RequestID")]
    pub request_id: RequestId,
    #[serde(rename = "HighestReplySeen")]
    pub highest_reply_seen: RequestId,
}

/// An RPC reply envelope. An empty `err_str` signals success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "MyUniqueID")]
    pub my_unique_id: String,
    #[serde(rename = "RequestID")]
    pub request_id: RequestId,
    #[serde(rename = "Result")]
    pub result: serde_json::Value,
    #[serde(rename = "ErrStr", default)]
    pub err_str: String,
}

impl ReplyEnvelope {
    pub fn is_success(&self) -> bool {
        self.err_str.is_empty()
    }
}
