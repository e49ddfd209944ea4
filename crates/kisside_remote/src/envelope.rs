use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{local_code, ErrorOrigin, RpcError};

/// Reserved JSON-RPC 2.0 error codes classify as server-origin failures;
/// everything else on the 2.0 wire is an application-level error.
const V2_RESERVED_CODE_MIN: i64 = -32768;
const V2_RESERVED_CODE_MAX: i64 = -32000;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProtocolVersion {
    #[serde(rename = "qx1")]
    Qx1,
    #[serde(rename = "2.0")]
    V2,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::Qx1 => "qx1",
            ProtocolVersion::V2 => "2.0",
        }
    }
}

/// One outbound call, frozen at submission time. `id` is the sequence
/// number of the request that carries the envelope.
#[derive(Clone, Debug, PartialEq)]
pub struct CallEnvelope {
    pub service: Option<String>,
    pub method: String,
    pub id: u64,
    pub params: Vec<Value>,
    pub version: ProtocolVersion,
    pub server_data: Option<Value>,
}

impl CallEnvelope {
    /// Render the wire object for this envelope's protocol version.
    /// Allocation: one JSON object. Complexity: O(params).
    pub fn to_wire(&self) -> Value {
        let mut message = Map::<String, Value>::new();
        match self.version {
            ProtocolVersion::Qx1 => {
                message.insert(
                    "service".to_owned(),
                    match &self.service {
                        Some(service) => Value::String(service.clone()),
                        None => Value::Null,
                    },
                );
                message.insert("method".to_owned(), Value::String(self.method.clone()));
                message.insert("id".to_owned(), Value::Number(self.id.into()));
                message.insert("params".to_owned(), Value::Array(self.params.clone()));
                if let Some(server_data) = &self.server_data {
                    message.insert("server_data".to_owned(), server_data.clone());
                }
            }
            ProtocolVersion::V2 => {
                let method = match &self.service {
                    Some(service) => format!("{service}.{}", self.method),
                    None => self.method.clone(),
                };
                message.insert("jsonrpc".to_owned(), Value::String("2.0".to_owned()));
                message.insert("method".to_owned(), Value::String(method));
                message.insert("id".to_owned(), Value::Number(self.id.into()));
                message.insert("params".to_owned(), Value::Array(self.params.clone()));
            }
        }
        Value::Object(message)
    }
}

/// Decode a reply object into its result value or a classified error.
/// A reply id that disagrees with `expected_id` is tolerated with a warning;
/// correlation already happened one level up.
pub fn decode_reply(
    version: ProtocolVersion,
    payload: &Value,
    expected_id: u64,
) -> Result<Value, RpcError> {
    let Some(reply) = payload.as_object() else {
        return Err(RpcError::local(
            local_code::NO_DATA,
            format!("reply is not an object: {payload}"),
        ));
    };

    if let Some(id) = reply.get("id").and_then(Value::as_u64) {
        if id != expected_id {
            tracing::warn!(expected = expected_id, got = id, "reply id mismatch");
        }
    }

    match reply.get("error") {
        Some(error) if !error.is_null() => Err(decode_error(version, error)),
        _ => match reply.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(RpcError::local(
                local_code::NO_DATA,
                "reply carries neither result nor error",
            )),
        },
    }
}

fn decode_error(version: ProtocolVersion, error: &Value) -> RpcError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown server error")
        .to_owned();
    let origin = match version {
        ProtocolVersion::Qx1 => error
            .get("origin")
            .and_then(Value::as_i64)
            .and_then(ErrorOrigin::from_wire_code)
            .unwrap_or(ErrorOrigin::Server),
        ProtocolVersion::V2 => {
            if (V2_RESERVED_CODE_MIN..=V2_RESERVED_CODE_MAX).contains(&code) {
                ErrorOrigin::Server
            } else {
                ErrorOrigin::Application
            }
        }
    };
    RpcError::with_origin(origin, code, message)
}
