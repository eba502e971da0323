//! JSON-RPC envelope representations
//!
//! Provides the request, notification and response envelopes shared by the server
//! dispatcher and the hand-rolled client, plus constructors for the standard error codes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

/// A request (`id` present) or notification (`id` absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Result(Value),
    Error(JsonRpcError),
}

/// A response envelope. Exactly one of `result`/`error` is carried by construction.
///
/// `id` is `None` only for errors raised before a request id could be read
/// (parse errors), and is then serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResponse", into = "RawResponse")]
pub struct JsonRpcResponse {
    pub id: Option<JsonRpcId>,
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    pub fn result(id: JsonRpcId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: ResponseOutcome::Result(result),
        }
    }

    pub fn error(id: Option<JsonRpcId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: ResponseOutcome::Error(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn error_with_data(
        id: Option<JsonRpcId>,
        code: i64,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            id,
            outcome: ResponseOutcome::Error(JsonRpcError {
                code,
                message: message.into(),
                data: Some(data),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Error(_))
    }

    /// Splits the envelope into its payload, turning an error object into `Err`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.outcome {
            ResponseOutcome::Result(value) => Ok(value),
            ResponseOutcome::Error(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawResponse {
    #[serde(default)]
    jsonrpc: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    id: Option<Option<JsonRpcId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

// Distinguishes an absent `id` (outer `None`) from an explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<JsonRpcId>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<JsonRpcId>::deserialize(deserializer).map(Some)
}

impl TryFrom<RawResponse> for JsonRpcResponse {
    type Error = String;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        let Some(id) = raw.id else {
            return Err("response is missing `id`".to_string());
        };

        let outcome = match (raw.result, raw.error) {
            (Some(result), None) => {
                if id.is_none() {
                    return Err("result response must carry a non-null `id`".to_string());
                }
                ResponseOutcome::Result(result)
            }
            (None, Some(error)) => ResponseOutcome::Error(error),
            (Some(_), Some(_)) => {
                return Err("response carries both `result` and `error`".to_string())
            }
            (None, None) => return Err("response carries neither `result` nor `error`".to_string()),
        };

        Ok(Self { id, outcome })
    }
}

impl From<JsonRpcResponse> for RawResponse {
    fn from(response: JsonRpcResponse) -> Self {
        let (result, error) = match response.outcome {
            ResponseOutcome::Result(value) => (Some(value), None),
            ResponseOutcome::Error(error) => (None, Some(error)),
        };

        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(response.id),
            result,
            error,
        }
    }
}
