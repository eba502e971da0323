//! MCP clients over the streamable HTTP transport
//!
//! Two interchangeable implementations of [`ToolSource`]: [`CustomMcpClient`] speaks the
//! wire format directly, [`SdkMcpClient`] runs on the `rust-mcp-sdk` client runtime and
//! its streamable HTTP transport. Both open a session with `initialize` followed by
//! `notifications/initialized` and attach the session header to every later call.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp::codec::CodecError;

pub mod custom;
pub mod discovery;
pub mod sdk;


pub use custom::CustomMcpClient;
pub use discovery::ToolBindings;
pub use sdk::SdkMcpClient;

pub const CLIENT_PROTOCOL_VERSION: &str = "2024-11-05";
pub const ACCEPT_JSON_AND_EVENT_STREAM: &str = "application/json, text/event-stream";

/// Returned by `call_tool` when the server answers successfully without any text content.
pub const EMPTY_TOOL_RESULT: &str = "Tool returned no content";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to MCP server: {0}")]
    ConnectFailed(#[source] Box<ClientError>),
    #[error("MCP server did not answer in time: {0}")]
    TransportTimeout(#[source] BoxError),
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(u16),
    #[error("unsupported response content type `{0}`")]
    UnsupportedContentType(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("MCP Error {code}: {message}")]
    Protocol { code: i64, message: String },
    #[error("unexpected MCP response: {0}")]
    Decode(String),
    #[error("no MCP server provides tool `{0}`")]
    UnknownTool(String),
    #[error("MCP client runtime error: {0}")]
    Runtime(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TransportTimeout(Box::new(err))
        } else {
            Self::Transport(err)
        }
    }
}

impl ClientError {
    /// Wraps a handshake failure. Timeouts stay distinguishable.
    pub fn connect_failed(self) -> Self {
        match self {
            Self::TransportTimeout(_) | Self::ConnectFailed(_) => self,
            other => Self::ConnectFailed(Box::new(other)),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportTimeout(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            protocol_version: CLIENT_PROTOCOL_VERSION.to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientOptions {
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        Ok(reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()?)
    }

    pub(crate) fn initialize_params(&self) -> Value {
        json!({
            "protocolVersion": self.protocol_version,
            "capabilities": {
                "tools": {}
            },
            "clientInfo": {
                "name": self.client_name,
                "version": self.client_version
            }
        })
    }
}

/// A discovered tool in the shape advertised to a function-calling model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn from_server_entry(
        name: String,
        description: Option<String>,
        input_schema: Option<Value>,
    ) -> Self {
        Self {
            name,
            description: description.unwrap_or_default(),
            parameters: input_schema
                .filter(Value::is_object)
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    }

    pub fn to_function_spec(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListedTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

/// `tools/list` result read loosely, so entries without a schema still bind.
#[derive(Debug, Deserialize)]
pub(crate) struct ToolsListing {
    #[serde(default)]
    tools: Vec<ListedTool>,
}

impl ToolsListing {
    pub(crate) fn from_result(result: Value) -> Result<Self, ClientError> {
        serde_json::from_value(result).map_err(|err| ClientError::Decode(err.to_string()))
    }

    pub(crate) fn into_descriptors(self) -> Vec<ToolDescriptor> {
        self.tools
            .into_iter()
            .map(|tool| {
                ToolDescriptor::from_server_entry(tool.name, tool.description, tool.input_schema)
            })
            .collect()
    }
}

#[async_trait]
pub trait ToolSource: Send + Sync {
    fn endpoint(&self) -> &str;
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ClientError>;
}
