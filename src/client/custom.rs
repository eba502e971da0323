//! Hand-rolled MCP client
//!
//! Builds JSON-RPC envelopes itself and reads event-stream bodies chunk by chunk,
//! stopping at the first data record.

use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{
    ClientError, ClientOptions, ToolDescriptor, ToolSource, ToolsListing,
    ACCEPT_JSON_AND_EVENT_STREAM, EMPTY_TOOL_RESULT,
};
use crate::mcp::codec::{self, EventStreamDecoder, Framing, MIME_APPLICATION_JSON};
use crate::mcp::rpc::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::server::{
    MCP_SESSION_ID_HEADER, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};

#[derive(Debug, Deserialize)]
struct ToolCallOutput {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

struct Exchange {
    session_id: Option<String>,
    response: Option<JsonRpcResponse>,
}

#[derive(Debug)]
pub struct CustomMcpClient {
    http: reqwest::Client,
    endpoint: String,
    options: ClientOptions,
    session_id: Option<String>,
}

impl CustomMcpClient {
    /// Connects and completes the `initialize` / `notifications/initialized` handshake.
    pub async fn open(
        endpoint: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let http = options.http_client().map_err(ClientError::connect_failed)?;
        let mut client = Self {
            http,
            endpoint: endpoint.into(),
            options,
            session_id: None,
        };

        client.handshake().await.map_err(ClientError::connect_failed)?;
        Ok(client)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Releases the connection pool.
    pub fn close(self) {
        debug!(endpoint = %self.endpoint, "closing mcp client");
    }

    async fn handshake(&mut self) -> Result<(), ClientError> {
        let params = self.options.initialize_params();
        let (result, session_id) = self.send_request(METHOD_INITIALIZE, Some(params)).await?;
        self.capture_session(session_id);

        info!(
            endpoint = %self.endpoint,
            server = %result["serverInfo"]["name"],
            protocol_version = %result["protocolVersion"],
            session_id = self.session_id.as_deref().unwrap_or("-"),
            "mcp session initialized"
        );

        let exchange = self
            .exchange(&JsonRpcRequest::notification(METHOD_INITIALIZED))
            .await?;
        self.capture_session(exchange.session_id);
        Ok(())
    }

    // Only the first response that carries the header defines the session.
    fn capture_session(&mut self, session_id: Option<String>) {
        if self.session_id.is_none() {
            self.session_id = session_id;
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(Value, Option<String>), ClientError> {
        let request = JsonRpcRequest::new(
            JsonRpcId::String(Uuid::new_v4().to_string()),
            method,
            params,
        );

        let exchange = self.exchange(&request).await?;
        let Some(response) = exchange.response else {
            return Err(ClientError::Decode(format!(
                "server acknowledged `{method}` without a response"
            )));
        };

        let response_id = response.id.clone();
        let result = response
            .into_result()
            .map_err(|error| ClientError::Protocol {
                code: error.code,
                message: error.message,
            })?;

        if response_id != request.id {
            return Err(ClientError::Decode(format!(
                "response id does not match request id for `{method}`"
            )));
        }

        Ok((result, exchange.session_id))
    }

    async fn exchange(&self, request: &JsonRpcRequest) -> Result<Exchange, ClientError> {
        let body = codec::encode(request, Framing::PlainEnvelope)?;
        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, MIME_APPLICATION_JSON)
            .header(ACCEPT, ACCEPT_JSON_AND_EVENT_STREAM)
            .body(body);

        if request.method != METHOD_INITIALIZE {
            if let Some(session_id) = &self.session_id {
                builder = builder.header(MCP_SESSION_ID_HEADER, session_id);
            }
        }

        let mut response = builder.send().await?;
        let status = response.status();
        let session_id = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        debug!(
            method = %request.method,
            status = status.as_u16(),
            content_type = %content_type,
            "mcp http response"
        );

        if !status.is_success() {
            return Err(ClientError::HttpStatus(status.as_u16()));
        }

        if status == StatusCode::ACCEPTED || request.is_notification() {
            return Ok(Exchange {
                session_id,
                response: None,
            });
        }

        let envelope = match Framing::from_content_type(&content_type) {
            Some(Framing::PlainEnvelope) => {
                let body = response.bytes().await?;
                codec::decode(&body, Framing::PlainEnvelope)?
            }
            Some(Framing::StreamedEnvelope) => read_event_stream(&mut response).await?,
            None => return Err(ClientError::UnsupportedContentType(content_type)),
        };

        Ok(Exchange {
            session_id,
            response: Some(envelope),
        })
    }
}

async fn read_event_stream(
    response: &mut reqwest::Response,
) -> Result<JsonRpcResponse, ClientError> {
    let mut decoder = EventStreamDecoder::new();
    while let Some(chunk) = response.chunk().await? {
        if let Some(payload) = decoder.feed(&chunk) {
            return Ok(codec::envelope_from_value(payload)?);
        }
    }

    Ok(codec::envelope_from_value(decoder.finish()?)?)
}

#[async_trait]
impl ToolSource for CustomMcpClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        let (result, _) = self.send_request(METHOD_TOOLS_LIST, None).await?;
        Ok(ToolsListing::from_result(result)?.into_descriptors())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ClientError> {
        debug!(endpoint = %self.endpoint, tool = %name, "calling tool");
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });

        let (result, _) = self.send_request(METHOD_TOOLS_CALL, Some(params)).await?;
        let output: ToolCallOutput =
            serde_json::from_value(result).map_err(|err| ClientError::Decode(err.to_string()))?;

        if output.is_error {
            warn!(tool = %name, "tool reported an execution error");
        }

        Ok(output
            .content
            .first()
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| EMPTY_TOOL_RESULT.to_string()))
    }
}
