//! MCP client on the `rust-mcp-sdk` client runtime
//!
//! The runtime owns the streamable HTTP transport: it runs the handshake, keeps the
//! session header and correlates responses with requests. `tools/list` is requested
//! untyped so that a server omitting a tool's `inputSchema` still yields descriptors.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use rust_mcp_sdk::{
    error::McpSdkError,
    mcp_client::{client_runtime, ClientHandler, ClientRuntime},
    schema::{
        schema_utils::{RequestFromClient, SdkErrorCodes},
        CallToolRequestParams, ClientCapabilities, ContentBlock, Implementation,
        InitializeRequestParams, InitializeResult,
    },
    McpClient, RequestOptions, StreamableTransportOptions, TransportError,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::{
    ClientError, ClientOptions, ToolDescriptor, ToolSource, ToolsListing, EMPTY_TOOL_RESULT,
};
use crate::mcp::rpc::INVALID_PARAMS;

// Server-initiated requests get the runtime's default answers.
struct RuntimeHandler;

#[async_trait]
impl ClientHandler for RuntimeHandler {}

pub struct SdkMcpClient {
    runtime: Arc<ClientRuntime>,
    endpoint: String,
    session_id: Option<String>,
    request_timeout: Duration,
}

impl fmt::Debug for SdkMcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkMcpClient")
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl SdkMcpClient {
    /// Starts the runtime, which performs `initialize` and `notifications/initialized`.
    ///
    /// The whole handshake is bounded by `request_timeout`.
    pub async fn open(
        endpoint: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let endpoint = endpoint.into();
        let transport_options = StreamableTransportOptions {
            mcp_url: endpoint.clone(),
            request_options: RequestOptions {
                request_timeout: options.request_timeout,
                ..RequestOptions::default()
            },
        };
        let runtime = client_runtime::with_transport_options(
            client_details(&options),
            transport_options,
            RuntimeHandler,
            None,
            None,
        );

        if let Err(err) = within(options.request_timeout, runtime.clone().start()).await {
            if let Err(shutdown_err) = runtime.shut_down().await {
                debug!(endpoint = %endpoint, error = %shutdown_err, "runtime shutdown after failed handshake");
            }
            return Err(err.connect_failed());
        }

        let session_id = runtime.session_id().await;
        if let Some(server) = runtime.server_info() {
            info!(
                endpoint = %endpoint,
                server = %server.server_info.name,
                protocol_version = %server.protocol_version,
                session_id = session_id.as_deref().unwrap_or("-"),
                "mcp session initialized"
            );
        }

        Ok(Self {
            runtime,
            endpoint,
            session_id,
            request_timeout: options.request_timeout,
        })
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Result of the `initialize` exchange.
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.runtime.server_info()
    }

    pub async fn close(self) {
        debug!(endpoint = %self.endpoint, "closing mcp client");
        if let Err(err) = self.runtime.shut_down().await {
            warn!(endpoint = %self.endpoint, error = %err, "mcp runtime did not shut down cleanly");
        }
    }
}

fn client_details(options: &ClientOptions) -> InitializeRequestParams {
    InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: options.client_name.clone(),
            version: options.client_version.clone(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        protocol_version: options.protocol_version.clone(),
        meta: None,
    }
}

// The transport waits on the POST itself without a deadline, so every call is bounded here.
async fn within<T>(
    deadline: Duration,
    call: impl Future<Output = Result<T, McpSdkError>>,
) -> Result<T, ClientError> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|elapsed| ClientError::TransportTimeout(Box::new(elapsed)))?
        .map_err(ClientError::from)
}

impl From<McpSdkError> for ClientError {
    fn from(err: McpSdkError) -> Self {
        match err {
            McpSdkError::RpcError(error)
            | McpSdkError::Transport(TransportError::JsonrpcError(error)) => Self::Protocol {
                code: error.code,
                message: error.message,
            },
            McpSdkError::Transport(TransportError::HttpConnection(err)) => err.into(),
            McpSdkError::Transport(TransportError::Http(status)) => {
                Self::HttpStatus(status.as_u16())
            }
            McpSdkError::Transport(TransportError::UnexpectedContentType(content_type)) => {
                Self::UnsupportedContentType(content_type)
            }
            McpSdkError::SdkError(error) | McpSdkError::Transport(TransportError::Sdk(error))
                if error.code == i64::from(SdkErrorCodes::REQUEST_TIMEOUT) =>
            {
                Self::TransportTimeout(Box::new(error))
            }
            other => Self::Runtime(other.to_string()),
        }
    }
}

#[async_trait]
impl ToolSource for SdkMcpClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ClientError> {
        let result = within(
            self.request_timeout,
            self.runtime
                .request(RequestFromClient::ListToolsRequest(None), None),
        )
        .await?;
        let result =
            serde_json::to_value(result).map_err(|err| ClientError::Decode(err.to_string()))?;

        Ok(ToolsListing::from_result(result)?.into_descriptors())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String, ClientError> {
        debug!(endpoint = %self.endpoint, tool = %name, "calling tool");
        let arguments = match arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            _ => {
                return Err(ClientError::Protocol {
                    code: INVALID_PARAMS,
                    message: "tool arguments must be a JSON object".to_string(),
                })
            }
        };
        let params = CallToolRequestParams {
            name: name.to_string(),
            arguments,
            meta: None,
            task: None,
        };

        let output = within(self.request_timeout, self.runtime.request_tool_call(params)).await?;

        if output.is_error.unwrap_or(false) {
            warn!(tool = %name, "tool reported an execution error");
        }

        Ok(match output.content.into_iter().next() {
            Some(ContentBlock::TextContent(text)) => text.text,
            _ => EMPTY_TOOL_RESULT.to_string(),
        })
    }
}
