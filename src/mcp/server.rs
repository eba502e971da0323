//! The central Model Context Protocol engine
//!
//! Provides JSON-RPC request decoding, session gating, capabilities negotiation
//! (`initialize`), and routing of `tools/list` / `tools/call` into the tool registry.

use rust_mcp_sdk::schema::{
    CallToolResult, ContentBlock, Implementation, InitializeResult, ServerCapabilities,
    ServerCapabilitiesTools, TextContent,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::mcp::rpc::{
    JsonRpcId, JsonRpcRequest, JsonRpcResponse, ResponseOutcome, INTERNAL_ERROR,
    INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::{errors::AppError, AppState};

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
pub const SERVER_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 1] = [SERVER_PROTOCOL_VERSION];

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// What the HTTP layer should send back for a dispatched call.
#[derive(Debug)]
pub enum Dispatch {
    /// One envelope, framed as an event stream, with the session header.
    Respond {
        response: JsonRpcResponse,
        session_id: String,
    },
    /// Bodiless acknowledgement of a notification.
    Accepted { session_id: String },
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

/// Decodes a request body, producing the JSON-RPC error to send back when it is unusable.
pub fn decode_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| JsonRpcResponse::error(None, PARSE_ERROR, "Parse error"))?;

    if payload.is_array() {
        return Err(JsonRpcResponse::error(
            None,
            INVALID_REQUEST,
            "Batch requests are not supported",
        ));
    }

    let request_id = payload
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<JsonRpcId>(id).ok());

    let request: JsonRpcRequest = serde_json::from_value(payload)
        .map_err(|_| JsonRpcResponse::error(request_id.clone(), INVALID_REQUEST, "Invalid Request"))?;

    if request.jsonrpc != JSONRPC_VERSION || request.method.trim().is_empty() {
        return Err(JsonRpcResponse::error(
            request_id,
            INVALID_REQUEST,
            "Invalid Request",
        ));
    }

    Ok(request)
}

/// Applies the session rules to one decoded call and routes it.
pub async fn dispatch(
    state: &AppState,
    session_id: Option<&str>,
    request: JsonRpcRequest,
) -> Result<Dispatch, AppError> {
    if request.method == METHOD_INITIALIZE {
        let Some(id) = request.id else {
            return Err(AppError::initialize_without_id());
        };
        let session = state.sessions.create_session().await;
        let response = handle_initialize(id, request.params.as_ref());
        audit(&session.id, &request.method, request.params.as_ref(), &response);
        return Ok(Dispatch::Respond {
            response,
            session_id: session.id,
        });
    }

    let session_id = session_id.ok_or_else(AppError::missing_session)?;
    let session = state
        .sessions
        .lookup(session_id)
        .await
        .ok_or_else(AppError::unknown_session)?;

    if request.method == METHOD_INITIALIZED {
        let session = state.sessions.activate(&session.id).await?;
        return Ok(Dispatch::Accepted {
            session_id: session.id,
        });
    }

    if !session.is_ready() {
        return Err(AppError::session_not_ready());
    }

    let Some(id) = request.id else {
        debug!(session_id = %session.id, method = %request.method, "notification acknowledged");
        return Ok(Dispatch::Accepted {
            session_id: session.id,
        });
    };

    let audit_params = request.params.clone();
    let response = handle_json_rpc_request(state, id, &request.method, request.params).await;
    audit(&session.id, &request.method, audit_params.as_ref(), &response);

    Ok(Dispatch::Respond {
        response,
        session_id: session.id,
    })
}

pub async fn handle_json_rpc_request(
    state: &AppState,
    id: JsonRpcId,
    method: &str,
    params: Option<Value>,
) -> JsonRpcResponse {
    match method {
        METHOD_PING => JsonRpcResponse::result(id, json!({})),
        METHOD_TOOLS_LIST => JsonRpcResponse::result(
            id,
            json!({
                "tools": state.tools.descriptors(),
            }),
        ),
        METHOD_TOOLS_CALL => handle_tools_call(state, id, params).await,
        _ => JsonRpcResponse::error(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method '{method}' not found"),
        ),
    }
}

pub fn handle_initialize(id: JsonRpcId, params: Option<&Value>) -> JsonRpcResponse {
    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: None,
            prompts: None,
            ..Default::default()
        },
        protocol_version: negotiate_protocol_version(params),
        instructions: None,
        meta: None,
    };

    match serde_json::to_value(initialize_result) {
        Ok(result) => JsonRpcResponse::result(id, result),
        Err(err) => internal_error(id, err),
    }
}

async fn handle_tools_call(state: &AppState, id: JsonRpcId, params: Option<Value>) -> JsonRpcResponse {
    let Some(raw_params) = params else {
        return JsonRpcResponse::error(Some(id), INVALID_PARAMS, "Missing parameters");
    };

    let tool_call: ToolCallParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return JsonRpcResponse::error(Some(id), INVALID_PARAMS, "Invalid params"),
    };

    let Some(name) = tool_call.name.filter(|name| !name.trim().is_empty()) else {
        return JsonRpcResponse::error(
            Some(id),
            INVALID_PARAMS,
            "Missing required parameter: name",
        );
    };

    let Some(tool) = state.tools.get(&name) else {
        return JsonRpcResponse::error_with_data(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Tool '{name}' not found"),
            json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": name,
                },
            }),
        );
    };

    // Execution failures are reported as tool output, never as JSON-RPC errors.
    let (text, is_error) = match tool.execute(tool_call.arguments.unwrap_or_default()).await {
        Ok(text) => (text, false),
        Err(err) => {
            warn!(tool = %name, error = %err, "tool execution failed");
            (format!("Tool execution error: {err}"), true)
        }
    };

    let result = CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: is_error.then_some(true),
        meta: None,
        structured_content: None,
    };

    match serde_json::to_value(result) {
        Ok(result) => JsonRpcResponse::result(id, result),
        Err(err) => internal_error(id, err),
    }
}

fn internal_error(id: JsonRpcId, err: serde_json::Error) -> JsonRpcResponse {
    tracing::error!(error = %err, "failed to serialize result");
    JsonRpcResponse::error(Some(id), INTERNAL_ERROR, "Internal error")
}

/// Echoes the requested version when supported, otherwise answers with our own.
pub fn negotiate_protocol_version(params: Option<&Value>) -> String {
    params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
        .unwrap_or(SERVER_PROTOCOL_VERSION)
        .to_string()
}

fn audit(session_id: &str, method: &str, params: Option<&Value>, response: &JsonRpcResponse) {
    let outcome = match &response.outcome {
        ResponseOutcome::Error(_) => "failure",
        ResponseOutcome::Result(result) if result.get("isError") == Some(&Value::Bool(true)) => {
            "tool_error"
        }
        ResponseOutcome::Result(_) => "success",
    };

    info!(
        session_id = %session_id,
        method = %method,
        params = %redact_audit_params(params),
        outcome,
        "mcp action audited"
    );
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
