use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod client;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod user_client;

use domain::registry::ToolRegistry;
use mcp::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new()),
            tools: Arc::new(tools),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::domain::tools::build_user_tools;
    use crate::mcp::codec::{decode_payload, Framing};
    use crate::mcp::server::MCP_SESSION_ID_HEADER;
    use crate::user_client::{NewUser, UserClient, UserClientError, UserPatch, UserSearch};

    use super::*;

    const ACCEPT_BOTH: &str = "application/json, text/event-stream";

    struct MockUserClient;

    #[async_trait::async_trait]
    impl UserClient for MockUserClient {
        async fn add(&self, user: NewUser) -> Result<String, UserClientError> {
            Ok(format!("User {} {} added", user.name, user.surname))
        }

        async fn get(&self, id: i64) -> Result<String, UserClientError> {
            Ok(format!("User {id}: Ada Lovelace"))
        }

        async fn search(&self, _filters: UserSearch) -> Result<String, UserClientError> {
            Ok("No users found".to_string())
        }

        async fn update(&self, id: i64, _patch: UserPatch) -> Result<String, UserClientError> {
            Ok(format!("User {id} updated"))
        }

        async fn delete(&self, _id: i64) -> Result<String, UserClientError> {
            Err(UserClientError::Status {
                status: 404,
                body: "not found".to_string(),
            })
        }
    }

    fn app() -> Router {
        let tools = build_user_tools(Arc::new(MockUserClient)).expect("tool registry");
        build_app(AppState::new(tools))
    }

    async fn post_mcp(
        app: &Router,
        accept: Option<&str>,
        session_id: Option<&str>,
        body: impl Into<Body>,
    ) -> Response {
        let mut builder = Request::builder()
            .uri("/mcp")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        if let Some(session_id) = session_id {
            builder = builder.header(MCP_SESSION_ID_HEADER, session_id);
        }

        app.clone()
            .oneshot(builder.body(body.into()).expect("request build"))
            .await
            .expect("request execution")
    }

    async fn call(app: &Router, session_id: Option<&str>, payload: Value) -> Response {
        post_mcp(app, Some(ACCEPT_BOTH), session_id, payload.to_string()).await
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes()
            .to_vec()
    }

    async fn event_stream_payload(response: Response) -> Value {
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/event-stream")
        );
        let body = body_bytes(response).await;
        decode_payload(&body, Framing::StreamedEnvelope).expect("event stream payload")
    }

    fn session_header(response: &Response) -> Option<String> {
        response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    fn initialize_request() -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0.0"}
            }
        })
    }

    async fn initialized_session(app: &Router) -> String {
        let response = call(app, None, initialize_request()).await;
        let session_id = session_header(&response).expect("session header on initialize");

        let response = call(
            app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        session_id
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_bytes(response).await;
        assert_eq!(body, b"{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_points_at_mcp_endpoint() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let payload: Value =
            serde_json::from_slice(&body_bytes(response).await).expect("discovery json");
        assert_eq!(payload["mcp_endpoint"], "/mcp");
        assert_eq!(payload["name"], env!("CARGO_PKG_NAME"));
    }

    #[tokio::test]
    async fn missing_accept_header_is_not_acceptable() {
        let app = app();
        let response = post_mcp(&app, None, None, initialize_request().to_string()).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

        let response = post_mcp(
            &app,
            Some("application/json"),
            None,
            initialize_request().to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn initialize_opens_session_with_event_stream_response() {
        let app = app();
        let response = call(&app, None, initialize_request()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
            Some("no-cache")
        );
        let session_id = session_header(&response).expect("session header");
        assert!(!session_id.is_empty());

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["id"], 1);
        assert_eq!(payload["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(payload["result"]["serverInfo"]["name"], env!("CARGO_PKG_NAME"));
        assert!(payload["result"]["capabilities"]["tools"].is_object());
        assert!(payload["result"]["capabilities"]["resources"].is_null());
        assert!(payload["result"]["capabilities"]["prompts"].is_null());
    }

    #[tokio::test]
    async fn each_initialize_creates_a_new_session() {
        let app = app();
        let first = session_header(&call(&app, None, initialize_request()).await);
        let second = session_header(&call(&app, None, initialize_request()).await);

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn initialize_without_id_opens_no_session() {
        let tools = build_user_tools(Arc::new(MockUserClient)).expect("tool registry");
        let state = AppState::new(tools);
        let app = build_app(state.clone());

        let mut request = initialize_request();
        request
            .as_object_mut()
            .expect("initialize request object")
            .remove("id");
        let response = call(&app, None, request).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(session_header(&response).is_none());
        let payload: Value =
            serde_json::from_slice(&body_bytes(response).await).expect("error json");
        assert_eq!(payload["code"], "invalid_request");
        assert!(state.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn tools_list_before_initialized_is_rejected() {
        let app = app();
        let response = call(&app, None, initialize_request()).await;
        let session_id = session_header(&response).expect("session header");

        let response = call(
            &app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_or_unknown_session_is_rejected() {
        let app = app();
        let tools_list = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});

        let response = call(&app, None, tools_list.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(&app, Some("not-a-session"), tools_list).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = call(
            &app,
            Some("not-a-session"),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn initialized_notification_is_accepted_with_session_header() {
        let app = app();
        let response = call(&app, None, initialize_request()).await;
        let session_id = session_header(&response).expect("session header");

        let response = call(
            &app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(session_header(&response), Some(session_id));
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn tools_list_returns_registered_tools() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(session_header(&response), Some(session_id));

        let payload = event_stream_payload(response).await;
        let names: Vec<&str> = payload["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "get_user_by_id",
                "search_users",
                "add_user",
                "update_user",
                "delete_user"
            ]
        );
        assert!(payload["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_returns_text_content() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({
                "jsonrpc": "2.0",
                "id": "call-1",
                "method": "tools/call",
                "params": {"name": "get_user_by_id", "arguments": {"id": 1}}
            }),
        )
        .await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["id"], "call-1");
        assert_eq!(payload["result"]["content"][0]["type"], "text");
        assert_eq!(payload["result"]["content"][0]["text"], "User 1: Ada Lovelace");
        assert!(payload["result"]["isError"].is_null());
    }

    #[tokio::test]
    async fn failing_tool_reports_is_error_content() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "delete_user", "arguments": {"id": 7}}
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload = event_stream_payload(response).await;
        assert!(payload.get("error").is_none());
        assert_eq!(payload["result"]["isError"], true);
        let text = payload["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        assert!(text.starts_with("Tool execution error: "));
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "drop_database", "arguments": {}}
            }),
        )
        .await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["error"]["code"], -32601);
        assert_eq!(payload["error"]["message"], "Tool 'drop_database' not found");
        assert_eq!(payload["error"]["data"]["code"], "tool_not_found");
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({
                "jsonrpc": "2.0",
                "id": 5,
                "method": "tools/call",
                "params": {"arguments": {}}
            }),
        )
        .await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"}),
        )
        .await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["id"], 6);
        assert_eq!(payload["error"]["code"], -32601);
        assert_eq!(payload["error"]["message"], "Method 'resources/list' not found");
    }

    #[tokio::test]
    async fn ping_answers_empty_result() {
        let app = app();
        let session_id = initialized_session(&app).await;

        let response = call(
            &app,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}),
        )
        .await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["result"], json!({}));
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let app = app();
        let response = post_mcp(&app, Some(ACCEPT_BOTH), None, "{not json").await;

        assert_eq!(response.status(), StatusCode::OK);
        let payload = event_stream_payload(response).await;
        assert_eq!(payload["error"]["code"], -32700);
        assert!(payload["id"].is_null());
    }

    #[tokio::test]
    async fn batch_body_is_invalid_request() {
        let app = app();
        let response = call(&app, None, json!([initialize_request()])).await;

        let payload = event_stream_payload(response).await;
        assert_eq!(payload["error"]["code"], -32600);
    }
}
