//! Axum HTTP handlers for the web server
//!
//! Provides the primary Model Context Protocol endpoint, and general metadata endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::mcp::codec::{self, Framing, MIME_APPLICATION_JSON, MIME_TEXT_EVENT_STREAM};
use crate::mcp::rpc::JsonRpcResponse;
use crate::mcp::server::{decode_request, dispatch, Dispatch, MCP_SESSION_ID_HEADER};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

pub async fn mcp_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !accepts_json_and_event_stream(&headers) {
        return AppError::not_acceptable().into_response();
    }

    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(response) => return event_stream_response(&response, None),
    };

    let session_id = headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    match dispatch(&state, session_id, request).await {
        Ok(Dispatch::Respond {
            response,
            session_id,
        }) => event_stream_response(&response, Some(&session_id)),
        Ok(Dispatch::Accepted { session_id }) => {
            with_session_header(StatusCode::ACCEPTED.into_response(), Some(&session_id))
        }
        Err(err) => err.into_response(),
    }
}

/// The caller must list both media types; wildcards do not count.
pub fn accepts_json_and_event_stream(headers: &HeaderMap) -> bool {
    let accepted: Vec<String> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|item| {
            item.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
        .collect();

    accepted.iter().any(|item| item == MIME_APPLICATION_JSON)
        && accepted.iter().any(|item| item == MIME_TEXT_EVENT_STREAM)
}

fn event_stream_response(response: &JsonRpcResponse, session_id: Option<&str>) -> Response {
    let body = match codec::encode(response, Framing::StreamedEnvelope) {
        Ok(body) => body,
        Err(err) => return AppError::internal(err.to_string()).into_response(),
    };

    let response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, Framing::StreamedEnvelope.content_type()),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response();

    with_session_header(response, session_id)
}

fn with_session_header(mut response: Response, session_id: Option<&str>) -> Response {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_ID_HEADER), value);
    }
    response
}
