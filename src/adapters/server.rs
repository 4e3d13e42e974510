use crate::app::dispatcher::FunctionDispatcher;
use crate::domain::model::FunctionResponse;
use crate::utils::monitor::SystemMonitor;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Shared state of the local development server.
#[derive(Clone)]
pub struct ServerState {
    pub dispatcher: Arc<FunctionDispatcher>,
    pub monitor: Arc<SystemMonitor>,
}

impl ServerState {
    pub fn new(dispatcher: Arc<FunctionDispatcher>, monitor: Arc<SystemMonitor>) -> Self {
        Self {
            dispatcher,
            monitor,
        }
    }
}

/// `POST /{function}`; anything after the first path segment is ignored.
pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/{verb}", post(invoke_handler))
        .route("/{verb}/{*rest}", post(invoke_with_rest_handler))
        .with_state(state)
}

async fn invoke_with_rest_handler(
    State(state): State<ServerState>,
    Path((verb, _rest)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, verb, headers, body).await
}

async fn invoke_handler(
    State(state): State<ServerState>,
    Path(verb): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, verb, headers, body).await
}

async fn dispatch(state: ServerState, verb: String, headers: HeaderMap, body: Bytes) -> Response {
    if !state.dispatcher.knows(&verb) {
        tracing::warn!("❌ Unknown function: {}", verb);
        return StatusCode::NOT_FOUND.into_response();
    }

    let mut data = match parse_body(&body) {
        Ok(data) => data,
        Err(message) => {
            return relay(FunctionResponse::error(
                400,
                crate::core::processor::API_VERSION,
                &message,
            ))
        }
    };

    // 無法透過 invoke 傳遞 HTTP headers，所以把 User-Agent 放進 payload
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|agent| Value::String(agent.to_string()))
        .unwrap_or(Value::Null);
    data.insert("version".to_string(), user_agent);

    let started = Instant::now();
    let response = state.dispatcher.invoke(&verb, Value::Object(data)).await;
    tracing::info!(
        "🚀 {} -> {} in {:.3}s",
        verb,
        response.status_code,
        started.elapsed().as_secs_f64()
    );
    state
        .monitor
        .record_request(&verb, response.status_code, started.elapsed());

    relay(response)
}

fn parse_body(body: &[u8]) -> std::result::Result<Map<String, Value>, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("Error: request body must be a JSON object".to_string()),
        Err(e) => Err(format!("Error: request body is not valid JSON: {}", e)),
    }
}

/// Turn a function envelope into an HTTP response with the same status,
/// headers and body.
fn relay(envelope: FunctionResponse) -> Response {
    let status = StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = Response::new(Body::from(envelope.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid response header {}", name),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert!(parse_body(b"").unwrap().is_empty());
        assert!(parse_body(b"  \n").unwrap().is_empty());
        assert_eq!(parse_body(br#"{"input": "example input"}"#).unwrap()["input"], "example input");
        assert!(parse_body(b"[1, 2]").is_err());
        assert!(parse_body(b"{oops").is_err());
    }

    #[test]
    fn test_relay_copies_status_and_headers() {
        let envelope = FunctionResponse::error(401, "1.0.0", "Error: please upgrade to use this service");
        let response = relay(envelope);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-api-version"], "1.0.0");
        assert_eq!(response.headers()["content-type"], "application/json");
    }
}
