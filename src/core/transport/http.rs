//! HTTP transport implementation.
//!
//! JSON-RPC over POST for MCP clients, a read-only protocol listing, and the
//! signed webhook endpoint that feeds the submission gateway.

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::{TransportError, TransportResult, config::HttpConfig};
use crate::core::McpServer;
use crate::domains::submissions::SubmissionError;
use crate::domains::submissions::webhook::{EVENT_HEADER, SIGNATURE_HEADER};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

/// Incoming JSON-RPC 2.0 message.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Standard JSON-RPC error codes used by this transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
}

impl RpcErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Outgoing JSON-RPC 2.0 message: exactly one of `result` and `error`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code: code.code(),
                message: message.into(),
            }),
        }
    }
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    server: McpServer,
    session: Arc<RwLock<Option<SessionState>>>,
}

#[derive(Debug, Clone)]
struct SessionState {
    initialized: bool,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Routes, without binding a socket.
    pub fn router(&self, server: McpServer) -> Router {
        let state = AppState {
            server,
            session: Arc::new(RwLock::new(None)),
        };

        let mut app = Router::new()
            .route(&self.config.rpc_path, post(handle_rpc))
            .route(&self.config.webhook_path, post(handle_webhook))
            .route("/protocols", get(list_protocols))
            .route("/health", get(health_check))
            .route("/", get(root_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }
        app
    }

    /// Run the HTTP transport.
    pub async fn run(self, server: McpServer) -> TransportResult<()> {
        let addr = self.address();
        let app = self.router(server);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!(
            address = %addr,
            cors = self.config.enable_cors,
            rpc = %self.config.rpc_path,
            webhook = %self.config.webhook_path,
            "HTTP transport listening"
        );

        axum::serve(listener, app)
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(())
    }
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": state.server.name(),
        "version": state.server.version(),
        "transport": "HTTP",
        "protocol": "JSON-RPC 2.0",
        "tools": state.server.lifecycle().registry().snapshot().len(),
    }))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registry listing: every known protocol with its status and tools.
async fn list_protocols(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "protocols": state.server.protocols() }))
}

/// Signed pull-request deliveries.
#[instrument(skip_all)]
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(gateway) = state.server.gateway() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "submissions are not configured" })),
        );
    };

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    match gateway
        .handle_webhook(header(EVENT_HEADER), header(SIGNATURE_HEADER), &body)
        .await
    {
        Ok(submissions) => (
            StatusCode::OK,
            Json(json!({ "processed": submissions.len(), "submissions": submissions })),
        ),
        Err(error) => {
            warn!("Rejected webhook delivery: {}", error);
            let status = match error {
                SubmissionError::Signature => StatusCode::UNAUTHORIZED,
                SubmissionError::Payload(_) => StatusCode::BAD_REQUEST,
                SubmissionError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({ "error": error.to_string() })))
        }
    }
}

#[instrument(skip_all, fields(method))]
async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    tracing::Span::current().record("method", &request.method);
    info!("Received JSON-RPC request: {}", request.method);

    let response = process_request(&state, request).await;

    (StatusCode::OK, Json(response))
}

async fn process_request(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    if request.jsonrpc != "2.0" {
        return JsonRpcResponse::failure(request.id, RpcErrorCode::InvalidRequest, "Invalid Request");
    }

    match request.method.as_str() {
        "initialize" => handle_initialize(state, request).await,
        "tools/list" => handle_tools_list(state, request),
        "tools/call" => handle_tools_call(state, request).await,
        method if method.starts_with("notifications/") => {
            handle_notification(state, &request).await;
            JsonRpcResponse::success(request.id, Value::Null)
        }
        _ => {
            warn!("Unknown method: {}", request.method);
            JsonRpcResponse::failure(request.id, RpcErrorCode::MethodNotFound, "Method not found")
        }
    }
}

async fn handle_initialize(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    *state.session.write().await = Some(SessionState { initialized: false });

    JsonRpcResponse::success(
        request.id,
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": state.server.name(),
                "version": state.server.version()
            },
            "instructions": state.server.instructions()
        }),
    )
}

fn handle_tools_list(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    JsonRpcResponse::success(request.id, json!({ "tools": state.server.tool_descriptors() }))
}

async fn handle_tools_call(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    let Some(params) = request.params else {
        return JsonRpcResponse::failure(request.id, RpcErrorCode::InvalidParams, "Missing params");
    };
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return JsonRpcResponse::failure(request.id, RpcErrorCode::InvalidParams, "Missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    let result = state.server.invoke_tool(name, arguments).await;
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(request.id, value),
        Err(e) => JsonRpcResponse::failure(request.id, RpcErrorCode::Internal, e.to_string()),
    }
}

async fn handle_notification(state: &AppState, request: &JsonRpcRequest) {
    if request.method == "notifications/initialized" {
        info!("Client sent initialized notification");
        if let Some(session) = state.session.write().await.as_mut() {
            session.initialized = true;
        }
    } else {
        info!("Received notification: {}", request.method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::domains::protocols::loader::testing::loader;
    use crate::domains::protocols::validator::fixtures::weather;
    use crate::domains::protocols::{LifecycleManager, ProtocolSource};
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn app() -> Router {
        let lifecycle = Arc::new(LifecycleManager::new(loader()));
        lifecycle
            .load(ProtocolSource::inline("test", weather().to_string()))
            .await
            .unwrap();
        let server = McpServer::with_lifecycle(Config::default(), lifecycle);
        HttpTransport::new(HttpConfig::default()).router(server)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn rpc(method: &str, params: Value) -> Request<Body> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        Request::post("/mcp")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_tools_list_over_rpc() {
        let (status, body) = send(app().await, rpc("tools/list", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["tools"][0]["name"], "weatherApi_getCurrent");
    }

    #[tokio::test]
    async fn test_tools_call_maps_failures_to_error_results() {
        let params = json!({ "name": "weatherApi_getCurrent", "arguments": { "city": 123 } });
        let (_, body) = send(app().await, rpc("tools/call", params)).await;
        assert_eq!(body["result"]["isError"], true);
        assert_eq!(
            body["result"]["structuredContent"]["error"],
            "parameter_validation"
        );
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_, body) = send(app().await, rpc("resources/list", json!({}))).await;
        assert_eq!(body["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_protocol_listing() {
        let request = Request::get("/protocols").body(Body::empty()).unwrap();
        let (status, body) = send(app().await, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["protocols"][0]["name"], "weather-api");
        assert_eq!(body["protocols"][0]["status"], "active");
    }

    #[tokio::test]
    async fn test_webhook_without_gateway() {
        let request = Request::post("/webhooks/submissions")
            .header(EVENT_HEADER, "pull_request")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _) = send(app().await, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
