//! Streamable HTTP transport: the SDK's session-aware service mounted at
//! `/mcp` behind an optional bearer guard, plus `/health`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::server::{McpServer, SESSION_HEADER};
use super::session::{CloseReason, SessionId};

#[derive(Debug)]
struct HttpState {
    server: McpServer,
    auth_token: Option<String>,
}

/// Build the HTTP router; `auth_token` enables the bearer guard on `/mcp`
pub fn router(server: McpServer, auth_token: Option<String>) -> Router {
    let handler = server.clone();
    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );
    let state = Arc::new(HttpState { server, auth_token });

    let mcp = Router::new()
        .nest_service("/mcp", service)
        .layer(middleware::from_fn_with_state(Arc::clone(&state), track_sessions))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer));

    Router::new()
        .merge(mcp)
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .expose_headers([HeaderName::from_static(SESSION_HEADER)]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Token presented with the `Bearer` scheme, which matches case-insensitively
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

async fn require_bearer(State(state): State<Arc<HttpState>>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    if presented == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!(method = %request.method(), "Rejected request without valid bearer token");
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response()
    }
}

/// Mirror the transport's sessions into the session table: a response that
/// issues a session id opens one, a successful `DELETE` closes it
async fn track_sessions(State(state): State<Arc<HttpState>>, request: Request, next: Next) -> Response {
    let deleting = (request.method() == Method::DELETE)
        .then(|| session_header(request.headers()))
        .flatten();

    let response = next.run(request).await;
    let sessions = state.server.sessions();

    if let Some(id) = session_header(response.headers()) {
        sessions.join(&id);
    }
    if let Some(id) = deleting {
        if response.status().is_success() {
            sessions.close(&id, CloseReason::ClientDisconnect);
        }
    }
    response
}

fn session_header(headers: &axum::http::HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.parse().ok())
}

async fn health(State(state): State<Arc<HttpState>>) -> Json<serde_json::Value> {
    let (courses, schools) = state.server.catalog().cache_stats();
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "sessions": state.server.sessions().len(),
        "cache": { "courses": courses, "schools": schools },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogClient, CatalogService, RateLimiter};
    use crate::mcp::SessionState;
    use crate::models::AcademicYear;
    use crate::sources::mock::{make_course, MockSource};
    use crate::utils::RetryPolicy;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use futures_util::StreamExt;
    use serde_json::Value;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(source: Arc<MockSource>, auth_token: Option<&str>) -> (Router, McpServer) {
        let client = CatalogClient::new(
            source,
            Arc::new(RateLimiter::new(1000.0, 100, Duration::from_secs(1))),
            RetryPolicy::none(),
            Duration::from_secs(5),
        );
        let catalog = CatalogService::new(
            client,
            Duration::from_secs(600),
            NonZeroUsize::new(16).unwrap(),
            AcademicYear::new(2024),
        );
        let server = McpServer::new(Arc::new(catalog), Duration::from_secs(60));
        (router(server.clone(), auth_token.map(String::from)), server)
    }

    fn post(body: Value, session: Option<&str>) -> Request<Body> {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/mcp")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream");
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn initialize() -> Value {
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2025-06-18", "capabilities": {},
                          "clientInfo": {"name": "test", "version": "0"}}})
    }

    /// Read an event-stream body until the JSON-RPC reply with `id` shows up
    async fn reply_with_id(response: Response, id: i64) -> Value {
        let mut body = response.into_body().into_data_stream();
        let mut pending = String::new();
        let read = async {
            while let Some(chunk) = body.next().await {
                pending.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
                for line in pending.lines() {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    if let Ok(message) = serde_json::from_str::<Value>(data.trim()) {
                        if message["id"] == id {
                            return message;
                        }
                    }
                }
            }
            panic!("stream ended without a reply to {}", id);
        };
        tokio::time::timeout(Duration::from_secs(10), read).await.unwrap()
    }

    async fn open_session(app: &Router) -> String {
        let response = app.clone().oneshot(post(initialize(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let session = response.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        let reply = reply_with_id(response, 1).await;
        assert_eq!(reply["result"]["serverInfo"]["name"], "stanford-mcp");

        let initialized = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let response = app.clone().oneshot(post(initialized, Some(&session))).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        session
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let source = Arc::new(MockSource::with_courses(&[make_course(
            "105645", "CS", "106A", "Programming Methodology",
        )]));
        let (app, server) = app(source, None);

        let session = open_session(&app).await;
        let id: SessionId = session.parse().unwrap();
        assert_eq!(server.sessions().state(&id), SessionState::Connected);

        let call = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                          "params": {"name": "get_course",
                                     "arguments": {"course_id": "CS106A", "term": "Autumn"}}});
        let response = app.clone().oneshot(post(call, Some(&session))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let reply = reply_with_id(response, 2).await;
        assert_eq!(reply["result"]["structuredContent"]["course"]["course_id"], "105645");
        assert_eq!(server.sessions().state(&id), SessionState::Idle);

        let delete = axum::http::Request::builder()
            .method("DELETE")
            .uri("/mcp")
            .header(SESSION_HEADER, &session)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(delete).await.unwrap();
        assert!(response.status().is_success());
        assert!(server.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_call_gets_an_error_reply() {
        let source = Arc::new(MockSource::new());
        source.set_delay(Duration::from_secs(30));
        let (app, server) = app(Arc::clone(&source), None);
        let session = open_session(&app).await;
        let id: SessionId = session.parse().unwrap();

        let call = json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                          "params": {"name": "search_courses",
                                     "arguments": {"term": "Autumn", "keyword": "slow"}}});
        let response = app.clone().oneshot(post(call, Some(&session))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        while server.sessions().snapshot(&id).is_some_and(|s| s.open_requests == 0) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let cancel = json!({"jsonrpc": "2.0", "method": "notifications/cancelled",
                            "params": {"requestId": 3, "reason": "user aborted"}});
        let accepted = app.clone().oneshot(post(cancel, Some(&session))).await.unwrap();
        assert_eq!(accepted.status(), StatusCode::ACCEPTED);

        let reply = reply_with_id(response, 3).await;
        assert_eq!(reply["error"]["code"], -32800);
        assert_eq!(server.sessions().snapshot(&id).unwrap().open_requests, 0);
    }

    #[tokio::test]
    async fn test_bearer_guard() {
        let (app, _) = app(Arc::new(MockSource::new()), Some("s3cret"));

        let response = app.clone().oneshot(post(initialize(), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        for credentials in ["Bearer s3cret", "bearer s3cret", "BEARER  s3cret"] {
            let mut request = post(initialize(), None);
            request
                .headers_mut()
                .insert(header::AUTHORIZATION, HeaderValue::from_static(credentials));
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", credentials);
        }

        let mut request = post(initialize(), None);
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let health = axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(health).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bEaReR abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
    }
}
