//! MCP server: the SDK handler, request accounting, and the stdio and HTTP entrypoints.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::request::Parts;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler, ServiceExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{McpError, REQUEST_CANCELLED};
use super::session::{CloseReason, SessionId, SessionManager};
use super::stdio::{DrainingReader, InFlight, TrackingWriter, DRAIN_TIMEOUT};
use super::tools::ToolRegistry;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::sources::CatalogSource;

const SERVER_NAME: &str = "stanford-mcp";

/// Header carrying the streamable HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

const INSTRUCTIONS: &str = "Tools for Stanford's ExploreCourses catalog. Use search_courses to find \
courses, then get_course or get_schedule with a course id for details. Terms look like \
'2024-2025 Autumn'; a bare quarter uses the default academic year.";

struct ServerInner {
    catalog: Arc<CatalogService>,
    tools: ToolRegistry,
    sessions: SessionManager,
}

/// The MCP server for the course catalog
///
/// Cheap to clone; all clones share the catalog service, tool registry and
/// session table. A clone serving stdio is bound to that pipe's session.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
    bound: Option<SessionId>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.inner.tools.all().len())
            .field("sessions", &self.inner.sessions.len())
            .field("bound", &self.bound)
            .finish()
    }
}

impl McpServer {
    pub fn new(catalog: Arc<CatalogService>, idle_timeout: Duration) -> Self {
        let tools = ToolRegistry::new(Arc::clone(&catalog));
        Self {
            inner: Arc::new(ServerInner {
                catalog,
                tools,
                sessions: SessionManager::new(idle_timeout),
            }),
            bound: None,
        }
    }

    pub fn from_config(source: Arc<dyn CatalogSource>, config: &Config) -> Result<Self, McpError> {
        let catalog = CatalogService::from_config(source, config)
            .map_err(|e| McpError::Config(e.to_string()))?;
        Ok(Self::new(Arc::new(catalog), config.session.idle_timeout()))
    }

    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.inner.catalog
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    /// Every tool as advertised by `tools/list`
    pub fn tool_list(&self) -> Vec<Tool> {
        self.tools().all().iter().map(|t| t.to_tool()).collect()
    }

    fn bound_to(&self, session: SessionId) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            bound: Some(session),
        }
    }

    /// The session a request belongs to: the bound stdio session, else the HTTP header
    fn session_of(&self, context: &RequestContext<RoleServer>) -> Option<SessionId> {
        if let Some(bound) = &self.bound {
            return Some(bound.clone());
        }
        context
            .extensions
            .get::<Parts>()
            .and_then(|parts| parts.headers.get(SESSION_HEADER))
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }

    /// Run one `tools/call` on `session`
    ///
    /// The request counts against the session until it finishes. It ends
    /// with `REQUEST_CANCELLED` if `cancel` fires or the session closes first.
    pub async fn call_tool_in(
        &self,
        session: &SessionId,
        cancel: &CancellationToken,
        name: &str,
        args: Option<Value>,
    ) -> Result<CallToolResult, ErrorData> {
        self.sessions().join(session);
        let guard = self
            .sessions()
            .begin_request(session)
            .map_err(|e| ErrorData::invalid_request(e.to_string(), None))?;

        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled(session, name)),
            _ = guard.cancelled() => Err(cancelled(session, name)),
            result = self.tools().invoke(name, args) => match result {
                Ok(output) => Ok(output.into_call_result()),
                Err(e) => {
                    tracing::info!(%session, tool = name, kind = e.kind(), error = %e, "Tool call failed");
                    e.into_call_result()
                }
            },
        }
    }

    /// Serve one client over a byte stream until it disconnects
    ///
    /// End of input waits for replies to requests already read.
    pub async fn serve_stream<R, W>(&self, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let session = self.sessions().open_pinned();
        let in_flight = InFlight::new();
        let transport = (
            DrainingReader::new(reader, in_flight.clone(), DRAIN_TIMEOUT),
            TrackingWriter::new(writer, in_flight),
        );

        let outcome = match self.bound_to(session.clone()).serve(transport).await {
            Ok(running) => running
                .waiting()
                .await
                .map(|reason| tracing::debug!(session = %session, ?reason, "Service stopped"))
                .map_err(|e| McpError::Transport(e.to_string())),
            Err(e) => Err(McpError::Transport(e.to_string())),
        };

        match outcome {
            Ok(()) => {
                self.sessions().close(&session, CloseReason::ClientDisconnect);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Transport failed");
                self.sessions().close(&session, CloseReason::TransportError);
                Err(e)
            }
        }
    }

    /// Run the server in stdio mode (for desktop MCP clients)
    pub async fn run_stdio(&self) -> Result<(), McpError> {
        tracing::info!("Starting MCP server in stdio mode");
        self.serve_stream(tokio::io::stdin(), tokio::io::stdout())
            .await
    }

    /// Run the streamable HTTP transport until Ctrl-C
    pub async fn run_http(
        &self,
        addr: &str,
        auth_token: Option<String>,
    ) -> Result<(SocketAddr, JoinHandle<()>), McpError> {
        self.run_http_with_shutdown(addr, auth_token, shutdown_signal())
            .await
    }

    /// Run the streamable HTTP transport until `shutdown` resolves
    pub async fn run_http_with_shutdown<F>(
        &self,
        addr: &str,
        auth_token: Option<String>,
        shutdown: F,
    ) -> Result<(SocketAddr, JoinHandle<()>), McpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, auth = auth_token.is_some(), "Starting MCP server in HTTP mode");

        let app = super::http::router(self.clone(), auth_token);
        let sessions = self.sessions().clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "HTTP server failed");
            }
            let closed = sessions.close_all(CloseReason::Shutdown);
            tracing::info!(closed, "HTTP server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Periodically reap idle sessions and purge expired cache entries
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = server.sessions().reap_idle();
                let purged = server.catalog().purge_expired();
                if !reaped.is_empty() || purged > 0 {
                    tracing::debug!(reaped = reaped.len(), purged, "Maintenance pass");
                }
            }
        })
    }
}

fn cancelled(session: &SessionId, tool: &str) -> ErrorData {
    tracing::debug!(%session, tool, "Request cancelled");
    ErrorData::new(
        REQUEST_CANCELLED,
        "Request cancelled",
        Some(json!({ "tool": tool })),
    )
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.into(),
                title: Some("Stanford ExploreCourses".into()),
                version: crate::VERSION.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tool_list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = request.arguments.map(Value::Object);
        match self.session_of(&context) {
            Some(session) => {
                self.call_tool_in(&session, &context.ct, &request.name, args)
                    .await
            }
            // stateless HTTP: account the call on a throwaway session
            None => {
                let session = self.sessions().open();
                let result = self
                    .call_tool_in(&session, &context.ct, &request.name, args)
                    .await;
                self.sessions().close(&session, CloseReason::ClientDisconnect);
                result
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
