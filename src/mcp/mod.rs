//! MCP (Model Context Protocol) implementation on the `rmcp` SDK.
//!
//! - [`ToolRegistry`]: the fixed tool set with schema-checked inputs and outputs
//! - [`SessionManager`]: per-client sessions and request accounting
//! - [`McpServer`]: the SDK handler plus the stdio and streamable HTTP entrypoints

mod error;
mod handlers;
pub mod http;
pub mod schema;
pub mod server;
mod session;
mod stdio;
mod tools;

pub use error::{failure_text, McpError, ToolError, REQUEST_CANCELLED};
pub use handlers::{ToolHandler, ToolOutput};
pub use server::{McpServer, SESSION_HEADER};
pub use session::{
    CloseReason, RequestGuard, SessionError, SessionId, SessionInfo, SessionManager, SessionState,
};
pub use stdio::{DrainingReader, InFlight, TrackingWriter, DRAIN_TIMEOUT, MAX_MESSAGE_BYTES};
pub use tools::{ToolDescriptor, ToolKind, ToolRegistry};
