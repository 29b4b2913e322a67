//! Error types for the MCP layer and how tool failures reach the client.

use std::time::Duration;

use rmcp::model::{CallToolResult, Content, ErrorCode};
use rmcp::ErrorData;
use serde_json::json;

use super::schema::SchemaError;
use crate::catalog::FetchError;
use crate::models::QueryError;

/// JSON-RPC code for a request the client cancelled or whose session closed
pub const REQUEST_CANCELLED: ErrorCode = ErrorCode(-32800);

/// Failure of one `tools/call`
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] SchemaError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) | ToolError::InvalidArguments(_) => "SchemaValidationError",
            ToolError::Fetch(e) => e.kind(),
            ToolError::Internal(_) => "InternalError",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Fetch(e) if e.is_retryable())
    }

    /// Client-facing description; internal details stay in the logs
    pub fn message(&self) -> String {
        match self {
            ToolError::Fetch(FetchError::Internal(_)) | ToolError::Internal(_) => {
                "Internal error while running the tool".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Argument errors become JSON-RPC errors; the rest are `isError` tool
    /// results whose text carries the kind and retry hints
    pub fn into_call_result(self) -> Result<CallToolResult, ErrorData> {
        match self {
            ToolError::UnknownTool(_) | ToolError::InvalidArguments(_) => Err(
                ErrorData::invalid_params(self.to_string(), Some(json!({ "kind": self.kind() }))),
            ),
            ToolError::Fetch(FetchError::InvalidQuery(e)) => Err(ErrorData::invalid_params(
                format!("Invalid query: {}", e),
                Some(json!({ "kind": "InvalidQuery" })),
            )),
            other => {
                if let ToolError::Fetch(FetchError::Internal(detail)) | ToolError::Internal(detail) =
                    &other
                {
                    tracing::error!(%detail, "Tool failed with an internal error");
                }
                let retry_after = match &other {
                    ToolError::Fetch(e) => e.retry_after(),
                    _ => None,
                };
                let text = failure_text(
                    other.kind(),
                    &other.message(),
                    other.is_retryable(),
                    retry_after,
                );
                Ok(CallToolResult::error(vec![Content::text(text)]))
            }
        }
    }
}

impl From<QueryError> for ToolError {
    fn from(err: QueryError) -> Self {
        ToolError::Fetch(FetchError::InvalidQuery(err))
    }
}

/// `kind: message` followed by `key: value` retry hints, one per line
pub fn failure_text(
    kind: &str,
    message: &str,
    retryable: bool,
    retry_after: Option<Duration>,
) -> String {
    let mut text = format!("{}: {}\nretryable: {}", kind, message, retryable);
    if let Some(after) = retry_after {
        text.push_str(&format!("\nretry_after_ms: {}", after.as_millis()));
    }
    text
}

/// Errors from serving the MCP endpoint
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::RawContent;

    fn text_of(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| match &c.raw {
                RawContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_schema_errors_are_invalid_params() {
        let err = ToolError::InvalidArguments(SchemaError {
            path: "$.term".into(),
            message: "expected string, got integer".into(),
        });
        assert_eq!(err.kind(), "SchemaValidationError");
        let rpc = err.into_call_result().unwrap_err();
        assert_eq!(rpc.code, ErrorCode::INVALID_PARAMS);

        let rpc = ToolError::from(QueryError::Unconstrained)
            .into_call_result()
            .unwrap_err();
        assert_eq!(rpc.code, ErrorCode::INVALID_PARAMS);
        assert_eq!(rpc.data.unwrap()["kind"], "InvalidQuery");
    }

    #[test]
    fn test_domain_errors_are_tool_results() {
        let result = ToolError::from(FetchError::RateLimited {
            retry_after: Duration::from_millis(1500),
        })
        .into_call_result()
        .unwrap();
        assert_eq!(result.is_error, Some(true));
        let text = text_of(&result);
        assert!(text.starts_with("RateLimited: "));
        assert!(text.contains("retryable: true"));
        assert!(text.contains("retry_after_ms: 1500"));

        let result = ToolError::from(FetchError::Upstream {
            message: "HTTP 400".into(),
            retryable: false,
        })
        .into_call_result()
        .unwrap();
        assert!(text_of(&result).contains("retryable: false"));
        assert!(!text_of(&result).contains("retry_after_ms"));
    }

    #[test]
    fn test_failures_carry_no_structured_content() {
        let failures = [
            ToolError::from(FetchError::NotFound("no course 'CS 999'".into())),
            ToolError::from(FetchError::Timeout),
            ToolError::from(FetchError::RateLimited {
                retry_after: Duration::from_secs(1),
            }),
            ToolError::Internal("boom".into()),
        ];
        for failure in failures {
            let result = failure.into_call_result().unwrap();
            assert_eq!(result.is_error, Some(true));
            // a failure carries no structured content, so no output schema applies
            assert!(result.structured_content.is_none());
            assert!(!text_of(&result).is_empty());
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let result = ToolError::Internal("output schema mismatch at $.courses".into())
            .into_call_result()
            .unwrap();
        let text = text_of(&result);
        assert!(text.starts_with("InternalError: "));
        assert!(!text.contains("schema"));
    }
}
