//! MCP tool handlers
//!
//! Four tools: `search_regex`, `search_semantic`, `get_stats`, and
//! `health_check`. Each handler enqueues a HIGH-priority task through the
//! scheduler handle and awaits the reply; handlers never touch the store
//! directly.

pub mod get_stats;
pub mod health_check;
pub mod search_regex;
pub mod search_semantic;

// Internal dependencies
use chunkhound_scheduler::{SchedulerError, SchedulerHandle};

// External dependencies
use agenterra_rmcp::{
    handler::server::tool::Parameters, model::CallToolResult, model::Content,
    model::Implementation, model::ProtocolVersion, model::ServerCapabilities, model::ServerInfo,
    model::ToolsCapability, tool, Error as McpError, ServerHandler,
};
use serde::Serialize;

/// Structured error object returned to tool callers
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub kind: &'static str,
    pub message: String,
}

impl ToolError {
    /// Map the internal error taxonomy onto wire-visible kinds
    pub fn from_scheduler(error: &SchedulerError) -> Self {
        let kind = match error {
            SchedulerError::Storage(chunkhound_storage::StorageError::InvalidPathFilter(_)) => {
                "invalid_argument"
            }
            SchedulerError::Storage(chunkhound_storage::StorageError::AnnUnavailable(_))
            | SchedulerError::Embedding(_) => "embedding_unavailable",
            SchedulerError::WorkerGone => "unavailable",
            SchedulerError::Cancelled | SchedulerError::DeadlineExceeded => "cancelled",
            _ => "internal",
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }

    /// Render as an MCP error result
    pub fn into_result(self) -> Result<CallToolResult, McpError> {
        let content = Content::json(&self)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::error(vec![content]))
    }
}

/// Convert a successful serializable response into an MCP result
pub fn success<T: Serialize>(response: &T) -> Result<CallToolResult, McpError> {
    let content =
        Content::json(response).map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![content]))
}

/// Default response-size budget in tokens when the caller does not pass one
const DEFAULT_MAX_RESPONSE_TOKENS: usize = 6_000;

/// Rough bytes-per-token factor for the serialized-size guardrail
const BYTES_PER_TOKEN: usize = 4;

/// Translate a `max_response_tokens` parameter into the byte cap the
/// storage layer enforces
pub fn response_byte_cap(max_response_tokens: Option<usize>) -> usize {
    max_response_tokens.unwrap_or(DEFAULT_MAX_RESPONSE_TOKENS) * BYTES_PER_TOKEN
}

#[derive(Clone)]
pub struct McpServer {
    tool_router: agenterra_rmcp::handler::server::router::tool::ToolRouter<McpServer>,
    handle: SchedulerHandle,
}

impl McpServer {
    /// Create a new MCP server backed by the scheduler handle
    pub fn new(handle: SchedulerHandle) -> Self {
        Self {
            tool_router: Self::tool_router(),
            handle,
        }
    }
}

#[agenterra_rmcp::tool_router]
impl McpServer {
    /// MCP `search_regex` tool
    #[tool(
        description = r#"Exact regular-expression search over indexed code. Patterns match within a single chunk's text (a function, class, comment block, or markdown section); a pattern cannot match across chunk boundaries. Supports an optional relative path filter and offset/limit pagination."#
    )]
    pub async fn search_regex(
        &self,
        Parameters(params): Parameters<search_regex::SearchRegexParams>,
    ) -> Result<CallToolResult, McpError> {
        search_regex::search_regex_handler(&self.handle, &params).await
    }

    /// MCP `search_semantic` tool
    #[tool(
        description = r#"Approximate-nearest-neighbor search over semantic embeddings of code chunks. Finds code by meaning rather than exact text; results carry a cosine similarity score. Pagination across a changing index is best-effort: the vector index is not frozen between pages."#
    )]
    pub async fn search_semantic(
        &self,
        Parameters(params): Parameters<search_semantic::SearchSemanticParams>,
    ) -> Result<CallToolResult, McpError> {
        search_semantic::search_semantic_handler(&self.handle, &params).await
    }

    /// MCP `get_stats` tool
    #[tool(
        description = r#"Index statistics: file and chunk counts, embedding counts per model, scheduler queue depth, and the background scan state."#
    )]
    pub async fn get_stats(&self) -> Result<CallToolResult, McpError> {
        get_stats::get_stats_handler(&self.handle).await
    }

    /// MCP `health_check` tool
    #[tool(
        description = r#"Server health: database connectivity, worker liveness, and the age of the last durability checkpoint."#
    )]
    pub async fn health_check(&self) -> Result<CallToolResult, McpError> {
        health_check::health_check_handler(&self.handle).await
    }
}

#[agenterra_rmcp::tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        let tools_capability = ToolsCapability {
            list_changed: Some(true),
        };

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                experimental: None,
                logging: None,
                completions: None,
                prompts: None,
                resources: None,
                tools: Some(tools_capability),
            },
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "ChunkHound indexes source repositories into a local store and answers \
                 exact regex and semantic embedding searches over code chunks."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_kinds_are_stable() {
        let error = SchedulerError::Embedding("no model".to_string());
        let tool_error = ToolError::from_scheduler(&error);
        assert_eq!(tool_error.kind, "embedding_unavailable");

        let error = SchedulerError::WorkerGone;
        assert_eq!(ToolError::from_scheduler(&error).kind, "unavailable");
    }

    #[test]
    fn response_cap_scales_with_tokens() {
        assert_eq!(response_byte_cap(Some(1000)), 4000);
        assert_eq!(response_byte_cap(None), 24_000);
    }
}
