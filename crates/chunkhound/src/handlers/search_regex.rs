//! Handler for the `search_regex` tool

use super::{response_byte_cap, success, ToolError};
use agenterra_rmcp::model::CallToolResult;
use agenterra_rmcp::Error as McpError;
use chunkhound_scheduler::SchedulerHandle;
use chunkhound_storage::{Pagination, RegexSearchRequest, SearchResultRow};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_LIMIT: usize = 10;

/// Parameters for the `search_regex` tool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct SearchRegexParams {
    #[schemars(description = "Regular expression matched against chunk code text")]
    pub pattern: String,
    #[schemars(description = "Relative path substring filter (no .., ~, or absolute paths)")]
    pub path: Option<String>,
    #[schemars(description = "Maximum results per page (default 10)")]
    pub limit: Option<usize>,
    #[schemars(description = "Result offset for pagination (default 0)")]
    pub offset: Option<usize>,
    #[schemars(description = "Cap on the serialized response size, in tokens")]
    pub max_response_tokens: Option<usize>,
}

/// Response envelope for both search tools
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ResultEntry>,
    pub pagination: Pagination,
}

/// One search hit as exposed over the wire
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultEntry {
    pub file: String,
    pub chunk_kind: String,
    pub symbol: String,
    pub start_line: usize,
    pub end_line: usize,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<SearchResultRow> for ResultEntry {
    fn from(row: SearchResultRow) -> Self {
        Self {
            file: row.file,
            chunk_kind: row.chunk_kind,
            symbol: row.symbol,
            start_line: row.start_line,
            end_line: row.end_line,
            code: row.code,
            score: row.score,
        }
    }
}

/// `search_regex` handler
pub async fn search_regex_handler(
    handle: &SchedulerHandle,
    params: &SearchRegexParams,
) -> Result<CallToolResult, McpError> {
    info!(
        target = "handler",
        endpoint = "search_regex",
        pattern = %params.pattern,
        path = params.path.as_deref().unwrap_or(""),
        "Incoming request"
    );

    let request = RegexSearchRequest {
        pattern: params.pattern.clone(),
        path_filter: params.path.clone(),
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
        offset: params.offset.unwrap_or(0),
        max_response_bytes: Some(response_byte_cap(params.max_response_tokens)),
    };

    match handle.search_regex(request).await {
        Ok(page) => success(&SearchResponse {
            results: page.results.into_iter().map(ResultEntry::from).collect(),
            pagination: page.pagination,
        }),
        Err(e) => ToolError::from_scheduler(&e).into_result(),
    }
}
