//! Handler for the `search_semantic` tool

use super::search_regex::{ResultEntry, SearchResponse};
use super::{response_byte_cap, success, ToolError};
use agenterra_rmcp::model::CallToolResult;
use agenterra_rmcp::Error as McpError;
use chunkhound_scheduler::{SchedulerHandle, SemanticQuery};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEFAULT_LIMIT: usize = 10;

/// Parameters for the `search_semantic` tool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct SearchSemanticParams {
    #[schemars(description = "Natural-language description of the code to find")]
    pub query: String,
    #[schemars(description = "Embedding provider tag; defaults to the indexing provider")]
    pub provider: Option<String>,
    #[schemars(description = "Embedding model; defaults to the indexing model")]
    pub model: Option<String>,
    #[schemars(description = "Relative path substring filter (no .., ~, or absolute paths)")]
    pub path: Option<String>,
    #[schemars(description = "Maximum results per page (default 10)")]
    pub limit: Option<usize>,
    #[schemars(description = "Result offset for pagination (default 0)")]
    pub offset: Option<usize>,
    #[schemars(description = "Minimum cosine similarity for a hit")]
    pub threshold: Option<f32>,
    #[schemars(description = "Cap on the serialized response size, in tokens")]
    pub max_response_tokens: Option<usize>,
}

/// `search_semantic` handler
pub async fn search_semantic_handler(
    handle: &SchedulerHandle,
    params: &SearchSemanticParams,
) -> Result<CallToolResult, McpError> {
    info!(
        target = "handler",
        endpoint = "search_semantic",
        query = %params.query,
        "Incoming request"
    );

    let request = SemanticQuery {
        query: params.query.clone(),
        provider: params.provider.clone(),
        model: params.model.clone(),
        path_filter: params.path.clone(),
        limit: params.limit.unwrap_or(DEFAULT_LIMIT),
        offset: params.offset.unwrap_or(0),
        threshold: params.threshold,
        max_response_bytes: Some(response_byte_cap(params.max_response_tokens)),
    };

    match handle.search_semantic(request).await {
        Ok(page) => success(&SearchResponse {
            results: page.results.into_iter().map(ResultEntry::from).collect(),
            pagination: page.pagination,
        }),
        Err(e) => ToolError::from_scheduler(&e).into_result(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_deserialize_with_threshold() {
        let params: SearchSemanticParams = serde_json::from_str(
            r#"{"query": "sum a list of numbers", "limit": 5, "threshold": 0.4}"#,
        )
        .unwrap();
        assert_eq!(params.query, "sum a list of numbers");
        assert_eq!(params.limit, Some(5));
        assert_eq!(params.threshold, Some(0.4));
    }
}
