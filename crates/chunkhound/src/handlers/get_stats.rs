//! Handler for the `get_stats` tool

use super::{success, ToolError};
use agenterra_rmcp::model::CallToolResult;
use agenterra_rmcp::Error as McpError;
use chunkhound_scheduler::SchedulerHandle;
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// Response for `get_stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub files: u64,
    pub chunks: u64,
    pub embeddings_by_model: serde_json::Value,
    pub queue_depth: usize,
    pub background_scan_state: &'static str,
}

/// `get_stats` handler
pub async fn get_stats_handler(handle: &SchedulerHandle) -> Result<CallToolResult, McpError> {
    info!(target = "handler", endpoint = "get_stats", "Incoming request");

    match handle.get_stats().await {
        Ok(stats) => {
            let by_model: serde_json::Map<String, serde_json::Value> = stats
                .embeddings_by_model
                .iter()
                .map(|t| {
                    (
                        format!("{}/{}", t.provider, t.model),
                        json!({"dimension": t.dimension, "vectors": t.vector_count}),
                    )
                })
                .collect();
            success(&StatsResponse {
                files: stats.files,
                chunks: stats.chunks,
                embeddings_by_model: serde_json::Value::Object(by_model),
                queue_depth: stats.queue_depth,
                background_scan_state: stats.background_scan_state,
            })
        }
        Err(e) => ToolError::from_scheduler(&e).into_result(),
    }
}
