//! Handler for the `health_check` tool

use super::{success, ToolError};
use agenterra_rmcp::model::CallToolResult;
use agenterra_rmcp::Error as McpError;
use chunkhound_scheduler::SchedulerHandle;
use serde::Serialize;
use tracing::info;

/// Response for `health_check`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_connected: bool,
    pub worker_running: bool,
    pub last_checkpoint_age: f64,
}

/// `health_check` handler
pub async fn health_check_handler(handle: &SchedulerHandle) -> Result<CallToolResult, McpError> {
    info!(target = "handler", endpoint = "health_check", "Incoming request");

    match handle.health_check().await {
        Ok(report) => success(&HealthResponse {
            status: report.status,
            db_connected: report.db_connected,
            worker_running: report.worker_running,
            last_checkpoint_age: report.last_checkpoint_age_secs,
        }),
        Err(e) => ToolError::from_scheduler(&e).into_result(),
    }
}
