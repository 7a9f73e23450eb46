//! Tool server orchestration
//!
//! Selects the transport (stdio or HTTP/SSE) and runs the MCP service over
//! it. The server only borrows the scheduler handle; the engine context
//! owns the worker and performs the orderly shutdown when the surrounding
//! select loop unwinds.

use crate::handlers::McpServer;
use agenterra_rmcp::{
    transport::{
        sse_server::{SseServer, SseServerConfig},
        stdio,
    },
    ServiceExt,
};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::HeaderValue;
use axum::response::Response;
use chunkhound_scheduler::SchedulerHandle;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Run the stdio transport: one JSON-RPC message per line
///
/// # Errors
/// Transport failures; a closed stdin ends the service cleanly.
pub async fn run_stdio_server(handle: SchedulerHandle) -> anyhow::Result<()> {
    info!("Starting MCP server on stdio");
    let service = McpServer::new(handle).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Run the HTTP transport with SSE event streaming
///
/// # Errors
/// Bind failures (fatal per the error taxonomy) and serve errors.
pub async fn run_http_server(
    handle: SchedulerHandle,
    addr: SocketAddr,
    cors: bool,
) -> anyhow::Result<()> {
    let sse_config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: CancellationToken::new(),
        sse_keep_alive: Some(SSE_KEEP_ALIVE),
    };
    let (sse_server, router) = SseServer::new(sse_config);
    let _ct = sse_server.with_service(move || McpServer::new(handle.clone()));

    let router = if cors {
        router.layer(axum::middleware::map_response(allow_all_origins))
    } else {
        router
    };

    info!(%addr, "Starting MCP server over HTTP");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Permissive CORS headers for browser-hosted MCP clients
async fn allow_all_origins(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}
