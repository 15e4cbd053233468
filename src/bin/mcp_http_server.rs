//! Mock telemetry endpoints served as MCP tools over HTTP.

use anyhow::Result;
use std::sync::Arc;

use diagnostic_agency::config::DiagnosticsConfig;
use diagnostic_agency::services::{serve_http, McpService};
use diagnostic_agency::tools::{telemetry_tools, Channel, ToolRegistry};
use diagnostic_agency::utils::{init_tracing, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log = init_tracing("mcp_http_server", LogTarget::Stdout);

    let config = DiagnosticsConfig::from_env();
    let registry = telemetry_tools()
        .into_iter()
        .fold(ToolRegistry::builder(), |builder, tool| {
            builder.register(Channel::InProcess, tool)
        })
        .build()?;

    let service = McpService::new("MCP-HTTP-Server", Arc::new(registry));
    serve_http(service, &config.mcp_http_bind).await
}
