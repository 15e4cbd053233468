//! Failure analysis KB served over stdio. Spawned by the diagnostic agent.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use diagnostic_agency::config::DiagnosticsConfig;
use diagnostic_agency::knowledge::{embedder_from_config, DiagnosticKb};
use diagnostic_agency::services::{serve_stdio, McpService};
use diagnostic_agency::tools::{Channel, FailureAnalysisKbTool, ToolRegistry};
use diagnostic_agency::utils::{init_tracing, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    // stdout carries protocol frames only
    let _log = init_tracing("mcp_local_server", LogTarget::Stderr);

    let config = DiagnosticsConfig::from_env();
    let kb = Arc::new(DiagnosticKb::with_playbooks(embedder_from_config(&config)).await);
    info!("Failure analysis KB ready with {} documents", kb.len().await);

    let registry = ToolRegistry::builder()
        .register(
            Channel::InProcess,
            Arc::new(FailureAnalysisKbTool::new(kb, config.kb_top_n)),
        )
        .build()?;

    let service = McpService::new("MCP-Local-Server", Arc::new(registry)).with_diagnostic_prompt();
    serve_stdio(service).await
}
