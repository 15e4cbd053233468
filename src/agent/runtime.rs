//! Process-level wiring for a diagnostic run: MCP channels, registry, agent.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use super::trace::{ConsoleTrace, NullTrace, TraceLevel, TraceSink};
use super::{
    diagnostic_prompt, provider_from_config, AgentConfig, DiagnosticAgent, ModelProfile,
    FAILURE_SENTINEL,
};
use crate::config::DiagnosticsConfig;
use crate::tools::{McpClient, ToolRegistry};

/// Connect both MCP servers and collect their tools, network tools first.
///
/// The returned clients own the pipe subprocess and must outlive the registry's use.
pub async fn connect_tools(config: &DiagnosticsConfig) -> Result<(ToolRegistry, Vec<Arc<McpClient>>)> {
    println!("MCP local server path: {}", config.mcp_local_command.display());
    let pipe = McpClient::spawn_stdio("local", &config.mcp_local_command, &[])
        .await
        .context("Failed to start the local MCP server")?;
    println!("initializing STDIO client session");

    let network = McpClient::connect_http("http", &config.mcp_http_url)
        .await
        .with_context(|| format!("Failed to reach the MCP server at {}", config.mcp_http_url))?;
    println!("initializing HTTP client session");

    println!("\nloading tools & prompt");
    let registry = ToolRegistry::builder()
        .register_mcp(network.clone())
        .await?
        .register_mcp(pipe.clone())
        .await?
        .build()?;

    Ok((registry, vec![network, pipe]))
}

fn trace_for(level: TraceLevel) -> Arc<dyn TraceSink> {
    if level <= TraceLevel::Normal {
        Arc::new(NullTrace)
    } else {
        Arc::new(ConsoleTrace::new(level))
    }
}

async fn run_query(
    prompt: &str,
    model: Option<&str>,
    level: TraceLevel,
    config: &DiagnosticsConfig,
) -> Result<String> {
    let (registry, _clients) = connect_tools(config).await?;

    println!("\nTools loaded :");
    for tool in registry.list_tools() {
        println!("▪️ {} - {}", tool.name, tool.description);
    }

    let profile = ModelProfile::select(model);
    let agent = DiagnosticAgent::new(
        provider_from_config(config),
        AgentConfig::from_settings(profile, config),
        Arc::new(registry),
    )
    .with_trace(trace_for(level));

    println!("\nAnswering query : {}", prompt);
    let response = agent.run(&diagnostic_prompt(prompt)).await?;
    info!(
        "Diagnostic run finished after {} steps",
        response.steps.len()
    );
    Ok(response.answer)
}

/// Answer `prompt` with a freshly wired diagnostic agent.
///
/// Never fails: any error along the way is printed and `"Error"` is returned.
pub async fn query_agent(
    prompt: &str,
    model: Option<&str>,
    level: TraceLevel,
    config: &DiagnosticsConfig,
) -> String {
    match run_query(prompt, model, level, config).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Diagnostic query failed: {:#}", e);
            println!("Error: {:#}", e);
            FAILURE_SENTINEL.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normal_level_is_silent() {
        assert_eq!(trace_for(TraceLevel::Normal).level(), TraceLevel::Normal);
        assert_eq!(trace_for(TraceLevel::Trace).level(), TraceLevel::Trace);
    }

    #[tokio::test]
    async fn test_missing_local_server_yields_sentinel() {
        let config = DiagnosticsConfig {
            mcp_local_command: PathBuf::from("/nonexistent/mcp_local_server"),
            ..DiagnosticsConfig::default()
        };
        let answer = query_agent("why?", None, TraceLevel::Normal, &config).await;
        assert_eq!(answer, FAILURE_SENTINEL);
    }
}
