//! The diagnostic agent behind the A2A transport.

use anyhow::Result;
use std::sync::Arc;

use diagnostic_agency::config::DiagnosticsConfig;
use diagnostic_agency::services::a2a::serve;
use diagnostic_agency::services::{diagnostic_agent_card, DiagnosticAgentExecutor};
use diagnostic_agency::utils::{init_tracing, LogTarget};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log = init_tracing("a2a_diagnostic_agent", LogTarget::Stdout);

    let config = DiagnosticsConfig::from_env();
    let card = diagnostic_agent_card(&config.a2a_url);
    let bind = config.a2a_bind.clone();
    let executor = Arc::new(DiagnosticAgentExecutor::new(config));

    serve(card, executor, &bind).await
}
