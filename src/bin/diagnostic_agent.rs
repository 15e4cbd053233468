//! One-shot local run of the diagnostic agent against the stock alert.

use anyhow::Result;
use clap::Parser;

use diagnostic_agency::agent::{query_agent, TraceLevel, DIAGNOSTIC_QUERY};
use diagnostic_agency::config::DiagnosticsConfig;
use diagnostic_agency::utils::{init_tracing, LogTarget};

#[derive(Parser)]
#[command(name = "diagnostic_agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Root-cause the stock latency alert with the diagnostic agent", long_about = None)]
struct Cli {
    /// Model to reason with (gpt-oss:20b or granite4:32b-a9b-h)
    #[arg(long)]
    model: Option<String>,

    /// Print tool calls, results and timings
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let _log = init_tracing("diagnostic_agent", LogTarget::Stdout);

    let cli = Cli::parse();
    let config = DiagnosticsConfig::from_env();
    let level = if cli.verbose {
        TraceLevel::Verbose
    } else {
        TraceLevel::Normal
    };

    println!("\nRunning Query Agent...");
    let response = query_agent(DIAGNOSTIC_QUERY, cli.model.as_deref(), level, &config).await;
    println!("\nResponse: {}", response);
    Ok(())
}
